//! The inbox pipeline orchestrator.
//!
//! [`Pipeline`] owns every state transition of an [`InboxItem`]. It does no
//! polling of its own: an external scheduler (the app's scan passes, a UI
//! action) calls one operation per item, and each operation is a single
//! read → compute → revision-checked write against the [`InboxStore`].
//!
//! # Return values
//!
//! Transition operations return `Ok(Some(item))` with the persisted item
//! when something changed, and `Ok(None)` when the item is missing,
//! soft-deleted, or the transition does not apply in its current state.
//!
//! # Concurrency
//!
//! No item state is kept between calls. Two transitions racing on the same
//! id are serialised by the store's revision check: the loser re-reads and
//! recomputes, up to [`MAX_WRITE_ATTEMPTS`] times.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::backoff::compute_backoff_millis;
use crate::clock::{Clock, SystemClock};
use crate::eligibility;
use crate::models::{
    non_blank, ErrorCode, ExtractedFields, InboxItem, LookupStatus, OcrStatus, ProviderCandidate,
    ProviderSnapshot, SourceType,
};
use crate::scoring::{score_candidate, CommitRule, ScoreQuery, AUTO_COMMIT_THRESHOLD};
use crate::store::{InboxStore, SnapshotWrite};

/// Attempts before a contended transition gives up.
pub const MAX_WRITE_ATTEMPTS: usize = 5;

/// Tunables for the orchestrator's decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelinePolicy {
    /// Top confidence needed to commit without review.
    pub commit_threshold: i32,
    pub commit_rule: CommitRule,
    /// When set, a failed OCR pass becomes due again after this delay.
    pub ocr_retry_delay_ms: Option<i64>,
    /// When set, an OCR attempt older than this may be released.
    pub ocr_stale_after_ms: Option<i64>,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            commit_threshold: AUTO_COMMIT_THRESHOLD,
            commit_rule: CommitRule::Threshold,
            ocr_retry_delay_ms: None,
            ocr_stale_after_ms: None,
        }
    }
}

/// Observer notified after every persisted change.
pub trait ChangeListener: Send + Sync {
    fn item_changed(&self, item_id: &str);
}

enum Step {
    Write(SnapshotWrite),
    Skip,
}

/// A bulk-import row. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct ImportRow {
    title: Option<String>,
    artist: Option<String>,
    barcode: Option<String>,
    label: Option<String>,
    #[serde(alias = "catno", alias = "catalogNo")]
    catalog_no: Option<String>,
}

fn owned(value: Option<&str>) -> Option<String> {
    non_blank(value).map(String::from)
}

pub struct Pipeline<S: InboxStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    policy: PipelinePolicy,
    rng: Mutex<StdRng>,
    listener: Option<Arc<dyn ChangeListener>>,
}

impl<S: InboxStore> Pipeline<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            policy: PipelinePolicy::default(),
            rng: Mutex::new(StdRng::from_entropy()),
            listener: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: PipelinePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pin the backoff jitter sequence.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policy(&self) -> &PipelinePolicy {
        &self.policy
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn notify(&self, item_id: &str) {
        if let Some(listener) = &self.listener {
            listener.item_changed(item_id);
        }
    }

    // ============ Capture ============

    async fn create(&self, item: InboxItem) -> Result<InboxItem> {
        self.store
            .upsert_item(&item)
            .await
            .with_context(|| format!("Failed to store new inbox item {}", item.id))?;
        info!(
            item_id = %item.id,
            source = item.source_type.as_str(),
            lookup = item.lookup_status.as_str(),
            "captured inbox item"
        );
        self.notify(&item.id);
        Ok(item)
    }

    /// Queue for lookup now if the item carries a signal.
    fn queue_if_signalled(item: &mut InboxItem, now: i64) {
        if eligibility::has_signal(item) {
            item.lookup_status = LookupStatus::Pending;
            item.next_lookup_at = Some(now);
        } else {
            item.lookup_status = LookupStatus::NotEligible;
        }
    }

    pub async fn create_quick_add(&self, title: &str, artist: &str) -> Result<InboxItem> {
        let now = self.now();
        let mut item = InboxItem::new(SourceType::QuickAdd, now);
        item.raw_title = owned(Some(title));
        item.raw_artist = owned(Some(artist));
        Self::queue_if_signalled(&mut item, now);
        self.create(item).await
    }

    pub async fn create_barcode(&self, barcode: &str) -> Result<InboxItem> {
        let now = self.now();
        let mut item = InboxItem::new(SourceType::Barcode, now);
        item.barcode = owned(Some(barcode));
        if item.barcode.is_none() {
            bail!("barcode must not be empty");
        }
        Self::queue_if_signalled(&mut item, now);
        self.create(item).await
    }

    /// Capture a cover photo. The item is OCR-eligible immediately.
    pub async fn create_cover_capture(&self, photo_uri: &str) -> Result<InboxItem> {
        let now = self.now();
        let uri = owned(Some(photo_uri)).context("photo uri must not be empty")?;
        let mut item = InboxItem::new(SourceType::CoverPhoto, now);
        item.photo_uris = vec![uri.clone()];
        item.reference_photo_uri = Some(uri);
        item.next_ocr_at = Some(now);
        self.create(item).await
    }

    /// Capture one bulk-import row (a JSON object).
    ///
    /// Recognised keys: `title`, `artist`, `barcode`, `label`, `catalog_no`
    /// (or `catno` / `catalogNo`). The raw row is kept verbatim.
    pub async fn create_import_row(&self, row_json: &str) -> Result<InboxItem> {
        let row: ImportRow = serde_json::from_str(row_json)
            .context("Import row must be a JSON object")?;

        let now = self.now();
        let mut item = InboxItem::new(SourceType::QuickAdd, now);
        item.raw_row_json = Some(row_json.to_string());
        item.raw_title = owned(row.title.as_deref());
        item.raw_artist = owned(row.artist.as_deref());
        item.barcode = owned(row.barcode.as_deref());
        item.extracted_label = owned(row.label.as_deref());
        item.extracted_catalog_no = owned(row.catalog_no.as_deref());
        Self::queue_if_signalled(&mut item, now);
        self.create(item).await
    }

    // ============ Transition core ============

    async fn transition<F>(&self, id: &str, op: &'static str, mut step: F) -> Result<Option<InboxItem>>
    where
        F: FnMut(&mut InboxItem, i64) -> Step + Send,
    {
        self.transition_with(
            id,
            op,
            || async { Ok::<_, anyhow::Error>(()) },
            |item, _: &(), now| step(item, now),
        )
        .await
    }

    /// Like [`Pipeline::transition`], but `load` runs after each read of the
    /// item so the step sees related rows no older than the item itself.
    async fn transition_with<T, L, Fut, F>(
        &self,
        id: &str,
        op: &'static str,
        load: L,
        mut step: F,
    ) -> Result<Option<InboxItem>>
    where
        T: Send,
        L: Fn() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T>> + Send,
        F: FnMut(&mut InboxItem, &T, i64) -> Step + Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = match self.store.get_item(id).await? {
                Some(item) if !item.is_deleted() => item,
                _ => {
                    debug!(item_id = %id, op, "no active inbox item");
                    return Ok(None);
                }
            };
            let related = load().await?;

            let now = self.now();
            let mut next = current.clone();
            let snapshots = match step(&mut next, &related, now) {
                Step::Write(snapshots) => snapshots,
                Step::Skip => {
                    debug!(item_id = %id, op, "transition not applicable");
                    return Ok(None);
                }
            };
            next.updated_at = now;
            next.revision = current.revision + 1;

            if self
                .store
                .save_item(&next, current.revision, &snapshots)
                .await
                .with_context(|| format!("{}: failed to save inbox item {}", op, id))?
            {
                debug!(
                    item_id = %id,
                    op,
                    ocr = next.ocr_status.as_str(),
                    lookup = next.lookup_status.as_str(),
                    revision = next.revision,
                    "transition applied"
                );
                self.notify(id);
                return Ok(Some(next));
            }

            warn!(item_id = %id, op, attempt, "revision conflict, re-reading");
        }

        bail!(
            "{}: inbox item {} kept changing underneath ({} attempts)",
            op,
            id,
            MAX_WRITE_ATTEMPTS
        )
    }

    // ============ OCR ============

    /// Claim the item for an OCR attempt.
    pub async fn mark_ocr_in_progress(&self, id: &str) -> Result<Option<InboxItem>> {
        self.transition(id, "mark_ocr_in_progress", |item, now| {
            if item.ocr_status == OcrStatus::InProgress {
                return Step::Skip;
            }
            item.ocr_status = OcrStatus::InProgress;
            item.last_tried_at = Some(now);
            Step::Write(SnapshotWrite::Keep)
        })
        .await
    }

    /// Record the outcome of an OCR attempt.
    ///
    /// Only an IN_PROGRESS item takes a result. On success the extracted
    /// fields replace the previous ones and the item is queued for lookup
    /// only if it now carries a signal.
    pub async fn apply_ocr_result(
        &self,
        id: &str,
        fields: &ExtractedFields,
        success: bool,
    ) -> Result<Option<InboxItem>> {
        self.record_ocr(id, None, fields, success).await
    }

    /// [`Pipeline::apply_ocr_result`] for the attempt claimed at
    /// `started_at`. A result from an attempt that was released and
    /// re-claimed since is dropped.
    pub async fn apply_ocr_attempt(
        &self,
        id: &str,
        started_at: i64,
        fields: &ExtractedFields,
        success: bool,
    ) -> Result<Option<InboxItem>> {
        self.record_ocr(id, Some(started_at), fields, success).await
    }

    async fn record_ocr(
        &self,
        id: &str,
        started_at: Option<i64>,
        fields: &ExtractedFields,
        success: bool,
    ) -> Result<Option<InboxItem>> {
        let retry_delay = self.policy.ocr_retry_delay_ms;
        self.transition(id, "apply_ocr_result", |item, now| {
            if item.ocr_status != OcrStatus::InProgress {
                return Step::Skip;
            }
            if started_at.is_some_and(|t| item.last_tried_at != Some(t)) {
                debug!(item_id = %item.id, "result from a superseded OCR attempt");
                return Step::Skip;
            }
            if success {
                item.extracted_title = owned(fields.title.as_deref());
                item.extracted_artist = owned(fields.artist.as_deref());
                item.extracted_label = owned(fields.label.as_deref());
                item.extracted_catalog_no = owned(fields.catalog_no.as_deref());
                item.ocr_status = OcrStatus::Done;
                item.error_code = ErrorCode::None;
                Self::queue_if_signalled(item, now);
            } else {
                item.ocr_status = OcrStatus::Failed;
                item.error_code = ErrorCode::ApiError;
                item.next_ocr_at = retry_delay.map(|delay| now + delay);
            }
            Step::Write(SnapshotWrite::Keep)
        })
        .await
    }

    /// FAILED → NOT_STARTED once the OCR retry time has elapsed.
    pub async fn requeue_ocr(&self, id: &str) -> Result<Option<InboxItem>> {
        self.transition(id, "requeue_ocr", |item, now| {
            if !eligibility::is_ocr_requeue_due(item, now) {
                return Step::Skip;
            }
            item.ocr_status = OcrStatus::NotStarted;
            Step::Write(SnapshotWrite::Keep)
        })
        .await
    }

    /// IN_PROGRESS → NOT_STARTED for an attempt older than the stale timeout.
    ///
    /// Does nothing unless `ocr_stale_after_ms` is configured.
    pub async fn release_stale_ocr(&self, id: &str) -> Result<Option<InboxItem>> {
        let Some(stale_after) = self.policy.ocr_stale_after_ms else {
            return Ok(None);
        };
        self.transition(id, "release_stale_ocr", |item, now| {
            if !eligibility::is_ocr_stale(item, now, stale_after) {
                return Step::Skip;
            }
            item.ocr_status = OcrStatus::NotStarted;
            item.next_ocr_at = Some(now);
            Step::Write(SnapshotWrite::Keep)
        })
        .await
    }

    // ============ Lookup ============

    /// Score a lookup response and decide commit, review, or retry.
    ///
    /// Only a PENDING item takes results. Prior snapshots are always
    /// replaced. An empty response schedules a backoff retry computed from
    /// the retry count before this failure.
    pub async fn apply_lookup_results(
        &self,
        id: &str,
        candidates: &[ProviderCandidate],
        error_code: ErrorCode,
    ) -> Result<Option<InboxItem>> {
        let threshold = self.policy.commit_threshold;
        let rule = self.policy.commit_rule;

        self.transition(id, "apply_lookup_results", |item, now| {
            if item.lookup_status != LookupStatus::Pending {
                return Step::Skip;
            }
            if candidates.is_empty() {
                let delay = {
                    let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                    compute_backoff_millis(error_code, item.retry_count, &mut *rng)
                };
                item.next_lookup_at = Some(now + delay);
                item.retry_count = item.retry_count.saturating_add(1);
                item.lookup_status = LookupStatus::Failed;
                item.error_code = error_code;
                info!(
                    item_id = %item.id,
                    error = error_code.as_str(),
                    retry_count = item.retry_count,
                    delay_ms = delay,
                    "lookup failed, retry scheduled"
                );
                return Step::Write(SnapshotWrite::Purge);
            }

            let query = ScoreQuery {
                title: item.best_title(),
                artist: item.best_artist(),
                catalog_no: item.best_catalog_no(),
                barcode: item.best_barcode(),
            };
            let snapshots: Vec<ProviderSnapshot> = candidates
                .iter()
                .map(|c| ProviderSnapshot::from_candidate(&item.id, c, score_candidate(&query, c), now))
                .collect();

            let mut top_idx = 0;
            for (i, s) in snapshots.iter().enumerate() {
                if s.confidence() > snapshots[top_idx].confidence() {
                    top_idx = i;
                }
            }
            let top = &snapshots[top_idx];
            let second = snapshots
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != top_idx)
                .map(|(_, s)| s.confidence())
                .max();

            let commit = rule.decide(threshold, top.confidence(), second, item.was_undone);
            if commit {
                item.lookup_status = LookupStatus::Committed;
                item.committed_provider_item_id = Some(top.provider_item_id.clone());
            } else {
                item.lookup_status = LookupStatus::NeedsReview;
                item.committed_provider_item_id = None;
            }
            item.error_code = ErrorCode::None;
            item.confidence_score = Some(top.confidence());
            item.confidence_reasons = top.score.reasons.clone();
            item.next_lookup_at = None;

            info!(
                item_id = %item.id,
                candidates = snapshots.len(),
                top = top.confidence(),
                decision = item.lookup_status.as_str(),
                "lookup scored"
            );
            Step::Write(SnapshotWrite::Replace(snapshots))
        })
        .await
    }

    /// FAILED → PENDING once the backoff has elapsed.
    pub async fn requeue_lookup(&self, id: &str) -> Result<Option<InboxItem>> {
        self.transition(id, "requeue_lookup", |item, now| {
            if !eligibility::is_lookup_requeue_due(item, now) {
                return Step::Skip;
            }
            item.lookup_status = LookupStatus::Pending;
            Step::Write(SnapshotWrite::Keep)
        })
        .await
    }

    /// Manual retry: PENDING and due now. The retry count is kept so later
    /// automatic failures still back off from where they left off.
    /// Committed items must be undone first.
    pub async fn retry_lookup(&self, id: &str) -> Result<Option<InboxItem>> {
        self.transition(id, "retry_lookup", |item, now| {
            if item.lookup_status == LookupStatus::Committed || !eligibility::has_signal(item) {
                return Step::Skip;
            }
            item.lookup_status = LookupStatus::Pending;
            item.next_lookup_at = Some(now);
            Step::Write(SnapshotWrite::Keep)
        })
        .await
    }

    // ============ Human decisions ============

    /// NEEDS_REVIEW → COMMITTED on the highest-confidence snapshot.
    pub async fn mark_committed(&self, id: &str) -> Result<Option<InboxItem>> {
        self.transition_with(
            id,
            "mark_committed",
            move || async move {
                let top = self.store.top_snapshots(id, 1).await?;
                Ok::<_, anyhow::Error>(top.into_iter().next())
            },
            |item, top: &Option<ProviderSnapshot>, _now| {
                if item.lookup_status != LookupStatus::NeedsReview {
                    return Step::Skip;
                }
                let Some(top) = top else {
                    return Step::Skip;
                };
                Self::commit_to(item, top);
                Step::Write(SnapshotWrite::Keep)
            },
        )
        .await
    }

    /// NEEDS_REVIEW → COMMITTED on one specific snapshot picked by a human.
    pub async fn confirm_candidate(&self, id: &str, snapshot_id: &str) -> Result<Option<InboxItem>> {
        self.transition_with(
            id,
            "confirm_candidate",
            move || async move { self.store.snapshots_for(id).await },
            |item, snapshots: &Vec<ProviderSnapshot>, _now| {
                if item.lookup_status != LookupStatus::NeedsReview {
                    return Step::Skip;
                }
                let Some(chosen) = snapshots.iter().find(|s| s.id == snapshot_id) else {
                    debug!(item_id = %item.id, snapshot_id, "no such candidate");
                    return Step::Skip;
                };
                Self::commit_to(item, chosen);
                Step::Write(SnapshotWrite::Keep)
            },
        )
        .await
    }

    fn commit_to(item: &mut InboxItem, chosen: &ProviderSnapshot) {
        item.lookup_status = LookupStatus::Committed;
        item.committed_provider_item_id = Some(chosen.provider_item_id.clone());
        item.confidence_score = Some(chosen.confidence());
        item.confidence_reasons = chosen.score.reasons.clone();
        item.error_code = ErrorCode::None;
        item.next_lookup_at = None;
    }

    /// COMMITTED → NEEDS_REVIEW, remembering that a human undid it.
    pub async fn undo_commit(&self, id: &str) -> Result<Option<InboxItem>> {
        self.transition(id, "undo_commit", |item, _now| {
            if item.lookup_status != LookupStatus::Committed {
                return Step::Skip;
            }
            item.lookup_status = LookupStatus::NeedsReview;
            item.committed_provider_item_id = None;
            item.was_undone = true;
            Step::Write(SnapshotWrite::Keep)
        })
        .await
    }

    /// Flag the item as unidentifiable; it parks in review. A committed
    /// item leaves COMMITTED only through [`Pipeline::undo_commit`].
    pub async fn mark_unknown(&self, id: &str) -> Result<Option<InboxItem>> {
        self.transition(id, "mark_unknown", |item, _now| {
            if item.lookup_status == LookupStatus::Committed {
                return Step::Skip;
            }
            item.is_unknown = true;
            item.lookup_status = LookupStatus::NeedsReview;
            item.next_lookup_at = None;
            Step::Write(SnapshotWrite::Keep)
        })
        .await
    }

    /// Apply a human correction to the best-known fields.
    ///
    /// Non-blank values override. An uncommitted item that now carries a
    /// signal is queued for lookup again.
    pub async fn edit_fields(&self, id: &str, fields: &ExtractedFields) -> Result<Option<InboxItem>> {
        if fields.is_empty() {
            return Ok(None);
        }
        self.transition(id, "edit_fields", |item, now| {
            if let Some(v) = owned(fields.title.as_deref()) {
                item.extracted_title = Some(v);
            }
            if let Some(v) = owned(fields.artist.as_deref()) {
                item.extracted_artist = Some(v);
            }
            if let Some(v) = owned(fields.label.as_deref()) {
                item.extracted_label = Some(v);
            }
            if let Some(v) = owned(fields.catalog_no.as_deref()) {
                item.extracted_catalog_no = Some(v);
            }
            item.is_unknown = false;
            if item.lookup_status != LookupStatus::Committed && eligibility::has_signal(item) {
                item.lookup_status = LookupStatus::Pending;
                item.next_lookup_at = Some(now);
            }
            Step::Write(SnapshotWrite::Keep)
        })
        .await
    }

    // ============ Deletion ============

    /// Hide the item from every active query and drop its snapshots.
    pub async fn soft_delete(&self, id: &str) -> Result<Option<InboxItem>> {
        self.transition(id, "soft_delete", |item, now| {
            item.deleted_at = Some(now);
            Step::Write(SnapshotWrite::Purge)
        })
        .await
    }

    /// Remove the item and its snapshots for good.
    pub async fn purge(&self, id: &str) -> Result<bool> {
        let existed = self.store.delete_item(id).await?;
        if existed {
            info!(item_id = %id, "purged inbox item");
            self.notify(id);
        }
        Ok(existed)
    }
}
