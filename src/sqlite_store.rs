//! SQLite-backed [`InboxStore`] implementation.
//!
//! Items live in `inbox_items`, snapshots in `provider_snapshots` (see
//! [`crate::migrate`]). Status enums are stored as their
//! `SCREAMING_SNAKE_CASE` names and decoded with the documented fallbacks;
//! photo URIs and reason lists are JSON text columns.
//!
//! [`save_item`](InboxStore::save_item) runs in one transaction: a
//! revision-guarded `UPDATE`, then the snapshot change. Zero updated rows
//! means the revision moved and nothing is written.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};

use digbin_core::eligibility;
use digbin_core::pipeline::{ChangeListener, Pipeline};
use digbin_core::models::{
    decode_reasons, CandidateScore, ErrorCode, InboxItem, LookupStatus, OcrStatus,
    ProviderSnapshot, SourceType,
};
use digbin_core::store::{InboxStore, SnapshotWrite};
use std::sync::Arc;

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`InboxStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Stream rows for a due-query and keep those passing `keep`, up to
    /// `limit`. The SQL narrows by status and time; `keep` applies the full
    /// eligibility predicate.
    async fn select_due<F>(&self, sql: &str, at: i64, limit: i64, keep: F) -> Result<Vec<InboxItem>>
    where
        F: Fn(&InboxItem) -> bool + Send,
    {
        let limit = limit.max(0) as usize;
        let mut out = Vec::new();
        if limit == 0 {
            return Ok(out);
        }

        let mut rows = sqlx::query(sql).bind(at).fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            let item = item_from_row(&row)?;
            if keep(&item) {
                out.push(item);
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }
}

const ITEM_SELECT: &str = r#"
    SELECT id, source_type, created_at, updated_at, last_tried_at, barcode,
           raw_title, raw_artist, raw_row_json, photo_uris_json, ocr_status,
           next_ocr_at, lookup_status, next_lookup_at, retry_count, error_code,
           extracted_title, extracted_artist, extracted_label, extracted_catalog_no,
           confidence_score, confidence_reasons_json, committed_provider_item_id,
           is_unknown, was_undone, deleted_at, reference_photo_uri, revision
    FROM inbox_items
"#;

const SNAPSHOT_SELECT: &str = r#"
    SELECT id, inbox_item_id, provider, provider_item_id, title, artist, label,
           catalog_no, barcode, format_summary, thumb_url, raw_json, confidence,
           reasons_json, created_at
    FROM provider_snapshots
"#;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind every item column except `id`, in table order.
fn bind_fields<'q>(query: SqliteQuery<'q>, item: &'q InboxItem) -> SqliteQuery<'q> {
    let photo_uris_json =
        serde_json::to_string(&item.photo_uris).unwrap_or_else(|_| "[]".to_string());
    query
        .bind(item.source_type.as_str())
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.last_tried_at)
        .bind(&item.barcode)
        .bind(&item.raw_title)
        .bind(&item.raw_artist)
        .bind(&item.raw_row_json)
        .bind(photo_uris_json)
        .bind(item.ocr_status.as_str())
        .bind(item.next_ocr_at)
        .bind(item.lookup_status.as_str())
        .bind(item.next_lookup_at)
        .bind(item.retry_count as i64)
        .bind(item.error_code.as_str())
        .bind(&item.extracted_title)
        .bind(&item.extracted_artist)
        .bind(&item.extracted_label)
        .bind(&item.extracted_catalog_no)
        .bind(item.confidence_score)
        .bind(item.reasons_json())
        .bind(&item.committed_provider_item_id)
        .bind(item.is_unknown)
        .bind(item.was_undone)
        .bind(item.deleted_at)
        .bind(&item.reference_photo_uri)
        .bind(item.revision)
}

fn item_from_row(row: &SqliteRow) -> Result<InboxItem> {
    let source_type: String = row.try_get("source_type")?;
    let ocr_status: String = row.try_get("ocr_status")?;
    let lookup_status: String = row.try_get("lookup_status")?;
    let error_code: String = row.try_get("error_code")?;
    let photo_uris_json: String = row.try_get("photo_uris_json")?;
    let reasons_json: String = row.try_get("confidence_reasons_json")?;
    let retry_count: i64 = row.try_get("retry_count")?;

    Ok(InboxItem {
        id: row.try_get("id")?,
        source_type: SourceType::decode(&source_type),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_tried_at: row.try_get("last_tried_at")?,
        barcode: row.try_get("barcode")?,
        raw_title: row.try_get("raw_title")?,
        raw_artist: row.try_get("raw_artist")?,
        raw_row_json: row.try_get("raw_row_json")?,
        photo_uris: serde_json::from_str(&photo_uris_json).unwrap_or_default(),
        ocr_status: OcrStatus::decode(&ocr_status),
        next_ocr_at: row.try_get("next_ocr_at")?,
        lookup_status: LookupStatus::decode(&lookup_status),
        next_lookup_at: row.try_get("next_lookup_at")?,
        retry_count: retry_count.clamp(0, u32::MAX as i64) as u32,
        error_code: ErrorCode::decode(&error_code),
        extracted_title: row.try_get("extracted_title")?,
        extracted_artist: row.try_get("extracted_artist")?,
        extracted_label: row.try_get("extracted_label")?,
        extracted_catalog_no: row.try_get("extracted_catalog_no")?,
        confidence_score: row.try_get("confidence_score")?,
        confidence_reasons: decode_reasons(&reasons_json),
        committed_provider_item_id: row.try_get("committed_provider_item_id")?,
        is_unknown: row.try_get("is_unknown")?,
        was_undone: row.try_get("was_undone")?,
        deleted_at: row.try_get("deleted_at")?,
        reference_photo_uri: row.try_get("reference_photo_uri")?,
        revision: row.try_get("revision")?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> Result<ProviderSnapshot> {
    let reasons_json: String = row.try_get("reasons_json")?;
    Ok(ProviderSnapshot {
        id: row.try_get("id")?,
        inbox_item_id: row.try_get("inbox_item_id")?,
        provider: row.try_get("provider")?,
        provider_item_id: row.try_get("provider_item_id")?,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
        label: row.try_get("label")?,
        catalog_no: row.try_get("catalog_no")?,
        barcode: row.try_get("barcode")?,
        format_summary: row.try_get("format_summary")?,
        thumb_url: row.try_get("thumb_url")?,
        raw_json: row.try_get("raw_json")?,
        score: CandidateScore {
            confidence: row.try_get("confidence")?,
            reasons: decode_reasons(&reasons_json),
        },
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl InboxStore for SqliteStore {
    async fn upsert_item(&self, item: &InboxItem) -> Result<()> {
        let query = sqlx::query(
            r#"
            INSERT INTO inbox_items (id, source_type, created_at, updated_at, last_tried_at,
                                     barcode, raw_title, raw_artist, raw_row_json,
                                     photo_uris_json, ocr_status, next_ocr_at, lookup_status,
                                     next_lookup_at, retry_count, error_code, extracted_title,
                                     extracted_artist, extracted_label, extracted_catalog_no,
                                     confidence_score, confidence_reasons_json,
                                     committed_provider_item_id, is_unknown, was_undone,
                                     deleted_at, reference_photo_uri, revision)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_type = excluded.source_type,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                last_tried_at = excluded.last_tried_at,
                barcode = excluded.barcode,
                raw_title = excluded.raw_title,
                raw_artist = excluded.raw_artist,
                raw_row_json = excluded.raw_row_json,
                photo_uris_json = excluded.photo_uris_json,
                ocr_status = excluded.ocr_status,
                next_ocr_at = excluded.next_ocr_at,
                lookup_status = excluded.lookup_status,
                next_lookup_at = excluded.next_lookup_at,
                retry_count = excluded.retry_count,
                error_code = excluded.error_code,
                extracted_title = excluded.extracted_title,
                extracted_artist = excluded.extracted_artist,
                extracted_label = excluded.extracted_label,
                extracted_catalog_no = excluded.extracted_catalog_no,
                confidence_score = excluded.confidence_score,
                confidence_reasons_json = excluded.confidence_reasons_json,
                committed_provider_item_id = excluded.committed_provider_item_id,
                is_unknown = excluded.is_unknown,
                was_undone = excluded.was_undone,
                deleted_at = excluded.deleted_at,
                reference_photo_uri = excluded.reference_photo_uri,
                revision = excluded.revision
            "#,
        )
        .bind(&item.id);

        bind_fields(query, item)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to upsert inbox item {}", item.id))?;
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<InboxItem>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", ITEM_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn save_item(
        &self,
        item: &InboxItem,
        expected_revision: i64,
        snapshots: &SnapshotWrite,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let query = sqlx::query(
            r#"
            UPDATE inbox_items SET
                source_type = ?, created_at = ?, updated_at = ?, last_tried_at = ?,
                barcode = ?, raw_title = ?, raw_artist = ?, raw_row_json = ?,
                photo_uris_json = ?, ocr_status = ?, next_ocr_at = ?, lookup_status = ?,
                next_lookup_at = ?, retry_count = ?, error_code = ?, extracted_title = ?,
                extracted_artist = ?, extracted_label = ?, extracted_catalog_no = ?,
                confidence_score = ?, confidence_reasons_json = ?,
                committed_provider_item_id = ?, is_unknown = ?, was_undone = ?,
                deleted_at = ?, reference_photo_uri = ?, revision = ?
            WHERE id = ? AND revision = ?
            "#,
        );
        let updated = bind_fields(query, item)
            .bind(&item.id)
            .bind(expected_revision)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        match snapshots {
            SnapshotWrite::Keep => {}
            SnapshotWrite::Purge => {
                sqlx::query("DELETE FROM provider_snapshots WHERE inbox_item_id = ?")
                    .bind(&item.id)
                    .execute(&mut *tx)
                    .await?;
            }
            SnapshotWrite::Replace(fresh) => {
                sqlx::query("DELETE FROM provider_snapshots WHERE inbox_item_id = ?")
                    .bind(&item.id)
                    .execute(&mut *tx)
                    .await?;

                for (position, snap) in fresh.iter().enumerate() {
                    sqlx::query(
                        r#"
                        INSERT INTO provider_snapshots (id, inbox_item_id, position, provider,
                                                        provider_item_id, title, artist, label,
                                                        catalog_no, barcode, format_summary,
                                                        thumb_url, raw_json, confidence,
                                                        reasons_json, created_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&snap.id)
                    .bind(&item.id)
                    .bind(position as i64)
                    .bind(&snap.provider)
                    .bind(&snap.provider_item_id)
                    .bind(&snap.title)
                    .bind(&snap.artist)
                    .bind(&snap.label)
                    .bind(&snap.catalog_no)
                    .bind(&snap.barcode)
                    .bind(&snap.format_summary)
                    .bind(&snap.thumb_url)
                    .bind(&snap.raw_json)
                    .bind(snap.confidence())
                    .bind(snap.score.reasons_json())
                    .bind(snap.created_at)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_item(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM provider_snapshots WHERE inbox_item_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM inbox_items WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn snapshots_for(&self, item_id: &str) -> Result<Vec<ProviderSnapshot>> {
        let rows = sqlx::query(&format!(
            "{} WHERE inbox_item_id = ? ORDER BY confidence DESC, position ASC",
            SNAPSHOT_SELECT
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(snapshot_from_row).collect()
    }

    async fn top_snapshots(&self, item_id: &str, limit: i64) -> Result<Vec<ProviderSnapshot>> {
        let rows = sqlx::query(&format!(
            "{} WHERE inbox_item_id = ? ORDER BY confidence DESC, position ASC LIMIT ?",
            SNAPSHOT_SELECT
        ))
        .bind(item_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(snapshot_from_row).collect()
    }

    async fn ocr_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>> {
        let sql = format!(
            "{} WHERE deleted_at IS NULL AND ocr_status = 'NOT_STARTED' \
             AND COALESCE(next_ocr_at, 0) <= ? ORDER BY created_at ASC, id ASC",
            ITEM_SELECT
        );
        self.select_due(&sql, now, limit, |i| eligibility::is_ocr_eligible(i, now))
            .await
    }

    async fn lookup_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>> {
        let sql = format!(
            "{} WHERE deleted_at IS NULL AND lookup_status = 'PENDING' \
             AND COALESCE(next_lookup_at, 0) <= ? ORDER BY created_at ASC, id ASC",
            ITEM_SELECT
        );
        self.select_due(&sql, now, limit, |i| eligibility::is_lookup_eligible(i, now))
            .await
    }

    async fn lookup_requeue_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>> {
        let sql = format!(
            "{} WHERE deleted_at IS NULL AND lookup_status = 'FAILED' \
             AND next_lookup_at IS NOT NULL AND next_lookup_at <= ? \
             ORDER BY created_at ASC, id ASC",
            ITEM_SELECT
        );
        self.select_due(&sql, now, limit, |i| eligibility::is_lookup_requeue_due(i, now))
            .await
    }

    async fn ocr_requeue_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>> {
        let sql = format!(
            "{} WHERE deleted_at IS NULL AND ocr_status = 'FAILED' \
             AND next_ocr_at IS NOT NULL AND next_ocr_at <= ? \
             ORDER BY created_at ASC, id ASC",
            ITEM_SELECT
        );
        self.select_due(&sql, now, limit, |i| eligibility::is_ocr_requeue_due(i, now))
            .await
    }

    async fn ocr_stale(
        &self,
        now: i64,
        stale_after_ms: i64,
        limit: i64,
    ) -> Result<Vec<InboxItem>> {
        let sql = format!(
            "{} WHERE deleted_at IS NULL AND ocr_status = 'IN_PROGRESS' \
             AND COALESCE(last_tried_at, 0) <= ? ORDER BY created_at ASC, id ASC",
            ITEM_SELECT
        );
        let cutoff = now.saturating_sub(stale_after_ms);
        self.select_due(&sql, cutoff, limit, |i| {
            eligibility::is_ocr_stale(i, now, stale_after_ms)
        })
        .await
    }

    async fn count_active(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM inbox_items WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn list_active(&self, limit: i64) -> Result<Vec<InboxItem>> {
        let rows = sqlx::query(&format!(
            "{} WHERE deleted_at IS NULL ORDER BY created_at DESC, id DESC LIMIT ?",
            ITEM_SELECT
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    async fn count_by_lookup_status(&self) -> Result<Vec<(LookupStatus, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT lookup_status, COUNT(*) AS n
            FROM inbox_items
            WHERE deleted_at IS NULL
            GROUP BY lookup_status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        // Unrecognised statuses fold into their decode fallback.
        let mut counts = vec![0_i64; LookupStatus::ALL.len()];
        for row in &rows {
            let status: String = row.get("lookup_status");
            let n: i64 = row.get("n");
            let decoded = LookupStatus::decode(&status);
            if let Some(slot) = LookupStatus::ALL.iter().position(|s| *s == decoded) {
                counts[slot] += n;
            }
        }

        Ok(LookupStatus::ALL
            .iter()
            .zip(counts)
            .filter(|(_, n)| *n > 0)
            .map(|(s, n)| (*s, n))
            .collect())
    }
}

/// Orchestrator over the configured database, with the configured policy.
pub async fn open_pipeline(
    config: &Config,
    listener: Option<Arc<dyn ChangeListener>>,
) -> Result<Pipeline<SqliteStore>> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let pipeline = Pipeline::new(store).with_policy(config.pipeline.policy());
    Ok(match listener {
        Some(listener) => pipeline.with_listener(listener),
        None => pipeline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate_pool;
    use digbin_core::models::{ProviderCandidate, ReasonCode};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate_pool(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn snapshot(item_id: &str, provider_item_id: &str, confidence: i32) -> ProviderSnapshot {
        let candidate = ProviderCandidate {
            provider: "fixture".into(),
            provider_item_id: provider_item_id.into(),
            title: "T".into(),
            artist: "A".into(),
            raw_json: "{}".into(),
            ..Default::default()
        };
        let score = CandidateScore {
            confidence,
            reasons: vec![ReasonCode::BarcodeMatch],
        };
        ProviderSnapshot::from_candidate(item_id, &candidate, score, 5)
    }

    #[tokio::test]
    async fn test_item_round_trips_every_field() {
        let store = store().await;
        let mut item = InboxItem::new(SourceType::CoverPhoto, 100);
        item.photo_uris = vec!["file:///a.jpg".into(), "file:///b.jpg".into()];
        item.reference_photo_uri = Some("file:///a.jpg".into());
        item.extracted_title = Some("Blue Train".into());
        item.confidence_score = Some(40);
        item.confidence_reasons = vec![ReasonCode::TitleMatch, ReasonCode::LowSignal];
        item.retry_count = 3;
        item.error_code = ErrorCode::RateLimit;
        item.was_undone = true;
        store.upsert_item(&item).await.unwrap();

        let loaded = store.get_item(&item.id).await.unwrap().unwrap();
        assert_eq!(loaded, item);
        assert!(store.get_item("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_enum_values_fall_back() {
        let store = store().await;
        let item = InboxItem::new(SourceType::Barcode, 100);
        store.upsert_item(&item).await.unwrap();

        sqlx::query(
            "UPDATE inbox_items SET lookup_status = 'LOST', ocr_status = 'WAT', error_code = 'X', \
             source_type = 'FAX', confidence_reasons_json = '[\"barcode_match\",\"psychic\"]' \
             WHERE id = ?",
        )
        .bind(&item.id)
        .execute(store.pool())
        .await
        .unwrap();

        let loaded = store.get_item(&item.id).await.unwrap().unwrap();
        assert_eq!(loaded.lookup_status, LookupStatus::NotEligible);
        assert_eq!(loaded.ocr_status, OcrStatus::NotStarted);
        assert_eq!(loaded.error_code, ErrorCode::None);
        assert_eq!(loaded.source_type, SourceType::QuickAdd);
        assert_eq!(loaded.confidence_reasons, vec![ReasonCode::BarcodeMatch]);
    }

    #[tokio::test]
    async fn test_save_is_revision_checked_and_replaces_snapshots() {
        let store = store().await;
        let mut item = InboxItem::new(SourceType::Barcode, 100);
        store.upsert_item(&item).await.unwrap();

        item.revision = 1;
        let first = vec![snapshot(&item.id, "a", 30), snapshot(&item.id, "b", 30)];
        assert!(store
            .save_item(&item, 0, &SnapshotWrite::Replace(first))
            .await
            .unwrap());

        item.revision = 2;
        let stale = vec![snapshot(&item.id, "z", 99)];
        assert!(!store
            .save_item(&item, 0, &SnapshotWrite::Replace(stale))
            .await
            .unwrap());

        let ranked: Vec<String> = store
            .snapshots_for(&item.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.provider_item_id)
            .collect();
        assert_eq!(ranked, vec!["a", "b"], "ties keep provider order, stale write ignored");

        let second = vec![snapshot(&item.id, "c", 10), snapshot(&item.id, "d", 80)];
        assert!(store
            .save_item(&item, 1, &SnapshotWrite::Replace(second))
            .await
            .unwrap());
        let top = store.top_snapshots(&item.id, 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].provider_item_id, "d");
        assert_eq!(top[0].score.reasons, vec![ReasonCode::BarcodeMatch]);

        item.revision = 3;
        assert!(store.save_item(&item, 2, &SnapshotWrite::Purge).await.unwrap());
        assert!(store.snapshots_for(&item.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_due_queries_match_eligibility() {
        let store = store().await;

        let mut pending = InboxItem::new(SourceType::Barcode, 10);
        pending.barcode = Some("X1".into());
        pending.lookup_status = LookupStatus::Pending;
        pending.next_lookup_at = Some(50);
        store.upsert_item(&pending).await.unwrap();

        // PENDING without a signal never comes back.
        let mut hollow = InboxItem::new(SourceType::QuickAdd, 5);
        hollow.lookup_status = LookupStatus::Pending;
        store.upsert_item(&hollow).await.unwrap();

        let mut cover = InboxItem::new(SourceType::CoverPhoto, 20);
        cover.photo_uris = vec!["file:///c.jpg".into()];
        cover.next_ocr_at = Some(20);
        store.upsert_item(&cover).await.unwrap();

        let mut failed = InboxItem::new(SourceType::Barcode, 30);
        failed.barcode = Some("X2".into());
        failed.lookup_status = LookupStatus::Failed;
        failed.next_lookup_at = Some(70);
        store.upsert_item(&failed).await.unwrap();

        let mut stuck = InboxItem::new(SourceType::CoverPhoto, 40);
        stuck.photo_uris = vec!["file:///s.jpg".into()];
        stuck.ocr_status = OcrStatus::InProgress;
        stuck.last_tried_at = Some(40);
        store.upsert_item(&stuck).await.unwrap();

        let ids = |items: Vec<InboxItem>| items.into_iter().map(|i| i.id).collect::<Vec<_>>();

        assert!(store.lookup_due(49, 10).await.unwrap().is_empty());
        assert_eq!(ids(store.lookup_due(50, 10).await.unwrap()), vec![pending.id.clone()]);
        assert_eq!(ids(store.ocr_due(20, 10).await.unwrap()), vec![cover.id.clone()]);
        assert!(store.lookup_requeue_due(69, 10).await.unwrap().is_empty());
        assert_eq!(ids(store.lookup_requeue_due(70, 10).await.unwrap()), vec![failed.id.clone()]);
        assert!(store.ocr_stale(100, 61, 10).await.unwrap().is_empty());
        assert_eq!(ids(store.ocr_stale(100, 60, 10).await.unwrap()), vec![stuck.id.clone()]);
        assert!(store.ocr_requeue_due(1_000, 10).await.unwrap().is_empty());
        assert!(store.lookup_due(1_000, 0).await.unwrap().is_empty());

        assert_eq!(store.count_active().await.unwrap(), 5);
        assert_eq!(
            store.count_by_lookup_status().await.unwrap(),
            vec![
                (LookupStatus::NotEligible, 2),
                (LookupStatus::Pending, 2),
                (LookupStatus::Failed, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_deleted_items_leave_active_views() {
        let store = store().await;
        let mut item = InboxItem::new(SourceType::Barcode, 10);
        item.barcode = Some("X1".into());
        item.lookup_status = LookupStatus::Pending;
        store.upsert_item(&item).await.unwrap();
        let newer = InboxItem::new(SourceType::QuickAdd, 20);
        store.upsert_item(&newer).await.unwrap();

        assert_eq!(store.list_active(10).await.unwrap()[0].id, newer.id);

        item.deleted_at = Some(30);
        item.revision = 1;
        assert!(store.save_item(&item, 0, &SnapshotWrite::Purge).await.unwrap());
        assert!(store.lookup_due(100, 10).await.unwrap().is_empty());
        assert_eq!(store.count_active().await.unwrap(), 1);
        assert!(store.get_item(&item.id).await.unwrap().is_some());

        assert!(store.delete_item(&item.id).await.unwrap());
        assert!(!store.delete_item(&item.id).await.unwrap());
    }
}
