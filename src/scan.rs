//! Scan passes: the scheduler that drives the pipeline.
//!
//! One [`Scanner::run_once`] call performs, in order:
//!
//! 1. release OCR attempts stuck past `ocr_stale_after_secs` (if set)
//! 2. requeue failed OCR whose retry time has come
//! 3. OCR every due cover photo through the [`TextExtractor`]
//! 4. requeue failed lookups whose backoff has elapsed
//! 5. look up every due item through the [`LookupProvider`]
//!
//! Each step is bounded by `pipeline.batch_limit` and handles items one at
//! a time; every state change goes through the orchestrator. A disabled
//! collaborator skips its step.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use digbin_core::fields::parse_lines;
use digbin_core::models::{ErrorCode, ExtractedFields, InboxItem, LookupStatus, OcrStatus};
use digbin_core::pipeline::Pipeline;
use digbin_core::store::InboxStore;

use crate::config::Config;
use crate::providers::{build_extractor, build_provider};
use crate::sqlite_store::open_pipeline;
use crate::traits::{LookupProvider, LookupQuery, TextExtractor};

/// Counts from one scan pass.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub ocr_released: usize,
    pub ocr_requeued: usize,
    pub ocr_done: usize,
    pub ocr_failed: usize,
    pub lookup_requeued: usize,
    pub committed: usize,
    pub needs_review: usize,
    pub lookup_failed: usize,
}

impl ScanReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

pub struct Scanner<S: InboxStore> {
    pipeline: Arc<Pipeline<S>>,
    extractor: Option<Arc<dyn TextExtractor>>,
    provider: Option<Arc<dyn LookupProvider>>,
    batch_limit: i64,
}

impl<S: InboxStore> Scanner<S> {
    pub fn new(pipeline: Arc<Pipeline<S>>, batch_limit: i64) -> Self {
        Self {
            pipeline,
            extractor: None,
            provider: None,
            batch_limit,
        }
    }

    pub fn with_extractor(mut self, extractor: Option<Arc<dyn TextExtractor>>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_provider(mut self, provider: Option<Arc<dyn LookupProvider>>) -> Self {
        self.provider = provider;
        self
    }

    pub async fn run_once(&self) -> Result<ScanReport> {
        let mut report = ScanReport::default();

        self.release_stale_ocr(&mut report).await?;
        if let Some(extractor) = &self.extractor {
            self.requeue_ocr(&mut report).await?;
            self.ocr_pass(extractor.as_ref(), &mut report).await?;
        }
        if let Some(provider) = &self.provider {
            self.requeue_lookups(&mut report).await?;
            self.lookup_pass(provider.as_ref(), &mut report).await?;
        }

        if !report.is_idle() {
            info!(?report, "scan pass finished");
        }
        Ok(report)
    }

    async fn release_stale_ocr(&self, report: &mut ScanReport) -> Result<()> {
        let Some(stale_after) = self.pipeline.policy().ocr_stale_after_ms else {
            return Ok(());
        };
        let now = self.pipeline.now();
        let stuck = self
            .pipeline
            .store()
            .ocr_stale(now, stale_after, self.batch_limit)
            .await?;
        for item in stuck {
            if self.pipeline.release_stale_ocr(&item.id).await?.is_some() {
                warn!(item_id = %item.id, "released stale OCR attempt");
                report.ocr_released += 1;
            }
        }
        Ok(())
    }

    async fn requeue_ocr(&self, report: &mut ScanReport) -> Result<()> {
        let now = self.pipeline.now();
        for item in self.pipeline.store().ocr_requeue_due(now, self.batch_limit).await? {
            if self.pipeline.requeue_ocr(&item.id).await?.is_some() {
                report.ocr_requeued += 1;
            }
        }
        Ok(())
    }

    async fn ocr_pass(&self, extractor: &dyn TextExtractor, report: &mut ScanReport) -> Result<()> {
        let now = self.pipeline.now();
        for item in self.pipeline.store().ocr_due(now, self.batch_limit).await? {
            let Some(claimed) = self.pipeline.mark_ocr_in_progress(&item.id).await? else {
                continue;
            };
            let Some(photo) = photo_for(&claimed) else {
                continue;
            };
            let started_at = claimed.last_tried_at.unwrap_or(now);

            let outcome = match extractor.extract_text(photo).await {
                Ok(lines) => {
                    let fields = parse_lines(&lines);
                    debug!(item_id = %item.id, lines = lines.len(), "text extracted");
                    self.pipeline
                        .apply_ocr_attempt(&item.id, started_at, &fields, true)
                        .await?
                }
                Err(e) => {
                    warn!(item_id = %item.id, engine = extractor.name(), error = %e, "OCR failed");
                    self.pipeline
                        .apply_ocr_attempt(&item.id, started_at, &ExtractedFields::default(), false)
                        .await?
                }
            };

            match outcome {
                Some(updated) if updated.ocr_status == OcrStatus::Done => report.ocr_done += 1,
                Some(_) => report.ocr_failed += 1,
                None => {}
            }
        }
        Ok(())
    }

    async fn requeue_lookups(&self, report: &mut ScanReport) -> Result<()> {
        let now = self.pipeline.now();
        for item in self.pipeline.store().lookup_requeue_due(now, self.batch_limit).await? {
            if self.pipeline.requeue_lookup(&item.id).await?.is_some() {
                report.lookup_requeued += 1;
            }
        }
        Ok(())
    }

    async fn lookup_pass(&self, provider: &dyn LookupProvider, report: &mut ScanReport) -> Result<()> {
        let now = self.pipeline.now();
        for item in self.pipeline.store().lookup_due(now, self.batch_limit).await? {
            let query = LookupQuery::from_item(&item);
            let (candidates, code) = match provider.search(&query).await {
                Ok(found) if found.is_empty() => (found, ErrorCode::NoMatch),
                Ok(found) => (found, ErrorCode::None),
                Err(e) => {
                    warn!(item_id = %item.id, provider = provider.name(), error = %e, "lookup failed");
                    (Vec::new(), e.code())
                }
            };

            let updated = self
                .pipeline
                .apply_lookup_results(&item.id, &candidates, code)
                .await?;
            match updated.map(|i| i.lookup_status) {
                Some(LookupStatus::Committed) => report.committed += 1,
                Some(LookupStatus::NeedsReview) => report.needs_review += 1,
                Some(LookupStatus::Failed) => report.lookup_failed += 1,
                _ => {}
            }
        }
        Ok(())
    }
}

fn photo_for(item: &InboxItem) -> Option<&str> {
    item.reference_photo_uri
        .as_deref()
        .or_else(|| item.photo_uris.first().map(String::as_str))
}

/// `dig scan`: run one pass against the configured database and print it.
pub async fn run_scan(config: &Config, limit: Option<i64>) -> Result<()> {
    let pipeline = Arc::new(open_pipeline(config, None).await?);
    let scanner = Scanner::new(pipeline, limit.unwrap_or(config.pipeline.batch_limit))
        .with_extractor(build_extractor(&config.ocr))
        .with_provider(build_provider(&config.lookup)?);

    if !config.ocr.is_enabled() {
        println!("OCR is disabled; cover photos wait in NOT_STARTED.");
    }
    if !config.lookup.is_enabled() {
        println!("Lookup is disabled; queued items stay PENDING.");
    }

    let report = scanner.run_once().await?;

    println!("Scan complete.");
    println!(
        "  OCR:     {} done, {} failed, {} requeued, {} released",
        report.ocr_done, report.ocr_failed, report.ocr_requeued, report.ocr_released
    );
    println!(
        "  Lookup:  {} committed, {} needs review, {} failed, {} requeued",
        report.committed, report.needs_review, report.lookup_failed, report.lookup_requeued
    );
    Ok(())
}
