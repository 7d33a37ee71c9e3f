//! Storage abstraction for the inbox pipeline.
//!
//! The [`InboxStore`] trait covers everything the orchestrator, the scan
//! passes, and the read surface need, so backends are interchangeable
//! (SQLite in the app crate, [`memory::InMemoryStore`] here).
//!
//! # Atomicity
//!
//! [`save_item`](InboxStore::save_item) is the only write used by pipeline
//! transitions. It persists the item and its snapshot change as one unit,
//! and only when the stored `revision` still equals the revision the caller
//! read. A `false` return means another writer got there first; the caller
//! re-reads and recomputes.
//!
//! # Batch queries
//!
//! The `*_due` queries return non-deleted items in `created_at` order,
//! bounded by `limit`, and apply the same predicates as
//! [`crate::eligibility`].

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{InboxItem, LookupStatus, ProviderSnapshot};

/// What happens to an item's snapshots alongside an item write.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotWrite {
    /// Leave snapshots untouched.
    Keep,
    /// Delete every existing snapshot, then insert these.
    Replace(Vec<ProviderSnapshot>),
    /// Delete every existing snapshot.
    Purge,
}

/// Abstract storage backend for inbox items and their snapshots.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_item`](InboxStore::upsert_item) | Unconditional insert or replace |
/// | [`get_item`](InboxStore::get_item) | Fetch by id (deleted items included) |
/// | [`save_item`](InboxStore::save_item) | Revision-checked write with snapshot change |
/// | [`delete_item`](InboxStore::delete_item) | Hard delete item and snapshots |
/// | [`snapshots_for`](InboxStore::snapshots_for) | Candidates ranked by confidence |
/// | [`ocr_due`](InboxStore::ocr_due) | OCR-eligible items |
/// | [`lookup_due`](InboxStore::lookup_due) | Lookup-eligible items |
#[async_trait]
pub trait InboxStore: Send + Sync {
    async fn upsert_item(&self, item: &InboxItem) -> Result<()>;

    async fn get_item(&self, id: &str) -> Result<Option<InboxItem>>;

    /// Write `item` if the stored revision equals `expected_revision`.
    ///
    /// The caller sets `item.revision` to the new value before calling.
    async fn save_item(
        &self,
        item: &InboxItem,
        expected_revision: i64,
        snapshots: &SnapshotWrite,
    ) -> Result<bool>;

    /// Remove the item and all of its snapshots. Returns whether it existed.
    async fn delete_item(&self, id: &str) -> Result<bool>;

    /// Snapshots for an item, highest confidence first; ties keep provider order.
    async fn snapshots_for(&self, item_id: &str) -> Result<Vec<ProviderSnapshot>>;

    async fn top_snapshots(&self, item_id: &str, limit: i64) -> Result<Vec<ProviderSnapshot>> {
        let mut all = self.snapshots_for(item_id).await?;
        all.truncate(limit.max(0) as usize);
        Ok(all)
    }

    async fn ocr_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>>;

    async fn lookup_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>>;

    /// FAILED lookups whose backoff has elapsed.
    async fn lookup_requeue_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>>;

    /// FAILED OCR passes whose retry time has elapsed.
    async fn ocr_requeue_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>>;

    /// OCR attempts in flight since before `now - stale_after_ms`.
    async fn ocr_stale(&self, now: i64, stale_after_ms: i64, limit: i64)
        -> Result<Vec<InboxItem>>;

    async fn count_active(&self) -> Result<i64>;

    /// Non-deleted items, newest first.
    async fn list_active(&self, limit: i64) -> Result<Vec<InboxItem>>;

    /// Non-deleted item counts per lookup status.
    async fn count_by_lookup_status(&self) -> Result<Vec<(LookupStatus, i64)>>;
}
