//! In-memory [`InboxStore`] implementation for tests and embedding.
//!
//! Items live in a `HashMap` and snapshots in a `Vec` (insertion order is
//! provider order), both behind `std::sync::RwLock`. A save takes both write
//! locks, items first, so the revision check and the snapshot change are
//! observed together.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::eligibility;
use crate::models::{InboxItem, LookupStatus, ProviderSnapshot};

use super::{InboxStore, SnapshotWrite};

pub struct InMemoryStore {
    items: RwLock<HashMap<String, InboxItem>>,
    snapshots: RwLock<Vec<ProviderSnapshot>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(Vec::new()),
        }
    }

    fn select<F>(&self, limit: i64, keep: F) -> Vec<InboxItem>
    where
        F: Fn(&InboxItem) -> bool,
    {
        let items = self.items.read().unwrap();
        let mut out: Vec<InboxItem> = items
            .values()
            .filter(|i| !i.is_deleted() && keep(i))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out.truncate(limit.max(0) as usize);
        out
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_snapshots(stored: &mut Vec<ProviderSnapshot>, item_id: &str, write: &SnapshotWrite) {
    match write {
        SnapshotWrite::Keep => {}
        SnapshotWrite::Purge => stored.retain(|s| s.inbox_item_id != item_id),
        SnapshotWrite::Replace(fresh) => {
            stored.retain(|s| s.inbox_item_id != item_id);
            stored.extend(fresh.iter().cloned());
        }
    }
}

#[async_trait]
impl InboxStore for InMemoryStore {
    async fn upsert_item(&self, item: &InboxItem) -> Result<()> {
        let mut items = self.items.write().unwrap();
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<InboxItem>> {
        let items = self.items.read().unwrap();
        Ok(items.get(id).cloned())
    }

    async fn save_item(
        &self,
        item: &InboxItem,
        expected_revision: i64,
        snapshots: &SnapshotWrite,
    ) -> Result<bool> {
        let mut items = self.items.write().unwrap();
        let mut stored = self.snapshots.write().unwrap();

        match items.get(&item.id) {
            Some(current) if current.revision == expected_revision => {}
            _ => return Ok(false),
        }

        items.insert(item.id.clone(), item.clone());
        apply_snapshots(&mut stored, &item.id, snapshots);
        Ok(true)
    }

    async fn delete_item(&self, id: &str) -> Result<bool> {
        let mut items = self.items.write().unwrap();
        let mut stored = self.snapshots.write().unwrap();
        stored.retain(|s| s.inbox_item_id != id);
        Ok(items.remove(id).is_some())
    }

    async fn snapshots_for(&self, item_id: &str) -> Result<Vec<ProviderSnapshot>> {
        let stored = self.snapshots.read().unwrap();
        let mut out: Vec<ProviderSnapshot> = stored
            .iter()
            .filter(|s| s.inbox_item_id == item_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.confidence().cmp(&a.confidence()));
        Ok(out)
    }

    async fn ocr_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>> {
        Ok(self.select(limit, |i| eligibility::is_ocr_eligible(i, now)))
    }

    async fn lookup_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>> {
        Ok(self.select(limit, |i| eligibility::is_lookup_eligible(i, now)))
    }

    async fn lookup_requeue_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>> {
        Ok(self.select(limit, |i| eligibility::is_lookup_requeue_due(i, now)))
    }

    async fn ocr_requeue_due(&self, now: i64, limit: i64) -> Result<Vec<InboxItem>> {
        Ok(self.select(limit, |i| eligibility::is_ocr_requeue_due(i, now)))
    }

    async fn ocr_stale(
        &self,
        now: i64,
        stale_after_ms: i64,
        limit: i64,
    ) -> Result<Vec<InboxItem>> {
        Ok(self.select(limit, |i| eligibility::is_ocr_stale(i, now, stale_after_ms)))
    }

    async fn count_active(&self) -> Result<i64> {
        let items = self.items.read().unwrap();
        Ok(items.values().filter(|i| !i.is_deleted()).count() as i64)
    }

    async fn list_active(&self, limit: i64) -> Result<Vec<InboxItem>> {
        let mut out = self.select(i64::MAX, |_| true);
        out.reverse();
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn count_by_lookup_status(&self) -> Result<Vec<(LookupStatus, i64)>> {
        let items = self.items.read().unwrap();
        Ok(LookupStatus::ALL
            .iter()
            .map(|status| {
                let n = items
                    .values()
                    .filter(|i| !i.is_deleted() && i.lookup_status == *status)
                    .count() as i64;
                (*status, n)
            })
            .filter(|(_, n)| *n > 0)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateScore, ProviderCandidate, SourceType};

    fn snapshot(item_id: &str, provider_item_id: &str, confidence: i32) -> ProviderSnapshot {
        let candidate = ProviderCandidate {
            provider: "test".into(),
            provider_item_id: provider_item_id.into(),
            ..Default::default()
        };
        let score = CandidateScore {
            confidence,
            reasons: Vec::new(),
        };
        ProviderSnapshot::from_candidate(item_id, &candidate, score, 0)
    }

    #[tokio::test]
    async fn test_save_rejects_stale_revision() {
        let store = InMemoryStore::new();
        let mut item = InboxItem::new(SourceType::Barcode, 10);
        store.upsert_item(&item).await.unwrap();

        item.revision = 1;
        assert!(store.save_item(&item, 0, &SnapshotWrite::Keep).await.unwrap());
        item.revision = 2;
        assert!(!store.save_item(&item, 0, &SnapshotWrite::Keep).await.unwrap());
        assert_eq!(store.get_item(&item.id).await.unwrap().unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_save_on_missing_item_fails() {
        let store = InMemoryStore::new();
        let item = InboxItem::new(SourceType::Barcode, 10);
        assert!(!store.save_item(&item, 0, &SnapshotWrite::Keep).await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_replace_and_ranking() {
        let store = InMemoryStore::new();
        let mut item = InboxItem::new(SourceType::Barcode, 10);
        store.upsert_item(&item).await.unwrap();

        let first = vec![snapshot(&item.id, "a", 40), snapshot(&item.id, "b", 90)];
        item.revision = 1;
        store
            .save_item(&item, 0, &SnapshotWrite::Replace(first))
            .await
            .unwrap();

        let second = vec![
            snapshot(&item.id, "c", 60),
            snapshot(&item.id, "d", 75),
            snapshot(&item.id, "e", 60),
        ];
        item.revision = 2;
        store
            .save_item(&item, 1, &SnapshotWrite::Replace(second))
            .await
            .unwrap();

        let ranked: Vec<String> = store
            .snapshots_for(&item.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.provider_item_id)
            .collect();
        assert_eq!(ranked, vec!["d", "c", "e"]);

        let top = store.top_snapshots(&item.id, 1).await.unwrap();
        assert_eq!(top[0].provider_item_id, "d");
    }

    #[tokio::test]
    async fn test_delete_purges_snapshots() {
        let store = InMemoryStore::new();
        let mut item = InboxItem::new(SourceType::Barcode, 10);
        store.upsert_item(&item).await.unwrap();
        item.revision = 1;
        store
            .save_item(&item, 0, &SnapshotWrite::Replace(vec![snapshot(&item.id, "a", 10)]))
            .await
            .unwrap();

        assert!(store.delete_item(&item.id).await.unwrap());
        assert!(store.snapshots_for(&item.id).await.unwrap().is_empty());
        assert!(!store.delete_item(&item.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_active_queries_skip_deleted_and_order_by_creation() {
        let store = InMemoryStore::new();
        for (ts, barcode) in [(30, "c"), (10, "a"), (20, "b")] {
            let mut item = InboxItem::new(SourceType::Barcode, ts);
            item.barcode = Some(barcode.into());
            item.lookup_status = LookupStatus::Pending;
            store.upsert_item(&item).await.unwrap();
        }
        let mut gone = InboxItem::new(SourceType::Barcode, 5);
        gone.barcode = Some("gone".into());
        gone.lookup_status = LookupStatus::Pending;
        gone.deleted_at = Some(6);
        store.upsert_item(&gone).await.unwrap();

        let due: Vec<String> = store
            .lookup_due(100, 2)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|i| i.barcode)
            .collect();
        assert_eq!(due, vec!["a", "b"]);

        assert_eq!(store.count_active().await.unwrap(), 3);
        let newest = store.list_active(1).await.unwrap();
        assert_eq!(newest[0].barcode.as_deref(), Some("c"));
        assert_eq!(
            store.count_by_lookup_status().await.unwrap(),
            vec![(LookupStatus::Pending, 3)]
        );
    }
}
