//! Live, read-only projections of the inbox.
//!
//! [`LiveInbox`] turns write notifications into `tokio::sync::watch`
//! receivers. Register [`LiveInbox::listener`] on the pipeline, then ask for
//! a projection:
//!
//! | Projection | Value |
//! |------------|-------|
//! | [`active_count`](LiveInbox::active_count) | non-deleted item count |
//! | [`active_items`](LiveInbox::active_items) | newest non-deleted items |
//! | [`item`](LiveInbox::item) | one item, `None` once missing or deleted |
//! | [`top_candidates`](LiveInbox::top_candidates) | an item's best snapshots |
//!
//! Each projection reloads from the store after every change and only
//! publishes when the value differs. Its background task ends when the
//! receiver is dropped.

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use digbin_core::models::{InboxItem, ProviderSnapshot};
use digbin_core::pipeline::ChangeListener;
use digbin_core::store::InboxStore;

/// Bumps a change counter on every pipeline write.
pub struct ChangeSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl ChangeListener for ChangeSignal {
    fn item_changed(&self, _item_id: &str) {
        self.tx.send_modify(|n| *n = n.wrapping_add(1));
    }
}

pub struct LiveInbox<S: InboxStore> {
    store: Arc<S>,
    changes: Arc<watch::Sender<u64>>,
}

impl<S: InboxStore + 'static> LiveInbox<S> {
    pub fn new(store: Arc<S>) -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            store,
            changes: Arc::new(tx),
        }
    }

    /// Listener to register on the pipeline.
    pub fn listener(&self) -> Arc<dyn ChangeListener> {
        Arc::new(ChangeSignal {
            tx: self.changes.clone(),
        })
    }

    /// Force every projection to reload, for writes made outside this
    /// process.
    pub fn poke(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }

    pub async fn active_count(&self) -> Result<watch::Receiver<i64>> {
        let store = self.store.clone();
        self.project(move || {
            let store = store.clone();
            async move { store.count_active().await }
        })
        .await
    }

    pub async fn active_items(&self, limit: i64) -> Result<watch::Receiver<Vec<InboxItem>>> {
        let store = self.store.clone();
        self.project(move || {
            let store = store.clone();
            async move { store.list_active(limit).await }
        })
        .await
    }

    pub async fn item(&self, id: &str) -> Result<watch::Receiver<Option<InboxItem>>> {
        let store = self.store.clone();
        let id = id.to_string();
        self.project(move || {
            let store = store.clone();
            let id = id.clone();
            async move { Ok(store.get_item(&id).await?.filter(|i| !i.is_deleted())) }
        })
        .await
    }

    pub async fn top_candidates(
        &self,
        id: &str,
        limit: i64,
    ) -> Result<watch::Receiver<Vec<ProviderSnapshot>>> {
        let store = self.store.clone();
        let id = id.to_string();
        self.project(move || {
            let store = store.clone();
            let id = id.clone();
            async move { store.top_snapshots(&id, limit).await }
        })
        .await
    }

    /// Load once, then reload after every change until the receiver goes away.
    async fn project<T, F, Fut>(&self, load: F) -> Result<watch::Receiver<T>>
    where
        T: PartialEq + Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut changes = self.changes.subscribe();
        let (tx, rx) = watch::channel(load().await?);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        match load().await {
                            Ok(value) => {
                                tx.send_if_modified(|current| {
                                    if *current == value {
                                        return false;
                                    }
                                    *current = value;
                                    true
                                });
                            }
                            Err(e) => warn!(error = %e, "live projection reload failed"),
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
