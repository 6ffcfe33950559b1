//! Reconciler - incremental state reconciliation loop
//!
//! ## Responsibilities
//!
//! - Decide, per fetched value, whether the store actually changed
//! - Drain one batch at a time, one update in flight at a time
//! - Keep the shared store responsive by yielding between updates
//!
//! ## Invariants
//!
//! - A value is written iff no stored state exists for its path or the
//!   stored value differs (loose scalar inequality)
//! - Updates apply in producer (depth-first) order within a batch
//! - Batch N+1 never starts before batch N is fully drained
//! - A single failing item never aborts its batch

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::value_store::{StateValue, StoredState, ValueStore};

/// Single (path, value) pair destined for the store
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub name: String,
    pub value: StateValue,
}

impl StateUpdate {
    pub fn new(name: impl Into<String>, value: impl Into<StateValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered batch of pending updates from one fetch result
pub type PendingBatch = Vec<StateUpdate>;

/// Change detector: write iff the path is new or the value differs
///
/// Pure, no I/O. Equality is the loose scalar equality of
/// [`StateValue`]; composites are already normalized upstream.
pub fn should_write(existing: Option<&StoredState>, update: &StateUpdate) -> bool {
    match existing {
        None => true,
        Some(stored) => stored.value != update.value,
    }
}

/// Outcome of one reconciliation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Updates persisted to the store
    pub written: usize,
    /// Updates whose stored value already matched
    pub unchanged: usize,
    /// Updates dropped after a backend read/write failure
    pub skipped: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.written + self.unchanged + self.skipped
    }
}

/// Sequential reconciliation worker
///
/// The store is a shared resource with no locking of its own;
/// serialization is achieved purely through the single-active-batch
/// discipline here.
pub struct ReconciliationQueue {
    store: Arc<dyn ValueStore>,
    /// Held across a whole batch run; a second `reconcile` call queues
    /// behind the first instead of interleaving
    gate: Mutex<()>,
}

impl ReconciliationQueue {
    pub fn new(store: Arc<dyn ValueStore>) -> Self {
        Self {
            store,
            gate: Mutex::new(()),
        }
    }

    /// Drain a batch front-to-back, one update in flight at a time
    ///
    /// The resolved report is the completion signal; it resolves for an
    /// empty batch without touching the store. A failed read suppresses
    /// the write for that item (the source wrote on failed reads, which
    /// caused redundant writes after transient backend errors); a
    /// failed write is logged and the run continues. No retry, no
    /// rollback; the next poll cycle re-attempts naturally.
    pub async fn reconcile(&self, batch: PendingBatch) -> ReconcileReport {
        let _run = self.gate.lock().await;
        let mut report = ReconcileReport::default();

        for update in batch {
            match self.store.get_state(&update.name).await {
                Ok(existing) => {
                    if should_write(existing.as_ref(), &update) {
                        match self
                            .store
                            .set_state(&update.name, update.value.clone(), true)
                            .await
                        {
                            Ok(()) => {
                                report.written += 1;
                                tracing::trace!(name = %update.name, value = %update.value, "State written");
                            }
                            Err(e) => {
                                report.skipped += 1;
                                tracing::warn!(name = %update.name, error = %e, "State write failed, continuing batch");
                            }
                        }
                    } else {
                        report.unchanged += 1;
                    }
                }
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!(name = %update.name, error = %e, "State read failed, skipping item");
                }
            }

            // One schedulable unit per update: concurrent work on the
            // shared backend is not starved by a long batch
            tokio::task::yield_now().await;
        }

        tracing::debug!(
            written = report.written,
            unchanged = report.unchanged,
            skipped = report.skipped,
            "Batch reconciled"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_store::MemoryStore;

    fn stored(value: StateValue) -> StoredState {
        StoredState { value, ack: true }
    }

    #[test]
    fn absent_state_always_writes() {
        let update = StateUpdate::new("cameras.c1.name", "Front");
        assert!(should_write(None, &update));
    }

    #[test]
    fn equal_value_never_writes() {
        let update = StateUpdate::new("cameras.c1.name", "Front");
        assert!(!should_write(Some(&stored("Front".into())), &update));
    }

    #[test]
    fn differing_value_writes() {
        let update = StateUpdate::new("cameras.c1.name", "Back");
        assert!(should_write(Some(&stored("Front".into())), &update));
    }

    #[test]
    fn numeric_variants_compare_loosely() {
        let update = StateUpdate::new("cameras.c1.score", StateValue::Float(50.0));
        assert!(!should_write(Some(&stored(StateValue::Int(50))), &update));
    }

    #[tokio::test]
    async fn empty_batch_completes_without_store_calls() {
        let store = Arc::new(MemoryStore::new());
        let queue = ReconciliationQueue::new(store.clone());
        let report = queue.reconcile(Vec::new()).await;
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(store.state_count().await, 0);
    }

    #[tokio::test]
    async fn second_run_of_unchanged_batch_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let queue = ReconciliationQueue::new(store.clone());
        let batch = vec![
            StateUpdate::new("cameras.c1.name", "Front"),
            StateUpdate::new("cameras.c1.isMotion", false),
        ];

        let first = queue.reconcile(batch.clone()).await;
        assert_eq!(first.written, 2);

        let second = queue.reconcile(batch).await;
        assert_eq!(second.written, 0);
        assert_eq!(second.unchanged, 2);
    }

    #[tokio::test]
    async fn changed_value_is_written_again() {
        let store = Arc::new(MemoryStore::new());
        let queue = ReconciliationQueue::new(store.clone());

        queue
            .reconcile(vec![StateUpdate::new("cameras.c1.name", "Front")])
            .await;
        let report = queue
            .reconcile(vec![StateUpdate::new("cameras.c1.name", "Back")])
            .await;

        assert_eq!(report.written, 1);
        let state = store.get_state("cameras.c1.name").await.unwrap().unwrap();
        assert_eq!(state.value, StateValue::Str("Back".to_string()));
        assert!(state.ack);
    }
}
