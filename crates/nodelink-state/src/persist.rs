//! Background delivery of link records to the persister.
//!
//! The diff loop hands records to an unbounded channel and never waits for
//! the store. The worker stores them one at a time, each call bounded by a
//! timeout. Records that fail are kept (the latest per node) and retried on
//! a fixed interval, or replaced and retried at once when a newer record
//! for the same node arrives.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use nodelink_core::error::{Error, Result};
use nodelink_core::{LinkRecord, Persister};

/// Handle to the persistence worker task.
pub(crate) struct PersistWorker {
    tx: mpsc::UnboundedSender<LinkRecord>,
    task: JoinHandle<()>,
}

impl PersistWorker {
    /// Queue a record. Never blocks.
    pub fn submit(&self, record: LinkRecord) {
        if self.tx.send(record).is_err() {
            warn!("persistence worker gone, record dropped");
        }
    }

    /// Close the queue and wait for the worker to drain it.
    pub async fn finish(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "persistence worker panicked");
        }
    }
}

/// Spawn the worker.
pub(crate) fn spawn_persist_worker(
    persister: Arc<dyn Persister>,
    call_timeout: Duration,
    retry_interval: Duration,
) -> PersistWorker {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(persist_loop(persister, call_timeout, retry_interval, rx));
    PersistWorker { tx, task }
}

async fn persist_loop(
    persister: Arc<dyn Persister>,
    call_timeout: Duration,
    retry_interval: Duration,
    mut rx: mpsc::UnboundedReceiver<LinkRecord>,
) {
    let mut failed: BTreeMap<u32, LinkRecord> = BTreeMap::new();
    let mut retry = tokio::time::interval_at(Instant::now() + retry_interval, retry_interval);
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            record = rx.recv() => match record {
                Some(record) => {
                    failed.remove(&record.node);
                    if let Err(e) = store(persister.as_ref(), &record, call_timeout).await {
                        warn!(node = record.node, error = %e, "persisting link failed, will retry");
                        failed.insert(record.node, record);
                    }
                }
                None => break,
            },
            _ = retry.tick(), if !failed.is_empty() => {
                debug!(count = failed.len(), "retrying failed link records");
                let pending = std::mem::take(&mut failed);
                for (node, record) in pending {
                    if let Err(e) = store(persister.as_ref(), &record, call_timeout).await {
                        warn!(node, error = %e, "persisting link failed again");
                        failed.insert(node, record);
                    }
                }
            }
        }
    }

    if !failed.is_empty() {
        warn!(
            nodes = ?failed.keys().collect::<Vec<_>>(),
            "persistence worker stopping with unsaved records"
        );
    }
}

async fn store(persister: &dyn Persister, record: &LinkRecord, call_timeout: Duration) -> Result<()> {
    match tokio::time::timeout(call_timeout, persister.upsert(record.clone())).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout),
    }
}
