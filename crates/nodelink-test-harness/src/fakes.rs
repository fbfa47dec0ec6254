//! In-memory collaborator fakes for state manager tests.
//!
//! - [`RecordingNotifier`] keeps every notification it receives.
//! - [`MemoryPersister`] keeps the latest record per node and every call,
//!   and can be made slow or failing.
//! - [`MemoryDirectory`] answers lookups from a fixed table.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use nodelink_core::error::{Error, Result};
use nodelink_core::{LinkRecord, Lookuper, NodeDirectoryEntry, Notification, Notifier, Persister};

/// A [`Notifier`] that records every notification in order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// The `kind()` of everything received so far.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.notifications().iter().map(Notification::kind).collect()
    }

    /// Forget everything received so far.
    pub fn clear(&self) {
        self.notifications
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    /// Wait until `cond` holds for the recorded notifications.
    ///
    /// Polls every 5 ms; returns whether `cond` held before `limit`.
    pub async fn wait_until<F>(&self, limit: Duration, cond: F) -> bool
    where
        F: Fn(&[Notification]) -> bool,
    {
        let deadline = Instant::now() + limit;
        loop {
            if cond(&self.notifications()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.notifications
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notification);
        Ok(())
    }
}

/// A [`Persister`] backed by a map.
#[derive(Debug, Default)]
pub struct MemoryPersister {
    records: Mutex<HashMap<u32, LinkRecord>>,
    calls: Mutex<Vec<LinkRecord>>,
    delay: Mutex<Duration>,
    failing: AtomicBool,
}

impl MemoryPersister {
    /// A persister that stores immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// A persister that sleeps `delay` before every store.
    pub fn slow(delay: Duration) -> Self {
        let persister = Self::default();
        persister.set_delay(delay);
        persister
    }

    /// A persister whose every call fails.
    pub fn failing() -> Self {
        let persister = Self::default();
        persister.set_failing(true);
        persister
    }

    /// Change the per-call delay.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    /// Make subsequent calls fail (`true`) or succeed (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The stored record for `node`.
    pub fn record(&self, node: u32) -> Option<LinkRecord> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&node)
            .cloned()
    }

    /// Every call received, stored or not, in order.
    pub fn calls(&self) -> Vec<LinkRecord> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl Persister for MemoryPersister {
    async fn upsert(&self, record: LinkRecord) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());

        let delay = *self.delay.lock().unwrap_or_else(|p| p.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Persistence("store unavailable".into()));
        }
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(record.node, record);
        Ok(())
    }
}

/// A [`Lookuper`] answering from a fixed table.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: HashMap<u32, NodeDirectoryEntry>,
    unavailable: Mutex<HashSet<u32>>,
    lookups: AtomicUsize,
}

impl MemoryDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    pub fn with_entry(mut self, node: u32, name: &str, description: &str) -> Self {
        self.entries.insert(
            node,
            NodeDirectoryEntry {
                name: name.to_string(),
                description: description.to_string(),
            },
        );
        self
    }

    /// Make lookups of `node` fail (`true`) or answer (`false`).
    pub fn set_unavailable(&self, node: u32, unavailable: bool) {
        let mut set = self.unavailable.lock().unwrap_or_else(|p| p.into_inner());
        if unavailable {
            set.insert(node);
        } else {
            set.remove(&node);
        }
    }

    /// Number of lookups served, failed ones included.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Lookuper for MemoryDirectory {
    fn lookup(&self, node: u32) -> Result<Option<NodeDirectoryEntry>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self
            .unavailable
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&node)
        {
            return Err(Error::Lookup(format!("directory unavailable for {node}")));
        }
        Ok(self.entries.get(&node).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(node: u32, secs: u64) -> LinkRecord {
        LinkRecord {
            node,
            total_tx_seconds: secs,
            last_tx_start: None,
            last_tx_end: None,
            connected_since: Utc::now(),
        }
    }

    #[tokio::test]
    async fn persister_keeps_latest_record() {
        let persister = MemoryPersister::new();
        persister.upsert(record(2000, 5)).await.unwrap();
        persister.upsert(record(2000, 9)).await.unwrap();
        assert_eq!(persister.record(2000).unwrap().total_tx_seconds, 9);
        assert_eq!(persister.calls().len(), 2);
    }

    #[tokio::test]
    async fn failing_persister_records_call_but_not_value() {
        let persister = MemoryPersister::failing();
        assert!(persister.upsert(record(2000, 5)).await.is_err());
        assert!(persister.record(2000).is_none());
        assert_eq!(persister.calls().len(), 1);

        persister.set_failing(false);
        persister.upsert(record(2000, 5)).await.unwrap();
        assert!(persister.record(2000).is_some());
    }

    #[test]
    fn directory_lookup() {
        let directory = MemoryDirectory::new().with_entry(2000, "W1AW", "Newington, CT");
        assert_eq!(directory.lookup(2000).unwrap().unwrap().name, "W1AW");
        assert!(directory.lookup(2001).unwrap().is_none());

        directory.set_unavailable(2001, true);
        assert!(directory.lookup(2001).is_err());
        assert_eq!(directory.lookup_count(), 3);
    }

    #[tokio::test]
    async fn recorder_wait_until() {
        let notifier = RecordingNotifier::new();
        notifier
            .notify(Notification::LinksRemoved {
                at: Utc::now(),
                nodes: vec![2000],
            })
            .await
            .unwrap();
        assert!(
            notifier
                .wait_until(Duration::from_millis(50), |n| n.len() == 1)
                .await
        );
        assert_eq!(notifier.kinds(), vec!["links_removed"]);
        assert!(
            !notifier
                .wait_until(Duration::from_millis(20), |n| n.len() == 2)
                .await
        );
    }
}
