//! The state manager task.
//!
//! One task owns the [`LinkTracker`] and serialises every mutation. It
//! reads [`StateUpdate`]s from a bounded channel that any number of
//! producers (the feed pump, the poller, callers) share, applies each under
//! the write lock, and then acts on the resulting changes:
//!
//! - transmit edges go into the [`TxBatcher`] and leave as one
//!   [`Notification::TxBatch`] when the window closes
//! - link records go to the persistence worker without waiting
//! - membership notifications and snapshots go out immediately, after any
//!   queued batch, so notifications keep observation order

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use nodelink_client::{Connector, MessageFeed};
use nodelink_core::error::{Error, Result};
use nodelink_core::{Lookuper, NoLookup, Notification, Notifier, Persister};

use crate::batch::TxBatcher;
use crate::config::StateConfig;
use crate::handle::StateHandle;
use crate::persist::{PersistWorker, spawn_persist_worker};
use crate::poller::Poller;
use crate::tracker::{Change, LinkTracker};
use crate::update::{Observation, StateUpdate, interpret};

/// The downstream services a state manager talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Receives change notifications.
    pub notifier: Arc<dyn Notifier>,
    /// Records transmit totals.
    pub persister: Arc<dyn Persister>,
    /// Resolves node names.
    pub lookuper: Arc<dyn Lookuper>,
}

impl Collaborators {
    /// Collaborators with no node directory.
    pub fn new(notifier: Arc<dyn Notifier>, persister: Arc<dyn Persister>) -> Self {
        Self {
            notifier,
            persister,
            lookuper: Arc::new(NoLookup),
        }
    }

    /// Use `lookuper` to resolve node names.
    pub fn with_lookuper(mut self, lookuper: Arc<dyn Lookuper>) -> Self {
        self.lookuper = lookuper;
        self
    }
}

/// Handle to a running state manager.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use nodelink_client::ConnectorBuilder;
/// use nodelink_core::BroadcastNotifier;
/// use nodelink_state::{Collaborators, StateConfig, StateManager};
/// # use nodelink_core::{LinkRecord, Persister, Result};
/// # struct Discard;
/// # #[async_trait::async_trait]
/// # impl Persister for Discard {
/// #     async fn upsert(&self, _record: LinkRecord) -> Result<()> { Ok(()) }
/// # }
///
/// # async fn example() -> Result<()> {
/// let connector = ConnectorBuilder::new()
///     .host("192.168.1.50")
///     .credentials("admin", "llcgi")
///     .start()?;
///
/// let notifier = Arc::new(BroadcastNotifier::new(64));
/// let mut notifications = notifier.subscribe();
/// let manager = StateManager::start(
///     StateConfig::new(1999),
///     Collaborators::new(notifier, Arc::new(Discard)),
/// )?;
/// manager.attach(&connector).await?;
///
/// while let Ok(notification) = notifications.recv().await {
///     println!("{}", notification.kind());
/// }
/// # Ok(())
/// # }
/// ```
pub struct StateManager {
    config: StateConfig,
    input: mpsc::Sender<StateUpdate>,
    handle: StateHandle,
    cancel: CancellationToken,
    engine: Mutex<Option<JoinHandle<()>>>,
    producers: Mutex<Vec<JoinHandle<()>>>,
}

impl StateManager {
    /// Start the state manager task.
    ///
    /// Must be called from within a tokio runtime. Producers are added
    /// with [`attach`](Self::attach) or by sending on
    /// [`sender`](Self::sender).
    pub fn start(config: StateConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let (input, rx) = mpsc::channel(config.input_capacity);
        let handle = StateHandle::new(LinkTracker::new(config.local_node));
        let cancel = CancellationToken::new();

        let persist = spawn_persist_worker(
            Arc::clone(&collaborators.persister),
            config.collaborator_timeout,
            config.persist_retry_interval,
        );
        let engine = Engine {
            handle: handle.clone(),
            batcher: TxBatcher::new(config.batch_window),
            persist,
            notifier: collaborators.notifier,
            lookuper: collaborators.lookuper,
            notify_timeout: config.collaborator_timeout,
        };

        info!(
            node = config.local_node,
            mode = %config.update_mode,
            "state manager started"
        );
        let task = tokio::spawn(engine.run(rx, cancel.clone()));

        Ok(Self {
            config,
            input,
            handle,
            cancel,
            engine: Mutex::new(Some(task)),
            producers: Mutex::new(Vec::new()),
        })
    }

    /// The configuration the manager runs with.
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Reader for the live state.
    pub fn handle(&self) -> StateHandle {
        self.handle.clone()
    }

    /// A sender for feeding updates from a custom producer.
    pub fn sender(&self) -> mpsc::Sender<StateUpdate> {
        self.input.clone()
    }

    /// Submit one update, waiting for room in the input channel.
    pub async fn submit(&self, update: impl Into<StateUpdate>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Shutdown);
        }
        self.input
            .send(update.into())
            .await
            .map_err(|_| Error::Shutdown)
    }

    /// Start the producers the update mode calls for on `connector`.
    ///
    /// Event modes take the connector's message feed; fails with
    /// [`Error::InvalidParameter`] if it was already taken. Polling modes
    /// start a [`Poller`] for the local node. In
    /// [`UpdateMode::PollOnly`](crate::UpdateMode::PollOnly) the feed stays
    /// with the connector; the caller must read or drop it.
    pub async fn attach(&self, connector: &Connector) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Shutdown);
        }

        let mode = self.config.update_mode;
        let mut producers = self.producers.lock().await;

        if mode.uses_events() {
            let feed = connector.take_feed().await.ok_or_else(|| {
                Error::InvalidParameter("connector message feed already taken".into())
            })?;
            producers.push(tokio::spawn(pump_feed(
                feed,
                self.input.clone(),
                self.cancel.clone(),
            )));
        }

        if mode.uses_polling() {
            let poller = Poller::new(
                connector.clone(),
                self.config.local_node,
                self.config.poll_interval,
            );
            producers.push(poller.spawn(self.input.clone(), self.cancel.clone()));
        }

        debug!(mode = %mode, "producers attached");
        Ok(())
    }

    /// Stop the producers and the manager task.
    ///
    /// Any queued batch is flushed and the persistence queue drained
    /// (each call still bounded by the collaborator timeout) before this
    /// returns. Safe to call more than once.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let producers = std::mem::take(&mut *self.producers.lock().await);
        for task in producers {
            if let Err(e) = task.await {
                warn!(error = %e, "state producer panicked");
            }
        }

        if let Some(task) = self.engine.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "state manager task panicked");
            }
            info!(node = self.config.local_node, "state manager stopped");
        }
    }
}

impl Drop for StateManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Forward the connector's feed into the manager's input.
async fn pump_feed(mut feed: MessageFeed, tx: mpsc::Sender<StateUpdate>, cancel: CancellationToken) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = feed.recv() => message,
        };
        let Some(message) = message else {
            debug!("message feed closed");
            break;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(message.into()) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

/// Everything the manager task owns.
struct Engine {
    handle: StateHandle,
    batcher: TxBatcher,
    persist: PersistWorker,
    notifier: Arc<dyn Notifier>,
    lookuper: Arc<dyn Lookuper>,
    notify_timeout: Duration,
}

impl Engine {
    async fn run(mut self, mut rx: mpsc::Receiver<StateUpdate>, cancel: CancellationToken) {
        loop {
            let deadline = self.batcher.deadline();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush_batch().await;
                }
                update = rx.recv() => match update {
                    Some(update) => self.process(update).await,
                    None => break,
                },
            }
        }

        self.flush_batch().await;
        self.persist.finish().await;
    }

    async fn process(&mut self, update: StateUpdate) {
        let now = Utc::now();

        // The write lock covers the whole diff, including enrichment.
        let (changes, snapshot) = {
            let mut tracker = self.handle.tracker().write().await;
            let mut changes = match update {
                StateUpdate::Snapshot(status) => tracker.apply_snapshot(&status, now),
                StateUpdate::Message(message) => match interpret(&message) {
                    Some(Observation::Links(list)) => tracker.apply_link_list(&list, now),
                    Some(Observation::LocalTx(keyed)) => tracker.set_local(Some(keyed), None),
                    Some(Observation::LocalRx(keyed)) => tracker.set_local(None, Some(keyed)),
                    None => Vec::new(),
                },
            };
            tracker.enrich(self.lookuper.as_ref());
            tracker.fill_names(&mut changes);

            let snapshot = changes
                .iter()
                .any(Change::needs_snapshot)
                .then(|| Notification::Snapshot {
                    at: now,
                    local: tracker.local().clone(),
                    links: tracker.links(),
                });
            (changes, snapshot)
        };

        if changes.is_empty() {
            return;
        }
        trace!(changes = changes.len(), "update applied");

        let observed = Instant::now();
        for change in changes {
            match change {
                Change::TxEdge(event) => self.batcher.push(event, observed),
                Change::Persist(record) => self.persist.submit(record),
                Change::Added(links) => {
                    self.flush_batch().await;
                    self.notify(Notification::LinksAdded { at: now, links }).await;
                }
                Change::Removed(nodes) => {
                    self.flush_batch().await;
                    self.notify(Notification::LinksRemoved { at: now, nodes }).await;
                }
                Change::LocalChanged(_) => {}
            }
        }

        if let Some(snapshot) = snapshot {
            self.flush_batch().await;
            self.notify(snapshot).await;
        }
    }

    async fn flush_batch(&mut self) {
        if let Some(events) = self.batcher.take() {
            trace!(edges = events.len(), "flushing tx batch");
            self.notify(Notification::TxBatch {
                at: Utc::now(),
                events,
            })
            .await;
        }
    }

    async fn notify(&self, notification: Notification) {
        let kind = notification.kind();
        match tokio::time::timeout(self.notify_timeout, self.notifier.notify(notification)).await {
            Ok(Ok(())) => trace!(kind, "notification delivered"),
            Ok(Err(e)) => warn!(kind, error = %e, "notifier failed"),
            Err(_) => warn!(kind, "notifier timed out"),
        }
    }
}
