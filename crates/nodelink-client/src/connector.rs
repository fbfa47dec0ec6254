//! The reconnecting session client.
//!
//! [`Connector`] keeps one logged-in session to the controller alive. A
//! supervisor task owns the lifecycle: it dials, reads the banner, logs in,
//! runs the session read loop, and on any I/O error waits out an
//! exponential backoff before dialing again. While a session is Ready,
//! every classified message is forwarded to the [`MessageFeed`] in socket
//! order, and responses are matched to waiting callers by `ActionID`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, trace, warn};

use nodelink_core::error::{Error, Result};
use nodelink_proto::{Action, FrameReader, Message, MessageKind, classify};

use crate::backoff::Backoff;
use crate::config::ConnectorConfig;
use crate::feed::MessageFeed;
use crate::state::ConnectorState;

/// How long shutdown waits for the `Logoff` write.
const LOGOFF_TIMEOUT: Duration = Duration::from_millis(500);

/// Waiters for correlated responses, keyed by action id.
type Pending = HashMap<String, oneshot::Sender<Message>>;

/// State shared between the connector handles and its tasks.
struct Shared {
    config: ConnectorConfig,
    state_tx: watch::Sender<ConnectorState>,
    /// Write half of the current session, `None` between sessions.
    writer: Mutex<Option<OwnedWriteHalf>>,
    pending: Mutex<Pending>,
    next_id: AtomicU64,
    /// Banner line of the most recent session.
    banner: Mutex<Option<String>>,
    /// Feed receiver until a consumer takes it.
    feed: Mutex<Option<MessageFeed>>,
    cancel: CancellationToken,
}

/// Handle to a running connector.
///
/// Cheap to clone; all clones drive the same session. Requests from any
/// number of tasks are serialized onto the socket and told apart by their
/// action ids. Dropping the last handle stops the supervisor.
#[derive(Clone)]
pub struct Connector {
    shared: Arc<Shared>,
    supervisor: Arc<Mutex<Option<JoinHandle<()>>>>,
    _guard: Arc<DropGuard>,
}

impl Connector {
    /// Start a connector with the given configuration.
    ///
    /// Returns immediately; the first connection attempt runs in the
    /// background. Must be called from within a tokio runtime.
    pub fn start(config: ConnectorConfig) -> Result<Self> {
        config.validate()?;

        let cancel = CancellationToken::new();
        let (feed_tx, feed_rx) = mpsc::channel(config.feed_capacity);
        let (state_tx, _) = watch::channel(ConnectorState::Disconnected);

        let shared = Arc::new(Shared {
            config,
            state_tx,
            writer: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            banner: Mutex::new(None),
            feed: Mutex::new(Some(MessageFeed::new(feed_rx, cancel.clone()))),
            cancel: cancel.clone(),
        });

        debug!(addr = %shared.config.addr(), "starting connector");
        let task = tokio::spawn(supervise(Arc::clone(&shared), feed_tx));

        Ok(Self {
            shared,
            supervisor: Arc::new(Mutex::new(Some(task))),
            _guard: Arc::new(cancel.drop_guard()),
        })
    }

    /// The configuration the connector runs with.
    pub fn config(&self) -> &ConnectorConfig {
        &self.shared.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectorState {
        *self.shared.state_tx.borrow()
    }

    /// Watch lifecycle state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectorState> {
        self.shared.state_tx.subscribe()
    }

    /// Wait until the connector is Ready.
    ///
    /// Fails with [`Error::Timeout`] if it does not get there in time and
    /// with [`Error::Shutdown`] if it was stopped.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.shared.state_tx.subscribe();
        let wait = rx.wait_for(|s| matches!(s, ConnectorState::Ready | ConnectorState::Stopped));
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(state)) if state.is_ready() => Ok(()),
            Ok(_) => Err(Error::Shutdown),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Take the message feed. Only the first call returns it.
    ///
    /// The feed applies backpressure: while it is untaken or unread, the
    /// session stops reading the socket once `feed_capacity` messages are
    /// buffered. Drop the feed if the messages are not wanted.
    pub async fn take_feed(&self) -> Option<MessageFeed> {
        self.shared.feed.lock().await.take()
    }

    /// Banner line sent by the controller on the most recent session.
    pub async fn banner(&self) -> Option<String> {
        self.shared.banner.lock().await.clone()
    }

    /// Generate a fresh action id (`<prefix>-<n>`).
    pub fn next_action_id(&self) -> String {
        self.shared.next_action_id()
    }

    /// Send an action and wait for its correlated response.
    ///
    /// Uses the action's own id when it carries one, otherwise generates
    /// one. Fails with [`Error::NotConnected`] unless Ready, with
    /// [`Error::Timeout`] after the configured request timeout, with
    /// [`Error::ConnectionLost`] if the session drops first, and with
    /// [`Error::Protocol`] for an error response.
    pub async fn request(&self, action: Action) -> Result<Message> {
        self.shared.request(action).await
    }

    /// Send an action without waiting for a response. Returns its id.
    pub async fn send(&self, action: Action) -> Result<String> {
        self.shared.ensure_ready()?;
        let id = action
            .action_id
            .clone()
            .unwrap_or_else(|| self.shared.next_action_id());
        self.shared.write(&action, &id).await?;
        Ok(id)
    }

    /// Stop the connector.
    ///
    /// Logs off when a session is up, then cancels the supervisor and waits
    /// for it to exit. Safe to call at any time, including mid-reconnect,
    /// and from several tasks at once. After it returns the feed yields
    /// nothing more.
    pub async fn shutdown(&self) {
        if self.state().is_ready() {
            let logoff = tokio::time::timeout(LOGOFF_TIMEOUT, self.send(Action::logoff()));
            if let Ok(Err(e)) = logoff.await {
                debug!(error = %e, "logoff failed");
            }
        }

        self.shared.cancel.cancel();

        let task = self.supervisor.lock().await.take();
        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    warn!(error = %e, "connector supervisor panicked");
                }
            }
            None => {
                let mut rx = self.shared.state_tx.subscribe();
                let _ = rx.wait_for(|s| *s == ConnectorState::Stopped).await;
            }
        }
    }
}

impl Shared {
    fn next_action_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.config.action_id_prefix, n)
    }

    fn set_state(&self, state: ConnectorState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(state = %state, "connector state changed");
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match *self.state_tx.borrow() {
            ConnectorState::Ready => Ok(()),
            ConnectorState::Stopped => Err(Error::Shutdown),
            _ => Err(Error::NotConnected),
        }
    }

    async fn request(&self, action: Action) -> Result<Message> {
        self.ensure_ready()?;

        let id = action
            .action_id
            .clone()
            .unwrap_or_else(|| self.next_action_id());

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&id) {
                return Err(Error::InvalidParameter(format!(
                    "action id already in flight: {id}"
                )));
            }
            pending.insert(id.clone(), tx);
        }

        if let Err(e) = self.write(&action, &id).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(msg)) => {
                trace!(action = %action.name, action_id = %id, "response received");
                if msg.is_success() {
                    Ok(msg)
                } else {
                    Err(Error::Protocol(format!(
                        "{} failed: {}",
                        action.name,
                        msg.header("Message").unwrap_or("no message")
                    )))
                }
            }
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Timeout)
            }
        }
    }

    async fn write(&self, action: &Action, id: &str) -> Result<()> {
        let bytes = action.encode(id);
        let mut writer = self.writer.lock().await;
        let w = writer.as_mut().ok_or(Error::NotConnected)?;
        trace!(action = %action.name, action_id = %id, "sending action");
        w.write_all(&bytes).await.map_err(map_write_error)?;
        w.flush().await.map_err(map_write_error)?;
        Ok(())
    }

    /// Hand a response to the caller waiting on its action id.
    async fn complete(&self, msg: &Message) {
        let Some(id) = msg.action_id() else {
            return;
        };
        let waiter = self.pending.lock().await.remove(id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(msg.clone());
            }
            None => trace!(action_id = %id, "response for unknown or expired action"),
        }
    }

    /// Close the writer and fail every in-flight request.
    async fn end_session(&self) {
        if let Some(mut w) = self.writer.lock().await.take() {
            let _ = w.shutdown().await;
        }
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            debug!(count = pending.len(), "failing in-flight requests");
            pending.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Why a Ready session ended.
enum SessionEnd {
    Shutdown,
    Lost(Error),
}

/// Owns the reconnect loop until shutdown.
async fn supervise(shared: Arc<Shared>, feed_tx: mpsc::Sender<Message>) {
    let addr = shared.config.addr();
    let mut backoff = Backoff::new(shared.config.min_backoff, shared.config.max_backoff);

    loop {
        shared.set_state(ConnectorState::Connecting);

        let established = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            result = establish(&shared, &addr) => result,
        };

        match established {
            Ok(reader) => {
                shared.set_state(ConnectorState::Ready);
                backoff.reset();
                info!(addr = %addr, "session ready");

                let end = run_session(&shared, reader, &feed_tx).await;
                shared.end_session().await;
                match end {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Lost(e) => warn!(addr = %addr, error = %e, "session lost"),
                }
            }
            Err(e) => {
                shared.end_session().await;
                warn!(addr = %addr, error = %e, "connection attempt failed");
            }
        }

        shared.set_state(ConnectorState::Disconnected);
        let delay = backoff.next_delay();
        warn!(
            addr = %addr,
            delay_ms = delay.as_millis() as u64,
            "reconnecting after backoff"
        );

        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.end_session().await;
    shared.set_state(ConnectorState::Stopped);
    info!(addr = %addr, "connector stopped");
}

/// Dial, read the banner, and log in.
async fn establish(shared: &Shared, addr: &str) -> Result<FrameReader<OwnedReadHalf>> {
    let config = &shared.config;
    debug!(
        addr = %addr,
        timeout_ms = config.connect_timeout.as_millis() as u64,
        "connecting to controller"
    );

    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(|e| map_connect_error(e, addr))?;

    if let Err(e) = stream.set_nodelay(true) {
        warn!(addr = %addr, error = %e, "failed to set TCP_NODELAY (continuing anyway)");
    }

    shared.set_state(ConnectorState::LoggingIn);
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    *shared.writer.lock().await = Some(write_half);

    tokio::time::timeout(config.login_timeout, login(shared, &mut reader))
        .await
        .map_err(|_| Error::Timeout)??;

    Ok(reader)
}

/// Read the banner, send `Login`, and wait for its response.
async fn login(shared: &Shared, reader: &mut FrameReader<OwnedReadHalf>) -> Result<()> {
    let banner = reader.read_line().await?.ok_or(Error::ConnectionLost)?;
    debug!(banner = %banner, "controller banner");
    *shared.banner.lock().await = Some(banner);

    let config = &shared.config;
    let id = shared.next_action_id();
    shared
        .write(&Action::login(&config.username, &config.secret), &id)
        .await?;

    loop {
        let frame = reader.next_frame().await?.ok_or(Error::ConnectionLost)?;
        let msg = classify(frame);
        if msg.kind != MessageKind::Response {
            trace!(kind = ?msg.kind, "ignoring message before login completes");
            continue;
        }
        if msg.action_id().is_some_and(|got| got != id) {
            continue;
        }
        if msg.is_success() {
            info!(username = %config.username, "login accepted");
            return Ok(());
        }
        let reason = msg.header("Message").unwrap_or("login rejected").to_string();
        return Err(Error::LoginRejected(reason));
    }
}

/// Read frames until the session fails or the connector stops.
async fn run_session(
    shared: &Arc<Shared>,
    mut reader: FrameReader<OwnedReadHalf>,
    feed_tx: &mpsc::Sender<Message>,
) -> SessionEnd {
    let session = shared.cancel.child_token();
    let keepalive = shared
        .config
        .keepalive_interval
        .map(|interval| tokio::spawn(keepalive_loop(Arc::clone(shared), interval, session.clone())));

    let end = loop {
        let frame = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break SessionEnd::Shutdown,
            _ = session.cancelled() => break SessionEnd::Lost(Error::Timeout),
            frame = reader.next_frame() => frame,
        };

        let msg = match frame {
            Ok(Some(frame)) => classify(frame),
            Ok(None) => break SessionEnd::Lost(Error::ConnectionLost),
            Err(e) => break SessionEnd::Lost(e),
        };
        trace!(kind = ?msg.kind, lines = msg.raw.len(), "message received");

        if msg.kind == MessageKind::Response {
            shared.complete(&msg).await;
        }

        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break SessionEnd::Shutdown,
            sent = feed_tx.send(msg) => {
                if sent.is_err() {
                    trace!("message feed dropped, discarding message");
                }
            }
        }
    };

    session.cancel();
    if let Some(task) = keepalive {
        task.abort();
    }
    end
}

/// Ping the controller every `interval`; cancel the session on failure.
async fn keepalive_loop(shared: Arc<Shared>, interval: Duration, session: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = session.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = session.cancelled() => break,
            result = shared.request(Action::ping()) => result,
        };

        match result {
            Ok(_) => trace!("keepalive acknowledged"),
            Err(e) => {
                warn!(error = %e, "keepalive failed, dropping session");
                session.cancel();
                break;
            }
        }
    }
}

/// Map a connect error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a write error to the appropriate [`Error`] variant.
fn map_write_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Transport(format!("failed to send action: {}", e)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectorBuilder;
    use nodelink_test_harness::MockAmiServer;

    /// Builder pointed at a mock server with test-friendly timings.
    fn builder(server: &MockAmiServer) -> ConnectorBuilder {
        ConnectorBuilder::new()
            .host("127.0.0.1")
            .port(server.port())
            .credentials("admin", "secret")
            .min_backoff(Duration::from_millis(20))
            .max_backoff(Duration::from_millis(200))
            .request_timeout(Duration::from_millis(500))
            .keepalive_interval(None)
    }

    /// Poll `cond` every 10 ms until it holds or `limit` elapses.
    async fn eventually<F: Fn() -> bool>(cond: F, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    /// A local port with nothing listening on it.
    async fn dead_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_connects_and_logs_in() {
        let server = MockAmiServer::start().await.unwrap();
        let connector = builder(&server).start().unwrap();

        connector.wait_ready(Duration::from_secs(2)).await.unwrap();
        assert_eq!(connector.state(), ConnectorState::Ready);
        assert_eq!(
            connector.banner().await.as_deref(),
            Some("Asterisk Call Manager/1.0")
        );
        assert_eq!(server.received_actions().first().map(String::as_str), Some("Login"));

        connector.shutdown().await;
        assert_eq!(connector.state(), ConnectorState::Stopped);
    }

    #[tokio::test]
    async fn test_request_correlates_response() {
        let server = MockAmiServer::start().await.unwrap();
        server.reply(
            "RptStatus:XStat",
            &["Response: Success", "Conn: 2000 10.0.0.1 0 OUT 00:00:05 ESTABLISHED"],
        );
        let connector = builder(&server).start().unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();

        let msg = connector.request(Action::xstat(1999)).await.unwrap();
        assert!(msg.is_success());
        assert_eq!(
            msg.header("Conn"),
            Some("2000 10.0.0.1 0 OUT 00:00:05 ESTABLISHED")
        );

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_their_own_responses() {
        let server = MockAmiServer::start().await.unwrap();
        server.reply("RptStatus:XStat", &["Response: Success", "Kind: xstat"]);
        server.reply("RptStatus:SawStat", &["Response: Success", "Kind: sawstat"]);
        let connector = builder(&server).start().unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();

        let (a, b, c) = tokio::join!(
            connector.request(Action::xstat(1999)),
            connector.request(Action::sawstat(1999)),
            connector.request(Action::ping().with_action_id("custom-id")),
        );
        assert_eq!(a.unwrap().header("Kind"), Some("xstat"));
        assert_eq!(b.unwrap().header("Kind"), Some("sawstat"));
        assert_eq!(c.unwrap().action_id(), Some("custom-id"));

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let server = MockAmiServer::start().await.unwrap();
        server.silence("Command");
        let connector = builder(&server)
            .request_timeout(Duration::from_millis(100))
            .start()
            .unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();

        let result = connector.request(Action::command("rpt stats 1999")).await;
        assert!(matches!(result, Err(Error::Timeout)));
        // The session survives a single timed-out request.
        assert_eq!(connector.state(), ConnectorState::Ready);

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn test_error_response_is_protocol_error() {
        let server = MockAmiServer::start().await.unwrap();
        let connector = builder(&server).start().unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();

        // Unscripted actions get an error response from the mock.
        let result = connector.request(Action::new("Bogus")).await;
        match result {
            Err(Error::Protocol(msg)) => assert!(msg.contains("Bogus"), "{msg}"),
            other => panic!("expected Protocol error, got {:?}", other),
        }

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_before_ready_is_not_connected() {
        let port = dead_port().await;
        let connector = ConnectorBuilder::new()
            .port(port)
            .min_backoff(Duration::from_secs(5))
            .max_backoff(Duration::from_secs(5))
            .start()
            .unwrap();

        let result = connector.request(Action::ping()).await;
        assert!(matches!(result, Err(Error::NotConnected)));

        connector.shutdown().await;
        let result = connector.request(Action::ping()).await;
        assert!(matches!(result, Err(Error::Shutdown)));
    }

    #[tokio::test]
    async fn test_events_reach_feed_in_order() {
        let server = MockAmiServer::start().await.unwrap();
        let connector = builder(&server).start().unwrap();
        let mut feed = connector.take_feed().await.unwrap();
        assert!(connector.take_feed().await.is_none());
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();

        server.push_event(&["Event: VarSet", "Variable: RPT_TXKEYED", "Value: 1"]);
        server.push_event(&["Event: VarSet", "Variable: RPT_TXKEYED", "Value: 0"]);

        let mut values = Vec::new();
        while values.len() < 2 {
            let msg = tokio::time::timeout(Duration::from_secs(2), feed.recv())
                .await
                .unwrap()
                .unwrap();
            if msg.event_name() == Some("VarSet") {
                values.push(msg.header("Value").unwrap().to_string());
            }
        }
        assert_eq!(values, vec!["1", "0"]);

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn test_login_rejected_retries_with_backoff() {
        let server = MockAmiServer::start().await.unwrap();
        server.set_accept_login(false);
        let connector = builder(&server).start().unwrap();

        assert!(eventually(|| server.connection_count() >= 3, Duration::from_secs(3)).await);
        assert_ne!(connector.state(), ConnectorState::Ready);

        // Fixing the credentials on the controller side is enough.
        server.set_accept_login(true);
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnects_after_connection_drop() {
        let server = MockAmiServer::start().await.unwrap();
        let connector = builder(&server).start().unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();
        assert_eq!(server.connection_count(), 1);

        server.drop_connections();

        // Comes back on a new connection.
        assert!(eventually(|| server.connection_count() == 2, Duration::from_secs(2)).await);
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();
        assert_eq!(server.connection_count(), 2);

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn test_in_flight_request_fails_when_session_drops() {
        let server = MockAmiServer::start().await.unwrap();
        server.silence("Command");
        let connector = builder(&server)
            .request_timeout(Duration::from_secs(5))
            .start()
            .unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();

        let requester = {
            let connector = connector.clone();
            tokio::spawn(async move { connector.request(Action::command("slow")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.drop_connections();

        let result = tokio::time::timeout(Duration::from_secs(2), requester)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::ConnectionLost)));

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn test_keepalive_failure_reconnects() {
        let server = MockAmiServer::start().await.unwrap();
        server.silence("Ping");
        let connector = builder(&server)
            .keepalive_interval(Some(Duration::from_millis(100)))
            .request_timeout(Duration::from_millis(100))
            .start()
            .unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();

        assert!(eventually(|| server.connection_count() >= 2, Duration::from_secs(3)).await);
        assert!(server.received_actions().iter().any(|a| a == "Ping"));

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn test_keepalive_success_keeps_session() {
        let server = MockAmiServer::start().await.unwrap();
        let connector = builder(&server)
            .keepalive_interval(Some(Duration::from_millis(50)))
            .start()
            .unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let pings = server
            .received_actions()
            .iter()
            .filter(|a| *a == "Ping")
            .count();
        assert!(pings >= 2, "pings = {pings}");
        assert_eq!(server.connection_count(), 1);

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff_is_prompt() {
        let port = dead_port().await;
        let connector = ConnectorBuilder::new()
            .port(port)
            .min_backoff(Duration::from_secs(30))
            .max_backoff(Duration::from_secs(30))
            .start()
            .unwrap();

        // The refused dial fails at once; the supervisor is now in backoff.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connector.state(), ConnectorState::Disconnected);

        tokio::time::timeout(Duration::from_secs(1), connector.shutdown())
            .await
            .expect("shutdown should not wait out the backoff timer");
        assert_eq!(connector.state(), ConnectorState::Stopped);
    }

    #[tokio::test]
    async fn test_concurrent_shutdown_calls() {
        let server = MockAmiServer::start().await.unwrap();
        let connector = builder(&server).start().unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();

        let other = connector.clone();
        tokio::join!(connector.shutdown(), other.shutdown());
        assert_eq!(connector.state(), ConnectorState::Stopped);
        assert_eq!(other.state(), ConnectorState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_logs_off_and_silences_feed() {
        let server = MockAmiServer::start().await.unwrap();
        let connector = builder(&server).start().unwrap();
        let mut feed = connector.take_feed().await.unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();

        server.push_event(&["Event: RPT_Heartbeat"]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        connector.shutdown().await;

        assert!(feed.recv().await.is_none());
        assert!(
            eventually(
                || server.received_actions().iter().any(|a| a == "Logoff"),
                Duration::from_secs(1)
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_dropping_last_handle_stops_supervisor() {
        let server = MockAmiServer::start().await.unwrap();
        let connector = builder(&server).start().unwrap();
        connector.wait_ready(Duration::from_secs(2)).await.unwrap();
        let mut states = connector.subscribe_state();

        drop(connector);
        tokio::time::timeout(
            Duration::from_secs(1),
            states.wait_for(|s| *s == ConnectorState::Stopped),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn test_action_ids_use_prefix_and_count_up() {
        let port = dead_port().await;
        let connector = ConnectorBuilder::new()
            .port(port)
            .action_id_prefix("mon")
            .min_backoff(Duration::from_secs(5))
            .max_backoff(Duration::from_secs(5))
            .start()
            .unwrap();

        let first = connector.next_action_id();
        let second = connector.next_action_id();
        assert!(first.starts_with("mon-"), "{first}");
        let n1: u64 = first["mon-".len()..].parse().unwrap();
        let n2: u64 = second["mon-".len()..].parse().unwrap();
        assert_eq!(n2, n1 + 1);

        connector.shutdown().await;
    }
}
