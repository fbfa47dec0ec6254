//! Mock management-interface server for connector and poller tests.
//!
//! [`MockAmiServer`] listens on a random localhost port and behaves like a
//! minimal controller: it greets every connection with a banner, answers
//! `Login`, `Ping` and `Logoff`, replies to other actions from a script
//! keyed by action name, and can push unsolicited events or drop every
//! connection on demand.
//!
//! # Example
//!
//! ```
//! use nodelink_test_harness::MockAmiServer;
//!
//! # async fn example() -> nodelink_core::Result<()> {
//! let server = MockAmiServer::start().await?;
//!
//! // `RptStatus` with `COMMAND: XStat` gets this body (plus the request's ActionID).
//! server.reply("RptStatus:XStat", &["Response: Success", "LinkedNodes: <NONE>"]);
//!
//! let port = server.port();
//! // ... point a connector at 127.0.0.1:port ...
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use nodelink_core::error::{Error, Result};
use nodelink_proto::{FrameReader, Message, classify};

/// Greeting sent on every new connection.
pub const BANNER: &str = "Asterisk Call Manager/1.0";

/// Instruction for one connection task.
enum ConnCommand {
    /// Write these bytes.
    Push(Vec<u8>),
    /// Close the connection.
    Close,
}

/// Script and bookkeeping shared with the connection tasks.
struct ServerState {
    accept_login: bool,
    replies: HashMap<String, Vec<String>>,
    silenced: HashSet<String>,
    received: Vec<Message>,
    connections: Vec<mpsc::UnboundedSender<ConnCommand>>,
    accepted: usize,
}

/// A scripted controller for tests.
///
/// Dropping the server stops accepting and closes every open connection.
pub struct MockAmiServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    accept_task: JoinHandle<()>,
}

impl MockAmiServer {
    /// Bind `127.0.0.1:0` and start accepting connections.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock AMI server: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?;

        let state = Arc::new(Mutex::new(ServerState {
            accept_login: true,
            replies: HashMap::new(),
            silenced: HashSet::new(),
            received: Vec::new(),
            connections: Vec::new(),
            accepted: 0,
        }));

        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&state)));

        Ok(Self {
            addr,
            state,
            accept_task,
        })
    }

    /// The listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The listening port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Accept (`true`, the default) or reject subsequent logins.
    pub fn set_accept_login(&self, accept: bool) {
        self.lock().accept_login = accept;
    }

    /// Script the reply to an action.
    ///
    /// `action` is either the action name (`VoterStatus`) or the name and
    /// its `COMMAND` field joined by a colon (`RptStatus:SawStat`); the
    /// longer form is matched first. The request's `ActionID` is inserted
    /// after the first line. Replaces any earlier script for the same key.
    pub fn reply(&self, action: &str, lines: &[&str]) {
        self.lock().replies.insert(
            action.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
    }

    /// Never answer `action` (matched like [`reply`](MockAmiServer::reply)).
    pub fn silence(&self, action: &str) {
        self.lock().silenced.insert(action.to_string());
    }

    /// Answer `action` again after [`silence`](MockAmiServer::silence).
    pub fn unsilence(&self, action: &str) {
        self.lock().silenced.remove(action);
    }

    /// Send an unsolicited frame to every open connection.
    pub fn push_event(&self, lines: &[&str]) {
        let bytes = encode_frame(lines.iter().map(|l| l.to_string()));
        self.lock()
            .connections
            .retain(|conn| conn.send(ConnCommand::Push(bytes.clone())).is_ok());
    }

    /// Close every open connection.
    pub fn drop_connections(&self) {
        for conn in self.lock().connections.drain(..) {
            let _ = conn.send(ConnCommand::Close);
        }
    }

    /// Number of connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.lock().accepted
    }

    /// Names of every action received, in arrival order.
    pub fn received_actions(&self) -> Vec<String> {
        self.lock()
            .received
            .iter()
            .filter_map(|m| m.header("Action").map(str::to_string))
            .collect()
    }

    /// Every action received, in arrival order.
    pub fn received(&self) -> Vec<Message> {
        self.lock().received.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        lock(&self.state)
    }
}

impl Drop for MockAmiServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.drop_connections();
    }
}

fn lock(state: &Mutex<ServerState>) -> MutexGuard<'_, ServerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn accept_loop(listener: TcpListener, state: Arc<Mutex<ServerState>>) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                tracing::debug!(error = %e, "mock AMI accept failed");
                continue;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut guard = lock(&state);
            guard.accepted += 1;
            guard.connections.push(tx);
        }
        tokio::spawn(serve_connection(stream, Arc::clone(&state), rx));
    }
}

async fn serve_connection(
    stream: TcpStream,
    state: Arc<Mutex<ServerState>>,
    mut commands: mpsc::UnboundedReceiver<ConnCommand>,
) {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = FrameReader::new(read_half);

    let banner = format!("{BANNER}\r\n");
    if writer.write_all(banner.as_bytes()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(ConnCommand::Push(bytes)) => {
                    if write(&mut writer, &bytes).await.is_err() {
                        break;
                    }
                }
                Some(ConnCommand::Close) | None => break,
            },
            frame = reader.next_frame() => {
                let msg = match frame {
                    Ok(Some(frame)) => classify(frame),
                    _ => break,
                };
                let (reply, close) = respond(&state, msg);
                if let Some(bytes) = reply {
                    if write(&mut writer, &bytes).await.is_err() {
                        break;
                    }
                }
                if close {
                    break;
                }
            }
        }
    }

    let _ = writer.shutdown().await;
}

async fn write(writer: &mut OwnedWriteHalf, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Decide the reply to one received action. Returns the bytes to send, if
/// any, and whether to close the connection afterwards.
fn respond(state: &Mutex<ServerState>, msg: Message) -> (Option<Vec<u8>>, bool) {
    let mut guard = lock(state);
    let name = msg.header("Action").unwrap_or_default().to_string();
    let id = msg.action_id().map(str::to_string);
    let keys: Vec<String> = match msg.header("COMMAND") {
        Some(command) => vec![format!("{name}:{command}"), name.clone()],
        None => vec![name.clone()],
    };
    guard.received.push(msg);

    if keys.iter().any(|k| guard.silenced.contains(k)) {
        return (None, false);
    }
    if let Some(lines) = keys.iter().find_map(|k| guard.replies.get(k)) {
        return (Some(encode_reply(lines.clone(), id.as_deref())), false);
    }

    let lines: Vec<&str> = match name.as_str() {
        "Login" if guard.accept_login => {
            vec!["Response: Success", "Message: Authentication accepted"]
        }
        "Login" => vec!["Response: Error", "Message: Authentication failed"],
        "Ping" => vec!["Response: Success", "Ping: Pong"],
        "Logoff" => {
            let bytes = encode_reply(
                vec![
                    "Response: Goodbye".to_string(),
                    "Message: Thanks for all the fish.".to_string(),
                ],
                id.as_deref(),
            );
            return (Some(bytes), true);
        }
        _ => {
            let error = format!("Message: Invalid/unknown command: {name}");
            return (
                Some(encode_reply(
                    vec!["Response: Error".to_string(), error],
                    id.as_deref(),
                )),
                false,
            );
        }
    };
    let lines = lines.into_iter().map(str::to_string).collect();
    (Some(encode_reply(lines, id.as_deref())), false)
}

/// Encode a scripted reply, inserting `ActionID` after the first line.
fn encode_reply(mut lines: Vec<String>, action_id: Option<&str>) -> Vec<u8> {
    if let Some(id) = action_id {
        let at = lines.len().min(1);
        lines.insert(at, format!("ActionID: {id}"));
    }
    encode_frame(lines)
}

fn encode_frame(lines: impl IntoIterator<Item = String>) -> Vec<u8> {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out.into_bytes()
}
