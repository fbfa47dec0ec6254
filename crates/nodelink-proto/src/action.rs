//! Outbound action encoding.
//!
//! Every request to the controller is an action frame:
//!
//! ```text
//! Action: <name>\r\n
//! ActionID: <id>\r\n
//! <Key>: <Value>\r\n
//! ...
//! \r\n
//! ```
//!
//! The builders below return an [`Action`] without an id; the connector
//! assigns one when the action is sent, unless the caller supplied its own.

/// An action to send to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Action name, e.g. `Login` or `RptStatus`.
    pub name: String,
    /// Caller-supplied correlation id; `None` lets the connector pick one.
    pub action_id: Option<String>,
    /// Additional header fields in send order.
    pub fields: Vec<(String, String)>,
}

impl Action {
    /// A bare action with no fields.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            action_id: None,
            fields: Vec::new(),
        }
    }

    /// Append a header field.
    pub fn field(mut self, key: &str, value: impl ToString) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    /// Use a specific correlation id instead of an auto-generated one.
    pub fn with_action_id(mut self, id: &str) -> Self {
        self.action_id = Some(id.to_string());
        self
    }

    /// `Login` with username and secret, asking for events.
    pub fn login(username: &str, secret: &str) -> Self {
        Action::new("Login")
            .field("Username", username)
            .field("Secret", secret)
            .field("Events", "on")
    }

    /// `Ping`, used as a keepalive.
    pub fn ping() -> Self {
        Action::new("Ping")
    }

    /// `Logoff`, sent before a clean disconnect.
    pub fn logoff() -> Self {
        Action::new("Logoff")
    }

    /// `RptStatus` with `COMMAND: XStat` for a local node.
    pub fn xstat(node: u32) -> Self {
        Action::new("RptStatus")
            .field("COMMAND", "XStat")
            .field("NODE", node)
    }

    /// `RptStatus` with `COMMAND: SawStat` for a local node.
    pub fn sawstat(node: u32) -> Self {
        Action::new("RptStatus")
            .field("COMMAND", "SawStat")
            .field("NODE", node)
    }

    /// `VoterStatus` for a local node.
    pub fn voter_status(node: u32) -> Self {
        Action::new("VoterStatus").field("Node", node)
    }

    /// `Command` running a controller CLI command.
    pub fn command(command: &str) -> Self {
        Action::new("Command").field("Command", command)
    }

    /// Encode the action with the given correlation id.
    ///
    /// Carriage returns and line feeds inside names and values are dropped
    /// so a value can never terminate the frame early.
    pub fn encode(&self, action_id: &str) -> Vec<u8> {
        let mut out = String::with_capacity(64);
        push_line(&mut out, "Action", &self.name);
        push_line(&mut out, "ActionID", action_id);
        for (key, value) in &self.fields {
            push_line(&mut out, key, value);
        }
        out.push_str("\r\n");
        out.into_bytes()
    }
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.extend(key.chars().filter(|c| !matches!(c, '\r' | '\n')));
    out.push_str(": ");
    out.extend(value.chars().filter(|c| !matches!(c, '\r' | '\n')));
    out.push_str("\r\n");
}
