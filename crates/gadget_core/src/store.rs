//! Session state and the reducer that owns every transition.

use std::collections::BTreeMap;

use serde_json::Value;
use shared::{
    domain::{Block, CommandEntry, DocumentBlocks, TransportProtocol},
    protocol::ConfigurePayload,
};
use tokio::sync::watch;
use tracing::debug;

pub const DEFAULT_SERVER_ADDRESS: &str = "ws://localhost:8080";

pub fn default_initial_content() -> DocumentBlocks {
    vec![Block::paragraph("Type '/' to start")]
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub server_address: String,
    pub transport_protocol: TransportProtocol,
    pub initial_content: DocumentBlocks,
    pub command_entries: BTreeMap<String, CommandEntry>,
    pub is_connected: bool,
    pub last_error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            transport_protocol: TransportProtocol::Socket,
            initial_content: default_initial_content(),
            command_entries: BTreeMap::new(),
            is_connected: false,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Configure(ConfigurePayload),
    SetInitialContent(DocumentBlocks),
    Register(CommandEntry),
    ServerConnected,
    ServerError(String),
    ServerDisconnected,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configure(_) => "CONFIGURE",
            Self::SetInitialContent(_) => "SET_INITIAL_CONTENT",
            Self::Register(_) => "REGISTER",
            Self::ServerConnected => "SERVER_CONNECTED",
            Self::ServerError(_) => "SERVER_ERROR",
            Self::ServerDisconnected => "SERVER_DISCONNECTED",
        }
    }

    /// Builds an action from its wire name. Unknown names yield `Ok(None)`.
    pub fn from_named(name: &str, payload: Value) -> Result<Option<Self>, serde_json::Error> {
        let action = match name {
            "CONFIGURE" => Self::Configure(serde_json::from_value(payload)?),
            "SET_INITIAL_CONTENT" => Self::SetInitialContent(serde_json::from_value(payload)?),
            "REGISTER" | "REGISTER_SLASH_ITEM" => Self::Register(serde_json::from_value(payload)?),
            "SERVER_CONNECTED" => Self::ServerConnected,
            "SERVER_ERROR" => Self::ServerError(match payload {
                Value::String(message) => message,
                other => other.to_string(),
            }),
            "SERVER_DISCONNECTED" => Self::ServerDisconnected,
            _ => return Ok(None),
        };
        Ok(Some(action))
    }
}

/// Pure transition function. The input state is never modified.
pub fn apply(state: &SessionState, action: Action) -> SessionState {
    let mut next = state.clone();
    match action {
        Action::Configure(payload) => {
            if let Some(address) = payload.server_address {
                next.server_address = address;
            }
            if let Some(protocol) = payload.transport_protocol {
                next.transport_protocol = protocol;
            }
            if let Some(content) = payload.initial_content {
                next.initial_content = content;
            }
        }
        Action::SetInitialContent(content) => next.initial_content = content,
        Action::Register(entry) => {
            next.command_entries.insert(entry.title.clone(), entry);
        }
        Action::ServerConnected => {
            next.is_connected = true;
            next.last_error = None;
        }
        Action::ServerError(message) => {
            next.is_connected = false;
            next.last_error = Some(message);
        }
        Action::ServerDisconnected => next.is_connected = false,
    }
    next
}

/// Shared handle to the session state. Cloning shares the same state.
#[derive(Clone)]
pub struct StateStore {
    state: watch::Sender<SessionState>,
}

impl StateStore {
    pub fn new(initial: SessionState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    pub fn dispatch(&self, action: Action) {
        let name = action.name();
        self.state.send_modify(|state| *state = apply(state, action));
        debug!(action = name, "state: applied action");
    }

    /// Applies a named action; names the reducer does not know leave state untouched.
    pub fn dispatch_named(&self, name: &str, payload: Value) -> Result<(), serde_json::Error> {
        match Action::from_named(name, payload)? {
            Some(action) => self.dispatch(action),
            None => debug!(action = name, "state: ignoring unknown action"),
        }
        Ok(())
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
