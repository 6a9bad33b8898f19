//! Message bridge and state-sync engine for the embeddable editor gadget.
//!
//! A [`Gadget`] owns the session store, the collaboration peer link and the
//! dispatch task that routes host messages and peer frames through the
//! [`MessageBridge`]. The document itself lives behind [`DocumentEngine`].

pub mod bridge;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
mod gadget;
pub mod host;
pub mod registry;
pub mod store;

pub use bridge::MessageBridge;
pub use config::{load_settings, GadgetSettings};
pub use connection::{ConnectionManager, ConnectionOptions};
pub use engine::{DocumentEngine, InMemoryDocumentEngine};
pub use error::{EngineError, TransportError};
pub use gadget::Gadget;
pub use host::HostPort;
pub use registry::{CommandRegistry, SuggestionItem};
pub use store::{Action, SessionState, StateStore};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
