//! voyager-link - persistent client for the Voyager Application Server
//!
//! Maintains one logical session against a single endpoint, restoring it
//! after transient failures with capped exponential backoff. Three duties
//! run concurrently against the current connection: a periodic liveness
//! probe, an inbound message consumer, and a periodic status publisher.

pub mod config;
pub mod duty;
pub mod error;
pub mod message;
pub mod policy;
pub mod session;
pub mod transport;

pub use error::LinkError;
pub use message::StatusMessage;
pub use policy::{ReconnectDecision, ReconnectPolicy};
pub use session::{SessionConfig, SessionManager, SessionState};
pub use transport::{ReadHalf, Transport, WriteHalf, WsTransport};
