//! WebSocket Server
//!
//! Serves the registry to clients: reads, writes and value monitors over a
//! JSON message protocol.

mod handler;
mod protocol;
mod router;
mod state;

pub use handler::*;
pub use protocol::*;
pub use router::*;
pub use state::*;
