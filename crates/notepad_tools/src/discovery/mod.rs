//! Device discovery
//!
//! Walks every device of an inventory (optionally filtered by search
//! criteria), instantiates it against an injected transport, and collects
//! the notepad metadata of the signals a predicate selects.

mod criteria;
mod finder;
mod inventory;
mod transport;

pub use criteria::*;
pub use finder::*;
pub use inventory::*;
pub use transport::*;

/// Errors raised while scanning an inventory
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Failed to read inventory {path}: {reason}")]
    Inventory { path: String, reason: String },

    #[error("Failed to instantiate device {name}: {reason}")]
    Instantiate { name: String, reason: String },

    #[error("Failed to check signal {signal}: {reason}")]
    Predicate { signal: String, reason: String },
}
