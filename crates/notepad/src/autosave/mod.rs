//! Autosave
//!
//! Persists variable values across restarts. At startup the persisted values
//! are reconciled against the freshly built descriptors; while running, the
//! registry snapshot is flushed back to the same file.

mod reconcile;
mod store;

pub use reconcile::*;
pub use store::*;
