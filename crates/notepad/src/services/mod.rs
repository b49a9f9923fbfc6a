//! Background services
//!
//! - `RefreshService`: re-scans the configuration source and registers new PVs
//! - `AutosaveService`: flushes registry values to the autosave file

mod autosave;
mod refresh;

pub use autosave::*;
pub use refresh::*;

/// Published by the refresh service after a scan that added variables
pub const VARIABLES_ADDED_EVENT: &str = "registry/variables-added";

/// Publish to request an immediate autosave flush
pub const FLUSH_REQUEST_EVENT: &str = "autosave/flush";
