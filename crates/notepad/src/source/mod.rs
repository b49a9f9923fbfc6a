//! Configuration Source
//!
//! Reads the list of PV definitions the server should expose. The source of
//! truth is always the complete current file; there is no diff feed.

mod loader;

pub use loader::*;
