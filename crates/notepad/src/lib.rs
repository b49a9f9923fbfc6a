//! PV Notepad - Dynamically updated process variable server
//!
//! This crate provides the live registry service, including:
//! - Loading PV definitions from a JSON configuration source
//! - Building network-addressable variables with limits and write loopback
//! - Restoring and persisting values through an autosave file
//! - Periodic configuration refresh that only ever adds variables
//! - A WebSocket access protocol for reads, writes and monitors

pub use notepad_runtime;
pub use notepad_types;

// Error types
pub mod types;

// Runtime options
pub mod config;

// Configuration source (config.json)
pub mod source;

// Variable descriptors, registry and write propagation
pub mod pv;

// Value persistence and startup reconciliation
pub mod autosave;

// Initial registry population
pub mod startup;

// Background services (refresh, autosave flush)
pub mod services;

// WebSocket server
pub mod server;

pub use types::{Error, Result};
