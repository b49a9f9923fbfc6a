//! Notepad Runtime - Service lifecycle for the notepad server
//!
//! Long-running background work (configuration refresh, autosave flushing) is
//! expressed as services driven by a shared `ServiceManager`.

pub mod service;
