//! Write behaviors
//!
//! A putter runs when a client write has passed validation. For a setpoint
//! variable it copies the value into the paired readback; the write is only
//! acknowledged once that copy has happened.

use std::fmt;

use notepad_types::{CoercionError, PvValue};

use super::Registry;

/// Errors returned to the writer of a variable
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PutError {
    #[error("No such PV: {0}")]
    NotFound(String),

    #[error("PV is read-only: {0}")]
    ReadOnly(String),

    #[error("Invalid value for {address}: {reason}")]
    Validation { address: String, reason: String },

    #[error("Failed to propagate write from {from} to {to}: {reason}")]
    Propagation {
        from: String,
        to: String,
        reason: String,
    },
}

impl PutError {
    pub(crate) fn validation(address: &str, reason: impl fmt::Display) -> Self {
        PutError::Validation {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Behavior installed on a variable and run on every accepted write
pub trait Putter: Send + Sync + fmt::Debug {
    /// Called with the coerced value before it is stored on `address`.
    ///
    /// Returning an error rejects the write and leaves `address` unchanged.
    fn put(&self, registry: &Registry, address: &str, value: &PvValue) -> Result<(), PutError>;
}

/// Copies writes on a setpoint into its readback variable
#[derive(Debug, Clone)]
pub struct LoopbackPutter {
    pub read_address: String,
}

impl LoopbackPutter {
    pub fn new(read_address: impl Into<String>) -> Self {
        Self {
            read_address: read_address.into(),
        }
    }
}

impl Putter for LoopbackPutter {
    fn put(&self, registry: &Registry, address: &str, value: &PvValue) -> Result<(), PutError> {
        let propagation = |reason: String| PutError::Propagation {
            from: address.to_string(),
            to: self.read_address.clone(),
            reason,
        };

        let target = registry
            .get(&self.read_address)
            .ok_or_else(|| propagation("readback is not registered".to_string()))?;

        let value = value
            .coerce(target.descriptor().storage)
            .map_err(|e: CoercionError| propagation(e.to_string()))?;

        registry.store(&target, value);
        Ok(())
    }
}
