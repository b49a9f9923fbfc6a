//! Variable descriptors

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use notepad_types::{Limits, PvValue, RecordKind, RecordType, StorageType};

use super::Putter;

/// Where a variable came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableOrigin {
    /// Built from a configuration entry
    Configured,
    /// Restored from autosave with no configuration entry behind it
    CarryOver,
    /// Owned by the server itself
    Internal,
}

/// One network-addressable variable
///
/// Everything except `value` is fixed once the descriptor is registered;
/// `value` is only the initial value.
#[derive(Debug, Clone)]
pub struct VariableDescriptor {
    /// Logical attribute name (definition name, `<name>_write`, ...)
    pub attribute: String,
    /// PV name, unique within the registry
    pub address: String,
    /// Record type served for this variable
    pub record: RecordType,
    pub kind: RecordKind,
    /// Storage type incoming writes are coerced to
    pub storage: StorageType,
    pub value: PvValue,
    pub limits: Option<Limits>,
    pub read_only: bool,
    /// Counterpart read/write address, if any
    pub paired_address: Option<String>,
    pub doc: String,
    pub origin: VariableOrigin,
    /// Behavior run on accepted writes, before the value is stored
    pub putter: Option<Arc<dyn Putter>>,
}

impl VariableDescriptor {
    /// Read-only integer owned by the server
    pub fn internal(address: impl Into<String>, attribute: impl Into<String>, doc: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            address: address.into(),
            record: RecordType::Longin,
            kind: RecordKind::Integer,
            storage: StorageType::Int,
            value: PvValue::Int(0),
            limits: None,
            read_only: true,
            paired_address: None,
            doc: doc.into(),
            origin: VariableOrigin::Internal,
            putter: None,
        }
    }

    /// True if this is the write side of a read/write pair
    pub fn is_setpoint(&self) -> bool {
        !self.read_only && self.paired_address.is_some()
    }
}

/// Serializable view of a variable and its current value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSnapshot {
    pub address: String,
    pub attribute: String,
    pub record: RecordType,
    pub kind: RecordKind,
    pub value: PvValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<Limits>,
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paired_address: Option<String>,
    pub doc: String,
    pub origin: VariableOrigin,
}

/// Listing entry for `/pvs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSummary {
    pub address: String,
    pub kind: RecordKind,
    pub read_only: bool,
    pub origin: VariableOrigin,
}
