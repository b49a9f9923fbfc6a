//! Variable Registry
//!
//! Live mapping from PV address to variable. The registry only grows: a
//! registered variable is never replaced or removed, so client monitors stay
//! valid for the lifetime of the process. Only values change.
//!
//! Values sit behind a per-variable lock, so writes, loopback propagation and
//! autosave snapshots can run from different tasks without tearing a value.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use serde_json::Value as Json;
use tokio::sync::broadcast;

use notepad_types::PvValue;

use super::{PutError, VariableDescriptor, VariableSnapshot, VariableSummary};

/// A registered variable and its current value
#[derive(Debug)]
pub struct LiveVariable {
    descriptor: VariableDescriptor,
    value: RwLock<PvValue>,
}

impl LiveVariable {
    fn new(descriptor: VariableDescriptor) -> Self {
        let value = RwLock::new(descriptor.value.clone());
        Self { descriptor, value }
    }

    /// Immutable part of the variable (its `value` is the initial value)
    pub fn descriptor(&self) -> &VariableDescriptor {
        &self.descriptor
    }

    pub fn address(&self) -> &str {
        &self.descriptor.address
    }

    pub fn read_only(&self) -> bool {
        self.descriptor.read_only
    }

    /// Current value
    pub fn value(&self) -> PvValue {
        self.value.read().clone()
    }

    pub fn snapshot(&self) -> VariableSnapshot {
        let d = &self.descriptor;
        VariableSnapshot {
            address: d.address.clone(),
            attribute: d.attribute.clone(),
            record: d.record,
            kind: d.kind,
            value: self.value(),
            limits: d.limits,
            read_only: d.read_only,
            paired_address: d.paired_address.clone(),
            doc: d.doc.clone(),
            origin: d.origin,
        }
    }

    pub fn summary(&self) -> VariableSummary {
        VariableSummary {
            address: self.descriptor.address.clone(),
            kind: self.descriptor.kind,
            read_only: self.descriptor.read_only,
            origin: self.descriptor.origin,
        }
    }
}

/// Change notification published by the registry
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// A new variable was registered
    Added { address: String },
    /// A variable's value changed
    ValueChanged { address: String, value: PvValue },
}

/// Append-only registry of live variables
pub struct Registry {
    variables: DashMap<String, Arc<LiveVariable>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            variables: DashMap::new(),
            events,
        }
    }

    /// Add a variable unless its address is already taken.
    ///
    /// Returns `false` and leaves the registry untouched when the address
    /// exists. This is the only way the set of variables changes.
    pub fn register_if_absent(&self, descriptor: VariableDescriptor) -> bool {
        let address = match self.variables.entry(descriptor.address.clone()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                let address = descriptor.address.clone();
                slot.insert(Arc::new(LiveVariable::new(descriptor)));
                address
            }
        };

        let _ = self.events.send(RegistryEvent::Added { address });
        true
    }

    /// Look up a variable
    pub fn get(&self, address: &str) -> Option<Arc<LiveVariable>> {
        self.variables.get(address).map(|v| Arc::clone(v.value()))
    }

    pub fn contains(&self, address: &str) -> bool {
        self.variables.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// All addresses, sorted
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.variables.iter().map(|e| e.key().clone()).collect();
        addresses.sort();
        addresses
    }

    /// Every variable, sorted by address
    pub fn variables(&self) -> Vec<Arc<LiveVariable>> {
        let mut variables: Vec<_> = self.variables.iter().map(|e| Arc::clone(e.value())).collect();
        variables.sort_by(|a, b| a.address().cmp(b.address()));
        variables
    }

    /// `(address, value)` for every variable, sorted by address
    pub fn snapshot(&self) -> Vec<(String, PvValue)> {
        self.variables()
            .into_iter()
            .map(|v| (v.address().to_string(), v.value()))
            .collect()
    }

    pub fn summaries(&self) -> Vec<VariableSummary> {
        self.variables().iter().map(|v| v.summary()).collect()
    }

    /// Subscribe to registrations and value changes
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Client write.
    ///
    /// The raw value is coerced to the variable's storage type and checked
    /// against its control limits; then the variable's putter runs, and only
    /// if that succeeds is the value stored. Returns the stored value.
    pub fn put(&self, address: &str, raw: &Json) -> Result<PvValue, PutError> {
        let variable = self
            .get(address)
            .ok_or_else(|| PutError::NotFound(address.to_string()))?;
        let descriptor = variable.descriptor();

        if descriptor.read_only {
            return Err(PutError::ReadOnly(address.to_string()));
        }

        let value = PvValue::coerce_json(raw, descriptor.storage)
            .map_err(|e| PutError::validation(address, e))?;

        if let (Some(limits), Some(v)) = (descriptor.limits, value.as_f64()) {
            if !limits.within_ctrl(v) {
                return Err(PutError::validation(
                    address,
                    format!("{} is outside the control limits", v),
                ));
            }
        }

        if let Some(putter) = &descriptor.putter {
            putter.put(self, address, &value)?;
        }

        self.store(&variable, value.clone());
        Ok(value)
    }

    /// Server-side write that bypasses the read-only flag and putter
    pub fn set_value(&self, address: &str, value: PvValue) -> Result<(), PutError> {
        let variable = self
            .get(address)
            .ok_or_else(|| PutError::NotFound(address.to_string()))?;
        let value = value
            .coerce(variable.descriptor().storage)
            .map_err(|e| PutError::validation(address, e))?;

        self.store(&variable, value);
        Ok(())
    }

    pub(crate) fn store(&self, variable: &LiveVariable, value: PvValue) {
        *variable.value.write() = value.clone();
        let _ = self.events.send(RegistryEvent::ValueChanged {
            address: variable.address().to_string(),
            value,
        });
    }
}
