//! Startup reconciliation of autosaved values against configuration

use std::collections::HashSet;

use tracing::warn;

use notepad_types::{PvValue, RecordKind, RecordType, StorageType};

use super::PersistedState;
use crate::pv::{VariableDescriptor, VariableOrigin};

/// Result of merging persisted values into a fresh descriptor set
#[derive(Debug)]
pub struct Reconciliation {
    /// Fresh descriptors (persisted values applied) followed by carry-overs
    pub descriptors: Vec<VariableDescriptor>,
    /// Addresses whose initial value came from the autosave file
    pub restored: Vec<String>,
    /// Persisted addresses with no configuration behind them
    pub carried_over: Vec<String>,
}

/// Attribute name of the `index`th carry-over variable
pub fn carryover_attribute(index: usize) -> String {
    format!("autosaved_carryover_{}", index)
}

/// Merge persisted values into freshly built descriptors.
///
/// Known addresses take the persisted value as their initial value when it
/// coerces to the descriptor's storage type. Persisted addresses that are no
/// longer configured become analog carry-over variables, numbered in address
/// order, so their values are still served and saved.
pub fn reconcile(mut fresh: Vec<VariableDescriptor>, persisted: &PersistedState) -> Reconciliation {
    let mut restored = Vec::new();

    for descriptor in fresh.iter_mut() {
        let Some(saved) = persisted.get(&descriptor.address) else {
            continue;
        };
        match saved.coerce(descriptor.storage) {
            Ok(value) => {
                descriptor.value = value;
                restored.push(descriptor.address.clone());
            }
            Err(e) => warn!(
                address = %descriptor.address,
                "Autosaved value does not fit the configured type, using default: {}", e
            ),
        }
    }

    let configured: HashSet<&str> = fresh.iter().map(|d| d.address.as_str()).collect();
    let orphans: Vec<(&String, &PvValue)> = persisted
        .iter()
        .filter(|(address, _)| !configured.contains(address.as_str()))
        .collect();
    drop(configured);

    let mut carried_over = Vec::with_capacity(orphans.len());
    for (index, (address, value)) in orphans.into_iter().enumerate() {
        warn!(
            address = %address,
            "Autosaved PV has no configuration entry, carrying it over as {}",
            carryover_attribute(index)
        );
        fresh.push(carryover(index, address, value));
        carried_over.push(address.clone());
    }

    Reconciliation {
        descriptors: fresh,
        restored,
        carried_over,
    }
}

fn carryover(index: usize, address: &str, value: &PvValue) -> VariableDescriptor {
    // Numbers are served as analog floats; anything else keeps its own storage
    let (storage, value) = match value.as_f64() {
        Some(v) => (StorageType::Float, PvValue::Float(v)),
        None => (value.storage_type(), value.clone()),
    };

    VariableDescriptor {
        attribute: carryover_attribute(index),
        address: address.to_string(),
        record: RecordType::Ao,
        kind: RecordKind::Analog,
        storage,
        value,
        limits: None,
        read_only: false,
        paired_address: None,
        doc: format!("Autosaved value of {} with no configuration entry", address),
        origin: VariableOrigin::CarryOver,
        putter: None,
    }
}
