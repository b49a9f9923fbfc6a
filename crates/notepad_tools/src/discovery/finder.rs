//! Signal search across an inventory

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, error, warn};

use notepad_types::PvDefinition;

use super::{Criteria, DiscoveryError, Inventory, Signal, Transport};

/// Class of signals that carry notepad metadata
pub const NOTEPAD_SIGNAL_CLASS: &str = "NotepadLinkedSignal";

/// Selects the signals to export
pub trait SignalPredicate {
    fn check(&self, signal: &Signal) -> Result<bool, DiscoveryError>;
}

impl<F> SignalPredicate for F
where
    F: Fn(&Signal) -> Result<bool, DiscoveryError>,
{
    fn check(&self, signal: &Signal) -> Result<bool, DiscoveryError> {
        self(signal)
    }
}

/// Matches signals of one class
#[derive(Debug, Clone)]
pub struct ClassPredicate {
    pub class: String,
}

impl ClassPredicate {
    pub fn new(class: impl Into<String>) -> Self {
        Self { class: class.into() }
    }
}

impl Default for ClassPredicate {
    fn default() -> Self {
        Self::new(NOTEPAD_SIGNAL_CLASS)
    }
}

impl SignalPredicate for ClassPredicate {
    fn check(&self, signal: &Signal) -> Result<bool, DiscoveryError> {
        Ok(signal.class == self.class)
    }
}

/// Collect the notepad metadata of every selected signal.
///
/// Empty criteria scan the whole inventory. Devices that fail to instantiate
/// and signals whose check or metadata fails are logged and skipped; only an
/// unreadable inventory is an error. The result is keyed and sorted by
/// `read_pv`, later signals winning.
pub fn find_signals(
    inventory: &dyn Inventory,
    criteria: &Criteria,
    predicate: &dyn SignalPredicate,
    transport: &dyn Transport,
) -> Result<Vec<PvDefinition>, DiscoveryError> {
    let items = if criteria.is_empty() {
        inventory.items()?
    } else {
        inventory.search(criteria)?
    };
    debug!("Scanning {} inventory items", items.len());

    let mut found: BTreeMap<String, PvDefinition> = BTreeMap::new();

    for item in &items {
        let device = match inventory.instantiate(item, transport) {
            Ok(device) => device,
            Err(e) => {
                error!("{}", e);
                continue;
            }
        };

        for signal in &device.signals {
            let metadata = predicate.check(signal).and_then(|selected| {
                selected.then(|| signal.notepad_metadata()).transpose()
            });
            match metadata {
                Ok(Some(definition)) => {
                    found.insert(definition.read_pv.clone(), definition);
                }
                Ok(None) => {}
                Err(e) => error!("{}", e),
            }
        }
    }

    Ok(found.into_values().collect())
}

/// Read an existing configuration for `--update`; a missing file is empty
pub fn load_existing(path: &Path) -> anyhow::Result<Vec<PvDefinition>> {
    if !path.exists() {
        warn!("--update specified but {} does not exist", path.display());
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Merge found definitions into an existing configuration.
///
/// Entries with a known `read_pv` are replaced in place; new ones are
/// appended in the order found.
pub fn merge_update(mut existing: Vec<PvDefinition>, found: Vec<PvDefinition>) -> Vec<PvDefinition> {
    for definition in found {
        match existing.iter_mut().find(|d| d.read_pv == definition.read_pv) {
            Some(slot) => *slot = definition,
            None => existing.push(definition),
        }
    }
    existing
}
