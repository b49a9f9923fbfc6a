//! Device inventory
//!
//! `JsonInventory` reads a happi-style JSON database:
//!
//! ```text
//! {
//!   "at1l0_motor": {
//!     "name": "at1l0_motor",
//!     "beamline": "TMO",
//!     "z": 10.0,
//!     "signals": [
//!       {"attr": "user_setpoint", "class": "NotepadLinkedSignal",
//!        "notepad_metadata": {"read_pv": "...", "record_type": "ao"}}
//!     ]
//!   }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use notepad_types::PvDefinition;

use super::{Channel, Criteria, DiscoveryError, Transport};

/// One inventory entry, before instantiation
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryItem {
    pub name: String,
    /// Every field of the entry (searchable by criteria)
    pub fields: Map<String, Value>,
}

/// An instantiated device
#[derive(Debug)]
pub struct Device {
    pub name: String,
    pub signals: Vec<Signal>,
}

/// A signal of an instantiated device
#[derive(Debug)]
pub struct Signal {
    /// `<device>.<attr>`
    pub dotted_name: String,
    /// Signal class name
    pub class: String,
    pub channel: Box<dyn Channel>,
    metadata: Option<Map<String, Value>>,
}

impl Signal {
    /// Notepad metadata of the signal as a PV definition.
    ///
    /// A missing `dotted_name` is filled in from the signal's position in
    /// the device.
    pub fn notepad_metadata(&self) -> Result<PvDefinition, DiscoveryError> {
        let metadata = self.metadata.clone().ok_or_else(|| DiscoveryError::Predicate {
            signal: self.dotted_name.clone(),
            reason: "signal has no notepad metadata".to_string(),
        })?;

        let mut definition: PvDefinition = serde_json::from_value(Value::Object(metadata)).map_err(|e| {
            DiscoveryError::Predicate {
                signal: self.dotted_name.clone(),
                reason: e.to_string(),
            }
        })?;

        if definition.dotted_name.is_none() {
            definition.dotted_name = Some(self.dotted_name.clone());
        }
        Ok(definition)
    }
}

/// A source of devices
pub trait Inventory {
    /// Every entry in the inventory
    fn items(&self) -> Result<Vec<InventoryItem>, DiscoveryError>;

    /// Build a device for an entry, creating its channels through `transport`
    fn instantiate(&self, item: &InventoryItem, transport: &dyn Transport) -> Result<Device, DiscoveryError>;

    /// Entries matching every criterion
    fn search(&self, criteria: &Criteria) -> Result<Vec<InventoryItem>, DiscoveryError> {
        let items = self.items()?;
        Ok(items.into_iter().filter(|item| criteria.matches(&item.fields)).collect())
    }
}

#[derive(Debug, Deserialize)]
struct SignalSpec {
    attr: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    pv: Option<String>,
    #[serde(default)]
    notepad_metadata: Option<Map<String, Value>>,
}

/// Inventory backed by a JSON file
#[derive(Debug, Clone)]
pub struct JsonInventory {
    path: PathBuf,
}

impl JsonInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Inventory for JsonInventory {
    fn items(&self) -> Result<Vec<InventoryItem>, DiscoveryError> {
        let inventory_error = |reason: String| DiscoveryError::Inventory {
            path: self.path.display().to_string(),
            reason,
        };

        let content = std::fs::read_to_string(&self.path).map_err(|e| inventory_error(e.to_string()))?;
        let entries: Map<String, Value> =
            serde_json::from_str(&content).map_err(|e| inventory_error(e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(|(key, value)| {
                let fields = match value {
                    Value::Object(fields) => fields,
                    other => {
                        let mut fields = Map::new();
                        fields.insert("value".to_string(), other);
                        fields
                    }
                };
                let name = fields
                    .get("name")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or(key);
                InventoryItem { name, fields }
            })
            .collect())
    }

    fn instantiate(&self, item: &InventoryItem, transport: &dyn Transport) -> Result<Device, DiscoveryError> {
        let instantiate_error = |reason: String| DiscoveryError::Instantiate {
            name: item.name.clone(),
            reason,
        };

        let specs: Vec<SignalSpec> = match item.fields.get("signals") {
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| instantiate_error(e.to_string()))?,
            None => Vec::new(),
        };

        let signals = specs
            .into_iter()
            .map(|spec| {
                let pvname = spec
                    .pv
                    .clone()
                    .or_else(|| {
                        spec.notepad_metadata
                            .as_ref()
                            .and_then(|m| m.get("read_pv"))
                            .and_then(Value::as_str)
                            .map(String::from)
                    })
                    .unwrap_or_else(|| spec.attr.clone());

                Signal {
                    dotted_name: format!("{}.{}", item.name, spec.attr),
                    class: spec.class,
                    channel: transport.channel(&pvname),
                    metadata: spec.notepad_metadata,
                }
            })
            .collect();

        Ok(Device {
            name: item.name.clone(),
            signals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{NullTransport, parse_criteria};
    use serde_json::json;
    use tempfile::TempDir;

    fn write_inventory(dir: &TempDir, content: Value) -> JsonInventory {
        let path = dir.path().join("db.json");
        std::fs::write(&path, content.to_string()).unwrap();
        JsonInventory::new(path)
    }

    #[test]
    fn test_items_and_search() {
        let dir = TempDir::new().unwrap();
        let inventory = write_inventory(
            &dir,
            json!({
                "at1l0": {"name": "at1l0", "beamline": "TMO", "z": 10},
                "im2k0": {"name": "im2k0", "beamline": "RIX", "z": 20}
            }),
        );

        assert_eq!(inventory.items().unwrap().len(), 2);

        let found = inventory.search(&parse_criteria(&["beamline=T*"])).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "at1l0");
    }

    #[test]
    fn test_instantiate_uses_transport() {
        let dir = TempDir::new().unwrap();
        let inventory = write_inventory(
            &dir,
            json!({
                "at1l0": {
                    "signals": [
                        {"attr": "setpoint", "class": "NotepadLinkedSignal",
                         "notepad_metadata": {"read_pv": "TST:SP"}},
                        {"attr": "readback", "class": "EpicsSignalRO", "pv": "TST:RBV"}
                    ]
                }
            }),
        );

        let item = &inventory.items().unwrap()[0];
        let device = inventory.instantiate(item, &NullTransport).unwrap();

        assert_eq!(device.signals.len(), 2);
        assert_eq!(device.signals[0].channel.pvname(), "TST:SP");
        assert_eq!(device.signals[1].channel.pvname(), "TST:RBV");
        assert!(device.signals[1].channel.is_connected());

        let definition = device.signals[0].notepad_metadata().unwrap();
        assert_eq!(definition.read_pv, "TST:SP");
        assert_eq!(definition.dotted_name.as_deref(), Some("at1l0.setpoint"));
        assert!(device.signals[1].notepad_metadata().is_err());
    }

    #[test]
    fn test_malformed_signals_fail_instantiation() {
        let dir = TempDir::new().unwrap();
        let inventory = write_inventory(&dir, json!({"bad": {"signals": "nope"}}));

        let item = &inventory.items().unwrap()[0];
        assert!(matches!(
            inventory.instantiate(item, &NullTransport),
            Err(DiscoveryError::Instantiate { .. })
        ));
    }

    #[test]
    fn test_unreadable_inventory() {
        let inventory = JsonInventory::new("/nonexistent/db.json");
        assert!(matches!(inventory.items(), Err(DiscoveryError::Inventory { .. })));
    }
}
