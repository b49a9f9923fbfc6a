//! PV Definitions
//!
//! One entry of the JSON configuration source. Definitions are produced by the
//! discovery tool and consumed by the service and the text exporters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::{Limits, RecordKindError, RecordType};

/// A single PV definition (`config.json` entry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvDefinition {
    /// Logical identifier, unique within a configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Read-side (readback) PV name
    pub read_pv: String,

    /// Write-side (setpoint) PV name, if distinct from the readback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_pv: Option<String>,

    /// Record type string (`ai`, `bo`, `waveform`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,

    /// Initial value, coerced to the record's storage type when built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Json>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_ctrl_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_ctrl_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_alarm_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_alarm_limit: Option<f64>,

    /// Hierarchical display identifier (e.g. `at1l0.motor.user_setpoint`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dotted_name: Option<String>,

    /// Free-form metadata, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Json>,
}

impl PvDefinition {
    /// Create a definition with only a read PV
    pub fn new(read_pv: impl Into<String>) -> Self {
        Self {
            name: None,
            read_pv: read_pv.into(),
            write_pv: None,
            record_type: None,
            default_value: None,
            lower_ctrl_limit: None,
            upper_ctrl_limit: None,
            lower_alarm_limit: None,
            upper_alarm_limit: None,
            dotted_name: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the write PV
    pub fn with_write_pv(mut self, write_pv: impl Into<String>) -> Self {
        self.write_pv = Some(write_pv.into());
        self
    }

    /// Set the record type
    pub fn with_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Set the default value
    pub fn with_default(mut self, value: Json) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Set the dotted display name
    pub fn with_dotted_name(mut self, dotted_name: impl Into<String>) -> Self {
        self.dotted_name = Some(dotted_name.into());
        self
    }

    /// Logical name: `name`, then `dotted_name`, then `read_pv`
    pub fn logical_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.dotted_name.as_deref())
            .unwrap_or(&self.read_pv)
    }

    /// Documentation string: metadata `doc`, else the dotted name
    pub fn doc(&self) -> String {
        self.extra
            .get("doc")
            .and_then(|d| d.as_str())
            .or(self.dotted_name.as_deref())
            .unwrap_or_default()
            .to_string()
    }

    /// Declared record type, defaulting to `ai` when absent
    pub fn record_type(&self) -> Result<RecordType, RecordKindError> {
        match &self.record_type {
            Some(s) => s.parse(),
            None => Ok(RecordType::default()),
        }
    }

    /// Limits, if any limit field is set
    pub fn limits(&self) -> Option<Limits> {
        let limits = Limits {
            lower_ctrl: self.lower_ctrl_limit,
            upper_ctrl: self.upper_ctrl_limit,
            lower_alarm: self.lower_alarm_limit,
            upper_alarm: self.upper_alarm_limit,
        };
        (!limits.is_empty()).then_some(limits)
    }

    /// Every PV name this definition declares (read first)
    pub fn pv_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.read_pv.as_str()).chain(self.write_pv.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_minimal() {
        let def: PvDefinition = serde_json::from_value(json!({"read_pv": "TST:A"})).unwrap();
        assert_eq!(def.read_pv, "TST:A");
        assert_eq!(def.write_pv, None);
        assert_eq!(def.record_type(), Ok(RecordType::Ai));
        assert_eq!(def.limits(), None);
        assert_eq!(def.logical_name(), "TST:A");
    }

    #[test]
    fn test_extra_metadata_round_trips() {
        let raw = json!({
            "read_pv": "TST:A",
            "dotted_name": "dev.a",
            "owner_type": "Motor",
            "doc": "user notes",
        });
        let def: PvDefinition = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(def.extra.get("owner_type"), Some(&json!("Motor")));
        assert_eq!(def.doc(), "user notes");
        assert_eq!(serde_json::to_value(&def).unwrap(), raw);
    }

    #[test]
    fn test_doc_falls_back_to_dotted_name() {
        let def = PvDefinition::new("TST:A").with_dotted_name("dev.a");
        assert_eq!(def.doc(), "dev.a");
        assert_eq!(def.logical_name(), "dev.a");
    }

    #[test]
    fn test_limits_and_pv_names() {
        let def: PvDefinition = serde_json::from_value(json!({
            "read_pv": "R",
            "write_pv": "W",
            "upper_ctrl_limit": 10.0,
        }))
        .unwrap();
        assert_eq!(def.limits().and_then(|l| l.upper_ctrl), Some(10.0));
        assert_eq!(def.pv_names().collect::<Vec<_>>(), vec!["R", "W"]);
    }

    #[test]
    fn test_unknown_record_type() {
        let def = PvDefinition::new("R").with_record_type("calc");
        assert!(def.record_type().is_err());
    }
}
