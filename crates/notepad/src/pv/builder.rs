//! Descriptor Builder
//!
//! Turns one `PvDefinition` into the variables it serves: the readback, and
//! the setpoint when `write_pv` is set. Setpoints get a `LoopbackPutter` so a
//! write is mirrored into the readback before it is acknowledged.

use std::sync::Arc;

use tracing::warn;

use notepad_types::{PvDefinition, PvValue};

use super::{LoopbackPutter, VariableDescriptor, VariableOrigin};

/// A single PV definition could not be built
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid PV definition {name}: {reason}")]
pub struct ConfigurationError {
    pub name: String,
    pub reason: String,
}

impl ConfigurationError {
    fn new(definition: &PvDefinition, reason: impl ToString) -> Self {
        Self {
            name: definition.logical_name().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DescriptorBuilder {
    strict: bool,
}

impl DescriptorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// In strict mode, limits on a non-numeric record reject the definition
    /// instead of being dropped.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Build the one or two descriptors for a definition
    pub fn build(&self, definition: &PvDefinition) -> Result<Vec<VariableDescriptor>, ConfigurationError> {
        let read_pv = definition.read_pv.trim();
        if read_pv.is_empty() {
            return Err(ConfigurationError::new(definition, "read_pv is empty"));
        }
        if let Some(write_pv) = &definition.write_pv {
            if write_pv.trim().is_empty() {
                return Err(ConfigurationError::new(definition, "write_pv is empty"));
            }
            if write_pv == &definition.read_pv {
                return Err(ConfigurationError::new(
                    definition,
                    "write_pv must differ from read_pv",
                ));
            }
        }

        let record = definition
            .record_type()
            .map_err(|e| ConfigurationError::new(definition, e))?
            .normalized();
        let kind = record.kind();
        let storage = kind.storage();

        let value = match &definition.default_value {
            Some(raw) => PvValue::coerce_json(raw, storage)
                .map_err(|e| ConfigurationError::new(definition, e))?,
            None => storage.zero(),
        };

        let limits = match definition.limits() {
            Some(limits) if value.is_numeric() => Some(limits),
            Some(_) if self.strict => {
                return Err(ConfigurationError::new(
                    definition,
                    format!("limits are not allowed on {} records", kind),
                ));
            }
            _ => None,
        };

        let name = definition.logical_name();
        let doc = definition.doc();

        let read = VariableDescriptor {
            attribute: name.to_string(),
            address: definition.read_pv.clone(),
            record,
            kind,
            storage,
            value: value.clone(),
            limits,
            read_only: definition.write_pv.is_some(),
            paired_address: definition.write_pv.clone(),
            doc: doc.clone(),
            origin: VariableOrigin::Configured,
            putter: None,
        };

        let Some(write_pv) = &definition.write_pv else {
            return Ok(vec![read]);
        };

        let write = VariableDescriptor {
            attribute: format!("{}_write", name),
            address: write_pv.clone(),
            record,
            kind,
            storage,
            value,
            limits,
            read_only: false,
            paired_address: Some(definition.read_pv.clone()),
            doc,
            origin: VariableOrigin::Configured,
            putter: Some(Arc::new(LoopbackPutter::new(definition.read_pv.clone()))),
        };

        Ok(vec![read, write])
    }

    /// Build every definition, skipping the ones that fail
    pub fn build_all(&self, definitions: &[PvDefinition]) -> Vec<VariableDescriptor> {
        let mut descriptors = Vec::with_capacity(definitions.len());
        for definition in definitions {
            match self.build(definition) {
                Ok(built) => descriptors.extend(built),
                Err(e) => warn!("Skipping PV definition: {}", e),
            }
        }
        descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pv::Registry;
    use notepad_types::{RecordKind, RecordType, StorageType};
    use serde_json::json;

    #[test]
    fn test_build_read_only_definition() {
        let definition = PvDefinition::new("TST:A").with_dotted_name("tst.a");
        let built = DescriptorBuilder::new().build(&definition).unwrap();

        assert_eq!(built.len(), 1);
        let read = &built[0];
        assert_eq!(read.address, "TST:A");
        assert_eq!(read.attribute, "tst.a");
        assert_eq!(read.record, RecordType::Ao);
        assert_eq!(read.kind, RecordKind::Analog);
        assert_eq!(read.value, PvValue::Float(0.0));
        assert_eq!(read.doc, "tst.a");
        assert!(!read.read_only);
        assert!(read.paired_address.is_none());
    }

    #[test]
    fn test_build_pair_references_each_other() {
        let definition = PvDefinition::new("TST:RBV")
            .with_write_pv("TST:SP")
            .with_record_type("longin")
            .with_default(json!(3));
        let built = DescriptorBuilder::new().build(&definition).unwrap();

        let (read, write) = (&built[0], &built[1]);
        assert_eq!(read.paired_address.as_deref(), Some("TST:SP"));
        assert_eq!(write.paired_address.as_deref(), Some("TST:RBV"));
        assert!(read.read_only);
        assert!(!write.read_only);
        assert!(write.is_setpoint());
        assert!(write.putter.is_some());
        assert_eq!(write.record, RecordType::Longout);
        assert_eq!(write.storage, StorageType::Int);
        assert_eq!(write.value, PvValue::Int(3));
        assert_eq!(write.attribute, "TST:RBV_write");
    }

    #[test]
    fn test_write_propagates_to_readback() {
        let definition = PvDefinition::new("X").with_write_pv("Y");
        let registry = Registry::new();
        for descriptor in DescriptorBuilder::new().build(&definition).unwrap() {
            registry.register_if_absent(descriptor);
        }

        registry.put("Y", &json!(4.5)).unwrap();

        let read = registry.get("X").unwrap();
        assert_eq!(read.value(), PvValue::Float(4.5));
        assert!(read.read_only());
        assert_eq!(registry.get("Y").unwrap().value(), PvValue::Float(4.5));
    }

    #[test]
    fn test_limits_only_on_numeric_records() {
        let mut numeric = PvDefinition::new("TST:N");
        numeric.upper_ctrl_limit = Some(10.0);
        let built = DescriptorBuilder::new().build(&numeric).unwrap();
        assert_eq!(built[0].limits.and_then(|l| l.upper_ctrl), Some(10.0));

        let mut text = PvDefinition::new("TST:S")
            .with_record_type("stringin")
            .with_default(json!("hello"));
        text.upper_ctrl_limit = Some(10.0);
        let built = DescriptorBuilder::new().build(&text).unwrap();
        assert!(built[0].limits.is_none());

        assert!(DescriptorBuilder::new().strict(true).build(&text).is_err());
    }

    #[test]
    fn test_build_errors() {
        let builder = DescriptorBuilder::new();

        let unknown = PvDefinition::new("TST:A").with_record_type("calc");
        assert!(builder.build(&unknown).is_err());

        let bad_default = PvDefinition::new("TST:A")
            .with_record_type("waveform")
            .with_default(json!("not an array"));
        let err = builder.build(&bad_default).unwrap_err();
        assert_eq!(err.name, "TST:A");

        let same = PvDefinition::new("TST:A").with_write_pv("TST:A");
        assert!(builder.build(&same).is_err());
    }

    #[test]
    fn test_build_all_isolates_malformed_entries() {
        let definitions = vec![
            PvDefinition::new("TST:A"),
            PvDefinition::new("TST:BAD").with_record_type("bogus"),
            PvDefinition::new("TST:B").with_write_pv("TST:B_SP"),
        ];

        let built = DescriptorBuilder::new().build_all(&definitions);
        let addresses: Vec<_> = built.iter().map(|d| d.address.as_str()).collect();
        assert_eq!(addresses, vec!["TST:A", "TST:B", "TST:B_SP"]);
    }
}
