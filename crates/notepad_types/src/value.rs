//! Process variable values
//!
//! Values are stored in one of four storage types. Anything arriving from the
//! outside world (configuration defaults, autosave files, client writes) is
//! raw JSON and has to be coerced into the storage type of its target.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

// ─────────────────────────────────────────────────────────────────────────────
// Storage Type
// ─────────────────────────────────────────────────────────────────────────────

/// Concrete storage type of a variable's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Float,
    Int,
    String,
    Array,
}

impl StorageType {
    /// The value a variable of this type starts at when nothing else is known
    pub fn zero(self) -> PvValue {
        match self {
            StorageType::Float => PvValue::Float(0.0),
            StorageType::Int => PvValue::Int(0),
            StorageType::String => PvValue::String(String::new()),
            StorageType::Array => PvValue::Array(Vec::new()),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageType::Float => "float",
            StorageType::Int => "int",
            StorageType::String => "string",
            StorageType::Array => "array",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coercion Error
// ─────────────────────────────────────────────────────────────────────────────

/// A raw value could not be converted to the requested storage type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Cannot coerce {value} to {target}")]
pub struct CoercionError {
    pub value: String,
    pub target: StorageType,
}

impl CoercionError {
    fn new(value: &Json, target: StorageType) -> Self {
        Self {
            value: value.to_string(),
            target,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PV Value
// ─────────────────────────────────────────────────────────────────────────────

/// Value held by a process variable
///
/// Serialized untagged so autosave files and protocol messages carry plain
/// JSON scalars and arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PvValue {
    /// Integer value (binary, integer and enum records)
    Int(i64),
    /// Floating point value (analog records)
    Float(f64),
    /// String value
    String(String),
    /// Array of numbers (waveform records)
    Array(Vec<f64>),
}

impl PvValue {
    /// Storage type of this value
    pub fn storage_type(&self) -> StorageType {
        match self {
            PvValue::Int(_) => StorageType::Int,
            PvValue::Float(_) => StorageType::Float,
            PvValue::String(_) => StorageType::String,
            PvValue::Array(_) => StorageType::Array,
        }
    }

    /// Whether the value is a numeric scalar
    pub fn is_numeric(&self) -> bool {
        matches!(self, PvValue::Int(_) | PvValue::Float(_))
    }

    /// Get as f64 (numeric scalars only)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PvValue::Int(i) => Some(*i as f64),
            PvValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert raw JSON into a value of the given storage type
    pub fn coerce_json(raw: &Json, target: StorageType) -> Result<Self, CoercionError> {
        let err = || CoercionError::new(raw, target);

        match target {
            StorageType::Float => match raw {
                Json::Number(n) => n.as_f64().map(PvValue::Float).ok_or_else(err),
                Json::Bool(b) => Ok(PvValue::Float(if *b { 1.0 } else { 0.0 })),
                _ => Err(err()),
            },
            StorageType::Int => match raw {
                Json::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(PvValue::Int(i))
                    } else {
                        match n.as_f64() {
                            // `i64::MAX as f64` rounds up to 2^63, which is already out of range
                            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                                Ok(PvValue::Int(f as i64))
                            }
                            _ => Err(err()),
                        }
                    }
                }
                Json::Bool(b) => Ok(PvValue::Int(i64::from(*b))),
                _ => Err(err()),
            },
            StorageType::String => match raw {
                Json::String(s) => Ok(PvValue::String(s.clone())),
                _ => Err(err()),
            },
            StorageType::Array => match raw {
                Json::Array(items) => items
                    .iter()
                    .map(|item| item.as_f64())
                    .collect::<Option<Vec<_>>>()
                    .map(PvValue::Array)
                    .ok_or_else(err),
                _ => Err(err()),
            },
        }
    }

    /// Convert this value into the given storage type
    pub fn coerce(&self, target: StorageType) -> Result<Self, CoercionError> {
        if self.storage_type() == target {
            return Ok(self.clone());
        }
        Self::coerce_json(&self.to_json(), target)
    }

    /// Convert to raw JSON
    pub fn to_json(&self) -> Json {
        match self {
            PvValue::Int(i) => Json::from(*i),
            PvValue::Float(f) => Json::from(*f),
            PvValue::String(s) => Json::from(s.as_str()),
            PvValue::Array(items) => Json::from(items.clone()),
        }
    }
}

impl fmt::Display for PvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvValue::Int(i) => write!(f, "{}", i),
            PvValue::Float(v) => write!(f, "{}", v),
            PvValue::String(s) => write!(f, "{:?}", s),
            PvValue::Array(items) => write!(f, "{:?}", items),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Limits
// ─────────────────────────────────────────────────────────────────────────────

/// Control and alarm limits of a numeric variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_ctrl: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_ctrl: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_alarm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_alarm: Option<f64>,
}

impl Limits {
    /// True if no limit is set
    pub fn is_empty(&self) -> bool {
        self.lower_ctrl.is_none()
            && self.upper_ctrl.is_none()
            && self.lower_alarm.is_none()
            && self.upper_alarm.is_none()
    }

    /// Check a value against the control limits.
    ///
    /// Limits that are both zero (the record default) do not restrict anything.
    pub fn within_ctrl(&self, value: f64) -> bool {
        let lower = self.lower_ctrl.unwrap_or(0.0);
        let upper = self.upper_ctrl.unwrap_or(0.0);
        if lower == 0.0 && upper == 0.0 {
            return true;
        }
        let above_lower = self.lower_ctrl.is_none_or(|lo| value >= lo);
        let below_upper = self.upper_ctrl.is_none_or(|hi| value <= hi);
        above_lower && below_upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(
            PvValue::coerce_json(&json!(3), StorageType::Float),
            Ok(PvValue::Float(3.0))
        );
        assert_eq!(
            PvValue::coerce_json(&json!(4.0), StorageType::Int),
            Ok(PvValue::Int(4))
        );
        assert_eq!(
            PvValue::coerce_json(&json!(true), StorageType::Int),
            Ok(PvValue::Int(1))
        );
        assert!(PvValue::coerce_json(&json!(4.5), StorageType::Int).is_err());
    }

    #[test]
    fn test_coerce_out_of_range_float_to_int() {
        assert!(PvValue::coerce_json(&json!(1e30), StorageType::Int).is_err());
        assert!(PvValue::coerce_json(&json!(-1e30), StorageType::Int).is_err());
        assert!(PvValue::coerce_json(&json!(9223372036854775808.0), StorageType::Int).is_err());
        assert_eq!(
            PvValue::coerce_json(&json!(-9223372036854775808.0), StorageType::Int),
            Ok(PvValue::Int(i64::MIN))
        );
        assert_eq!(
            PvValue::coerce_json(&json!(1e15), StorageType::Int),
            Ok(PvValue::Int(1_000_000_000_000_000))
        );
    }

    #[test]
    fn test_coerce_rejects_mismatched_types() {
        assert!(PvValue::coerce_json(&json!("abc"), StorageType::Float).is_err());
        assert!(PvValue::coerce_json(&json!(1), StorageType::String).is_err());
        assert!(PvValue::coerce_json(&json!(null), StorageType::Float).is_err());
        assert!(PvValue::coerce_json(&json!([1, "x"]), StorageType::Array).is_err());
    }

    #[test]
    fn test_coerce_array() {
        assert_eq!(
            PvValue::coerce_json(&json!([1, 2.5]), StorageType::Array),
            Ok(PvValue::Array(vec![1.0, 2.5]))
        );
    }

    #[test]
    fn test_untagged_deserialize() {
        let v: PvValue = serde_json::from_str("5").unwrap();
        assert_eq!(v, PvValue::Int(5));
        let v: PvValue = serde_json::from_str("5.5").unwrap();
        assert_eq!(v, PvValue::Float(5.5));
        let v: PvValue = serde_json::from_str("\"on\"").unwrap();
        assert_eq!(v, PvValue::String("on".to_string()));
    }

    #[test]
    fn test_value_coerce_between_storage_types() {
        assert_eq!(PvValue::Int(7).coerce(StorageType::Float), Ok(PvValue::Float(7.0)));
        assert!(PvValue::String("x".into()).coerce(StorageType::Int).is_err());
    }

    #[test]
    fn test_ctrl_limits() {
        let limits = Limits {
            lower_ctrl: Some(-1.0),
            upper_ctrl: Some(1.0),
            ..Default::default()
        };
        assert!(limits.within_ctrl(0.5));
        assert!(!limits.within_ctrl(1.5));

        let unset = Limits {
            lower_ctrl: Some(0.0),
            upper_ctrl: Some(0.0),
            ..Default::default()
        };
        assert!(unset.within_ctrl(100.0));
    }
}
