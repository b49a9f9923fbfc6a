//! Notepad Types - Core data model for process variables
//!
//! This crate contains the pure data structures shared by the notepad service
//! and its configuration tooling:
//!
//! - `RecordType` / `RecordKind` - record flavors and the types the server supports
//! - `PvValue` - scalar and array values with type coercion
//! - `PvDefinition` - one entry of the JSON configuration source

mod definition;
mod record;
mod value;

pub use definition::*;
pub use record::*;
pub use value::*;
