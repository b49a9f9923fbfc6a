//! Process Variables
//!
//! Descriptors are built from PV definitions and live in an append-only
//! registry. Writes to a setpoint variable are propagated to its readback
//! through the putter installed at build time.

mod builder;
mod descriptor;
mod putter;
mod registry;

pub use builder::*;
pub use descriptor::*;
pub use putter::*;
pub use registry::*;
