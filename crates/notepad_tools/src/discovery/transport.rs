//! Control-layer transport used when instantiating devices
//!
//! Discovery only needs the signal tree, never live values, so it runs
//! against `NullTransport`: every channel reports connected and reads and
//! writes do nothing.

use std::fmt;

use serde_json::Value;

/// A connection to one control-layer channel
pub trait Channel: Send + Sync + fmt::Debug {
    fn pvname(&self) -> &str;

    fn is_connected(&self) -> bool;

    fn get(&self) -> Option<Value>;

    fn put(&self, value: &Value) -> Result<(), String>;
}

/// Factory for channels, injected into device instantiation
pub trait Transport: Send + Sync {
    fn channel(&self, pvname: &str) -> Box<dyn Channel>;
}

/// Transport that never touches the network
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn channel(&self, pvname: &str) -> Box<dyn Channel> {
        Box::new(NullChannel {
            pvname: pvname.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NullChannel {
    pvname: String,
}

impl Channel for NullChannel {
    fn pvname(&self) -> &str {
        &self.pvname
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn get(&self) -> Option<Value> {
        None
    }

    fn put(&self, _value: &Value) -> Result<(), String> {
        Ok(())
    }
}
