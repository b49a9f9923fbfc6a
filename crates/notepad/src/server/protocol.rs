//! WebSocket Protocol Messages
//!
//! Paths: `/pvs` lists every variable, `/pv/<address>` is one variable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pv::PutError;

/// Path listing every variable
pub const PVS_PATH: &str = "/pvs";

/// Prefix of single-variable paths
pub const PV_PATH_PREFIX: &str = "/pv/";

/// Path of a single variable
pub fn pv_path(address: &str) -> String {
    format!("{}{}", PV_PATH_PREFIX, address)
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Monitor paths (supports `*` and `**` wildcards)
    Subscribe {
        /// Request ID for correlation
        id: String,
        paths: Vec<String>,
    },

    Unsubscribe { id: String, paths: Vec<String> },

    /// Read `/pvs` or `/pv/<address>`
    Get { id: String, path: String },

    /// Write a value to `/pv/<address>`
    Put { id: String, path: String, data: Value },

    /// Keep-alive
    Ping { id: String },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Sent on initial connection
    Connected {
        session_id: String,
        server_version: String,
    },

    /// Response to a client request
    Response {
        id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Push notification for subscribed paths
    Change {
        path: String,
        change_type: ChangeType,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },

    /// Error not tied to a successful parse of a request
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        code: ErrorCode,
        message: String,
    },

    Pong { id: String },
}

/// Type of change for push notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// A variable was registered
    Created,
    /// A variable's value changed
    Updated,
}

/// Error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    NotFound,
    ReadOnly,
    ValidationFailed,
    PropagationFailed,
    InternalError,
}

impl From<&PutError> for ErrorCode {
    fn from(err: &PutError) -> Self {
        match err {
            PutError::NotFound(_) => ErrorCode::NotFound,
            PutError::ReadOnly(_) => ErrorCode::ReadOnly,
            PutError::Validation { .. } => ErrorCode::ValidationFailed,
            PutError::Propagation { .. } => ErrorCode::PropagationFailed,
        }
    }
}

impl ServerMessage {
    /// Create a success response
    pub fn success(id: impl Into<String>, data: Option<Value>) -> Self {
        Self::Response {
            id: id.into(),
            success: true,
            data,
            code: None,
            error: None,
        }
    }

    /// Create an error response
    pub fn error_response(id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Response {
            id: id.into(),
            success: false,
            data: None,
            code: Some(code),
            error: Some(message.into()),
        }
    }

    /// Create a change notification
    pub fn change(path: impl Into<String>, change_type: ChangeType, data: Option<Value>) -> Self {
        Self::Change {
            path: path.into(),
            change_type,
            data,
        }
    }

    pub fn connected(session_id: impl Into<String>) -> Self {
        Self::Connected {
            session_id: session_id.into(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong(id: impl Into<String>) -> Self {
        Self::Pong { id: id.into() }
    }
}
