//! Wire envelopes for the broker request channel
//!
//! Requests travel as one line of JSON shaped
//! `{"operation": <name>, "data": {…}}`, replies as
//! `{"code": <integer>, "data": <any>}`. Code 0 is success; the negative
//! codes distinguish the failure classes the client cares about.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operation succeeded; `data` holds its result.
pub const CODE_OK: i32 = 0;
/// Envelope could not be decoded, or no endpoint produced a reply.
pub const CODE_MALFORMED: i32 = -1;
/// The broker has no live connection to the coordination store.
pub const CODE_UNAVAILABLE: i32 = -2;
/// The operation itself failed; `data` holds a description.
pub const CODE_OP_FAILED: i32 = -3;

/// A request to the broker.
///
/// One variant per operation the data layer exposes, so an unknown operation
/// name is a decode error rather than a runtime dispatch miss.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "operation", content = "data", rename_all = "snake_case")]
pub enum Request {
    Create {
        name: String,
        modality: u32,
        password: String,
        players: Vec<String>,
    },
    Update {
        id: u64,
        version: u64,
        classification: String,
        password: String,
    },
    Delete {
        id: u64,
        password: String,
    },
    Get {
        id: u64,
    },
    // The no-field operations are empty struct variants, not unit
    // variants, so the canonical `"data": {}` envelope decodes.
    GetList {},
    /// Rebind the data layer's root path. Administrative.
    Setpath {
        path: String,
    },
    /// Report store-connection state and endpoint.
    Status {},
    /// No-op, used only to unblock a shutdown wait.
    Dummy {},
}

impl Request {
    /// Decode one raw envelope line. An absent or null `data` counts as an
    /// empty mapping, matching clients that omit it for operations with no
    /// fields.
    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        let mut value: Value = serde_json::from_str(raw)?;
        if let Value::Object(envelope) = &mut value {
            match envelope.get("data") {
                None | Some(Value::Null) => {
                    envelope.insert("data".to_string(), Value::Object(Default::default()));
                }
                _ => {}
            }
        }
        serde_json::from_value(value)
    }

    /// Operation name as it appears on the wire, for logging.
    pub fn operation(&self) -> &'static str {
        match self {
            Request::Create { .. } => "create",
            Request::Update { .. } => "update",
            Request::Delete { .. } => "delete",
            Request::Get { .. } => "get",
            Request::GetList {} => "get_list",
            Request::Setpath { .. } => "setpath",
            Request::Status {} => "status",
            Request::Dummy {} => "dummy",
        }
    }
}

/// A reply from the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub code: i32,
    pub data: Value,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            code: CODE_OK,
            data,
        }
    }

    pub fn error(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            data: Value::String(description.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}
