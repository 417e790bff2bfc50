// Keypool — JSON-RPC 2.0 Protocol Types
//
// Envelope types for the socket server. Responses deserialize too, so a
// local client can read back what the server wrote.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// `complete` spent its whole retry budget.
pub const GATEWAY_FAILURE: i32 = -32010;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(format!("jsonrpc must be {:?}", JSONRPC_VERSION));
        }
        if self.method.is_empty() {
            return Err("method must not be empty".to_string());
        }
        Ok(())
    }

    /// Decode `params` into `T`. Absent params decode as `{}`, so a method
    /// whose params are all optional accepts a bare call.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, String> {
        let params = if self.params.is_null() {
            Value::Object(Default::default())
        } else {
            self.params.clone()
        };
        serde_json::from_value(params).map_err(|e| format!("Invalid params: {}", e))
    }
}

/// Exactly one of `result` / `error` is set.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn envelope(id: Value, result: Option<Value>, error: Option<JsonRpcError>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
            error,
            id,
        }
    }

    pub fn success(id: Value, result: Value) -> Self {
        Self::envelope(id, Some(result), None)
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        let error = JsonRpcError {
            code,
            message: message.into(),
            data: None,
        };
        Self::envelope(id, None, Some(error))
    }

    /// Unparseable input has no id to echo back.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::error(Value::Null, PARSE_ERROR, message)
    }

    /// Attach structured detail to an error response; no-op on success.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Some(err) = self.error.as_mut() {
            err.data = Some(data);
        }
        self
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
