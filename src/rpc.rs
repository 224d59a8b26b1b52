//! JSON-RPC 2.0 wire types spoken by the PLC web server.
//!
//! A request body is always an array of [`ApiRequest`] objects and the
//! device answers with an array of [`ApiResponse`] entries, one per call,
//! tagged by correlation id.
//!
//! ```text
//! [{"jsonrpc":"2.0","method":"PlcProgram.Read","params":{"var":"\"DB\".x"},"id":"aZ3k9QpL"}]
//! [{"jsonrpc":"2.0","id":"aZ3k9QpL","result":42}]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version tag carried by every call.
pub const JSONRPC_VERSION: &str = "2.0";

/// One logical remote invocation.
///
/// Requests are immutable once built. Null-valued parameters are dropped at
/// construction, so the serialized form measured by the planner is exactly
/// the form sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiRequest {
    jsonrpc: String,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Map<String, Value>>,
    id: String,
}

impl ApiRequest {
    /// Build a call without a correlation id.
    ///
    /// The id is filled in by [`crate::bulk::IdGenerator::assign_unique_ids`].
    pub fn new(method: impl Into<String>, params: Option<Map<String, Value>>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: strip_nulls(params),
            id: String::new(),
        }
    }

    /// Build a call from a JSON object value. Non-object values carry no
    /// parameters.
    pub fn with_params(method: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => Some(map),
            _ => None,
        };
        Self::new(method, params)
    }

    /// Return a copy of this call carrying `id`.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn jsonrpc(&self) -> &str {
        &self.jsonrpc
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn params(&self) -> Option<&Map<String, Value>> {
        self.params.as_ref()
    }

    /// Whether a correlation id has been assigned.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }
}

fn strip_nulls(params: Option<Map<String, Value>>) -> Option<Map<String, Value>> {
    let mut map = params?;
    map.retain(|_, value| !value.is_null());
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

/// Structured error reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiError {
    /// Classify this error through the device error table.
    pub fn kind(&self) -> ApiErrorKind {
        ApiErrorKind::from_code(self.code)
    }
}

/// One entry of a device reply array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Correlation id echoed by the device. Absent when the device could not
    /// attribute the entry to a call.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ApiResponse {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id.into()),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<String>, error: ApiError) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Device error classes, keyed by numeric code.
///
/// The bulk engine treats faults opaquely; this table is for the typed layer
/// above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    PermissionDenied,
    SystemBusy,
    LoginFailed,
    AlreadyAuthenticated,
    PasswordExpired,
    AddressDoesNotExist,
    InvalidAddress,
    InvalidArrayIndex,
    UnsupportedAddress,
    /// Any code the table does not know.
    Other(i64),
}

impl ApiErrorKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            -32700 => ApiErrorKind::ParseError,
            -32600 => ApiErrorKind::InvalidRequest,
            -32601 => ApiErrorKind::MethodNotFound,
            -32602 => ApiErrorKind::InvalidParams,
            2 => ApiErrorKind::PermissionDenied,
            3 => ApiErrorKind::SystemBusy,
            100 => ApiErrorKind::LoginFailed,
            101 => ApiErrorKind::AlreadyAuthenticated,
            102 => ApiErrorKind::PasswordExpired,
            200 => ApiErrorKind::AddressDoesNotExist,
            201 => ApiErrorKind::InvalidAddress,
            203 => ApiErrorKind::InvalidArrayIndex,
            204 => ApiErrorKind::UnsupportedAddress,
            other => ApiErrorKind::Other(other),
        }
    }

    /// Short human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorKind::ParseError => "parse error",
            ApiErrorKind::InvalidRequest => "invalid request",
            ApiErrorKind::MethodNotFound => "method not found",
            ApiErrorKind::InvalidParams => "invalid params",
            ApiErrorKind::PermissionDenied => "permission denied",
            ApiErrorKind::SystemBusy => "system is busy",
            ApiErrorKind::LoginFailed => "login failed",
            ApiErrorKind::AlreadyAuthenticated => "already authenticated",
            ApiErrorKind::PasswordExpired => "password expired",
            ApiErrorKind::AddressDoesNotExist => "address does not exist",
            ApiErrorKind::InvalidAddress => "invalid address",
            ApiErrorKind::InvalidArrayIndex => "invalid array index",
            ApiErrorKind::UnsupportedAddress => "unsupported address",
            ApiErrorKind::Other(_) => "unknown error",
        }
    }
}
