// ABOUTME: JSON-RPC 2.0 message model for the stdio link to managed MCP processes
// Outbound requests, classified inbound frames, and the standard error codes

//! JSON-RPC 2.0 message types.
//!
//! Inbound frames are classified into a tagged [`JsonRpcMessage`] instead of
//! being inspected as loose maps: a frame is a response (success or error), a
//! request from the server, or a notification. Payloads (`params`, `result`,
//! `error.data`) stay opaque [`Value`]s.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Protocol version tag carried on every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

// === Request Id ===

/// Identifier correlating a request with its response.
///
/// Outbound ids are decimal strings. Inbound ids are compared by their string
/// form, so a server echoing `"7"` back as the number `7` still matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Build an id from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract an id from a raw JSON value (string or number).
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Borrow the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for RequestId {
    fn from(counter: u64) -> Self {
        Self(counter.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// === Outbound ===

/// Request written to a managed process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    /// Omitted from the wire when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

// === Inbound ===

/// Error object carried by an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Outcome half of a response: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Success(Value),
    Failure(RpcError),
}

/// Response received from a managed process.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    pub id: RequestId,
    pub outcome: ResponseOutcome,
}

impl JsonRpcResponse {
    /// Consume the response, yielding the result or the remote error.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.outcome {
            ResponseOutcome::Success(value) => Ok(value),
            ResponseOutcome::Failure(error) => Err(error),
        }
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// Answer to one of our requests.
    Response(JsonRpcResponse),
    /// Server-initiated request (has both `id` and `method`).
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    /// Server-initiated notification (no `id`).
    Notification {
        method: String,
        params: Option<Value>,
    },
}

/// Why a JSON object could not be classified as a JSON-RPC frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameShapeError {
    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has neither id nor method")]
    MissingId,
}

impl JsonRpcMessage {
    /// Classify a parsed JSON frame.
    ///
    /// Any frame with an `id` and no `method` is a response, so a pending
    /// caller is always resolved:
    /// - a non-null `error` member wins over `result` when both are present
    /// - an `error` that is not a `{code, message}` object becomes an
    ///   `INTERNAL_ERROR` carrying the raw error text
    /// - a frame with neither member succeeds with an empty object
    pub fn classify(frame: Value) -> Result<Self, FrameShapeError> {
        let Value::Object(mut map) = frame else {
            return Err(FrameShapeError::NotAnObject);
        };

        let id = map.get("id").and_then(RequestId::from_json);
        let method = match map.remove("method") {
            Some(Value::String(method)) => Some(method),
            _ => None,
        };
        let params = map.remove("params");

        match (id, method) {
            (Some(id), Some(method)) => Ok(Self::Request { id, method, params }),
            (None, Some(method)) => Ok(Self::Notification { method, params }),
            (None, None) => Err(FrameShapeError::MissingId),
            (Some(id), None) => {
                let error = map.remove("error").filter(|error| !error.is_null());
                let outcome = match (error, map.remove("result")) {
                    (Some(error), _) => ResponseOutcome::Failure(RpcError::from_raw(error)),
                    (None, Some(result)) => ResponseOutcome::Success(result),
                    (None, None) => ResponseOutcome::Success(Value::Object(Map::new())),
                };
                Ok(Self::Response(JsonRpcResponse { id, outcome }))
            }
        }
    }
}

impl RpcError {
    /// Parse an `error` member, falling back to an internal error for
    /// anything that is not a well-formed error object.
    fn from_raw(raw: Value) -> Self {
        if let Ok(error) = serde_json::from_value::<Self>(raw.clone()) {
            return error;
        }

        let message = match &raw {
            Value::String(text) => text.clone(),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| raw.to_string(), String::from),
            other => other.to_string(),
        };
        Self {
            code: error_codes::INTERNAL_ERROR,
            message,
            data: Some(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization_omits_absent_params() {
        let request = JsonRpcRequest::new(RequestId::from(1), "tools/list", None);
        let line = serde_json::to_string(&request).unwrap();

        assert_eq!(line, r#"{"jsonrpc":"2.0","id":"1","method":"tools/list"}"#);
    }

    #[test]
    fn test_request_serialization_with_params() {
        let request = JsonRpcRequest::new(
            RequestId::from(12),
            "tools/call",
            Some(json!({"name": "echo", "arguments": {"value": "hi"}})),
        );
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["id"], json!("12"));
        assert_eq!(value["params"]["arguments"]["value"], json!("hi"));
    }

    #[test]
    fn test_request_id_from_json_number_matches_string() {
        let from_number = RequestId::from_json(&json!(7)).unwrap();
        let from_string = RequestId::from_json(&json!("7")).unwrap();

        assert_eq!(from_number, from_string);
        assert!(RequestId::from_json(&json!(null)).is_none());
        assert!(RequestId::from_json(&json!({"id": 1})).is_none());
    }

    #[test]
    fn test_classify_success_response() {
        let frame = json!({"jsonrpc": "2.0", "id": "3", "result": {"tools": []}});
        let message = JsonRpcMessage::classify(frame).unwrap();

        assert_eq!(
            message,
            JsonRpcMessage::Response(JsonRpcResponse {
                id: RequestId::new("3"),
                outcome: ResponseOutcome::Success(json!({"tools": []})),
            })
        );
    }

    #[test]
    fn test_classify_null_result_is_success() {
        let frame = json!({"jsonrpc": "2.0", "id": "4", "result": null});
        let JsonRpcMessage::Response(response) = JsonRpcMessage::classify(frame).unwrap() else {
            panic!("expected response");
        };

        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_classify_error_response() {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": 9,
            "error": {"code": -32601, "message": "Method not found", "data": {"m": "x"}}
        });
        let JsonRpcMessage::Response(response) = JsonRpcMessage::classify(frame).unwrap() else {
            panic!("expected response");
        };

        assert!(matches!(response.outcome, ResponseOutcome::Failure(_)));
        assert_eq!(response.id.as_str(), "9");
        let error = response.into_result().unwrap_err();
        assert_eq!(error.code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(error.data, Some(json!({"m": "x"})));
    }

    #[test]
    fn test_classify_notification_and_server_request() {
        let notification = json!({"jsonrpc": "2.0", "method": "notifications/progress"});
        assert!(matches!(
            JsonRpcMessage::classify(notification).unwrap(),
            JsonRpcMessage::Notification { ref method, params: None } if method == "notifications/progress"
        ));

        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "roots/list"});
        assert!(matches!(
            JsonRpcMessage::classify(request).unwrap(),
            JsonRpcMessage::Request { .. }
        ));
    }

    #[test]
    fn test_classify_rejects_unroutable_frames() {
        assert_eq!(
            JsonRpcMessage::classify(json!([1, 2])),
            Err(FrameShapeError::NotAnObject)
        );
        assert_eq!(
            JsonRpcMessage::classify(json!({"jsonrpc": "2.0"})),
            Err(FrameShapeError::MissingId)
        );
        assert_eq!(
            FrameShapeError::MissingId.to_string(),
            "frame has neither id nor method"
        );
    }

    #[test]
    fn test_classify_string_error_is_internal_error() {
        let frame = json!({"jsonrpc": "2.0", "id": "1", "error": "boom"});
        let JsonRpcMessage::Response(response) = JsonRpcMessage::classify(frame).unwrap() else {
            panic!("expected response");
        };

        let error = response.into_result().unwrap_err();
        assert_eq!(error.code, error_codes::INTERNAL_ERROR);
        assert_eq!(error.message, "boom");
        assert_eq!(error.data, Some(json!("boom")));
    }

    #[test]
    fn test_classify_error_object_without_code() {
        let frame = json!({"id": "2", "error": {"message": "bad input"}});
        let JsonRpcMessage::Response(response) = JsonRpcMessage::classify(frame).unwrap() else {
            panic!("expected response");
        };

        let error = response.into_result().unwrap_err();
        assert_eq!(error.code, error_codes::INTERNAL_ERROR);
        assert_eq!(error.message, "bad input");
    }

    #[test]
    fn test_classify_null_error_is_ignored() {
        let frame = json!({"jsonrpc": "2.0", "id": "4", "result": [1], "error": null});
        let JsonRpcMessage::Response(response) = JsonRpcMessage::classify(frame).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(response.outcome, ResponseOutcome::Success(json!([1])));
    }

    #[test]
    fn test_classify_response_without_payload_is_empty_success() {
        let frame = json!({"jsonrpc": "2.0", "id": "1"});
        let JsonRpcMessage::Response(response) = JsonRpcMessage::classify(frame).unwrap() else {
            panic!("expected response");
        };

        assert_eq!(response.into_result().unwrap(), json!({}));
    }
}
