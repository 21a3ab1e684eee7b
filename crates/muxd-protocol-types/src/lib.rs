//! Batch envelope definitions.
//!
//! One transport call carries a [`BatchRequest`]: an ordered list of
//! [`RequestEnvelope`]s. A successful batch answers with one [`ResultEntry`]
//! per request, in the same order. A failed batch answers with a single
//! [`ErrorDescriptor`] and no partial results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One logical request inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Caller-assigned identifier, echoed back unchanged.
    pub id: Value,
    /// Request type used for handler routing.
    #[serde(rename = "type")]
    pub request_type: String,
    /// Request arguments (`null` when omitted).
    #[serde(default)]
    pub args: Value,
}

impl RequestEnvelope {
    /// Create a request with an explicit id.
    pub fn new(id: impl Into<Value>, request_type: &str, args: Value) -> Self {
        Self {
            id: id.into(),
            request_type: request_type.to_string(),
            args,
        }
    }

    /// Create a request with an auto-generated id.
    pub fn with_generated_id(request_type: &str, args: Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), request_type, args)
    }
}

/// A request without an id, as issued by clients that correlate positionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Request type used for handler routing.
    #[serde(rename = "type")]
    pub request_type: String,
    /// Request arguments.
    #[serde(default)]
    pub args: Value,
}

impl Call {
    /// Create a call.
    pub fn new(request_type: &str, args: Value) -> Self {
        Self {
            request_type: request_type.to_string(),
            args,
        }
    }

    /// Attach an id, producing a full envelope.
    pub fn into_envelope(self, id: impl Into<Value>) -> RequestEnvelope {
        RequestEnvelope {
            id: id.into(),
            request_type: self.request_type,
            args: self.args,
        }
    }
}

/// Successful outcome of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Id of the request this result answers.
    pub id: Value,
    /// Handler result.
    pub payload: Value,
}

impl ResultEntry {
    pub fn new(id: Value, payload: Value) -> Self {
        Self { id, payload }
    }
}

/// Inbound batch envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Requests, processed strictly in this order.
    pub requests: Vec<RequestEnvelope>,
}

impl BatchRequest {
    /// Create a batch from envelopes.
    pub fn new(requests: Vec<RequestEnvelope>) -> Self {
        Self { requests }
    }

    /// Create a batch from id-less calls, assigning generated ids.
    pub fn from_calls(calls: Vec<Call>) -> Self {
        Self {
            requests: calls
                .into_iter()
                .map(|call| RequestEnvelope::with_generated_id(&call.request_type, call.args))
                .collect(),
        }
    }

    /// Number of requests in the batch.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Deserialize from raw bytes as read off the wire.
    ///
    /// Bytes that are not UTF-8 are a decode error like any other, so the
    /// caller can answer with [`ErrorDescriptor::malformed`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Failure category reported for a rejected batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A request type had neither a specific nor a default handler.
    UnknownHandler,
    /// Application handler code failed.
    HandlerError,
    /// Nested loopback calls went deeper than the configured limit.
    LoopbackDepthExceeded,
    /// The transport could not decode the batch envelope.
    MalformedBatch,
}

impl ErrorKind {
    /// Transport status code for this kind.
    ///
    /// `UnknownHandler` and `MalformedBatch` are client errors; everything
    /// else is a generic rejection. A malformed batch that was valid JSON
    /// carries `INVALID_REQUEST` instead, see [`ErrorDescriptor::malformed`].
    pub fn code(self) -> i32 {
        match self {
            Self::UnknownHandler => error_codes::METHOD_NOT_FOUND,
            Self::MalformedBatch => error_codes::PARSE_ERROR,
            Self::HandlerError | Self::LoopbackDepthExceeded => error_codes::INTERNAL_ERROR,
        }
    }

    /// Whether the caller is at fault.
    pub fn is_client_error(self) -> bool {
        matches!(self, Self::UnknownHandler | Self::MalformedBatch)
    }
}

/// Error information for a rejected batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Failure category.
    pub kind: ErrorKind,
    /// Status code derived from `kind`.
    pub code: i32,
    /// Human-readable detail.
    pub detail: String,
}

impl ErrorDescriptor {
    /// Create a descriptor; the code follows from the kind.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code(),
            detail: detail.into(),
        }
    }

    /// Descriptor for a batch envelope that failed to decode.
    ///
    /// Unreadable input (bad syntax, invalid UTF-8, truncation) is
    /// `PARSE_ERROR`; well-formed JSON of the wrong shape is
    /// `INVALID_REQUEST`.
    pub fn malformed(error: &serde_json::Error) -> Self {
        let code = match error.classify() {
            serde_json::error::Category::Data => error_codes::INVALID_REQUEST,
            _ => error_codes::PARSE_ERROR,
        };

        Self {
            kind: ErrorKind::MalformedBatch,
            code,
            detail: format!("Malformed batch: {error}"),
        }
    }
}

impl std::fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({}): {}", self.kind, self.code, self.detail)
    }
}

/// Outbound batch envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Ordered results (if the whole batch succeeded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ResultEntry>>,
    /// Error information (if the batch was rejected).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

impl BatchResponse {
    /// Create a successful response.
    pub fn success(results: Vec<ResultEntry>) -> Self {
        Self {
            results: Some(results),
            error: None,
        }
    }

    /// Create a rejection.
    pub fn error(descriptor: ErrorDescriptor) -> Self {
        Self {
            results: None,
            error: Some(descriptor),
        }
    }

    /// Check if the batch succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Split into results or the rejection descriptor.
    pub fn into_result(self) -> Result<Vec<ResultEntry>, ErrorDescriptor> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.results.unwrap_or_default()),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// Standard error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_uses_type_key() {
        let request = RequestEnvelope::new(1, "echo", json!("hi"));
        let json = serde_json::to_string(&request).unwrap();

        assert!(json.contains("\"type\":\"echo\""));
        assert!(json.contains("\"id\":1"));
        assert!(!json.contains("request_type"));
    }

    #[test]
    fn test_request_envelope_missing_args_is_null() {
        let request: RequestEnvelope =
            serde_json::from_str(r#"{"id":"a","type":"health"}"#).unwrap();

        assert_eq!(request.id, json!("a"));
        assert_eq!(request.request_type, "health");
        assert_eq!(request.args, Value::Null);
    }

    #[test]
    fn test_request_envelope_missing_type_is_rejected() {
        let result = serde_json::from_str::<RequestEnvelope>(r#"{"id":"a","args":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let first = RequestEnvelope::with_generated_id("health", Value::Null);
        let second = RequestEnvelope::with_generated_id("health", Value::Null);

        assert_ne!(first.id, second.id);
        assert!(first.id.is_string());
    }

    #[test]
    fn test_batch_from_calls_preserves_order() {
        let batch = BatchRequest::from_calls(vec![
            Call::new("kv.set", json!({"key": "a", "value": 1})),
            Call::new("kv.get", json!({"key": "a"})),
        ]);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.requests[0].request_type, "kv.set");
        assert_eq!(batch.requests[1].request_type, "kv.get");
        assert_ne!(batch.requests[0].id, batch.requests[1].id);
    }

    #[test]
    fn test_malformed_descriptor_codes() {
        let syntax = BatchRequest::from_slice(b"{\"requests\": [").unwrap_err();
        let utf8 = BatchRequest::from_slice(b"{\"requests\":[{\"id\":1,\"type\":\"e\xff\"}]}")
            .unwrap_err();
        let shape = BatchRequest::from_slice(br#"{"requests": 5}"#).unwrap_err();

        let syntax = ErrorDescriptor::malformed(&syntax);
        assert_eq!(syntax.kind, ErrorKind::MalformedBatch);
        assert_eq!(syntax.code, error_codes::PARSE_ERROR);
        assert!(syntax.detail.starts_with("Malformed batch: "));

        assert_eq!(ErrorDescriptor::malformed(&utf8).code, error_codes::PARSE_ERROR);
        assert_eq!(ErrorDescriptor::malformed(&shape).code, error_codes::INVALID_REQUEST);
    }

    #[test]
    fn test_batch_request_from_json_invalid() {
        assert!(BatchRequest::from_json("not json").is_err());
        assert!(BatchRequest::from_json(r#"{"requests":[{"id":1}]}"#).is_err());
        assert!(BatchRequest::from_json(r#"{"requests":[]}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_success_response_omits_error() {
        let response = BatchResponse::success(vec![ResultEntry::new(json!(1), json!("hi"))]);
        let json = response.to_json().unwrap();

        assert_eq!(json, r#"{"results":[{"id":1,"payload":"hi"}]}"#);
        assert!(response.is_success());
    }

    #[test]
    fn test_error_response_has_no_results() {
        let response = BatchResponse::error(ErrorDescriptor::new(
            ErrorKind::UnknownHandler,
            "missing",
        ));
        let json = response.to_json().unwrap();

        assert!(json.contains("\"kind\":\"unknown_handler\""));
        assert!(json.contains("\"code\":-32601"));
        assert!(!json.contains("\"results\""));
        assert!(!response.is_success());
    }

    #[test]
    fn test_into_result_splits_outcomes() {
        let ok = BatchResponse::success(vec![]);
        assert!(ok.into_result().unwrap().is_empty());

        let rejected =
            BatchResponse::error(ErrorDescriptor::new(ErrorKind::HandlerError, "boom"));
        let descriptor = rejected.into_result().unwrap_err();
        assert_eq!(descriptor.kind, ErrorKind::HandlerError);
        assert_eq!(descriptor.detail, "boom");
    }

    #[test]
    fn test_error_kind_status_mapping() {
        assert!(ErrorKind::UnknownHandler.is_client_error());
        assert!(ErrorKind::MalformedBatch.is_client_error());
        assert!(!ErrorKind::HandlerError.is_client_error());
        assert!(!ErrorKind::LoopbackDepthExceeded.is_client_error());

        assert_eq!(ErrorKind::UnknownHandler.code(), error_codes::METHOD_NOT_FOUND);
        assert_eq!(ErrorKind::MalformedBatch.code(), error_codes::PARSE_ERROR);
        assert_eq!(ErrorKind::HandlerError.code(), error_codes::INTERNAL_ERROR);
        assert_eq!(
            ErrorKind::LoopbackDepthExceeded.code(),
            error_codes::INTERNAL_ERROR
        );
    }

    #[test]
    fn test_error_kind_serialization() {
        let kinds = vec![
            (ErrorKind::UnknownHandler, "unknown_handler"),
            (ErrorKind::HandlerError, "handler_error"),
            (ErrorKind::LoopbackDepthExceeded, "loopback_depth_exceeded"),
            (ErrorKind::MalformedBatch, "malformed_batch"),
        ];

        for (kind, expected) in kinds {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", expected), "{:?}", kind);
        }
    }
}
