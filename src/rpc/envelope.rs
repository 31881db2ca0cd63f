//! JSON-RPC envelope and response types.
//!
//! Requests always carry keyword params and the protocol version `"2.0"`:
//!
//! ```text
//! {"method": "getPosition", "params": {}, "jsonrpc": "2.0", "id": 0}
//! ```
//!
//! Responses carry either `result` or `error`. Error data produced by the
//! simulation side is usually an exception record:
//!
//! ```text
//! {"error": {"message": "...", "data": {"ClassName": "...", "Message": "...", "StackTraceString": "..."}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-RPC protocol version sent with every call.
pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound call envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub method: String,
    pub params: Map<String, Value>,
    pub jsonrpc: String,
    pub id: u64,
}

impl Envelope {
    pub fn new(method: impl Into<String>, params: Map<String, Value>, id: u64) -> Self {
        Self {
            method: method.into(),
            params,
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
        }
    }
}

/// Inbound response body.
///
/// Any JSON object parses. `error` stays raw so that an error member of an
/// unexpected shape is still seen as an error; see [`RpcErrorBody`] for the
/// usual shape. `id` is accepted but not checked against the request; calls
/// are strictly one at a time per client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

/// The `error` member of a response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcErrorBody {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Exception details reported by the simulation in `error.data`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteException {
    #[serde(rename = "ClassName", default)]
    pub class_name: Option<String>,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "StackTraceString", default)]
    pub stack_trace: Option<String>,
}

impl RemoteException {
    /// Stack trace with escaped `\n` sequences expanded to real newlines.
    pub fn stack_trace_text(&self) -> Option<String> {
        self.stack_trace.as_ref().map(|s| s.replace("\\n", "\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let mut params = Map::new();
        params.insert("message".to_string(), json!("hello"));
        let envelope = Envelope::new("say", params, 7);

        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"method": "say", "params": {"message": "hello"}, "jsonrpc": "2.0", "id": 7})
        );
    }

    #[test]
    fn test_response_result_and_null() {
        let response: RpcResponse = serde_json::from_str(r#"{"result": {"x": 1.0}, "id": 3}"#).unwrap();
        assert_eq!(response.result, Some(json!({"x": 1.0})));
        assert!(response.error.is_none());

        let response: RpcResponse = serde_json::from_str(r#"{"result": null}"#).unwrap();
        assert!(response.result.is_none());

        let response: RpcResponse = serde_json::from_str(r#"{"jsonrpc": "2.0"}"#).unwrap();
        assert!(response.result.is_none() && response.error.is_none());
    }

    #[test]
    fn test_response_error_with_exception_data() {
        let body = r#"{"error": {"message": "Internal error", "data": {
            "ClassName": "System.NullReferenceException",
            "Message": "boom",
            "StackTraceString": "at Foo()\\nat Bar()"}}}"#;
        let response: RpcResponse = serde_json::from_str(body).unwrap();
        let error: RpcErrorBody = serde_json::from_value(response.error.unwrap()).unwrap();
        assert_eq!(error.message.as_deref(), Some("Internal error"));

        let exception: RemoteException = serde_json::from_value(error.data.unwrap()).unwrap();
        assert_eq!(exception.message.as_deref(), Some("boom"));
        assert_eq!(
            exception.class_name.as_deref(),
            Some("System.NullReferenceException")
        );
        assert_eq!(exception.stack_trace_text().unwrap(), "at Foo()\nat Bar()");
    }

    #[test]
    fn test_response_keeps_error_of_any_shape() {
        let response: RpcResponse =
            serde_json::from_str(r#"{"error": {"code": "E_INTERNAL", "message": "x"}}"#).unwrap();
        let error: RpcErrorBody = serde_json::from_value(response.error.unwrap()).unwrap();
        assert_eq!(error.code, Some(json!("E_INTERNAL")));

        let response: RpcResponse = serde_json::from_str(r#"{"error": "boom"}"#).unwrap();
        assert_eq!(response.error, Some(json!("boom")));
    }
}
