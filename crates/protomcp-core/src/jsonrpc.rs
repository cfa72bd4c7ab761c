//! JSON-RPC 2.0 framing: request/response/notification types, batch forms,
//! and the classify/encode/decode functions the transport layer calls.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};

/// The one JSON-RPC version this engine speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Zero-sized marker serializing/deserializing as the literal `"2.0"`.
///
/// Deserializing any other string is an [`Error::invalid_request`], matching
/// the teacher's `JsonRpcVersion` custom `Deserialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        if s == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version: {s}"
            )))
        }
    }
}

/// A JSON-RPC request id. Opaque to the engine beyond equality and hashing;
/// the sender alone guarantees uniqueness while the request is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// A numeric id.
    Number(i64),
    /// A string id.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// A JSON-RPC request: has both `id` and `method`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: RequestId,
}

impl Request {
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC notification: has `method`, never `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<&Error> for RpcError {
    fn from(e: &Error) -> Self {
        let code = e.kind.code().unwrap_or(crate::error::ErrorKind::internal_error());
        Self::new(code, e.message.clone())
    }
}

/// Result payload of a response: exactly one of `result`/`error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Success { result: Value },
    Error { error: RpcError },
}

/// A JSON-RPC response. `id` is `None` only for a parse-error reply, whose
/// request id could not be recovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: JsonRpcVersion,
    #[serde(flatten)]
    pub payload: ResponsePayload,
    pub id: Option<RequestId>,
}

impl Response {
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: ResponsePayload::Success { result },
            id: Some(id),
        }
    }

    #[must_use]
    pub fn error(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: ResponsePayload::Error { error },
            id,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error { .. })
    }
}

/// Any single JSON-RPC frame, classified by shape: presence of `id` and
/// `method` distinguishes the three forms (§4.1).
#[derive(Debug, Clone)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl Message {
    /// Classify a raw JSON value into one of the three message forms.
    ///
    /// A request has both `id` and `method`; a notification has `method`
    /// and no `id`; a response has `id` and neither `method` nor a missing
    /// `result`/`error` pair. Anything else is `InvalidRequest`.
    pub fn classify(value: Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_request("frame is not a JSON object"))?;

        let jsonrpc_ok = obj.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION);
        if !jsonrpc_ok {
            return Err(Error::invalid_request("missing or wrong jsonrpc tag"));
        }

        let has_method = obj.contains_key("method");
        let has_id = obj.contains_key("id");

        if has_method && has_id {
            let req: Request = serde_json::from_value(value)
                .map_err(|e| Error::invalid_request(format!("malformed request: {e}")))?;
            validate_id(&req.id)?;
            Ok(Self::Request(req))
        } else if has_method {
            let note: Notification = serde_json::from_value(value)
                .map_err(|e| Error::invalid_request(format!("malformed notification: {e}")))?;
            Ok(Self::Notification(note))
        } else if has_id {
            let resp: Response = serde_json::from_value(value)
                .map_err(|e| Error::invalid_request(format!("malformed response: {e}")))?;
            Ok(Self::Response(resp))
        } else {
            Err(Error::invalid_request(
                "frame has neither method nor id/result/error",
            ))
        }
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Request(r) => serde_json::to_value(r).expect("Request always serializes"),
            Self::Notification(n) => {
                serde_json::to_value(n).expect("Notification always serializes")
            }
            Self::Response(r) => serde_json::to_value(r).expect("Response always serializes"),
        }
    }
}

fn validate_id(id: &RequestId) -> Result<()> {
    // RequestId's untagged enum already rejects null/bool/object/array at
    // deserialize time; this exists as the single place that documents the
    // invariant from §3 ("never null; integer or string").
    match id {
        RequestId::Number(_) | RequestId::String(_) => Ok(()),
    }
}

/// Top-level JSON-RPC form: a lone frame or a batch (array) of frames.
#[derive(Debug, Clone)]
pub enum Frame {
    Single(Message),
    Batch(Vec<Message>),
}

/// Decode one line/payload of bytes into a [`Frame`].
///
/// Accepts both the single-object and batch-array top-level forms (§4.1a).
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| Error::parse(format!("invalid JSON: {e}")))?;
    match value {
        Value::Array(items) => {
            let messages = items
                .into_iter()
                .map(Message::classify)
                .collect::<Result<Vec<_>>>()?;
            Ok(Frame::Batch(messages))
        }
        other => Ok(Frame::Single(Message::classify(other)?)),
    }
}

/// Encode a [`Frame`] back to bytes (no trailing newline; transports add
/// their own framing).
pub fn encode(frame: Frame) -> Vec<u8> {
    let value = match frame {
        Frame::Single(m) => m.into_value(),
        Frame::Batch(ms) => Value::Array(ms.into_iter().map(Message::into_value).collect()),
    };
    serde_json::to_vec(&value).expect("Frame always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_request() {
        let v = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
        match Message::classify(v).unwrap() {
            Message::Request(r) => assert_eq!(r.method, "ping"),
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn classifies_notification() {
        let v = json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}});
        assert!(matches!(
            Message::classify(v).unwrap(),
            Message::Notification(_)
        ));
    }

    #[test]
    fn classifies_response() {
        let v = json!({"jsonrpc": "2.0", "id": "abc", "result": {}});
        match Message::classify(v).unwrap() {
            Message::Response(r) => assert!(!r.is_error()),
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn rejects_wrong_version() {
        let v = json!({"jsonrpc": "1.0", "id": 1, "method": "ping"});
        assert!(Message::classify(v).is_err());
    }

    #[test]
    fn rejects_null_id() {
        let v = json!({"jsonrpc": "2.0", "id": null, "method": "ping"});
        assert!(Message::classify(v).is_err());
    }

    #[test]
    fn string_and_integer_ids_coexist() {
        let a = RequestId::Number(1);
        let b = RequestId::String("1".into());
        assert_ne!(a, b);
    }

    #[test]
    fn round_trips_batch() {
        let bytes = br#"[{"jsonrpc":"2.0","id":1,"method":"ping"},{"jsonrpc":"2.0","method":"notifications/progress"}]"#;
        let frame = decode(bytes).unwrap();
        match &frame {
            Frame::Batch(items) => assert_eq!(items.len(), 2),
            Frame::Single(_) => panic!("expected batch"),
        }
        let back = encode(frame);
        let reparsed = decode(&back).unwrap();
        assert!(matches!(reparsed, Frame::Batch(items) if items.len() == 2));
    }

    #[test]
    fn encode_decode_identity_on_request() {
        let req = Request::new(RequestId::Number(7), "tools/list", None);
        let bytes = encode(Frame::Single(Message::Request(req.clone())));
        let back = decode(&bytes).unwrap();
        match back {
            Frame::Single(Message::Request(r)) => {
                assert_eq!(r.id, req.id);
                assert_eq!(r.method, req.method);
            }
            _ => panic!("expected single request"),
        }
    }
}
