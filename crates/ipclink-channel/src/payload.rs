//! Payload shapes for the message catalog.
//!
//! The channel itself treats payloads as opaque bytes. These are the
//! shapes the UI and worker processes agree on, encoded as JSON.

use bytes::Bytes;
use ipclink_frame::Message;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Serialize a payload.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Deserialize the payload of `message`.
pub fn decode<T: DeserializeOwned>(message: &Message) -> Result<T> {
    Ok(serde_json::from_slice(message.payload_bytes())?)
}

/// `PageCreated`: a worker created a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCreated {
    pub page_id: u64,
    pub pid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollKind {
    DocResize,
    WinResize,
    Scroll,
}

/// `Scroll`: a page's scroll position or size changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scroll {
    pub h: i32,
    pub v: i32,
    pub page_id: u64,
    pub subtype: ScrollKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Verbose,
    Debug,
}

/// `Log`: a log record forwarded from a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    /// Originating function or log group.
    pub function: String,
    pub message: String,
}

/// `RequireModule`: load a scripting module in the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequireModule {
    pub name: String,
}

/// `Ipc`: a scripting signal passed through to the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptCall {
    pub signal: String,
    pub page_id: u64,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// `EvalJs` from the UI: evaluate a script in a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalJsRequest {
    pub page_id: u64,
    pub script: String,
    /// Source name shown in script errors.
    pub source: String,
    #[serde(default)]
    pub no_return: bool,
    /// Identifies the UI-side callback; echoed in the response.
    pub callback: u64,
}

/// `EvalJs` from a worker: outcome of an [`EvalJsRequest`].
///
/// Both `result` and `error` are absent when the page no longer exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalJsResponse {
    pub page_id: u64,
    pub callback: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use ipclink_frame::MessageType;
    use serde_json::json;

    use super::*;
    use crate::error::ChannelError;

    #[test]
    fn scroll_wire_shape() {
        let scroll = Scroll {
            h: 0,
            v: 120,
            page_id: 3,
            subtype: ScrollKind::WinResize,
        };
        let bytes = encode(&scroll).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({"h": 0, "v": 120, "page_id": 3, "subtype": "win_resize"})
        );
    }

    #[test]
    fn eval_response_omits_absent_fields() {
        let gone = EvalJsResponse {
            page_id: 9,
            callback: 4,
            result: None,
            error: None,
        };
        let bytes = encode(&gone).unwrap();
        assert_eq!(&bytes[..], br#"{"page_id":9,"callback":4}"#);

        let message = Message::new(MessageType::EvalJs, bytes);
        assert_eq!(decode::<EvalJsResponse>(&message).unwrap(), gone);
    }

    #[test]
    fn log_levels_order_by_severity() {
        assert!(LogLevel::Fatal < LogLevel::Error);
        assert!(LogLevel::Verbose < LogLevel::Debug);
        let record: LogRecord = serde_json::from_value(json!({
            "level": "warn",
            "function": "webview.new",
            "message": "no session",
        }))
        .unwrap();
        assert_eq!(record.level, LogLevel::Warn);
    }

    #[test]
    fn decode_of_empty_payload_fails() {
        let err = decode::<PageCreated>(&Message::empty(MessageType::PageCreated)).unwrap_err();
        assert!(matches!(err, ChannelError::Payload(_)));
    }

    #[test]
    fn script_call_args_default_to_empty() {
        let message = Message::new(MessageType::Ipc, r#"{"signal":"ping","page_id":1}"#);
        let call: ScriptCall = decode(&message).unwrap();
        assert!(call.args.is_empty());
    }
}
