//! SignalR JSON hub protocol, version 1.
//!
//! Every record is a JSON object terminated by the ASCII record separator
//! (0x1E). A single WebSocket text frame may carry several records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub const RECORD_SEPARATOR: char = '\u{1e}';

const INVOCATION: u8 = 1;
const STREAM_ITEM: u8 = 2;
const COMPLETION: u8 = 3;
const STREAM_INVOCATION: u8 = 4;
const CANCEL_INVOCATION: u8 = 5;
const PING: u8 = 6;
const CLOSE: u8 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Streaming and cancellation frames; the client never starts streams.
    Unsupported(u8),
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allow_reconnect: Option<bool>,
}

impl HubFrame {
    pub fn invocation(invocation_id: Option<String>, target: &str, arguments: Vec<Value>) -> Self {
        HubFrame::Invocation { invocation_id, target: target.to_string(), arguments }
    }

    fn from_raw(raw: RawFrame) -> Result<Self> {
        Ok(match raw.kind {
            INVOCATION => HubFrame::Invocation {
                invocation_id: raw.invocation_id,
                target: raw
                    .target
                    .ok_or_else(|| Error::Protocol("invocation without target".into()))?,
                arguments: raw.arguments.unwrap_or_default(),
            },
            COMPLETION => HubFrame::Completion {
                invocation_id: raw
                    .invocation_id
                    .ok_or_else(|| Error::Protocol("completion without invocationId".into()))?,
                result: raw.result,
                error: raw.error,
            },
            PING => HubFrame::Ping,
            CLOSE => HubFrame::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect.unwrap_or(false),
            },
            kind @ (STREAM_ITEM | STREAM_INVOCATION | CANCEL_INVOCATION) => HubFrame::Unsupported(kind),
            other => return Err(Error::Protocol(format!("unknown message type {other}"))),
        })
    }

    fn to_raw(&self) -> RawFrame {
        match self {
            HubFrame::Invocation { invocation_id, target, arguments } => RawFrame {
                kind: INVOCATION,
                invocation_id: invocation_id.clone(),
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                ..Default::default()
            },
            HubFrame::Completion { invocation_id, result, error } => RawFrame {
                kind: COMPLETION,
                invocation_id: Some(invocation_id.clone()),
                result: result.clone(),
                error: error.clone(),
                ..Default::default()
            },
            HubFrame::Ping => RawFrame { kind: PING, ..Default::default() },
            HubFrame::Close { error, allow_reconnect } => RawFrame {
                kind: CLOSE,
                error: error.clone(),
                allow_reconnect: Some(*allow_reconnect),
                ..Default::default()
            },
            HubFrame::Unsupported(kind) => RawFrame { kind: *kind, ..Default::default() },
        }
    }

    /// Serialize as one record, separator included.
    pub fn encode(&self) -> Result<String> {
        let mut text = serde_json::to_string(&self.to_raw())?;
        text.push(RECORD_SEPARATOR);
        Ok(text)
    }
}

/// Split a text frame into records and parse each one.
pub fn decode(text: &str) -> Vec<Result<HubFrame>> {
    records(text)
        .map(|record| -> Result<HubFrame> {
            let raw: RawFrame = serde_json::from_str(record)?;
            HubFrame::from_raw(raw)
        })
        .collect()
}

fn records(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR).filter(|r| !r.trim().is_empty())
}

pub fn handshake_request() -> String {
    let mut text = serde_json::json!({ "protocol": "json", "version": 1 }).to_string();
    text.push(RECORD_SEPARATOR);
    text
}

/// Parse the first record of the server's handshake reply. Whatever follows
/// it in the same frame is returned untouched so it can be dispatched.
pub fn handshake_response(text: &str) -> Result<&str> {
    let (first, rest) = text
        .split_once(RECORD_SEPARATOR)
        .ok_or_else(|| Error::Handshake("incomplete handshake response".into()))?;
    let value: Value = serde_json::from_str(first)
        .map_err(|e| Error::Handshake(format!("unreadable handshake response: {e}")))?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(Error::Handshake(error.to_string()));
    }
    Ok(rest)
}
