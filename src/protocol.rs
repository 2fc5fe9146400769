//! `postMessage` protocol between the side panel and the embedded frame.
//!
//! Both directions are closed tagged unions keyed by `type`. Target origin is
//! always `'*'` because the embedded origin is whatever the user bookmarked,
//! so every inbound payload is validated here before anything acts on it:
//! any page can post to either window.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Every message type of this protocol starts with this prefix
pub const MESSAGE_PREFIX: &str = "SIDEPANEL_";

/// Target origin for every post; the embedded origin is not known in advance
pub const TARGET_ORIGIN: &str = "*";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Navigation commands the host can relay into the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavCommand {
    Back,
    Forward,
    Refresh,
}

impl NavCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            NavCommand::Back => "back",
            NavCommand::Forward => "forward",
            NavCommand::Refresh => "refresh",
        }
    }
}

/// frame → host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FrameMessage {
    #[serde(rename = "SIDEPANEL_URL_CHANGE")]
    UrlChange {
        url: String,
        #[serde(default)]
        title: String,
        timestamp: f64,
    },

    #[serde(rename = "SIDEPANEL_NAVIGATION_STATE", rename_all = "camelCase")]
    NavigationState {
        can_go_back: bool,
        can_go_forward: bool,
    },

    #[serde(rename = "SIDEPANEL_NAVIGATION_RESULT", rename_all = "camelCase")]
    NavigationResult {
        request_id: String,
        success: bool,
        command: NavCommand,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// host → frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    #[serde(rename = "SIDEPANEL_ENABLE_TRACKING")]
    EnableTracking { enabled: bool },

    #[serde(rename = "SIDEPANEL_GET_NAVIGATION_STATE")]
    GetNavigationState,

    #[serde(rename = "SIDEPANEL_NAVIGATE", rename_all = "camelCase")]
    Navigate {
        command: NavCommand,
        request_id: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Not ours: some other script on the page posted it
    #[error("foreign message")]
    Foreign,

    #[error("unknown message type `{0}`")]
    UnknownType(String),

    #[error("malformed {kind}: {detail}")]
    Malformed { kind: String, detail: String },

    #[error("invalid field `{field}` in {kind}")]
    InvalidField { kind: &'static str, field: &'static str },
}

impl ProtocolError {
    /// Foreign traffic is expected and not worth a warning
    pub fn is_foreign(&self) -> bool {
        matches!(self, ProtocolError::Foreign)
    }
}

const FRAME_TYPES: [&str; 3] = [
    "SIDEPANEL_URL_CHANGE",
    "SIDEPANEL_NAVIGATION_STATE",
    "SIDEPANEL_NAVIGATION_RESULT",
];

const HOST_TYPES: [&str; 3] = [
    "SIDEPANEL_ENABLE_TRACKING",
    "SIDEPANEL_GET_NAVIGATION_STATE",
    "SIDEPANEL_NAVIGATE",
];

/// Read the `type` discriminator and reject anything outside our namespace
fn message_type<'a>(value: &'a Value, known: &[&str]) -> Result<&'a str, ProtocolError> {
    let kind = value
        .as_object()
        .and_then(|obj| obj.get("type"))
        .and_then(Value::as_str)
        .ok_or(ProtocolError::Foreign)?;

    if !kind.starts_with(MESSAGE_PREFIX) {
        return Err(ProtocolError::Foreign);
    }
    if !known.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_string()));
    }
    Ok(kind)
}

fn valid_request_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN
}

/// Validate a payload received by the host
pub fn decode_frame_message(value: Value) -> Result<FrameMessage, ProtocolError> {
    let kind = message_type(&value, &FRAME_TYPES)?.to_string();

    let message: FrameMessage =
        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
            kind,
            detail: e.to_string(),
        })?;

    match &message {
        FrameMessage::UrlChange { url, timestamp, .. } => {
            if Url::parse(url).is_err() {
                return Err(ProtocolError::InvalidField {
                    kind: "SIDEPANEL_URL_CHANGE",
                    field: "url",
                });
            }
            if !timestamp.is_finite() || *timestamp < 0.0 {
                return Err(ProtocolError::InvalidField {
                    kind: "SIDEPANEL_URL_CHANGE",
                    field: "timestamp",
                });
            }
        }
        FrameMessage::NavigationResult { request_id, .. } if !valid_request_id(request_id) => {
            return Err(ProtocolError::InvalidField {
                kind: "SIDEPANEL_NAVIGATION_RESULT",
                field: "requestId",
            });
        }
        _ => {}
    }

    Ok(message)
}

/// Validate a payload received by the frame bridge
pub fn decode_host_message(value: Value) -> Result<HostMessage, ProtocolError> {
    let kind = message_type(&value, &HOST_TYPES)?.to_string();

    let message: HostMessage =
        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
            kind,
            detail: e.to_string(),
        })?;

    if let HostMessage::Navigate { request_id, .. } = &message {
        if !valid_request_id(request_id) {
            return Err(ProtocolError::InvalidField {
                kind: "SIDEPANEL_NAVIGATE",
                field: "requestId",
            });
        }
    }

    Ok(message)
}
