use serde::{Deserialize, Serialize};

use super::dispatcher::Handled;
use super::message::{MessageKind, RequestMessage};

/// JSON newline-delimited request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequest {
    /// `create`, `retrieve`, `update` or `delete`; anything else is unknown
    pub kind: String,
    pub transaction_uuid: String,
    pub source: String,
    pub dest: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// JSON newline-delimited response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    pub kind: String,
    pub transaction_uuid: String,
    pub source: String,
    pub dest: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireResponse {
    /// 400 reply to a line that is not a valid request
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Unknown.to_string().to_lowercase(),
            transaction_uuid: String::new(),
            source: String::new(),
            dest: String::new(),
            path: String::new(),
            status: 400,
            content_type: None,
            payload: None,
            error: Some(message.into()),
        }
    }
}

pub fn parse_kind(kind: &str) -> MessageKind {
    match kind.to_ascii_lowercase().as_str() {
        "create" => MessageKind::Create,
        "retrieve" => MessageKind::Retrieve,
        "update" => MessageKind::Update,
        "delete" => MessageKind::Delete,
        _ => MessageKind::Unknown,
    }
}

impl From<WireRequest> for RequestMessage {
    fn from(wire: WireRequest) -> Self {
        let request = RequestMessage::new(
            parse_kind(&wire.kind),
            wire.transaction_uuid,
            wire.source,
            wire.dest,
        )
        .with_path(wire.path);

        match wire.payload {
            Some(payload) => request.with_payload(payload),
            None => request,
        }
    }
}

impl From<Handled> for WireResponse {
    fn from(handled: Handled) -> Self {
        let response = handled.response;
        let payload = response.payload_text().map(|text| text.into_owned());

        Self {
            kind: response.kind.to_string().to_lowercase(),
            transaction_uuid: response.transaction_uuid,
            source: response.source,
            dest: response.dest,
            path: response.path,
            status: response.status.code(),
            content_type: response.content_type,
            payload,
            error: handled.error.map(|e| e.to_string()),
        }
    }
}
