use std::borrow::Cow;
use std::fmt;

/// Kind of a protocol message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Create,
    Retrieve,
    Update,
    Delete,
    /// Any kind this agent does not know
    Unknown,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Create => "CREATE",
            MessageKind::Retrieve => "RETRIEVE",
            MessageKind::Update => "UPDATE",
            MessageKind::Delete => "DELETE",
            MessageKind::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Inbound CRUD request
///
/// The dispatcher takes requests by value; their strings move into the
/// response, so a handled request cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMessage {
    pub kind: MessageKind,
    /// Opaque token echoed back in the response
    pub transaction_uuid: String,
    pub source: String,
    /// Routing target, matched against the endpoint table
    pub dest: String,
    pub path: String,
    pub payload: Option<Vec<u8>>,
}

impl RequestMessage {
    pub fn new(
        kind: MessageKind,
        transaction_uuid: impl Into<String>,
        source: impl Into<String>,
        dest: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            transaction_uuid: transaction_uuid.into(),
            source: source.into(),
            dest: dest.into(),
            path: String::new(),
            payload: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Response status; only these two values are ever produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    Success,
    #[default]
    Failed,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Success => 200,
            Status::Failed => 400,
        }
    }
}

/// Outbound response, routed back to the requester
///
/// A payload, when present, is owned by the response and released when the
/// response is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    pub kind: MessageKind,
    pub transaction_uuid: String,
    pub source: String,
    pub dest: String,
    pub path: String,
    pub payload: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub status: Status,
}

impl ResponseMessage {
    /// Failed reply with source and destination swapped relative to the request
    pub(crate) fn reply(
        kind: MessageKind,
        transaction_uuid: String,
        request_source: String,
        request_dest: String,
        path: String,
    ) -> Self {
        Self {
            kind,
            transaction_uuid,
            source: request_dest,
            dest: request_source,
            path,
            payload: None,
            content_type: None,
            status: Status::Failed,
        }
    }

    /// Payload as text, if any
    pub fn payload_text(&self) -> Option<Cow<'_, str>> {
        self.payload.as_deref().map(String::from_utf8_lossy)
    }
}
