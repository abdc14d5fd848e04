//! Error types for the `hub` layer.
use std::error::Error as StdError;
use std::fmt;

/// Errors raised inside the hub while decoding, encoding or delivering envelopes.
///
/// These never escape the hub's event entry points (`on_connect`, `on_message`, `on_close`,
/// `on_error`): they are logged and the affected unit of work is dropped. Handle
/// implementations return them from `send` so the hub can report a failed delivery.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: HubErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum HubErrorKind {
    /// Inbound data that could not be parsed as structured JSON.
    MalformedPayload,
    /// An outbound envelope could not be serialized.
    Serialization,
    /// The peer's transport is closed or no longer accepting writes.
    PeerUnavailable,
}

impl Error {
    pub fn peer_unavailable() -> Self {
        Error {
            source: None,
            error_kind: HubErrorKind::PeerUnavailable,
        }
    }

    pub fn malformed_payload(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: HubErrorKind::MalformedPayload,
        }
    }

    pub fn serialization(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: HubErrorKind::Serialization,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Hub Error: {:?}: {source}", self.error_kind),
            None => write!(f, "Hub Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}
