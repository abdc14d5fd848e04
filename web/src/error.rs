use std::error::Error as StdError;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use log::debug;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors surfaced to HTTP clients by the web layer.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: WebErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum WebErrorKind {
    /// A plain HTTP request reached the relay socket path.
    UpgradeRequired,
}

impl Error {
    pub fn upgrade_required(rejection: WebSocketUpgradeRejection) -> Self {
        Self {
            source: Some(Box::new(rejection)),
            error_kind: WebErrorKind::UpgradeRequired,
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

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.error_kind {
            WebErrorKind::UpgradeRequired => {
                if let Some(source) = &self.source {
                    debug!("Rejected non-upgrade request to socket path: {source}");
                }
                (
                    StatusCode::UPGRADE_REQUIRED,
                    [(header::UPGRADE, "websocket")],
                    "Expected WebSocket upgrade",
                )
                    .into_response()
            }
        }
    }
}
