//! Errors surfaced to clients.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tickvault_core::TsError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error(transparent)]
    Engine(#[from] TsError),

    #[error("unknown action type: {0}")]
    UnknownAction(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("response of {size} bytes exceeds datagram limit of {limit} bytes")]
    ResponseTooLarge { size: usize, limit: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Engine(e) => e.code(),
            Self::UnknownAction(_) => "UNKNOWN_ACTION",
            Self::MalformedRequest(_) => "MALFORMED_REQUEST",
            Self::ResponseTooLarge { .. } => "RESPONSE_TOO_LARGE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.code(),
            message: self.to_string(),
        }
    }
}

/// Wire shape of a failed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl ErrorResponse {
    /// JSON bytes no longer than `limit`, shortening the message to fit.
    pub fn encode(mut self, limit: usize) -> Bytes {
        loop {
            let encoded = match serde_json::to_vec(&self) {
                Ok(encoded) => encoded,
                Err(_) => return Bytes::from_static(b"{\"error\":\"INTERNAL_ERROR\"}"),
            };
            if encoded.len() <= limit || self.message.is_empty() {
                return Bytes::from(encoded);
            }
            let mut cut = self.message.len().saturating_sub(encoded.len() - limit);
            while !self.message.is_char_boundary(cut) {
                cut -= 1;
            }
            self.message.truncate(cut);
        }
    }
}
