//! Errors raised by the billing client.

use thiserror::Error;

/// Upstream error bodies longer than this are truncated.
pub const MAX_ERROR_BODY_CHARS: usize = 1024;

/// Terminal failure of a billing API call.
#[derive(Debug, Error)]
pub enum BillingError {
    /// The API answered with a non-success status
    #[error("Billing API error {status}: {body}")]
    Status { status: u16, body: String },

    /// An attempt did not complete within its timeout
    #[error("Billing API request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The request could not be sent or the connection failed
    #[error("Billing API transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// A success response carried a body that could not be decoded
    #[error("Billing API returned an undecodable body: {0}")]
    Decode(#[source] reqwest::Error),

    /// No access token is configured
    #[error("Billing API access token is not configured")]
    MissingAccessToken,

    /// A header name or value was rejected
    #[error("Invalid billing API header: {0}")]
    InvalidHeader(String),

    /// A resource id that cannot be used as a path segment
    #[error("Invalid billing resource id: {0:?}")]
    InvalidId(String),

    /// A request payload that could not be serialized
    #[error("Invalid billing request body: {0}")]
    InvalidBody(String),
}

impl BillingError {
    pub(crate) fn status(status: u16, body: String) -> Self {
        BillingError::Status {
            status,
            body: truncate(body),
        }
    }

    /// HTTP status returned by the API, if the failure was a status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BillingError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the API was never reached with a complete exchange.
    pub fn is_transport(&self) -> bool {
        matches!(self, BillingError::Timeout { .. } | BillingError::Transport(_))
    }
}

fn truncate(mut body: String) -> String {
    if let Some((index, _)) = body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        body.truncate(index);
        body.push('…');
    }
    body
}
