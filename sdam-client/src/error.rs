use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The manager answered with anything other than exactly 200.
    #[error("upstream {url} returned status {status_code}")]
    Status { status_code: u16, url: String },

    #[error("upstream {url} unavailable: {reason}")]
    Unavailable {
        url: String,
        reason: String,
        timed_out: bool,
    },

    #[error("upstream {url} returned an unreadable payload: {reason}")]
    Decode { url: String, reason: String },

    #[error("http client could not be built: {reason}")]
    Client { reason: String },

    #[error("invalid upstream address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
}

impl UpstreamError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, UpstreamError::Unavailable { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Unavailable { timed_out: true, .. })
    }
}
