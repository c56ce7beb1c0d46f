use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sdam::UpstreamError;
use thiserror::Error;
use tracing::warn;

use crate::{logging::category_access, registry::Document, selection::NotConfigured};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    NotConfigured(#[from] NotConfigured),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("local document {document} is corrupt: {reason}")]
    LocalStoreCorrupt { document: Document, reason: String },

    #[error("local document {document} could not be accessed: {reason}")]
    LocalStoreIo { document: Document, reason: String },
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        GatewayError::BadRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NotConfigured(_) => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Upstream(_)
            | GatewayError::LocalStoreCorrupt { .. }
            | GatewayError::LocalStoreIo { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Operators only ever see the status code.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let timed_out = matches!(&self, GatewayError::Upstream(err) if err.is_timeout());
        warn!(
            "{} request failed status={} timed_out={timed_out} err={self}",
            category_access(),
            status.as_u16()
        );
        status.into_response()
    }
}
