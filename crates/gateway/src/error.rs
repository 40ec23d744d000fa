//! Gateway error types.

use funcdeploy_protocol::RemoteError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API {0} has no root resource")]
    MissingRoot(String),

    #[error("invalid route {path}: {detail}")]
    InvalidRoute { path: String, detail: String },
}
