//! Deploy error types.

use funcdeploy_gateway::GatewayError;
use funcdeploy_package::PackageError;
use funcdeploy_protocol::{ConfigError, RemoteError, RemoteErrorKind};

/// Errors produced by a deployment run.
///
/// Precondition failures display only their message, so callers can show
/// them to users verbatim.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Missing or invalid configuration, or conflicting options.
    #[error("{0}")]
    Configuration(String),

    /// The packaged entry module does not load.
    #[error("{0}")]
    Validation(String),

    /// An environment variable source could not be parsed.
    #[error("{0}")]
    EnvParsing(String),

    #[error("{0}")]
    Remote(#[from] RemoteError),

    #[error("packaging failed: {0}")]
    Package(PackageError),

    #[error("gateway update failed: {0}")]
    Gateway(GatewayError),

    #[error("post-deploy hook failed: {0}")]
    Hook(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    /// Kind of the underlying remote failure, if this is one.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Whether the run failed before changing anything on the platform.
    ///
    /// Validation counts: it follows read-only lookups but precedes every
    /// mutation.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Validation(_) | Self::EnvParsing(_)
        )
    }
}

impl From<ConfigError> for DeployError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<PackageError> for DeployError {
    fn from(e: PackageError) -> Self {
        match e {
            PackageError::SourceIsTempDir => {
                Self::Configuration(PackageError::SourceIsTempDir.to_string())
            }
            PackageError::Validation(message) => Self::Validation(message),
            other => Self::Package(other),
        }
    }
}

impl From<GatewayError> for DeployError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Remote(remote) => Self::Remote(remote),
            other => Self::Gateway(other),
        }
    }
}
