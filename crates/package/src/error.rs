//! Packaging error types.

/// Errors produced while building, validating or archiving a package.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(
        "Source directory is the system temp directory. Cowardly refusing to fill up disk with recursive copy."
    )]
    SourceIsTempDir,

    /// The packaged entry module could not be loaded in a clean process.
    #[error("{0}")]
    Validation(String),

    #[error("dependency installation failed: {0}")]
    Install(String),

    #[error("toolchain error: {0}")]
    Toolchain(String),

    #[error("invalid manifest {file}: {detail}")]
    Manifest { file: String, detail: String },

    #[error("API module error: {0}")]
    Module(String),
}
