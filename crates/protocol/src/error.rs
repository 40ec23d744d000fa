//! Normalized remote error taxonomy.
//!
//! Collaborators surface failures with inconsistent shapes: some carry a
//! machine-readable code, some only a message. Every remote failure is
//! folded into a [`RemoteError`] whose [`RemoteErrorKind`] drives retry and
//! reporting, while the raw `code` is preserved for callers.

use serde::{Deserialize, Serialize};

/// Classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The addressed function, alias, API or stage does not exist.
    NotFound,
    /// The platform rate-limited the call; safe to retry the same request.
    Throttling,
    /// The resource already exists or is being modified concurrently.
    Conflict,
    /// Anything else, passed through untouched.
    Other,
}

/// Error returned by any remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    /// Raw code as reported by the collaborator (e.g. `NotFoundException`).
    pub code: String,
    pub message: String,
}

impl RemoteError {
    /// Builds an error from a raw collaborator code, deriving its kind.
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            kind: classify(&code),
            code,
            message: message.into(),
        }
    }

    /// Builds an error from a collaborator that only reports a message.
    ///
    /// The message itself is classified, so `"Rate exceeded"` still becomes
    /// a throttling error.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify(&message);
        let code = match kind {
            RemoteErrorKind::NotFound => "NotFound",
            RemoteErrorKind::Throttling => "Throttling",
            RemoteErrorKind::Conflict => "Conflict",
            RemoteErrorKind::Other => "Unknown",
        };
        Self {
            kind,
            code: code.to_string(),
            message,
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::NotFound,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn throttled(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Throttling,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_throttling(&self) -> bool {
        self.kind == RemoteErrorKind::Throttling
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }
}

fn classify(raw: &str) -> RemoteErrorKind {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("notfound") || lower.contains("not found") || lower.contains("nosuch") {
        RemoteErrorKind::NotFound
    } else if lower.contains("toomanyrequests")
        || lower.contains("throttl")
        || lower.contains("rate exceeded")
        || lower.contains("slowdown")
    {
        RemoteErrorKind::Throttling
    } else if lower.contains("conflict") || lower.contains("alreadyexists") {
        RemoteErrorKind::Conflict
    } else {
        RemoteErrorKind::Other
    }
}
