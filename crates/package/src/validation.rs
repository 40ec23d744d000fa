//! Clean-room load check of the packaged entry module.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::PackageError;
use crate::toolchain::Toolchain;

/// Module that must load for the package to be deployable: the API module
/// when one is declared, otherwise the module part of the remote handler.
pub fn entry_module(api_module: Option<&str>, remote_handler: &str) -> String {
    match api_module {
        Some(module) if !module.is_empty() => module.to_string(),
        _ => remote_handler
            .rsplit_once('.')
            .map(|(module, _)| module)
            .unwrap_or(remote_handler)
            .to_string(),
    }
}

fn validation_message(entry: &str) -> String {
    format!("cannot require ./{entry} after clean installation. Check your dependencies.")
}

/// Loads `./<entry>` from `dir` in a separate process with `env` applied to
/// that process only.
///
/// Fails with [`PackageError::Validation`] if the process cannot be started
/// or the module does not load.
pub async fn validate_package(
    toolchain: &dyn Toolchain,
    dir: &Path,
    entry: &str,
    env: &BTreeMap<String, String>,
) -> Result<(), PackageError> {
    match toolchain.probe(dir, entry, env).await {
        Ok(result) if result.success => {
            debug!(entry, "package entry module loads");
            Ok(())
        }
        Ok(result) => {
            debug!(entry, stderr = %result.stderr.trim(), "package entry module failed to load");
            Err(PackageError::Validation(validation_message(entry)))
        }
        Err(e) => {
            debug!(entry, error = %e, "could not run package probe");
            Err(PackageError::Validation(validation_message(entry)))
        }
    }
}
