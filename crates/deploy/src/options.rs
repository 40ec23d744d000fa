//! Per-call options of a deployment run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use funcdeploy_protocol::CONFIG_FILE_NAME;

use crate::error::DeployError;

/// Alias used when the caller names none.
pub const DEFAULT_ALIAS: &str = "latest";

/// Options accepted by [`DeployOrchestrator::update`](crate::DeployOrchestrator::update).
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOptions {
    /// Project directory. Defaults to the current directory.
    pub source: PathBuf,
    /// Explicit configuration file; defaults to `<source>/funcdeploy.json`.
    pub config: Option<PathBuf>,
    /// Alias to point at the new version.
    pub version: Option<String>,
    /// Leave the archive on disk and report its path.
    pub keep: bool,
    pub use_local_dependencies: bool,
    /// `false` strips dependencies flagged optional from the package.
    pub optional_dependencies: bool,
    /// Stage the archive in this bucket before updating the code.
    pub use_s3_bucket: Option<String>,
    /// `K=V,K2=V2` replacing the function's environment.
    pub set_env: Option<String>,
    /// JSON file with a flat string map replacing the function's environment.
    pub set_env_from_json: Option<PathBuf>,
    /// `K=V` pairs merged into the existing environment.
    pub update_env: Option<String>,
    /// Stage variable storing the gateway configuration digest.
    pub cache_api_config: Option<String>,
    /// Extra stage variables written with each gateway deployment. They are
    /// part of the configuration digest.
    pub stage_variables: BTreeMap<String, String>,
    /// Where working directories and archives are created. Defaults to the
    /// system temp directory.
    pub work_root: Option<PathBuf>,
    /// Passed unchanged to the post-deploy hook.
    pub post_deploy_options: serde_json::Map<String, serde_json::Value>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::from("."),
            config: None,
            version: None,
            keep: false,
            use_local_dependencies: false,
            optional_dependencies: true,
            use_s3_bucket: None,
            set_env: None,
            set_env_from_json: None,
            update_env: None,
            cache_api_config: None,
            stage_variables: BTreeMap::new(),
            work_root: None,
            post_deploy_options: serde_json::Map::new(),
        }
    }
}

impl UpdateOptions {
    pub fn for_source(source: impl AsRef<Path>) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn alias(&self) -> &str {
        match self.version.as_deref() {
            Some(alias) if !alias.is_empty() => alias,
            _ => DEFAULT_ALIAS,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.source.join(CONFIG_FILE_NAME))
    }

    pub fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Rejects mutually exclusive option pairs.
    pub fn check_conflicts(&self) -> Result<(), DeployError> {
        if self.use_local_dependencies && !self.optional_dependencies {
            return Err(DeployError::Configuration(
                "incompatible arguments --use-local-dependencies and --no-optional-dependencies"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
