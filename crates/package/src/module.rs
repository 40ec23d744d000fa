//! API modules and their optional capabilities.
//!
//! A project that fronts its function with a gateway names an API module.
//! That module may declare a route table, serve requests and expose a
//! post-deploy hook, each independently. The loader asks the toolchain which
//! of them are present once, and callers branch on the answer instead of
//! probing the module again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use funcdeploy_protocol::{ApiConfig, HookOutcome};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PackageError;
use crate::toolchain::Toolchain;

/// Capabilities reported by the toolchain for one module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescription {
    #[serde(default)]
    pub api_config: Option<ApiConfig>,
    /// Exports `proxyRouter`, the entry point gateway proxy integrations call.
    #[serde(default)]
    pub has_proxy_router: bool,
    /// Exports a plain `router`.
    #[serde(default)]
    pub has_router: bool,
    #[serde(default)]
    pub has_post_deploy: bool,
}

#[derive(Debug, Clone)]
pub struct ApiModule {
    name: String,
    dir: PathBuf,
    description: ModuleDescription,
}

impl ApiModule {
    pub fn new(name: &str, dir: &Path, description: ModuleDescription) -> Self {
        Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            description,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared route table, if the module exports one.
    pub fn api_config(&self) -> Option<&ApiConfig> {
        self.description.api_config.as_ref()
    }

    pub fn handles_requests(&self) -> bool {
        self.description.has_proxy_router || self.description.has_router
    }

    /// Whether the function handler can be pointed at `<module>.proxyRouter`.
    pub fn has_proxy_router(&self) -> bool {
        self.description.has_proxy_router
    }

    pub fn post_deploy(&self) -> Option<PostDeployHook<'_>> {
        self.description
            .has_post_deploy
            .then_some(PostDeployHook { module: self })
    }
}

/// Handle to a module's post-deploy hook.
#[derive(Debug, Clone, Copy)]
pub struct PostDeployHook<'a> {
    module: &'a ApiModule,
}

impl PostDeployHook<'_> {
    pub async fn invoke(
        &self,
        toolchain: &dyn Toolchain,
        event: &serde_json::Value,
        options: &serde_json::Value,
        env: &BTreeMap<String, String>,
    ) -> Result<HookOutcome, PackageError> {
        toolchain
            .run_post_deploy(&self.module.dir, &self.module.name, event, options, env)
            .await
    }
}

/// Loads `module` from the packaged directory, with the function's
/// environment applied, and records its capabilities.
pub async fn load_api_module(
    toolchain: &dyn Toolchain,
    dir: &Path,
    module: &str,
    env: &BTreeMap<String, String>,
) -> Result<ApiModule, PackageError> {
    let description = toolchain.describe_module(dir, module, env).await?;
    debug!(
        module,
        routes = description.api_config.is_some(),
        proxy_router = description.has_proxy_router,
        router = description.has_router,
        post_deploy = description.has_post_deploy,
        "loaded API module"
    );
    Ok(ApiModule::new(module, dir, description))
}
