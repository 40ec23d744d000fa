//! Post-deploy hook invocation.

use std::collections::BTreeMap;

use funcdeploy_package::{ApiModule, Toolchain};
use serde_json::{Value, json};
use tracing::info;

use crate::error::DeployError;
use crate::types::PostDeployReport;

/// Details of the finished deployment handed to the hook.
pub fn hook_event(name: &str, alias: &str, api_id: &str, region: &str, api_url: &str) -> Value {
    json!({
        "name": name,
        "alias": alias,
        "apiId": api_id,
        "region": region,
        "apiUrl": api_url,
    })
}

/// Runs the module's post-deploy hook if it exposes one, with the
/// function's environment applied.
///
/// Streamed partial values are collected into an array. A failed hook fails
/// the run.
pub async fn run_post_deploy(
    toolchain: &dyn Toolchain,
    module: &ApiModule,
    event: &Value,
    options: &Value,
    env: &BTreeMap<String, String>,
    was_api_cache_used: bool,
) -> Result<Option<PostDeployReport>, DeployError> {
    let Some(hook) = module.post_deploy() else {
        return Ok(None);
    };
    let outcome = hook.invoke(toolchain, event, options, env).await?;
    let result = outcome.into_result().map_err(DeployError::Hook)?;
    info!(module = module.name(), "post-deploy hook finished");
    Ok(Some(PostDeployReport {
        result,
        was_api_cache_used,
    }))
}
