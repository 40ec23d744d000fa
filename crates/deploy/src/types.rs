//! Data types for the deploy flow.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stage names, logged once each and in this order.
pub mod stage {
    pub const LOADING_CONFIGURATION: &str = "loading function configuration";
    pub const PACKAGING: &str = "packaging files";
    pub const VALIDATING: &str = "validating package";
    pub const UPDATING_CONFIGURATION: &str = "updating configuration";
    pub const ZIPPING: &str = "zipping package";
    pub const UPDATING_FUNCTION: &str = "updating function";
    pub const SETTING_ALIAS: &str = "setting version alias";
    pub const UPDATING_API: &str = "updating REST API";

    /// Full sequence for a project with an API.
    pub const ALL: [&str; 8] = [
        LOADING_CONFIGURATION,
        PACKAGING,
        VALIDATING,
        UPDATING_CONFIGURATION,
        ZIPPING,
        UPDATING_FUNCTION,
        SETTING_ALIAS,
        UPDATING_API,
    ];
}

/// Outcome of the post-deploy hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeployReport {
    pub result: serde_json::Value,
    pub was_api_cache_used: bool,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub function_name: String,
    /// ARN qualified with the new version.
    pub function_arn: String,
    pub version: String,
    pub alias: String,
    /// Archive path, reported only when kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Set whenever the gateway was updated, with or without a hook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_api_cache_used: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<PostDeployReport>,
}

/// Progress event emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum DeployEvent {
    /// A pipeline stage started.
    Stage { function: String, stage: String },
    /// The run finished and `alias` points at `version`.
    Completed {
        function: String,
        version: String,
        alias: String,
    },
    Failed { function: String, error: String },
}
