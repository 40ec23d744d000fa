//! Gateway store resources: APIs, the resource tree, methods and stages.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// An HTTP API as known by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestApi {
    pub id: String,
    pub name: String,
}

/// One node of an API's resource tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    /// `None` only for the root resource `/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_part: String,
    /// Full path from the root, e.g. `/users/{id}`.
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub methods: BTreeSet<String>,
}

impl Resource {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Method declaration on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodSpec {
    pub resource_id: String,
    pub http_method: String,
    pub authorization_type: String,
}

impl MethodSpec {
    pub fn open(resource_id: &str, http_method: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            http_method: http_method.to_string(),
            authorization_type: "NONE".to_string(),
        }
    }
}

/// How a method reaches its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationKind {
    /// Forwards the whole request to the function identified by `uri`.
    AwsProxy { uri: String },
    /// Answered by the gateway itself (used for CORS preflight).
    Mock,
}

/// Integration attached to a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSpec {
    pub resource_id: String,
    pub http_method: String,
    pub kind: IntegrationKind,
}

/// Response declaration for a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodResponse {
    pub resource_id: String,
    pub http_method: String,
    pub status_code: String,
    /// Header name → required flag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_parameters: BTreeMap<String, bool>,
}

/// Mapping from an integration result to a method response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationResponse {
    pub resource_id: String,
    pub http_method: String,
    pub status_code: String,
    /// Header name → static value expression.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_parameters: BTreeMap<String, String>,
}

/// Request to snapshot the current resource tree into a named stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub stage_name: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// A deployed snapshot of an API exposed under its own URL path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub name: String,
    pub deployment_id: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}
