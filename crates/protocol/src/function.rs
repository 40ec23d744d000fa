//! Function store resources: configuration, code, versions and aliases.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The mutable pre-publish pointer. Never a numbered version, never aliased.
pub const LATEST: &str = "$LATEST";

/// Remote configuration of a function (or of one of its versions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfiguration {
    pub function_name: String,
    /// Qualified with the version when describing a published version.
    pub function_arn: String,
    pub handler: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub runtime: String,
    /// `$LATEST` or a decimal version number.
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<BTreeMap<String, String>>,
}

impl FunctionConfiguration {
    /// Numbered version, or `None` for `$LATEST`.
    pub fn version_number(&self) -> Option<u64> {
        self.version.parse().ok()
    }

    /// Module part of the handler reference (`main.handler` → `main`).
    pub fn handler_module(&self) -> &str {
        self.handler
            .rsplit_once('.')
            .map(|(module, _)| module)
            .unwrap_or(&self.handler)
    }
}

/// Fields changed by an update-configuration call. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<BTreeMap<String, String>>,
}

impl ConfigurationUpdate {
    pub fn is_empty(&self) -> bool {
        self.handler.is_none() && self.environment.is_none()
    }
}

/// Where the platform reads new function code from.
#[derive(Clone, PartialEq, Eq)]
pub enum CodeSource {
    /// Archive bytes sent inline.
    ZipFile(Vec<u8>),
    /// Archive previously uploaded to the object store.
    Object { bucket: String, key: String },
}

impl std::fmt::Debug for CodeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZipFile(bytes) => write!(f, "ZipFile({} bytes)", bytes.len()),
            Self::Object { bucket, key } => write!(f, "Object(s3://{bucket}/{key})"),
        }
    }
}

/// Named pointer to exactly one numbered version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasConfiguration {
    pub name: String,
    pub function_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias_arn: String,
}

/// Unqualified function ARN.
pub fn function_arn(region: &str, account: &str, name: &str) -> String {
    format!("arn:aws:lambda:{region}:{account}:function:{name}")
}

/// ARN qualified with a version number or alias name.
pub fn qualified_arn(region: &str, account: &str, name: &str, qualifier: &str) -> String {
    format!("{}:{qualifier}", function_arn(region, account, name))
}
