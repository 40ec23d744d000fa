//! Persisted project configuration (`funcdeploy.json`).
//!
//! The file is written by the project scaffolding layer and only read here.
//! Required fields are checked at load time so that a broken file fails the
//! run before any remote call is made.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// File name looked up in the source directory when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "funcdeploy.json";

/// Errors produced while reading the project configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} does not exist in the source folder")]
    Missing(String),

    #[error("invalid configuration -- {field} missing from {file}")]
    MissingField { field: &'static str, file: String },

    #[error("invalid configuration -- cannot parse {file}: {detail}")]
    Invalid { file: String, detail: String },

    #[error("cannot read {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

/// The function this project deploys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSection {
    pub name: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// The HTTP gateway fronting the function, if the project declares one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSection {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_proxy: bool,
}

/// Validated project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub function: FunctionSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiSection>,
}

// Loose mirror of the file used to report which field is missing instead of
// a generic serde error.
#[derive(Debug, Default, Deserialize)]
struct RawProjectConfig {
    #[serde(default)]
    function: Option<RawFunctionSection>,
    #[serde(default)]
    api: Option<RawApiSection>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFunctionSection {
    name: Option<String>,
    region: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawApiSection {
    id: Option<String>,
    module: Option<String>,
    #[serde(default)]
    is_proxy: bool,
}

impl ProjectConfig {
    /// Reads and validates the configuration file at `path`.
    ///
    /// Error messages name the file by its base name, the way users see it
    /// in their project folder.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| CONFIG_FILE_NAME.to_string());

        if !path.is_file() {
            return Err(ConfigError::Missing(file));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            file: file.clone(),
            source,
        })?;
        Self::parse(&content, &file)
    }

    /// Parses and validates configuration text. `file` is only used in messages.
    pub fn parse(content: &str, file: &str) -> Result<Self, ConfigError> {
        let raw: RawProjectConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Invalid {
                file: file.to_string(),
                detail: e.to_string(),
            })?;

        let missing = |field: &'static str| ConfigError::MissingField {
            field,
            file: file.to_string(),
        };

        let function = raw.function.unwrap_or_default();
        let name = non_empty(function.name).ok_or_else(|| missing("function.name"))?;
        let region = non_empty(function.region).ok_or_else(|| missing("function.region"))?;

        let api = match raw.api {
            None => None,
            Some(api) => {
                let id = non_empty(api.id).ok_or_else(|| missing("api.id"))?;
                let module = non_empty(api.module);
                if module.is_none() && !api.is_proxy {
                    return Err(missing("api.module"));
                }
                Some(ApiSection {
                    id,
                    module,
                    is_proxy: api.is_proxy,
                })
            }
        };

        Ok(Self {
            function: FunctionSection {
                name,
                region,
                role: non_empty(function.role),
            },
            api,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
