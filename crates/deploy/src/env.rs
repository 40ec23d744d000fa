//! Environment variable sources for the function configuration.
//!
//! Sources are parsed before any remote call so malformed input fails the
//! run without side effects. Precedence, lowest first: existing remote
//! variables (only when merging), the JSON file, `set-env`, `update-env`.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::DeployError;
use crate::options::UpdateOptions;

pub type EnvMap = BTreeMap<String, String>;

const SET_ENV: &str = "set-env";
const SET_ENV_FROM_JSON: &str = "set-env-from-json";
const UPDATE_ENV: &str = "update-env";

/// Parses `K=V,K2=V2`. Double quotes group text containing commas and are
/// removed from the result.
pub fn parse_env_csv(source_name: &str, text: &str) -> Result<EnvMap, DeployError> {
    let mut vars = EnvMap::new();
    for token in split_csv(text) {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(DeployError::EnvParsing(format!(
                "Cannot read variables from {source_name}, Invalid CSV element {trimmed}"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(DeployError::EnvParsing(format!(
                "Cannot read variables from {source_name}, Invalid CSV element {trimmed}"
            )));
        }
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

fn split_csv(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => tokens.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    tokens.push(current);
    tokens
}

/// Reads a JSON file holding a flat object of string values.
pub fn read_env_json(path: &Path) -> Result<EnvMap, DeployError> {
    let fail = |detail: String| {
        DeployError::EnvParsing(format!("Cannot read variables from {SET_ENV_FROM_JSON}, {detail}"))
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| fail(format!("{}: {e}", path.display())))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| fail(e.to_string()))?;
    let serde_json::Value::Object(map) = value else {
        return Err(fail(format!("{} does not contain an object", path.display())));
    };
    map.into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => Ok((key, s)),
            other => Err(fail(format!("value of {key} is not a string: {other}"))),
        })
        .collect()
}

/// Parsed environment sources of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    replace: Option<EnvMap>,
    merge: Option<EnvMap>,
}

impl EnvOverrides {
    pub fn from_options(options: &UpdateOptions) -> Result<Self, DeployError> {
        let json = options
            .set_env_from_json
            .as_deref()
            .map(read_env_json)
            .transpose()?;
        let csv = options
            .set_env
            .as_deref()
            .map(|text| parse_env_csv(SET_ENV, text))
            .transpose()?;
        let merge = options
            .update_env
            .as_deref()
            .map(|text| parse_env_csv(UPDATE_ENV, text))
            .transpose()?;

        let replace = match (json, csv) {
            (None, None) => None,
            (json, csv) => {
                let mut vars = json.unwrap_or_default();
                vars.extend(csv.unwrap_or_default());
                Some(vars)
            }
        };
        Ok(Self { replace, merge })
    }

    pub fn is_empty(&self) -> bool {
        self.replace.is_none() && self.merge.is_none()
    }

    /// Final environment for the function, or `None` to leave it untouched.
    pub fn resolve(&self, existing: Option<&EnvMap>) -> Option<EnvMap> {
        if self.is_empty() {
            return None;
        }
        let mut vars = match &self.merge {
            Some(_) => existing.cloned().unwrap_or_default(),
            None => EnvMap::new(),
        };
        if let Some(replace) = &self.replace {
            vars.extend(replace.clone());
        }
        if let Some(merge) = &self.merge {
            vars.extend(merge.clone());
        }
        Some(vars)
    }
}
