//! Route tables declared by an API module.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-method options attached to a route. Opaque to the pipeline apart from
/// being part of the configuration digest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteOptions(pub serde_json::Map<String, serde_json::Value>);

/// Gateway configuration as declared by the API module.
///
/// `routes` maps a path (with or without leading `/`) to the methods served
/// on it. Both levels are ordered maps, so two declarations that differ only
/// in key order serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub routes: BTreeMap<String, BTreeMap<String, RouteOptions>>,
    /// `false` disables the generated CORS preflight handlers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors_handlers: Option<serde_json::Value>,
}

impl ApiConfig {
    pub fn cors_enabled(&self) -> bool {
        !matches!(self.cors_handlers, Some(serde_json::Value::Bool(false)))
    }
}

/// A single (method, path) binding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Route {
    /// Normalized path, always starting with `/`.
    pub path: String,
    /// Upper-cased HTTP method, or `ANY`.
    pub method: String,
}

/// Ordered collection of routes served by a gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSet {
    routes: Vec<Route>,
}

/// Path of the catch-all resource used in proxy mode.
pub const PROXY_PATH: &str = "/{proxy+}";

impl RouteSet {
    /// Flattens a declared route table, sorted by path then method.
    pub fn from_config(config: &ApiConfig) -> Self {
        let mut routes: Vec<Route> = config
            .routes
            .iter()
            .flat_map(|(path, methods)| {
                let path = normalize_path(path);
                methods.keys().map(move |method| Route {
                    path: path.clone(),
                    method: method.to_ascii_uppercase(),
                })
            })
            .collect();
        routes.sort();
        routes.dedup();
        Self { routes }
    }

    /// The single entry forwarding every path and method.
    pub fn catch_all() -> Self {
        Self {
            routes: vec![Route {
                path: PROXY_PATH.to_string(),
                method: "ANY".to_string(),
            }],
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Distinct paths in tree order (parents before children).
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.iter().map(|r| r.path.as_str()).collect();
        paths.dedup();
        paths
    }

    /// Methods declared on `path`.
    pub fn methods_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.routes
            .iter()
            .filter(move |r| r.path == path)
            .map(|r| r.method.as_str())
    }
}

/// Normalizes a declared path: single leading `/`, no trailing `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", trimmed.join("/"))
}
