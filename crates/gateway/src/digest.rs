//! Digest of the gateway configuration a stage was deployed with.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use funcdeploy_protocol::ApiConfig;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
struct DigestInput<'a> {
    alias: &'a str,
    routes: &'a ApiConfig,
    variables: &'a BTreeMap<String, String>,
}

/// Base64 SHA-256 of the canonical JSON of `{alias, routes, variables}`.
///
/// Object keys are emitted in sorted order at every level, so two
/// declarations differing only in key order share a digest.
pub fn config_digest(
    alias: &str,
    config: &ApiConfig,
    variables: &BTreeMap<String, String>,
) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(DigestInput {
        alias,
        routes: config,
        variables,
    })?;
    let canonical = serde_json::to_vec(&value)?;
    Ok(STANDARD.encode(Sha256::digest(&canonical)))
}
