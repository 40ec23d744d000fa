//! Configuration update, code upload, version publication and aliasing.

use std::future::Future;

use funcdeploy_protocol::function::{
    AliasConfiguration, CodeSource, ConfigurationUpdate, FunctionConfiguration,
};
use funcdeploy_protocol::RemoteError;
use funcdeploy_remote::{CallLog, FunctionStore, RetryPolicy, with_retry};
use tracing::info;

use crate::env::EnvMap;
use crate::error::DeployError;

/// Export an API module's request router is reached through.
pub const ROUTER_EXPORT: &str = "proxyRouter";

/// Configuration changes required before publishing, or `None` when the
/// remote configuration already matches.
///
/// A declared API module moves the handler to `<module>.proxyRouter`. A
/// resolved environment replaces the remote one when it differs.
pub fn plan_configuration_update(
    current: &FunctionConfiguration,
    api_module: Option<&str>,
    environment: Option<&EnvMap>,
) -> Option<ConfigurationUpdate> {
    let handler = api_module
        .map(|module| format!("{module}.{ROUTER_EXPORT}"))
        .filter(|handler| *handler != current.handler);

    let environment = environment
        .filter(|env| current.environment.as_ref() != Some(*env))
        .cloned();

    let update = ConfigurationUpdate {
        handler,
        environment,
    };
    (!update.is_empty()).then_some(update)
}

/// Function-store operations of a run, each wrapped in throttling retry.
pub struct VersionManager<'a> {
    functions: &'a dyn FunctionStore,
    log: &'a dyn CallLog,
    retry: &'a RetryPolicy,
}

impl<'a> VersionManager<'a> {
    pub fn new(functions: &'a dyn FunctionStore, log: &'a dyn CallLog, retry: &'a RetryPolicy) -> Self {
        Self {
            functions,
            log,
            retry,
        }
    }

    async fn call<T, F, Fut>(&self, name: &str, op: F) -> Result<T, DeployError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        Ok(with_retry(self.retry, self.log, name, op).await?)
    }

    pub async fn current(&self, name: &str) -> Result<FunctionConfiguration, DeployError> {
        self.call("lambda.getFunctionConfiguration", || {
            self.functions.get_configuration(name, None)
        })
        .await
    }

    pub async fn apply(
        &self,
        name: &str,
        update: &ConfigurationUpdate,
    ) -> Result<FunctionConfiguration, DeployError> {
        self.call("lambda.updateFunctionConfiguration", || {
            self.functions.update_configuration(name, update)
        })
        .await
    }

    /// Replaces `$LATEST`'s code and snapshots it into a new version.
    pub async fn publish(
        &self,
        name: &str,
        code: CodeSource,
    ) -> Result<FunctionConfiguration, DeployError> {
        self.call("lambda.updateFunctionCode", || {
            self.functions.update_code(name, code.clone())
        })
        .await?;
        let published = self
            .call("lambda.publishVersion", || self.functions.publish_version(name))
            .await?;
        info!(function = name, version = %published.version, "published version");
        Ok(published)
    }

    /// Points `alias` at `version`, creating the alias if needed. Other
    /// aliases are not touched.
    pub async fn point_alias(
        &self,
        name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasConfiguration, DeployError> {
        let existing = self
            .call("lambda.getAlias", || self.functions.get_alias(name, alias))
            .await?;
        let updated = match existing {
            Some(_) => {
                self.call("lambda.updateAlias", || {
                    self.functions.update_alias(name, alias, version)
                })
                .await?
            }
            None => {
                self.call("lambda.createAlias", || {
                    self.functions.create_alias(name, alias, version)
                })
                .await?
            }
        };
        info!(function = name, alias, version, "alias points at new version");
        Ok(updated)
    }
}
