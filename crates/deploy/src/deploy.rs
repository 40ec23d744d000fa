//! Deploy orchestrator.
//!
//! Runs the whole pipeline for one function: preconditions, packaging,
//! validation, configuration, publication, aliasing and the gateway. Every
//! precondition is checked before the first remote call, and nothing that
//! creates a version happens before the package has been validated.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use funcdeploy_gateway::{GatewayConfigurator, GatewayMode, GatewayRequest, GatewayUpdate};
use funcdeploy_package::{
    ApiModule, PackageArchive, PackageOptions, Toolchain, WorkingDirectory, archive_path,
    build_package, entry_module, guard_source_dir, load_api_module, remove_optional_dependencies,
    validate_package, write_archive,
};
use funcdeploy_protocol::function::{CodeSource, function_arn};
use funcdeploy_protocol::{ProjectConfig, RemoteError};
use funcdeploy_remote::{CallLog, Platform, RetryPolicy, TracingLog, with_retry};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::env::EnvOverrides;
use crate::error::DeployError;
use crate::hook::{hook_event, run_post_deploy};
use crate::options::UpdateOptions;
use crate::types::{DeployEvent, DeploymentResult, PostDeployReport, stage};
use crate::version::{VersionManager, plan_configuration_update};

/// Everything checked before the first remote call.
struct Preflight {
    source: PathBuf,
    config: ProjectConfig,
    env: EnvOverrides,
}

/// Removes the archive when dropped unless it is kept.
struct ArchiveGuard {
    archive: PackageArchive,
    keep: bool,
}

impl Drop for ArchiveGuard {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = self.archive.remove() {
            warn!(path = %self.archive.path.display(), error = %e, "failed to remove archive");
        }
    }
}

/// Orchestrates function deployments against one platform.
pub struct DeployOrchestrator {
    platform: Platform,
    toolchain: Arc<dyn Toolchain>,
    retry: RetryPolicy,
    events_tx: mpsc::Sender<DeployEvent>,
    events_rx: Option<mpsc::Receiver<DeployEvent>>,
}

impl DeployOrchestrator {
    pub fn new(platform: Platform, toolchain: Arc<dyn Toolchain>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            platform,
            toolchain,
            retry: RetryPolicy::default(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<DeployEvent>> {
        self.events_rx.take()
    }

    fn emit(&self, event: DeployEvent) {
        // Events are advisory; a full or unattended channel drops them.
        let _ = self.events_tx.try_send(event);
    }

    fn enter_stage(&self, log: &dyn CallLog, function: &str, name: &str) {
        log.log_stage(name);
        self.emit(DeployEvent::Stage {
            function: function.to_string(),
            stage: name.to_string(),
        });
    }

    async fn call<T, F, Fut>(&self, log: &dyn CallLog, name: &str, op: F) -> Result<T, DeployError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        Ok(with_retry(&self.retry, log, name, op).await?)
    }

    /// Deploys the project described by `options`.
    ///
    /// Stages and remote calls are recorded through `log`, or through
    /// `tracing` when none is given.
    pub async fn update(
        &self,
        options: &UpdateOptions,
        log: Option<&dyn CallLog>,
    ) -> Result<DeploymentResult, DeployError> {
        let fallback = TracingLog;
        let log = log.unwrap_or(&fallback);

        let preflight = preflight(options)?;
        let function = preflight.config.function.name.clone();

        match self.run(options, preflight, log).await {
            Ok(result) => {
                info!(
                    function = %function,
                    version = %result.version,
                    alias = %result.alias,
                    "deploy completed"
                );
                self.emit(DeployEvent::Completed {
                    function,
                    version: result.version.clone(),
                    alias: result.alias.clone(),
                });
                Ok(result)
            }
            Err(e) => {
                error!(function = %function, error = %e, "deploy failed");
                self.emit(DeployEvent::Failed {
                    function,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        options: &UpdateOptions,
        preflight: Preflight,
        log: &dyn CallLog,
    ) -> Result<DeploymentResult, DeployError> {
        let Preflight {
            source,
            config,
            env,
        } = preflight;
        let name = config.function.name.as_str();
        let region = config.function.region.as_str();
        let alias = options.alias();
        let api = config.api.as_ref();
        let versions = VersionManager::new(self.platform.functions.as_ref(), log, &self.retry);

        self.enter_stage(log, name, stage::LOADING_CONFIGURATION);
        let current = versions.current(name).await?;
        if let Some(api) = api {
            let gateway = self.platform.gateway.as_ref();
            self.call(log, "apigateway.getRestApi", || gateway.get_api(&api.id))
                .await?;
        }

        self.enter_stage(log, name, stage::PACKAGING);
        let work_root = options.work_root();
        let workdir = WorkingDirectory::create(&work_root)?;
        let package_options = PackageOptions {
            use_local_dependencies: options.use_local_dependencies,
            optional_dependencies: options.optional_dependencies,
        };
        build_package(self.toolchain.as_ref(), &source, &workdir, package_options).await?;

        self.enter_stage(log, name, stage::VALIDATING);
        let environment = env.resolve(current.environment.as_ref());
        let probe_env = environment
            .clone()
            .or_else(|| current.environment.clone())
            .unwrap_or_default();
        let api_module_name = api.and_then(|a| a.module.as_deref());
        let entry = entry_module(api_module_name, &current.handler);
        validate_package(self.toolchain.as_ref(), workdir.path(), &entry, &probe_env).await?;

        let module = match api_module_name {
            Some(module) => {
                let loaded =
                    load_api_module(self.toolchain.as_ref(), workdir.path(), module, &probe_env)
                        .await?;
                Some(loaded)
            }
            None => None,
        };
        let gateway_mode = match api {
            Some(api) => Some(gateway_mode(api.is_proxy, module.as_ref())?),
            None => None,
        };
        // The handler is moved to `<module>.proxyRouter` below.
        if let Some(module) = &module {
            require_proxy_router(module)?;
        }

        self.enter_stage(log, name, stage::UPDATING_CONFIGURATION);
        if let Some(update) =
            plan_configuration_update(&current, api_module_name, environment.as_ref())
        {
            versions.apply(name, &update).await?;
        }

        self.enter_stage(log, name, stage::ZIPPING);
        if !options.optional_dependencies {
            let removed = remove_optional_dependencies(workdir.path())?;
            info!(function = name, removed = removed.len(), "removed optional dependencies");
        }
        let archive = ArchiveGuard {
            archive: write_archive(workdir.path(), &archive_path(&work_root, name))?,
            keep: options.keep,
        };

        self.enter_stage(log, name, stage::UPDATING_FUNCTION);
        let bytes = archive.archive.read()?;
        let (code, s3_key) = match &options.use_s3_bucket {
            Some(bucket) => {
                let key = archive.archive.object_key();
                let objects = self.platform.objects.as_ref();
                self.call(log, "s3.upload", || objects.put_object(bucket, &key, bytes.clone()))
                    .await?;
                info!(bucket = %bucket, key = %key, "staged archive in object store");
                let code = CodeSource::Object {
                    bucket: bucket.clone(),
                    key: key.clone(),
                };
                (code, Some(key))
            }
            None => (CodeSource::ZipFile(bytes), None),
        };
        let published = versions.publish(name, code).await?;

        self.enter_stage(log, name, stage::SETTING_ALIAS);
        versions.point_alias(name, alias, &published.version).await?;

        let mut url = None;
        let mut api_cache_used = None;
        let mut deploy: Option<PostDeployReport> = None;
        if let (Some(api), Some(mode)) = (api, gateway_mode) {
            self.enter_stage(log, name, stage::UPDATING_API);
            let identity = self.platform.identity.as_ref();
            let caller = self
                .call(log, "sts.getCallerIdentity", || identity.get_caller_identity())
                .await?;
            let request = GatewayRequest {
                api_id: api.id.clone(),
                region: region.to_string(),
                function_arn: function_arn(region, &caller.account, name),
                alias: alias.to_string(),
                mode,
                cache_key: options.cache_api_config.clone(),
                extra_variables: options.stage_variables.clone(),
            };
            let GatewayUpdate {
                url: api_url,
                was_api_cache_used,
            } = GatewayConfigurator::new(self.platform.gateway.as_ref(), log, &self.retry)
                .update(&request)
                .await?;

            if let Some(module) = &module {
                let event = hook_event(name, alias, &api.id, region, &api_url);
                let hook_options = serde_json::Value::Object(options.post_deploy_options.clone());
                deploy = run_post_deploy(
                    self.toolchain.as_ref(),
                    module,
                    &event,
                    &hook_options,
                    &probe_env,
                    was_api_cache_used,
                )
                .await?;
            }
            url = Some(api_url);
            api_cache_used = Some(was_api_cache_used);
        }

        if let Err(e) = workdir.close() {
            warn!(function = name, error = %e, "failed to remove working directory");
        }

        Ok(DeploymentResult {
            function_name: name.to_string(),
            function_arn: published.function_arn.clone(),
            version: published.version.clone(),
            alias: alias.to_string(),
            archive: options.keep.then(|| archive.archive.path.clone()),
            s3_key,
            url,
            was_api_cache_used: api_cache_used,
            deploy,
        })
    }
}

/// Checks options, configuration and environment sources, in that order.
fn preflight(options: &UpdateOptions) -> Result<Preflight, DeployError> {
    options.check_conflicts()?;
    guard_source_dir(&options.source)?;
    let config = ProjectConfig::load(&options.config_path())?;
    let env = EnvOverrides::from_options(options)?;
    Ok(Preflight {
        source: options.source.clone(),
        config,
        env,
    })
}

fn gateway_mode(is_proxy: bool, module: Option<&ApiModule>) -> Result<GatewayMode, DeployError> {
    if is_proxy {
        return Ok(GatewayMode::Proxy);
    }
    let module = module.ok_or_else(|| {
        DeployError::Configuration("invalid configuration -- api.module missing".to_string())
    })?;
    module
        .api_config()
        .cloned()
        .map(GatewayMode::Routes)
        .ok_or_else(|| {
            DeployError::Configuration(format!(
                "{} does not export apiConfig; cannot configure the REST API routes",
                module.name()
            ))
        })
}

fn require_proxy_router(module: &ApiModule) -> Result<(), DeployError> {
    if module.has_proxy_router() {
        return Ok(());
    }
    Err(DeployError::Configuration(format!(
        "{} does not export proxyRouter; cannot route gateway requests to it",
        module.name()
    )))
}
