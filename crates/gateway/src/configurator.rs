//! Synchronizes an API's routes with the function alias and deploys a stage.
//!
//! One stage exists per alias. Integrations resolve the function through the
//! `lambdaVersion` stage variable, so the same resource tree serves
//! different versions from different stages.

use std::collections::BTreeMap;
use std::future::Future;

use funcdeploy_protocol::gateway::{
    DeploymentRequest, IntegrationKind, IntegrationResponse, IntegrationSpec, MethodResponse,
    MethodSpec, Resource,
};
use funcdeploy_protocol::routes::RouteSet;
use funcdeploy_protocol::{ApiConfig, RemoteError};
use funcdeploy_remote::{CallLog, GatewayStore, RetryPolicy, with_retry};
use tracing::{debug, info};

use crate::digest::config_digest;
use crate::error::GatewayError;

/// Stage variable naming the alias an integration invokes.
pub const VERSION_VARIABLE: &str = "lambdaVersion";

const CORS_ALLOW_HEADERS: &str = "'Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token'";

/// How the API routes requests to the function.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayMode {
    /// A single catch-all route forwards everything.
    Proxy,
    /// Routes declared by the API module.
    Routes(ApiConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub api_id: String,
    pub region: String,
    /// Unqualified function ARN.
    pub function_arn: String,
    /// Alias name; also the stage name.
    pub alias: String,
    pub mode: GatewayMode,
    /// Stage variable holding the configuration digest. Caching only applies
    /// in route mode.
    pub cache_key: Option<String>,
    pub extra_variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayUpdate {
    pub url: String,
    pub was_api_cache_used: bool,
}

/// Invocation URL of a stage.
pub fn stage_url(api_id: &str, region: &str, stage: &str) -> String {
    format!("https://{api_id}.execute-api.{region}.amazonaws.com/{stage}")
}

/// Integration URI invoking the alias named by the stage's version variable.
pub fn integration_uri(region: &str, function_arn: &str) -> String {
    format!(
        "arn:aws:apigateway:{region}:lambda:path/2015-03-31/functions/{function_arn}:${{stageVariables.{VERSION_VARIABLE}}}/invocations"
    )
}

pub struct GatewayConfigurator<'a> {
    gateway: &'a dyn GatewayStore,
    log: &'a dyn CallLog,
    retry: &'a RetryPolicy,
}

impl<'a> GatewayConfigurator<'a> {
    pub fn new(gateway: &'a dyn GatewayStore, log: &'a dyn CallLog, retry: &'a RetryPolicy) -> Self {
        Self { gateway, log, retry }
    }

    async fn call<T, F, Fut>(&self, name: &str, op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        Ok(with_retry(self.retry, self.log, name, op).await?)
    }

    pub async fn update(&self, request: &GatewayRequest) -> Result<GatewayUpdate, GatewayError> {
        let url = stage_url(&request.api_id, &request.region, &request.alias);
        let mut variables = request.extra_variables.clone();
        variables.insert(VERSION_VARIABLE.to_string(), request.alias.clone());

        match &request.mode {
            GatewayMode::Proxy => {
                self.ensure_proxy(request).await?;
            }
            GatewayMode::Routes(config) => {
                if let Some(key) = &request.cache_key {
                    let digest = config_digest(&request.alias, config, &request.extra_variables)?;
                    if self.stage_has_digest(request, key, &digest).await? {
                        info!(api = %request.api_id, stage = %request.alias, "gateway configuration unchanged, skipping");
                        return Ok(GatewayUpdate {
                            url,
                            was_api_cache_used: true,
                        });
                    }
                    variables.insert(key.clone(), digest);
                }
                self.sync_routes(request, config).await?;
            }
        }

        let deployment = DeploymentRequest {
            stage_name: request.alias.clone(),
            variables,
        };
        let api = request.api_id.as_str();
        let id = self
            .call("apigateway.createDeployment", || {
                self.gateway.create_deployment(api, &deployment)
            })
            .await?;
        info!(api, stage = %request.alias, deployment = %id, "deployed gateway stage");

        Ok(GatewayUpdate {
            url,
            was_api_cache_used: false,
        })
    }

    async fn stage_has_digest(
        &self,
        request: &GatewayRequest,
        key: &str,
        digest: &str,
    ) -> Result<bool, GatewayError> {
        let api = request.api_id.as_str();
        let stage = request.alias.as_str();
        let existing = self
            .call("apigateway.getStage", || self.gateway.get_stage(api, stage))
            .await?;
        Ok(existing.is_some_and(|s| s.variables.get(key).map(String::as_str) == Some(digest)))
    }

    async fn resources(&self, api: &str) -> Result<(Resource, Vec<Resource>), GatewayError> {
        let resources = self
            .call("apigateway.getResources", || self.gateway.list_resources(api))
            .await?;
        let root = resources
            .iter()
            .find(|r| r.is_root())
            .cloned()
            .ok_or_else(|| GatewayError::MissingRoot(api.to_string()))?;
        Ok((root, resources))
    }

    /// Binds the root and every catch-all resource to the function.
    async fn ensure_proxy(&self, request: &GatewayRequest) -> Result<(), GatewayError> {
        let api = request.api_id.as_str();
        let (root, resources) = self.resources(api).await?;
        let uri = integration_uri(&request.region, &request.function_arn);

        for route in RouteSet::catch_all().routes() {
            let proxy = match resources.iter().find(|r| r.path == route.path) {
                Some(existing) => existing.clone(),
                None => {
                    let part = route.path.trim_start_matches('/');
                    self.call("apigateway.createResource", || {
                        self.gateway.create_resource(api, &root.id, part)
                    })
                    .await?
                }
            };
            for resource in [&root, &proxy] {
                if !resource.methods.contains(&route.method) {
                    self.put_method(api, &resource.id, &route.method).await?;
                }
                self.put_proxy_integration(api, &resource.id, &route.method, &uri)
                    .await?;
            }
        }
        Ok(())
    }

    async fn sync_routes(&self, request: &GatewayRequest, config: &ApiConfig) -> Result<(), GatewayError> {
        let api = request.api_id.as_str();
        let routes = RouteSet::from_config(config);
        let (root, resources) = self.resources(api).await?;

        // The root itself cannot be deleted, only its methods.
        for method in &root.methods {
            self.call("apigateway.deleteMethod", || {
                self.gateway.delete_method(api, &root.id, method)
            })
            .await?;
        }

        // Deleting top-level resources removes their subtrees.
        for child in resources
            .iter()
            .filter(|r| r.parent_id.as_deref() == Some(root.id.as_str()))
        {
            self.call("apigateway.deleteResource", || {
                self.gateway.delete_resource(api, &child.id)
            })
            .await?;
        }

        let mut ids: BTreeMap<String, String> = BTreeMap::new();
        ids.insert("/".to_string(), root.id.clone());
        let uri = integration_uri(&request.region, &request.function_arn);

        for path in routes.paths() {
            let resource_id = self.ensure_path(api, path, &mut ids).await?;
            let methods: Vec<&str> = routes.methods_for(path).collect();
            for method in &methods {
                self.put_method(api, &resource_id, method).await?;
                self.put_proxy_integration(api, &resource_id, method, &uri).await?;
            }
            if config.cors_enabled() && !methods.contains(&"OPTIONS") {
                self.put_cors_handler(api, &resource_id, &methods, config).await?;
            }
        }
        debug!(api, routes = routes.routes().len(), "synchronized gateway routes");
        Ok(())
    }

    /// Creates the missing resources along `path`; returns the leaf id.
    async fn ensure_path(
        &self,
        api: &str,
        path: &str,
        ids: &mut BTreeMap<String, String>,
    ) -> Result<String, GatewayError> {
        let mut current = "/".to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let next = if current == "/" {
                format!("/{segment}")
            } else {
                format!("{current}/{segment}")
            };
            if !ids.contains_key(&next) {
                let parent = ids
                    .get(&current)
                    .cloned()
                    .ok_or_else(|| GatewayError::InvalidRoute {
                        path: path.to_string(),
                        detail: format!("parent {current} was not created"),
                    })?;
                let created = self
                    .call("apigateway.createResource", || {
                        self.gateway.create_resource(api, &parent, segment)
                    })
                    .await?;
                ids.insert(next.clone(), created.id);
            }
            current = next;
        }
        ids.get(&current).cloned().ok_or_else(|| GatewayError::InvalidRoute {
            path: path.to_string(),
            detail: "resource missing".to_string(),
        })
    }

    async fn put_method(&self, api: &str, resource_id: &str, method: &str) -> Result<(), GatewayError> {
        let spec = MethodSpec::open(resource_id, method);
        self.call("apigateway.putMethod", || self.gateway.put_method(api, &spec))
            .await
    }

    async fn put_proxy_integration(
        &self,
        api: &str,
        resource_id: &str,
        method: &str,
        uri: &str,
    ) -> Result<(), GatewayError> {
        let spec = IntegrationSpec {
            resource_id: resource_id.to_string(),
            http_method: method.to_string(),
            kind: IntegrationKind::AwsProxy {
                uri: uri.to_string(),
            },
        };
        self.call("apigateway.putIntegration", || {
            self.gateway.put_integration(api, &spec)
        })
        .await
    }

    /// Mock `OPTIONS` method answering CORS preflight for a resource.
    async fn put_cors_handler(
        &self,
        api: &str,
        resource_id: &str,
        methods: &[&str],
        config: &ApiConfig,
    ) -> Result<(), GatewayError> {
        self.put_method(api, resource_id, "OPTIONS").await?;

        let integration = IntegrationSpec {
            resource_id: resource_id.to_string(),
            http_method: "OPTIONS".to_string(),
            kind: IntegrationKind::Mock,
        };
        self.call("apigateway.putIntegration", || {
            self.gateway.put_integration(api, &integration)
        })
        .await?;

        let headers = ["Headers", "Methods", "Origin"]
            .map(|h| format!("method.response.header.Access-Control-Allow-{h}"));
        let method_response = MethodResponse {
            resource_id: resource_id.to_string(),
            http_method: "OPTIONS".to_string(),
            status_code: "200".to_string(),
            response_parameters: headers.iter().map(|h| (h.clone(), false)).collect(),
        };
        self.call("apigateway.putMethodResponse", || {
            self.gateway.put_method_response(api, &method_response)
        })
        .await?;

        let mut allowed: Vec<&str> = methods.to_vec();
        allowed.push("OPTIONS");
        let origin = match &config.cors_handlers {
            Some(serde_json::Value::String(origin)) => origin.clone(),
            _ => "'*'".to_string(),
        };
        let values = [
            CORS_ALLOW_HEADERS.to_string(),
            format!("'{}'", allowed.join(",")),
            origin,
        ];
        let integration_response = IntegrationResponse {
            resource_id: resource_id.to_string(),
            http_method: "OPTIONS".to_string(),
            status_code: "200".to_string(),
            response_parameters: headers.into_iter().zip(values).collect(),
        };
        self.call("apigateway.putIntegrationResponse", || {
            self.gateway.put_integration_response(api, &integration_response)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funcdeploy_protocol::routes::PROXY_PATH;
    use funcdeploy_protocol::{Route, function_arn};
    use funcdeploy_remote::{FunctionStore, RecordingLog};
    use funcdeploy_remote::memory::InMemoryPlatform;
    use std::sync::Arc;

    const REGION: &str = "us-east-1";
    const ACCOUNT: &str = "123456789012";

    struct Fixture {
        platform: Arc<InMemoryPlatform>,
        api: String,
        log: RecordingLog,
        retry: RetryPolicy,
    }

    async fn fixture() -> Fixture {
        let platform = Arc::new(InMemoryPlatform::new(ACCOUNT, REGION));
        platform.create_function("fn", "main.proxyRouter", None);
        platform.publish_version("fn").await.unwrap();
        platform.create_alias("fn", "latest", "1").await.unwrap();
        let api = platform.create_api("fn");
        Fixture {
            platform,
            api,
            log: RecordingLog::new(),
            retry: RetryPolicy::none(),
        }
    }

    fn routes(json: &str) -> ApiConfig {
        serde_json::from_str(json).unwrap()
    }

    fn request(f: &Fixture, mode: GatewayMode, cache_key: Option<&str>) -> GatewayRequest {
        GatewayRequest {
            api_id: f.api.clone(),
            region: REGION.into(),
            function_arn: function_arn(REGION, ACCOUNT, "fn"),
            alias: "latest".into(),
            mode,
            cache_key: cache_key.map(String::from),
            extra_variables: BTreeMap::new(),
        }
    }

    async fn run(f: &Fixture, request: &GatewayRequest) -> GatewayUpdate {
        GatewayConfigurator::new(f.platform.as_ref(), &f.log, &f.retry)
            .update(request)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn route_mode_builds_tree_and_deploys_stage() {
        let f = fixture().await;
        let config = routes(r#"{"version":3,"routes":{"echo":{"GET":{}},"users/{id}":{"POST":{}}}}"#);

        let update = run(&f, &request(&f, GatewayMode::Routes(config), None)).await;

        assert_eq!(
            update.url,
            format!("https://{}.execute-api.us-east-1.amazonaws.com/latest", f.api)
        );
        assert!(!update.was_api_cache_used);
        let served = f.platform.stage_routes(&f.api, "latest").unwrap();
        assert_eq!(
            served,
            vec![
                Route { path: "/echo".into(), method: "GET".into() },
                Route { path: "/users/{id}".into(), method: "POST".into() },
            ]
        );
        assert_eq!(f.platform.serving_version(&f.api, "latest"), Some(1));
        assert_eq!(f.platform.stage_variables(&f.api, "latest").unwrap()[VERSION_VARIABLE], "latest");

        let calls = f.log.api_calls_for("apigateway", true);
        assert!(calls.contains(&"apigateway.putMethodResponse".to_string()));
        assert!(calls.contains(&"apigateway.putIntegrationResponse".to_string()));
    }

    #[tokio::test]
    async fn resync_replaces_previous_routes() {
        let f = fixture().await;
        let first = routes(r#"{"routes":{"echo":{"GET":{}},"old":{"GET":{}}}}"#);
        let second = routes(r#"{"routes":{"hello":{"GET":{}}}}"#);

        run(&f, &request(&f, GatewayMode::Routes(first), None)).await;
        run(&f, &request(&f, GatewayMode::Routes(second), None)).await;

        let served = f.platform.stage_routes(&f.api, "latest").unwrap();
        assert_eq!(served, vec![Route { path: "/hello".into(), method: "GET".into() }]);
        let paths: Vec<String> = f
            .platform
            .list_resources(&f.api)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert!(!paths.contains(&"/old".to_string()));
    }

    #[tokio::test]
    async fn resync_drops_routes_on_the_root() {
        let f = fixture().await;
        let first = routes(r#"{"routes":{"/":{"GET":{}},"echo":{"GET":{}}}}"#);
        let second = routes(r#"{"routes":{"echo":{"GET":{}}}}"#);

        run(&f, &request(&f, GatewayMode::Routes(first), None)).await;
        assert_eq!(f.platform.stage_routes(&f.api, "latest").unwrap().len(), 2);
        run(&f, &request(&f, GatewayMode::Routes(second), None)).await;

        let served = f.platform.stage_routes(&f.api, "latest").unwrap();
        assert_eq!(served, vec![Route { path: "/echo".into(), method: "GET".into() }]);
        let resources = f.platform.list_resources(&f.api).await.unwrap();
        let root = resources.iter().find(|r| r.is_root()).unwrap();
        assert!(root.methods.is_empty());
        assert!(f.log.api_calls_for("apigateway", true).contains(&"apigateway.deleteMethod".to_string()));
    }

    #[tokio::test]
    async fn cors_handlers_can_be_disabled() {
        let f = fixture().await;
        let config = routes(r#"{"routes":{"echo":{"GET":{}}},"corsHandlers":false}"#);

        run(&f, &request(&f, GatewayMode::Routes(config), None)).await;

        assert!(f.log.api_calls_for("apigateway", false).iter().all(|c| c != "apigateway.putMethodResponse"));
    }

    #[tokio::test]
    async fn cache_skips_resync_when_digest_matches() {
        let f = fixture().await;
        let config = routes(r#"{"version":3,"routes":{"echo":{"GET":{}}}}"#);
        let changed = routes(r#"{"version":3,"routes":{"echo":{"POST":{}}}}"#);

        let first = run(&f, &request(&f, GatewayMode::Routes(config.clone()), Some("cfgCache"))).await;
        let second = run(&f, &request(&f, GatewayMode::Routes(config), Some("cfgCache"))).await;
        let third = run(&f, &request(&f, GatewayMode::Routes(changed), Some("cfgCache"))).await;

        assert!(!first.was_api_cache_used);
        assert!(second.was_api_cache_used);
        assert!(!third.was_api_cache_used);
        assert_eq!(f.platform.deployment_count(&f.api), 2);
        assert!(f.platform.stage_variables(&f.api, "latest").unwrap().contains_key("cfgCache"));
    }

    #[tokio::test]
    async fn proxy_mode_is_idempotent() {
        let f = fixture().await;

        run(&f, &request(&f, GatewayMode::Proxy, None)).await;
        run(&f, &request(&f, GatewayMode::Proxy, None)).await;

        let resources = f.platform.list_resources(&f.api).await.unwrap();
        assert_eq!(resources.len(), 2);
        let served = f.platform.stage_routes(&f.api, "latest").unwrap();
        assert_eq!(
            served,
            vec![
                Route { path: "/".into(), method: "ANY".into() },
                Route { path: PROXY_PATH.into(), method: "ANY".into() },
            ]
        );
        assert_eq!(
            f.log.api_calls_for("apigateway", false).iter().filter(|c| *c == "apigateway.createResource").count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_gateway_calls_are_retried() {
        let mut f = fixture().await;
        f.retry = RetryPolicy::default();
        f.platform.throttle_next(2);
        let config = routes(r#"{"routes":{"echo":{"GET":{}}}}"#);

        run(&f, &request(&f, GatewayMode::Routes(config), None)).await;

        assert_eq!(f.log.retry_log().len(), 2);
        assert!(f.platform.stage_routes(&f.api, "latest").is_some());
    }

    #[test]
    fn integration_uri_uses_stage_variable() {
        assert_eq!(
            integration_uri("eu-west-1", "arn:aws:lambda:eu-west-1:1:function:f"),
            "arn:aws:apigateway:eu-west-1:lambda:path/2015-03-31/functions/arn:aws:lambda:eu-west-1:1:function:f:${stageVariables.lambdaVersion}/invocations"
        );
    }
}
