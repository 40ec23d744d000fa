//! In-memory platform implementing every collaborator trait.
//!
//! Behaves like the real platform where the pipeline depends on it: version
//! numbers only grow, aliases move independently, stages keep the route table
//! they were deployed with, and missing resources fail with the platform's
//! own error codes. Calls can be throttled on demand with
//! [`InMemoryPlatform::throttle_next`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use funcdeploy_protocol::function::{
    AliasConfiguration, CodeSource, ConfigurationUpdate, FunctionConfiguration, LATEST,
    function_arn, qualified_arn,
};
use funcdeploy_protocol::gateway::{
    DeploymentRequest, IntegrationKind, IntegrationResponse, IntegrationSpec, MethodResponse,
    MethodSpec, Resource, RestApi, Stage,
};
use funcdeploy_protocol::{RemoteError, Route};

use crate::store::{
    CallerIdentity, FunctionStore, GatewayStore, IdentityProvider, ObjectStore, Platform,
    RemoteFuture,
};

const FUNCTION_NOT_FOUND: &str = "ResourceNotFoundException";
const GATEWAY_NOT_FOUND: &str = "NotFoundException";

#[derive(Debug)]
struct FunctionRecord {
    latest: FunctionConfiguration,
    latest_code: Vec<u8>,
    /// Published versions, ascending. Index `i` holds version `i + 1`.
    versions: Vec<(FunctionConfiguration, Vec<u8>)>,
    aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct Binding {
    route: Route,
    uri: String,
}

#[derive(Debug)]
struct StageRecord {
    stage: Stage,
    bindings: Vec<Binding>,
}

#[derive(Debug)]
struct ApiRecord {
    api: RestApi,
    resources: Vec<Resource>,
    integrations: BTreeMap<(String, String), IntegrationKind>,
    stages: BTreeMap<String, StageRecord>,
    deployments: u64,
}

#[derive(Debug, Default)]
struct State {
    functions: BTreeMap<String, FunctionRecord>,
    apis: BTreeMap<String, ApiRecord>,
    objects: BTreeMap<(String, String), Vec<u8>>,
    calls: Vec<String>,
    throttle_remaining: u32,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:06}", self.next_id)
    }

    fn function(&mut self, name: &str, arn: &str) -> Result<&mut FunctionRecord, RemoteError> {
        self.functions.get_mut(name).ok_or_else(|| {
            RemoteError::not_found(FUNCTION_NOT_FOUND, format!("Function not found: {arn}"))
        })
    }

    fn api(&mut self, api_id: &str) -> Result<&mut ApiRecord, RemoteError> {
        self.apis.get_mut(api_id).ok_or_else(|| {
            RemoteError::not_found(GATEWAY_NOT_FOUND, format!("Invalid API identifier specified {api_id}"))
        })
    }
}

impl ApiRecord {
    fn resource_mut(&mut self, resource_id: &str) -> Result<&mut Resource, RemoteError> {
        self.resources
            .iter_mut()
            .find(|r| r.id == resource_id)
            .ok_or_else(|| {
                RemoteError::not_found(GATEWAY_NOT_FOUND, format!("Invalid Resource identifier specified {resource_id}"))
            })
    }

    fn require_method(&self, resource_id: &str, http_method: &str) -> Result<(), RemoteError> {
        let has = self
            .resources
            .iter()
            .any(|r| r.id == resource_id && r.methods.contains(http_method));
        if has {
            Ok(())
        } else {
            Err(RemoteError::not_found(
                GATEWAY_NOT_FOUND,
                format!("Invalid Method identifier specified {resource_id} {http_method}"),
            ))
        }
    }

    fn proxy_bindings(&self) -> Vec<Binding> {
        let mut bindings: Vec<Binding> = self
            .integrations
            .iter()
            .filter_map(|((resource_id, method), kind)| {
                let IntegrationKind::AwsProxy { uri } = kind else {
                    return None;
                };
                let resource = self.resources.iter().find(|r| &r.id == resource_id)?;
                Some(Binding {
                    route: Route {
                        path: resource.path.clone(),
                        method: method.clone(),
                    },
                    uri: uri.clone(),
                })
            })
            .collect();
        bindings.sort_by(|a, b| a.route.cmp(&b.route));
        bindings
    }
}

/// Function store, object store, gateway and identity in one process.
#[derive(Debug)]
pub struct InMemoryPlatform {
    account: String,
    region: String,
    state: Mutex<State>,
}

impl InMemoryPlatform {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Wraps a shared platform as the collaborator bundle.
    pub fn platform(self: &Arc<Self>) -> Platform {
        Platform {
            functions: self.clone(),
            objects: self.clone(),
            gateway: self.clone(),
            identity: self.clone(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records the call and applies pending throttling.
    fn enter(&self, call: &str) -> Result<MutexGuard<'_, State>, RemoteError> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        if state.throttle_remaining > 0 {
            state.throttle_remaining -= 1;
            return Err(RemoteError::throttled(
                "TooManyRequestsException",
                "Rate exceeded",
            ));
        }
        Ok(state)
    }

    fn arn(&self, name: &str) -> String {
        function_arn(&self.region, &self.account, name)
    }

    // --- seeding ---

    /// Creates a function whose `$LATEST` has the given handler and
    /// environment. Replaces any existing function of the same name.
    pub fn create_function(
        &self,
        name: &str,
        handler: &str,
        environment: Option<BTreeMap<String, String>>,
    ) -> FunctionConfiguration {
        let latest = FunctionConfiguration {
            function_name: name.to_string(),
            function_arn: self.arn(name),
            handler: handler.to_string(),
            role: format!("arn:aws:iam::{}:role/{name}-executor", self.account),
            runtime: "nodejs".to_string(),
            version: LATEST.to_string(),
            environment,
        };
        self.lock().functions.insert(
            name.to_string(),
            FunctionRecord {
                latest: latest.clone(),
                latest_code: Vec::new(),
                versions: Vec::new(),
                aliases: BTreeMap::new(),
            },
        );
        latest
    }

    /// Creates an empty API holding only its root resource; returns its id.
    pub fn create_api(&self, name: &str) -> String {
        let mut state = self.lock();
        let id = state.next_id("api");
        let root_id = state.next_id("res");
        state.apis.insert(
            id.clone(),
            ApiRecord {
                api: RestApi {
                    id: id.clone(),
                    name: name.to_string(),
                },
                resources: vec![Resource {
                    id: root_id,
                    parent_id: None,
                    path_part: String::new(),
                    path: "/".to_string(),
                    methods: Default::default(),
                }],
                integrations: BTreeMap::new(),
                stages: BTreeMap::new(),
                deployments: 0,
            },
        );
        id
    }

    pub fn delete_api(&self, api_id: &str) -> bool {
        self.lock().apis.remove(api_id).is_some()
    }

    /// Fails the next `n` calls, whichever they are, with a throttling error.
    pub fn throttle_next(&self, n: u32) {
        self.lock().throttle_remaining = n;
    }

    // --- inspection ---

    /// `service.method` of every call received, throttled ones included.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Number of published versions of `name` (zero for unknown functions).
    pub fn version_count(&self, name: &str) -> usize {
        self.lock()
            .functions
            .get(name)
            .map(|f| f.versions.len())
            .unwrap_or(0)
    }

    pub fn alias_target(&self, name: &str, alias: &str) -> Option<u64> {
        self.lock()
            .functions
            .get(name)?
            .aliases
            .get(alias)?
            .parse()
            .ok()
    }

    pub fn latest_configuration(&self, name: &str) -> Option<FunctionConfiguration> {
        self.lock().functions.get(name).map(|f| f.latest.clone())
    }

    /// Code archive published as `version`.
    pub fn version_code(&self, name: &str, version: u64) -> Option<Vec<u8>> {
        let state = self.lock();
        let index = usize::try_from(version).ok()?.checked_sub(1)?;
        state
            .functions
            .get(name)?
            .versions
            .get(index)
            .map(|(_, code)| code.clone())
    }

    /// Routes served by a stage, as snapshotted at its last deployment.
    pub fn stage_routes(&self, api_id: &str, stage: &str) -> Option<Vec<Route>> {
        let state = self.lock();
        let record = state.apis.get(api_id)?.stages.get(stage)?;
        Some(record.bindings.iter().map(|b| b.route.clone()).collect())
    }

    pub fn stage_variables(&self, api_id: &str, stage: &str) -> Option<BTreeMap<String, String>> {
        let state = self.lock();
        Some(state.apis.get(api_id)?.stages.get(stage)?.stage.variables.clone())
    }

    pub fn deployment_count(&self, api_id: &str) -> u64 {
        self.lock()
            .apis
            .get(api_id)
            .map(|a| a.deployments)
            .unwrap_or(0)
    }

    pub fn object_size(&self, bucket: &str, key: &str) -> Option<usize> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(Vec::len)
    }

    /// Function version a request to `stage` would reach.
    ///
    /// Resolves the stage's first proxy integration URI against the stage
    /// variables, then resolves an alias qualifier to its version.
    pub fn serving_version(&self, api_id: &str, stage: &str) -> Option<u64> {
        let state = self.lock();
        let record = state.apis.get(api_id)?.stages.get(stage)?;
        let binding = record.bindings.first()?;
        let uri = substitute_stage_variables(&binding.uri, &record.stage.variables);
        let arn = uri.split("/functions/").nth(1)?.strip_suffix("/invocations")?;
        let mut parts = arn.split(':').skip(6);
        let name = parts.next()?;
        let qualifier = parts.next()?;
        let function = state.functions.get(name)?;
        match qualifier.parse::<u64>() {
            Ok(version) => Some(version),
            Err(_) => function.aliases.get(qualifier)?.parse().ok(),
        }
    }

    // --- function store ---

    fn resolve_configuration(
        &self,
        name: &str,
        qualifier: Option<&str>,
    ) -> Result<FunctionConfiguration, RemoteError> {
        let arn = self.arn(name);
        let mut state = self.enter("lambda.getFunctionConfiguration")?;
        let function = state.function(name, &arn)?;
        let version = match qualifier {
            None | Some(LATEST) => return Ok(function.latest.clone()),
            Some(q) => match q.parse::<usize>() {
                Ok(n) => n,
                Err(_) => function
                    .aliases
                    .get(q)
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| {
                        RemoteError::not_found(
                            FUNCTION_NOT_FOUND,
                            format!("Function not found: {arn}:{q}"),
                        )
                    })?,
            },
        };
        version
            .checked_sub(1)
            .and_then(|i| function.versions.get(i))
            .map(|(cfg, _)| cfg.clone())
            .ok_or_else(|| {
                RemoteError::not_found(
                    FUNCTION_NOT_FOUND,
                    format!("Function not found: {arn}:{version}"),
                )
            })
    }

    fn apply_update(
        &self,
        name: &str,
        update: &ConfigurationUpdate,
    ) -> Result<FunctionConfiguration, RemoteError> {
        let arn = self.arn(name);
        let mut state = self.enter("lambda.updateFunctionConfiguration")?;
        let function = state.function(name, &arn)?;
        if let Some(handler) = &update.handler {
            function.latest.handler = handler.clone();
        }
        if let Some(environment) = &update.environment {
            function.latest.environment = Some(environment.clone());
        }
        Ok(function.latest.clone())
    }

    fn replace_code(
        &self,
        name: &str,
        code: CodeSource,
    ) -> Result<FunctionConfiguration, RemoteError> {
        let arn = self.arn(name);
        let mut state = self.enter("lambda.updateFunctionCode")?;
        let bytes = match code {
            CodeSource::ZipFile(bytes) => bytes,
            CodeSource::Object { bucket, key } => state
                .objects
                .get(&(bucket.clone(), key.clone()))
                .cloned()
                .ok_or_else(|| {
                    RemoteError::from_code(
                        "InvalidParameterValueException",
                        format!("Error occurred while GetObject. S3 Error Code: NoSuchKey. {bucket}/{key}"),
                    )
                })?,
        };
        let function = state.function(name, &arn)?;
        function.latest_code = bytes;
        Ok(function.latest.clone())
    }

    fn publish(&self, name: &str) -> Result<FunctionConfiguration, RemoteError> {
        let arn = self.arn(name);
        let (region, account) = (self.region.clone(), self.account.clone());
        let mut state = self.enter("lambda.publishVersion")?;
        let function = state.function(name, &arn)?;
        let number = (function.versions.len() + 1).to_string();
        let mut snapshot = function.latest.clone();
        snapshot.version = number.clone();
        snapshot.function_arn = qualified_arn(&region, &account, name, &number);
        function
            .versions
            .push((snapshot.clone(), function.latest_code.clone()));
        Ok(snapshot)
    }

    fn read_alias(
        &self,
        name: &str,
        alias: &str,
    ) -> Result<Option<AliasConfiguration>, RemoteError> {
        let arn = self.arn(name);
        let mut state = self.enter("lambda.getAlias")?;
        let function = state.function(name, &arn)?;
        Ok(function.aliases.get(alias).map(|version| AliasConfiguration {
            name: alias.to_string(),
            function_version: version.clone(),
            alias_arn: format!("{arn}:{alias}"),
        }))
    }

    fn write_alias(
        &self,
        call: &str,
        name: &str,
        alias: &str,
        version: &str,
        create: bool,
    ) -> Result<AliasConfiguration, RemoteError> {
        let arn = self.arn(name);
        let mut state = self.enter(call)?;
        let function = state.function(name, &arn)?;

        let published = version
            .parse::<usize>()
            .is_ok_and(|n| n >= 1 && n <= function.versions.len());
        if !published {
            return Err(RemoteError::not_found(
                FUNCTION_NOT_FOUND,
                format!("Function not found: {arn}:{version}"),
            ));
        }
        match (create, function.aliases.contains_key(alias)) {
            (true, true) => {
                return Err(RemoteError::from_code(
                    "ResourceConflictException",
                    format!("Alias already exists: {arn}:{alias}"),
                ));
            }
            (false, false) => {
                return Err(RemoteError::not_found(
                    FUNCTION_NOT_FOUND,
                    format!("Alias not found: {arn}:{alias}"),
                ));
            }
            _ => {}
        }
        function
            .aliases
            .insert(alias.to_string(), version.to_string());
        Ok(AliasConfiguration {
            name: alias.to_string(),
            function_version: version.to_string(),
            alias_arn: format!("{arn}:{alias}"),
        })
    }

    fn versions(&self, name: &str) -> Result<Vec<FunctionConfiguration>, RemoteError> {
        let arn = self.arn(name);
        let mut state = self.enter("lambda.listVersionsByFunction")?;
        let function = state.function(name, &arn)?;
        let mut all = vec![function.latest.clone()];
        all.extend(function.versions.iter().map(|(cfg, _)| cfg.clone()));
        Ok(all)
    }

    // --- gateway ---

    fn with_api<T>(
        &self,
        call: &str,
        api_id: &str,
        f: impl FnOnce(&mut ApiRecord) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let mut state = self.enter(call)?;
        f(state.api(api_id)?)
    }

    fn add_resource(
        &self,
        api_id: &str,
        parent_id: &str,
        path_part: &str,
    ) -> Result<Resource, RemoteError> {
        let mut state = self.enter("apigateway.createResource")?;
        let id = state.next_id("res");
        let api = state.api(api_id)?;
        let parent_path = api.resource_mut(parent_id)?.path.clone();
        if api
            .resources
            .iter()
            .any(|r| r.parent_id.as_deref() == Some(parent_id) && r.path_part == path_part)
        {
            return Err(RemoteError::from_code(
                "ConflictException",
                format!("Another resource with the same parent already has this name: {path_part}"),
            ));
        }
        let path = if parent_path == "/" {
            format!("/{path_part}")
        } else {
            format!("{parent_path}/{path_part}")
        };
        let resource = Resource {
            id,
            parent_id: Some(parent_id.to_string()),
            path_part: path_part.to_string(),
            path,
            methods: Default::default(),
        };
        api.resources.push(resource.clone());
        Ok(resource)
    }

    fn remove_resource(&self, api_id: &str, resource_id: &str) -> Result<(), RemoteError> {
        self.with_api("apigateway.deleteResource", api_id, |api| {
            if api.resource_mut(resource_id)?.is_root() {
                return Err(RemoteError::from_code(
                    "BadRequestException",
                    "Cannot delete the root resource",
                ));
            }
            let mut doomed = vec![resource_id.to_string()];
            let mut i = 0;
            while i < doomed.len() {
                let parent = doomed[i].clone();
                doomed.extend(
                    api.resources
                        .iter()
                        .filter(|r| r.parent_id.as_deref() == Some(parent.as_str()))
                        .map(|r| r.id.clone()),
                );
                i += 1;
            }
            api.resources.retain(|r| !doomed.contains(&r.id));
            api.integrations
                .retain(|(resource, _), _| !doomed.contains(resource));
            Ok(())
        })
    }

    fn deploy(&self, api_id: &str, request: &DeploymentRequest) -> Result<String, RemoteError> {
        let mut state = self.enter("apigateway.createDeployment")?;
        let deployment_id = state.next_id("dep");
        let api = state.api(api_id)?;
        api.deployments += 1;
        let bindings = api.proxy_bindings();
        api.stages.insert(
            request.stage_name.clone(),
            StageRecord {
                stage: Stage {
                    name: request.stage_name.clone(),
                    deployment_id: deployment_id.clone(),
                    variables: request.variables.clone(),
                },
                bindings,
            },
        );
        Ok(deployment_id)
    }
}

fn substitute_stage_variables(uri: &str, variables: &BTreeMap<String, String>) -> String {
    variables.iter().fold(uri.to_string(), |acc, (name, value)| {
        acc.replace(&format!("${{stageVariables.{name}}}"), value)
    })
}

fn ready<'a, T: Send + 'a>(result: Result<T, RemoteError>) -> RemoteFuture<'a, T> {
    Box::pin(std::future::ready(result))
}

impl FunctionStore for InMemoryPlatform {
    fn get_configuration(
        &self,
        name: &str,
        qualifier: Option<&str>,
    ) -> RemoteFuture<'_, FunctionConfiguration> {
        ready(self.resolve_configuration(name, qualifier))
    }

    fn update_configuration(
        &self,
        name: &str,
        update: &ConfigurationUpdate,
    ) -> RemoteFuture<'_, FunctionConfiguration> {
        ready(self.apply_update(name, update))
    }

    fn update_code(
        &self,
        name: &str,
        code: CodeSource,
    ) -> RemoteFuture<'_, FunctionConfiguration> {
        ready(self.replace_code(name, code))
    }

    fn publish_version(&self, name: &str) -> RemoteFuture<'_, FunctionConfiguration> {
        ready(self.publish(name))
    }

    fn get_alias(
        &self,
        name: &str,
        alias: &str,
    ) -> RemoteFuture<'_, Option<AliasConfiguration>> {
        ready(self.read_alias(name, alias))
    }

    fn create_alias(
        &self,
        name: &str,
        alias: &str,
        version: &str,
    ) -> RemoteFuture<'_, AliasConfiguration> {
        ready(self.write_alias("lambda.createAlias", name, alias, version, true))
    }

    fn update_alias(
        &self,
        name: &str,
        alias: &str,
        version: &str,
    ) -> RemoteFuture<'_, AliasConfiguration> {
        ready(self.write_alias("lambda.updateAlias", name, alias, version, false))
    }

    fn list_versions(&self, name: &str) -> RemoteFuture<'_, Vec<FunctionConfiguration>> {
        ready(self.versions(name))
    }
}

impl ObjectStore for InMemoryPlatform {
    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> RemoteFuture<'_, ()> {
        let result = self.enter("s3.upload").map(|mut state| {
            state
                .objects
                .insert((bucket.to_string(), key.to_string()), body);
        });
        ready(result)
    }
}

impl GatewayStore for InMemoryPlatform {
    fn get_api(&self, api_id: &str) -> RemoteFuture<'_, RestApi> {
        ready(self.with_api("apigateway.getRestApi", api_id, |api| Ok(api.api.clone())))
    }

    fn list_resources(&self, api_id: &str) -> RemoteFuture<'_, Vec<Resource>> {
        ready(self.with_api("apigateway.getResources", api_id, |api| {
            Ok(api.resources.clone())
        }))
    }

    fn delete_resource(&self, api_id: &str, resource_id: &str) -> RemoteFuture<'_, ()> {
        ready(self.remove_resource(api_id, resource_id))
    }

    fn create_resource(
        &self,
        api_id: &str,
        parent_id: &str,
        path_part: &str,
    ) -> RemoteFuture<'_, Resource> {
        ready(self.add_resource(api_id, parent_id, path_part))
    }

    fn put_method(&self, api_id: &str, method: &MethodSpec) -> RemoteFuture<'_, ()> {
        ready(self.with_api("apigateway.putMethod", api_id, |api| {
            api.resource_mut(&method.resource_id)?
                .methods
                .insert(method.http_method.clone());
            Ok(())
        }))
    }

    fn delete_method(
        &self,
        api_id: &str,
        resource_id: &str,
        http_method: &str,
    ) -> RemoteFuture<'_, ()> {
        ready(self.with_api("apigateway.deleteMethod", api_id, |api| {
            api.require_method(resource_id, http_method)?;
            api.resource_mut(resource_id)?.methods.remove(http_method);
            api.integrations
                .remove(&(resource_id.to_string(), http_method.to_string()));
            Ok(())
        }))
    }

    fn put_integration(
        &self,
        api_id: &str,
        integration: &IntegrationSpec,
    ) -> RemoteFuture<'_, ()> {
        ready(self.with_api("apigateway.putIntegration", api_id, |api| {
            api.require_method(&integration.resource_id, &integration.http_method)?;
            api.integrations.insert(
                (
                    integration.resource_id.clone(),
                    integration.http_method.clone(),
                ),
                integration.kind.clone(),
            );
            Ok(())
        }))
    }

    fn put_method_response(
        &self,
        api_id: &str,
        response: &MethodResponse,
    ) -> RemoteFuture<'_, ()> {
        ready(self.with_api("apigateway.putMethodResponse", api_id, |api| {
            api.require_method(&response.resource_id, &response.http_method)
        }))
    }

    fn put_integration_response(
        &self,
        api_id: &str,
        response: &IntegrationResponse,
    ) -> RemoteFuture<'_, ()> {
        ready(self.with_api("apigateway.putIntegrationResponse", api_id, |api| {
            api.require_method(&response.resource_id, &response.http_method)?;
            let key = (response.resource_id.clone(), response.http_method.clone());
            if api.integrations.contains_key(&key) {
                Ok(())
            } else {
                Err(RemoteError::not_found(
                    GATEWAY_NOT_FOUND,
                    "No integration defined for method",
                ))
            }
        }))
    }

    fn create_deployment(
        &self,
        api_id: &str,
        request: &DeploymentRequest,
    ) -> RemoteFuture<'_, String> {
        ready(self.deploy(api_id, request))
    }

    fn get_stage(&self, api_id: &str, stage_name: &str) -> RemoteFuture<'_, Option<Stage>> {
        ready(self.with_api("apigateway.getStage", api_id, |api| {
            Ok(api.stages.get(stage_name).map(|s| s.stage.clone()))
        }))
    }
}

impl IdentityProvider for InMemoryPlatform {
    fn get_caller_identity(&self) -> RemoteFuture<'_, CallerIdentity> {
        let result = self.enter("sts.getCallerIdentity").map(|_| CallerIdentity {
            account: self.account.clone(),
            arn: format!("arn:aws:iam::{}:user/deployer", self.account),
        });
        ready(result)
    }
}
