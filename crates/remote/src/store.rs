//! Abstract remote collaborators consumed by the pipeline.
//!
//! Deployment logic stays decoupled from any cloud SDK and testable with
//! mocks. Implementations take owned copies of their arguments before
//! building the returned future, which only borrows `self`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use funcdeploy_protocol::function::{
    AliasConfiguration, CodeSource, ConfigurationUpdate, FunctionConfiguration,
};
use funcdeploy_protocol::gateway::{
    DeploymentRequest, IntegrationResponse, IntegrationSpec, MethodResponse, MethodSpec, Resource,
    RestApi, Stage,
};
use funcdeploy_protocol::RemoteError;

/// Future returned by every remote call.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Service names used when logging remote calls (`<service>.<method>`).
pub mod service {
    pub const FUNCTIONS: &str = "lambda";
    pub const OBJECTS: &str = "s3";
    pub const GATEWAY: &str = "apigateway";
    pub const IDENTITY: &str = "sts";
}

/// Function store: configuration, code, versions and aliases.
pub trait FunctionStore: Send + Sync {
    /// Reads the configuration of `$LATEST`, or of `qualifier` when given.
    fn get_configuration(
        &self,
        name: &str,
        qualifier: Option<&str>,
    ) -> RemoteFuture<'_, FunctionConfiguration>;

    fn update_configuration(
        &self,
        name: &str,
        update: &ConfigurationUpdate,
    ) -> RemoteFuture<'_, FunctionConfiguration>;

    /// Replaces the code behind `$LATEST`.
    fn update_code(&self, name: &str, code: CodeSource)
    -> RemoteFuture<'_, FunctionConfiguration>;

    /// Snapshots `$LATEST` into a new numbered version.
    fn publish_version(&self, name: &str) -> RemoteFuture<'_, FunctionConfiguration>;

    /// Returns `None` when the alias does not exist.
    fn get_alias(&self, name: &str, alias: &str)
    -> RemoteFuture<'_, Option<AliasConfiguration>>;

    fn create_alias(
        &self,
        name: &str,
        alias: &str,
        version: &str,
    ) -> RemoteFuture<'_, AliasConfiguration>;

    fn update_alias(
        &self,
        name: &str,
        alias: &str,
        version: &str,
    ) -> RemoteFuture<'_, AliasConfiguration>;

    /// `$LATEST` followed by every numbered version in ascending order.
    fn list_versions(&self, name: &str) -> RemoteFuture<'_, Vec<FunctionConfiguration>>;
}

/// Object store used to stage large archives.
pub trait ObjectStore: Send + Sync {
    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> RemoteFuture<'_, ()>;
}

/// HTTP gateway: resource tree, methods, integrations and stages.
pub trait GatewayStore: Send + Sync {
    fn get_api(&self, api_id: &str) -> RemoteFuture<'_, RestApi>;

    fn list_resources(&self, api_id: &str) -> RemoteFuture<'_, Vec<Resource>>;

    /// Deletes a resource and everything below it.
    fn delete_resource(&self, api_id: &str, resource_id: &str) -> RemoteFuture<'_, ()>;

    fn create_resource(
        &self,
        api_id: &str,
        parent_id: &str,
        path_part: &str,
    ) -> RemoteFuture<'_, Resource>;

    fn put_method(&self, api_id: &str, method: &MethodSpec) -> RemoteFuture<'_, ()>;

    /// Removes a method together with its integration.
    fn delete_method(
        &self,
        api_id: &str,
        resource_id: &str,
        http_method: &str,
    ) -> RemoteFuture<'_, ()>;

    fn put_integration(&self, api_id: &str, integration: &IntegrationSpec)
    -> RemoteFuture<'_, ()>;

    fn put_method_response(&self, api_id: &str, response: &MethodResponse)
    -> RemoteFuture<'_, ()>;

    fn put_integration_response(
        &self,
        api_id: &str,
        response: &IntegrationResponse,
    ) -> RemoteFuture<'_, ()>;

    /// Deploys the current resource tree to a stage; returns the deployment id.
    fn create_deployment(
        &self,
        api_id: &str,
        request: &DeploymentRequest,
    ) -> RemoteFuture<'_, String>;

    /// Returns `None` when the stage has never been deployed.
    fn get_stage(&self, api_id: &str, stage_name: &str) -> RemoteFuture<'_, Option<Stage>>;
}

/// Identity of the credentials the pipeline runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
}

pub trait IdentityProvider: Send + Sync {
    fn get_caller_identity(&self) -> RemoteFuture<'_, CallerIdentity>;
}

/// Bundle of every collaborator the orchestrator needs.
#[derive(Clone)]
pub struct Platform {
    pub functions: Arc<dyn FunctionStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub gateway: Arc<dyn GatewayStore>,
    pub identity: Arc<dyn IdentityProvider>,
}
