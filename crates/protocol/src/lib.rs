//! Data model shared by every stage of the deployment pipeline.
//!
//! Nothing in this crate performs I/O against the remote platform. It holds
//! the persisted project configuration, the shapes exchanged with the
//! function, object and gateway stores, the normalized remote error
//! taxonomy, and the route table an API module declares.

pub mod config;
pub mod error;
pub mod function;
pub mod gateway;
pub mod hook;
pub mod routes;

pub use config::{ApiSection, CONFIG_FILE_NAME, ConfigError, FunctionSection, ProjectConfig};
pub use error::{RemoteError, RemoteErrorKind};
pub use function::{
    AliasConfiguration, CodeSource, ConfigurationUpdate, FunctionConfiguration, LATEST,
    function_arn, qualified_arn,
};
pub use gateway::{
    DeploymentRequest, IntegrationKind, IntegrationResponse, IntegrationSpec, MethodResponse,
    MethodSpec, Resource, RestApi, Stage,
};
pub use hook::HookOutcome;
pub use routes::{ApiConfig, Route, RouteOptions, RouteSet};
