//! Function deploy pipeline.
//!
//! This crate implements the **business logic** of updating a deployed
//! function. It has no CLI or cloud SDK dependency: callers supply a
//! [`Platform`](funcdeploy_remote::Platform) and a
//! [`Toolchain`](funcdeploy_package::Toolchain).
//!
//! # Pipeline
//!
//! 1. **Load**: read the remote configuration, check the API exists
//! 2. **Package**: copy into a working directory, resolve dependencies
//! 3. **Validate**: load the entry module in a clean process
//! 4. **Configure**: handler upgrade and environment, only if changed
//! 5. **Zip**: strip optional dependencies on request, write the archive
//! 6. **Publish**: upload code, publish a new version
//! 7. **Alias**: point the requested alias at that version
//! 8. **Gateway**: sync routes and deploy the alias stage, run post-deploy

pub mod deploy;
pub mod env;
pub mod error;
pub mod hook;
pub mod options;
pub mod types;
pub mod version;

pub use deploy::DeployOrchestrator;
pub use env::{EnvOverrides, parse_env_csv, read_env_json};
pub use error::DeployError;
pub use hook::{hook_event, run_post_deploy};
pub use options::{DEFAULT_ALIAS, UpdateOptions};
pub use types::{DeployEvent, DeploymentResult, PostDeployReport, stage};
pub use version::{VersionManager, plan_configuration_update};
