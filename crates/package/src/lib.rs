//! Packaging of a function project for deployment.
//!
//! A run copies the project into a scratch [`builder::WorkingDirectory`],
//! resolves its dependencies through a [`toolchain::Toolchain`], proves the
//! entry module loads in a clean process, strips optional dependencies on
//! request and zips the result into a [`archive::PackageArchive`].

pub mod archive;
pub mod builder;
pub mod error;
pub mod manifest;
pub mod module;
pub mod toolchain;
pub mod validation;

pub use archive::{PackageArchive, archive_path, write_archive};
pub use builder::{
    PackageOptions, WorkingDirectory, build_package, copy_project, guard_source_dir,
};
pub use error::PackageError;
pub use manifest::{remove_optional_dependencies, rewire_relative_dependencies};
pub use module::{ApiModule, ModuleDescription, PostDeployHook, load_api_module};
pub use toolchain::{
    CommandSpec, CommandToolchain, InstallOptions, ProbeResult, Toolchain, ToolchainConfig,
    ToolchainFuture,
};
pub use validation::{entry_module, validate_package};
