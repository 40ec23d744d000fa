//! Isolated copy of a project, ready for dependency resolution.
//!
//! The source directory is never modified. Everything happens inside a
//! [`WorkingDirectory`] unique to the run, which is removed when the run
//! ends whatever its outcome.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::PackageError;
use crate::manifest;
use crate::toolchain::{InstallOptions, Toolchain};

/// Prefix of every working directory created under the work root.
pub const WORKDIR_PREFIX: &str = "funcdeploy-";

/// Directory holding a locally-resolved dependency tree.
pub const DEPENDENCY_DIR: &str = "node_modules";

/// Entries never copied into a package.
const ALWAYS_SKIPPED: &[&str] = &[".git"];

/// Scratch directory owned by one run.
#[derive(Debug)]
pub struct WorkingDirectory {
    path: PathBuf,
    removed: bool,
}

impl WorkingDirectory {
    /// Creates `<work_root>/funcdeploy-<uuid>`.
    pub fn create(work_root: &Path) -> Result<Self, PackageError> {
        let path = work_root.join(format!("{WORKDIR_PREFIX}{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        debug!(path = %path.display(), "created working directory");
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the directory now, reporting failures.
    pub fn close(mut self) -> Result<(), PackageError> {
        self.removed = true;
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove working directory");
        }
    }
}

/// Rejects the system temp directory as a source.
pub fn guard_source_dir(source: &Path) -> Result<(), PackageError> {
    guard_source_dir_against(source, &std::env::temp_dir())
}

/// Rejects `source` when it is `temp_root` itself.
pub fn guard_source_dir_against(source: &Path, temp_root: &Path) -> Result<(), PackageError> {
    let canonical =
        |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    if canonical(source) == canonical(temp_root) {
        return Err(PackageError::SourceIsTempDir);
    }
    Ok(())
}

/// Options controlling how dependencies end up in the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageOptions {
    /// Copy the local dependency tree verbatim instead of installing.
    pub use_local_dependencies: bool,
    /// Keep dependencies flagged optional.
    pub optional_dependencies: bool,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            use_local_dependencies: false,
            optional_dependencies: true,
        }
    }
}

/// Recursively copies `source` into `dest`.
///
/// Version-control metadata is skipped, as is the dependency tree unless
/// `include_dependencies` is set. `dest` itself is skipped when it lives
/// inside `source`. Returns the number of files copied.
pub fn copy_project(
    source: &Path,
    dest: &Path,
    include_dependencies: bool,
) -> Result<u64, PackageError> {
    let mut copied = 0;
    let skip_dest = std::fs::canonicalize(dest).ok();
    copy_dir(source, dest, include_dependencies, skip_dest.as_deref(), true, &mut copied)?;
    Ok(copied)
}

fn copy_dir(
    from: &Path,
    to: &Path,
    include_dependencies: bool,
    skip: Option<&Path>,
    top_level: bool,
    copied: &mut u64,
) -> Result<(), PackageError> {
    std::fs::create_dir_all(to)?;

    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if ALWAYS_SKIPPED.contains(&name.as_ref()) {
            continue;
        }
        if top_level && name == DEPENDENCY_DIR && !include_dependencies {
            continue;
        }

        // Follows symlinks so linked packages are materialized.
        let metadata = std::fs::metadata(&path)?;
        if metadata.is_dir() {
            if skip.is_some_and(|s| std::fs::canonicalize(&path).is_ok_and(|p| p == s)) {
                continue;
            }
            copy_dir(&path, &to.join(&*name), include_dependencies, skip, false, copied)?;
        } else if metadata.is_file() {
            std::fs::copy(&path, to.join(&*name))?;
            *copied += 1;
        }
    }

    Ok(())
}

/// Copies the project and resolves its dependencies inside `workdir`.
///
/// Relative `file:` dependencies are rewired to the original location before
/// installation, since the copy changes the base they resolve from.
pub async fn build_package(
    toolchain: &dyn Toolchain,
    source: &Path,
    workdir: &WorkingDirectory,
    options: PackageOptions,
) -> Result<(), PackageError> {
    let dest = workdir.path();
    let files = copy_project(source, dest, options.use_local_dependencies)?;
    let rewired = manifest::rewire_relative_dependencies(dest, source)?;
    info!(
        files,
        rewired,
        local = options.use_local_dependencies,
        "copied project into working directory"
    );

    if !options.use_local_dependencies {
        toolchain
            .install(
                dest,
                InstallOptions {
                    optional: options.optional_dependencies,
                },
            )
            .await?;
    }
    Ok(())
}
