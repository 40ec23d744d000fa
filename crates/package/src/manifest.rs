//! Edits to the packaged project manifest (`package.json`).

use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::builder::DEPENDENCY_DIR;
use crate::error::PackageError;

pub const MANIFEST_FILE: &str = "package.json";

const DEPENDENCY_SECTIONS: &[&str] = &["dependencies", "devDependencies", "optionalDependencies"];
const OPTIONAL_SECTION: &str = "optionalDependencies";

fn read_manifest(dir: &Path) -> Result<Option<Map<String, Value>>, PackageError> {
    let path = dir.join(MANIFEST_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str(&content)? {
        Value::Object(map) => Ok(Some(map)),
        _ => Err(PackageError::Manifest {
            file: MANIFEST_FILE.to_string(),
            detail: "top-level value is not an object".to_string(),
        }),
    }
}

fn write_manifest(dir: &Path, manifest: Map<String, Value>) -> Result<(), PackageError> {
    let content = serde_json::to_string_pretty(&Value::Object(manifest))?;
    std::fs::write(dir.join(MANIFEST_FILE), content)?;
    Ok(())
}

/// Rewrites relative local dependency references in the packaged manifest so
/// they resolve against `original_dir`. Returns how many were rewritten.
///
/// Handles `file:<relative>` specs and bare `./` or `../` paths.
pub fn rewire_relative_dependencies(
    package_dir: &Path,
    original_dir: &Path,
) -> Result<usize, PackageError> {
    let Some(mut manifest) = read_manifest(package_dir)? else {
        return Ok(0);
    };
    let base = std::fs::canonicalize(original_dir).unwrap_or_else(|_| original_dir.to_path_buf());

    let mut rewired = 0;
    for section in DEPENDENCY_SECTIONS {
        let Some(Value::Object(deps)) = manifest.get_mut(*section) else {
            continue;
        };
        for (name, spec) in deps.iter_mut() {
            let Some(relative) = spec.as_str().and_then(relative_reference) else {
                continue;
            };
            let absolute = normalize(&base.join(relative));
            let replacement = format!("file:{}", absolute.display());
            debug!(dependency = %name, to = %replacement, "rewired local dependency");
            *spec = Value::String(replacement);
            rewired += 1;
        }
    }

    if rewired > 0 {
        write_manifest(package_dir, manifest)?;
    }
    Ok(rewired)
}

/// Relative path of a local dependency spec, if it is one.
fn relative_reference(spec: &str) -> Option<&str> {
    let path = spec.strip_prefix("file:").unwrap_or(spec);
    let is_local = spec.starts_with("file:") || path.starts_with("./") || path.starts_with("../");
    (is_local && !Path::new(path).is_absolute()).then_some(path)
}

/// Lexically resolves `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Removes every package named in `optionalDependencies` from the packaged
/// dependency tree and drops that section from the manifest.
///
/// Returns the names that were declared optional.
pub fn remove_optional_dependencies(package_dir: &Path) -> Result<Vec<String>, PackageError> {
    let Some(mut manifest) = read_manifest(package_dir)? else {
        return Ok(Vec::new());
    };
    let Some(optional) = manifest.remove(OPTIONAL_SECTION) else {
        return Ok(Vec::new());
    };
    let names: Vec<String> = match optional {
        Value::Object(deps) => deps.keys().cloned().collect(),
        _ => Vec::new(),
    };

    for name in &names {
        let installed = package_dir.join(DEPENDENCY_DIR).join(name);
        match std::fs::remove_dir_all(&installed) {
            Ok(()) => debug!(dependency = %name, "removed optional dependency"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    write_manifest(package_dir, manifest)?;
    Ok(names)
}
