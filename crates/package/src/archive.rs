//! Compressed archive of the final package tree.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PackageError;

/// Archive produced once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArchive {
    pub path: PathBuf,
    pub size: u64,
    /// Hex SHA-256 of the archive bytes.
    pub sha256: String,
}

impl PackageArchive {
    /// Key used when the archive is staged in the object store.
    pub fn object_key(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn read(&self) -> Result<Vec<u8>, PackageError> {
        Ok(std::fs::read(&self.path)?)
    }

    /// Deletes the archive file; a missing file is not an error.
    pub fn remove(&self) -> Result<(), PackageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Archive location for `function`: `<work_root>/<function>-<uuid>.zip`.
///
/// Sits beside the working directory rather than inside it, so that tearing
/// down the working directory leaves a kept archive in place.
pub fn archive_path(work_root: &Path, function: &str) -> PathBuf {
    work_root.join(format!("{function}-{}.zip", uuid::Uuid::new_v4()))
}

/// Zips every file below `source_dir` into `dest`.
///
/// Entry names are relative with `/` separators, added in sorted order. Unix
/// permission bits are preserved. On failure no partial file is left at
/// `dest`.
pub fn write_archive(source_dir: &Path, dest: &Path) -> Result<PackageArchive, PackageError> {
    let mut files = Vec::new();
    collect_files(source_dir, source_dir, &mut files)?;
    files.sort();
    write_entries(&files, dest)
}

fn write_entries(files: &[(String, PathBuf)], dest: &Path) -> Result<PackageArchive, PackageError> {
    if let Err(e) = write_zip(files, dest) {
        match std::fs::remove_file(dest) {
            Ok(()) => {}
            Err(remove) if remove.kind() == std::io::ErrorKind::NotFound => {}
            Err(remove) => {
                tracing::warn!(path = %dest.display(), error = %remove, "failed to remove partial archive");
            }
        }
        return Err(e);
    }

    let (size, sha256) = digest_file(dest)?;
    tracing::info!(
        path = %dest.display(),
        files = files.len(),
        size,
        "wrote package archive"
    );
    Ok(PackageArchive {
        path: dest.to_path_buf(),
        size,
        sha256,
    })
}

fn write_zip(files: &[(String, PathBuf)], dest: &Path) -> Result<(), PackageError> {
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(file);
    for (name, path) in files {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(file_mode(path)?);
        zip.start_file(name.as_str(), options)?;
        let mut reader = BufReader::new(File::open(path)?);
        std::io::copy(&mut reader, &mut zip)?;
    }
    zip.finish()?.flush()?;
    Ok(())
}

fn collect_files(
    root: &Path,
    current: &Path,
    files: &mut Vec<(String, PathBuf)>,
) -> Result<(), PackageError> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = std::fs::metadata(&path)?;

        if metadata.is_dir() {
            collect_files(root, &path, files)?;
        } else if metadata.is_file() {
            let rel_path = path.strip_prefix(root).map_err(std::io::Error::other)?;
            let name = rel_path.to_string_lossy().replace('\\', "/");
            files.push((name, path));
        }
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Result<u32, PackageError> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::metadata(path)?.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Result<u32, PackageError> {
    Ok(0o644)
}

fn digest_file(path: &Path) -> Result<(u64, String), PackageError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hex::encode(hasher.finalize())))
}
