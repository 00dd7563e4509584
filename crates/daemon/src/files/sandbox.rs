//! Sandboxed path resolution and directory listing.
//!
//! Clients address files by logical paths such as `/photos/2024`. A logical
//! path is always interpreted relative to the storage root, normalized
//! lexically, and rejected if the result is not the root itself or one of its
//! descendants. This is the only boundary against directory traversal.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use protocol::{DirectoryEntry, DirectoryListing, EntryKind, ErrorCode};
use thiserror::Error;

/// Errors that can occur while resolving or listing a logical path.
///
/// Messages only ever mention the logical path, never the host path.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The path escapes the storage root.
    #[error("access outside the storage root is not allowed: {0}")]
    Unauthorized(String),

    /// The path does not exist.
    #[error("path not found: {0}")]
    NotFound(String),

    /// The host denied access to the path.
    #[error("permission denied: {0}")]
    AccessDenied(String),

    /// The path is malformed, for example it contains a NUL byte.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// The path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The storage root itself is unusable.
    #[error("invalid storage root {path}: {source}")]
    InvalidRoot {
        /// The configured root.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// Unexpected IO failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SandboxError {
    /// Returns the stable error classification sent to clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            SandboxError::Unauthorized(_) => ErrorCode::Unauthorized,
            SandboxError::NotFound(_) => ErrorCode::NotFound,
            SandboxError::AccessDenied(_) => ErrorCode::AccessDenied,
            SandboxError::InvalidPath(_) | SandboxError::NotADirectory(_) => {
                ErrorCode::ValidationError
            }
            SandboxError::InvalidRoot { .. } | SandboxError::Io(_) => ErrorCode::Internal,
        }
    }

    /// Message safe to send to a client.
    ///
    /// Unexpected failures are reduced to a generic message; the detail is
    /// only logged.
    pub fn client_message(&self) -> String {
        match self {
            SandboxError::InvalidRoot { .. } | SandboxError::Io(_) => {
                "an internal error occurred while reading the directory".to_string()
            }
            other => other.to_string(),
        }
    }

    fn from_io(err: io::Error, logical_path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => SandboxError::NotFound(logical_path.to_string()),
            io::ErrorKind::PermissionDenied => {
                SandboxError::AccessDenied(logical_path.to_string())
            }
            io::ErrorKind::NotADirectory => SandboxError::NotADirectory(logical_path.to_string()),
            io::ErrorKind::InvalidInput => SandboxError::InvalidPath(logical_path.to_string()),
            _ => SandboxError::Io(err),
        }
    }
}

/// Collapses `.`, `..` and redundant separators without touching the
/// filesystem. `..` at the filesystem root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                normalized.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = normalized.parent().is_none();
                if at_root {
                    if normalized.as_os_str().is_empty() {
                        normalized.push("..");
                    }
                } else if normalized.file_name().is_none() {
                    // Trailing ".." of a relative path
                    normalized.push("..");
                } else {
                    normalized.pop();
                }
            }
        }
    }
    normalized
}

/// Resolves a logical path against `root`.
///
/// Leading and trailing separators are stripped from `logical_path`, the
/// remainder is joined onto the root and normalized. The result must be the
/// normalized root or a descendant of it; the comparison is per path
/// component, so `/a/bb` is never accepted for root `/a/b`. Paths
/// containing a NUL byte are rejected as malformed.
pub fn resolve(root: &Path, logical_path: &str) -> Result<PathBuf, SandboxError> {
    if logical_path.contains('\0') {
        return Err(SandboxError::InvalidPath(logical_path.to_string()));
    }

    let trimmed = logical_path.trim_matches(|c| c == '/' || c == '\\');
    let root = normalize(root);
    let candidate = normalize(&root.join(trimmed));

    if candidate.starts_with(&root) {
        Ok(candidate)
    } else {
        tracing::warn!(
            logical_path = %logical_path,
            "Rejected path outside the storage root"
        );
        Err(SandboxError::Unauthorized(logical_path.to_string()))
    }
}

/// Joins an entry name onto the logical path it was listed under.
fn child_logical_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Lists the direct children of `resolved_path`.
///
/// `logical_path` is only used to build each entry's logical path and for
/// error messages. Entries that vanish or cannot be inspected while listing
/// are skipped. Directories come first, then files, each sorted
/// case-insensitively by name.
pub fn list_directory(
    resolved_path: &Path,
    logical_path: &str,
    include_hidden: bool,
) -> Result<Vec<DirectoryEntry>, SandboxError> {
    let metadata =
        fs::metadata(resolved_path).map_err(|e| SandboxError::from_io(e, logical_path))?;
    if !metadata.is_dir() {
        return Err(SandboxError::NotADirectory(logical_path.to_string()));
    }

    let read_dir =
        fs::read_dir(resolved_path).map_err(|e| SandboxError::from_io(e, logical_path))?;

    let mut entries = Vec::new();
    for entry_result in read_dir {
        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("Skipping unreadable directory entry: {}", e);
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if !include_hidden && name.starts_with('.') {
            continue;
        }

        // Follow symlinks like stat(2); fall back to the link itself when
        // the target is missing.
        let metadata = match fs::metadata(entry.path()).or_else(|_| entry.metadata()) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(name = %name, "Skipping entry without metadata: {}", e);
                continue;
            }
        };

        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let modified: DateTime<Utc> = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .into();

        entries.push(DirectoryEntry {
            logical_path: child_logical_path(logical_path, &name),
            name,
            kind,
            size_bytes: metadata.len(),
            modified_at: modified,
        });
    }

    entries.sort_by(|a, b| match (a.kind, b.kind) {
        (EntryKind::Directory, EntryKind::File) => std::cmp::Ordering::Less,
        (EntryKind::File, EntryKind::Directory) => std::cmp::Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });

    Ok(entries)
}

/// A storage root together with its listing policy.
///
/// The root is canonicalized once at construction. Resolution is lexical
/// first; when the resolved path exists it is also canonicalized and
/// re-checked, so a symlink inside the root cannot reach outside it.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    include_hidden: bool,
}

impl Sandbox {
    /// Creates a sandbox over an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let path = root.as_ref();
        let root = fs::canonicalize(path).map_err(|source| SandboxError::InvalidRoot {
            path: path.to_path_buf(),
            source,
        })?;
        if !root.is_dir() {
            return Err(SandboxError::InvalidRoot {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, "not a directory"),
            });
        }

        Ok(Self {
            root,
            include_hidden: true,
        })
    }

    /// Sets whether entries starting with '.' are listed.
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Returns the canonical storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a logical path to a host path inside the root.
    pub fn resolve(&self, logical_path: &str) -> Result<PathBuf, SandboxError> {
        let resolved = resolve(&self.root, logical_path)?;

        match fs::canonicalize(&resolved) {
            Ok(real) if real.starts_with(&self.root) => Ok(real),
            Ok(_) => {
                tracing::warn!(
                    logical_path = %logical_path,
                    "Rejected symlink pointing outside the storage root"
                );
                Err(SandboxError::Unauthorized(logical_path.to_string()))
            }
            // Missing paths are reported by the listing itself.
            Err(_) => Ok(resolved),
        }
    }

    /// Resolves and lists a logical directory.
    pub fn list(&self, logical_path: &str) -> Result<DirectoryListing, SandboxError> {
        let resolved = self.resolve(logical_path)?;
        let entries = list_directory(&resolved, logical_path, self.include_hidden)?;

        tracing::debug!(
            logical_path = %logical_path,
            entries = entries.len(),
            "Listed directory"
        );

        Ok(DirectoryListing {
            current_path: logical_path.to_string(),
            entries,
        })
    }
}
