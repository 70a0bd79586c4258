// src/storage.rs
//! Directory-as-database for harvested posts.
//!
//! Layout: `{root}/{account}/{post_id}/` holding the media files plus exactly one
//! `{YYYY-mm-dd_HH-MM-SS}_UTC_metadata.json`. Listing never fails (a missing
//! directory is just empty) and deletes are best-effort, because a harvest reset
//! and a transform request may touch the same tree at the same time.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const METADATA_SUFFIX: &str = "_metadata.json";
pub const PROCESSED_PREFIX: &str = "processed_";

const MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "mp4"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io failure during {operation} at {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed metadata record at {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid path component: {0:?}")]
    InvalidName(String),
}

impl StorageError {
    fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Snapshot of a post taken at harvest time. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataRecord {
    pub id: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub caption: Option<String>,
    pub media_type: String,
    pub likes: u64,
    pub comments: u64,
}

impl MetadataRecord {
    pub fn file_name(&self) -> String {
        metadata_file_name(&self.timestamp)
    }

    pub fn caption_or_empty(&self) -> &str {
        self.caption.as_deref().unwrap_or_default()
    }
}

/// `2024-05-01_12-30-00_UTC_metadata.json`
pub fn metadata_file_name(ts: &DateTime<Utc>) -> String {
    format!("{}_UTC{}", ts.format("%Y-%m-%d_%H-%M-%S"), METADATA_SUFFIX)
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn account_dir(&self, account: &str) -> PathBuf {
        self.root.join(account)
    }

    pub fn post_dir(&self, account: &str, post_id: &str) -> PathBuf {
        self.root.join(account).join(post_id)
    }

    /// Wipe the whole dataset and recreate an empty root.
    ///
    /// **Destructive**: every harvested post that was not consumed yet is lost.
    /// Each harvest cycle starts from a clean slate on purpose.
    pub fn reset_dataset(&self) -> Result<(), StorageError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io("reset", &self.root, e)),
        }
        fs::create_dir_all(&self.root).map_err(|e| StorageError::io("reset", &self.root, e))?;
        info!(target: "storage", root = %self.root.display(), "local storage cleared");
        Ok(())
    }

    pub fn create_post_dir(&self, account: &str, post_id: &str) -> Result<PathBuf, StorageError> {
        check_component(account)?;
        check_component(post_id)?;
        let dir = self.post_dir(account, post_id);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io("create post dir", &dir, e))?;
        Ok(dir)
    }

    /// Best-effort; never fails the caller.
    pub fn delete_post_dir(&self, account: &str, post_id: &str) {
        remove_tree_logged(&self.post_dir(account, post_id), "post");
    }

    /// Best-effort; never fails the caller.
    pub fn delete_account_dir(&self, account: &str) {
        let dir = self.account_dir(account);
        if remove_tree_logged(&dir, "account") {
            info!(target: "storage", dir = %dir.display(), "deleted account folder");
        }
    }

    pub fn list_accounts(&self) -> Vec<String> {
        list_subdirs(&self.root)
    }

    pub fn list_posts(&self, account: &str) -> Vec<String> {
        list_subdirs(&self.account_dir(account))
    }

    /// Media files of a post in lexicographic order, excluding previously processed outputs.
    pub fn list_media(&self, account: &str, post_id: &str) -> Vec<PathBuf> {
        let dir = self.post_dir(account, post_id);
        let mut names: Vec<String> = read_dir_names(&dir, |ft| ft.is_file())
            .into_iter()
            .filter(|n| !n.starts_with(PROCESSED_PREFIX) && has_media_extension(n))
            .collect();
        names.sort();
        names.into_iter().map(|n| dir.join(n)).collect()
    }

    /// Write the record next to the media through a temp file + rename.
    pub fn write_metadata(
        &self,
        post_dir: &Path,
        record: &MetadataRecord,
    ) -> Result<PathBuf, StorageError> {
        let path = post_dir.join(record.file_name());
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        let mut f =
            fs::File::create(&tmp).map_err(|e| StorageError::io("write metadata", &tmp, e))?;
        f.write_all(json.as_bytes())
            .map_err(|e| StorageError::io("write metadata", &tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StorageError::io("write metadata", &path, e))?;
        Ok(path)
    }

    /// `Ok(None)` when the post (or its metadata file) does not exist.
    pub fn read_metadata(
        &self,
        account: &str,
        post_id: &str,
    ) -> Result<Option<MetadataRecord>, StorageError> {
        let dir = self.post_dir(account, post_id);
        let mut names: Vec<String> = read_dir_names(&dir, |ft| ft.is_file())
            .into_iter()
            .filter(|n| n.ends_with(METADATA_SUFFIX))
            .collect();
        names.sort();
        let Some(name) = names.into_iter().next() else {
            return Ok(None);
        };
        let path = dir.join(name);
        let data = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io("read metadata", &path, e)),
        };
        let record = serde_json::from_str(&data).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        Ok(Some(record))
    }
}

fn check_component(s: &str) -> Result<(), StorageError> {
    let bad = s.is_empty()
        || s == "."
        || s == ".."
        || s.contains(['/', '\\'])
        || s.contains('\0');
    if bad {
        return Err(StorageError::InvalidName(s.to_string()));
    }
    Ok(())
}

fn has_media_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| MEDIA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_subdirs(dir: &Path) -> Vec<String> {
    let mut out = read_dir_names(dir, |ft| ft.is_dir());
    out.sort();
    out
}

fn read_dir_names(dir: &Path, keep: impl Fn(&fs::FileType) -> bool) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(it) => it,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(target: "storage", dir = %dir.display(), error = %e, "listing failed");
            }
            return Vec::new();
        }
    };
    entries
        .flatten()
        .filter(|e| e.file_type().map(|ft| keep(&ft)).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect()
}

/// Returns true when something was actually removed.
fn remove_tree_logged(dir: &Path, what: &'static str) -> bool {
    match fs::remove_dir_all(dir) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(target: "storage", dir = %dir.display(), what, "nothing to delete");
            false
        }
        Err(e) => {
            warn!(target: "storage", dir = %dir.display(), what, error = %e, "delete failed");
            false
        }
    }
}
