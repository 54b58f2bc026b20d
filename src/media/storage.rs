//! On-disk storage of uploaded photos.
//!
//! Files land in a single flat directory named `{unix_seconds}_{md5[..8]}{ext}`
//! and are served back under a fixed URL prefix.

use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::hashing::short_hash;
use super::heic;
use crate::config::UploadConfig;

const DEFAULT_EXTENSION: &str = ".jpg";
const DEFAULT_URL_PREFIX: &str = "/uploads/photos";

#[derive(Debug, Clone)]
pub struct StoredPhoto {
    /// Public URL, `{url_prefix}/{file name}`
    pub file_url: String,
    pub path: PathBuf,
    /// False when an identical file with the same name was already on disk
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct PhotoStorage {
    dir: PathBuf,
    url_prefix: String,
    convert_heic: bool,
}

impl PhotoStorage {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: &str, convert_heic: bool) -> Self {
        let trimmed = url_prefix.trim().trim_end_matches('/');
        let url_prefix = if trimmed.is_empty() {
            DEFAULT_URL_PREFIX.to_string()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self {
            dir: dir.into(),
            url_prefix,
            convert_heic,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(&config.dir, &config.url_prefix, config.convert_heic)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create upload directory {}", self.dir.display()))
    }

    /// Write an upload to disk, transcoding HEIC to JPEG when enabled.
    pub fn save(&self, bytes: &[u8], original_filename: &str, timestamp: i64) -> Result<StoredPhoto> {
        let ext = stored_extension(original_filename);
        let hash = short_hash(bytes);

        let (data, ext) = match ext {
            Some(ext) if heic::is_heif_extension(&ext) && self.convert_heic => {
                if heic::SUPPORTED {
                    let jpeg = heic::transcode_to_jpeg(bytes)
                        .with_context(|| format!("Failed to convert {} to JPEG", original_filename))?;
                    info!(filename = original_filename, "Converted HEIC upload to JPEG");
                    (Cow::Owned(jpeg), DEFAULT_EXTENSION.to_string())
                } else {
                    warn!(
                        filename = original_filename,
                        "HEIC support not compiled in, storing original file"
                    );
                    (Cow::Borrowed(bytes), format!(".{}", ext))
                }
            }
            Some(ext) => (Cow::Borrowed(bytes), format!(".{}", ext)),
            None => (Cow::Borrowed(bytes), DEFAULT_EXTENSION.to_string()),
        };

        let name = format!("{}_{}{}", timestamp, hash, ext);
        let path = self.dir.join(&name);

        self.ensure_dir()?;
        let created = !path.exists();
        fs::write(&path, &data).with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(StoredPhoto {
            file_url: format!("{}/{}", self.url_prefix, name),
            path,
            created,
        })
    }

    /// Remove a file written by `save`, unless it predates that call.
    pub fn discard(&self, stored: &StoredPhoto) {
        if !stored.created {
            return;
        }
        if let Err(e) = fs::remove_file(&stored.path) {
            warn!("Failed to remove {}: {}", stored.path.display(), e);
        }
    }

    /// Map a public URL back to its file, rejecting anything outside the
    /// upload directory.
    pub fn resolve(&self, file_url: &str) -> Option<PathBuf> {
        let name = file_url.strip_prefix(&self.url_prefix)?.strip_prefix('/')?;
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\']);
        valid.then(|| self.dir.join(name))
    }

    /// Delete the file behind `file_url`. Returns false if there was none.
    pub fn remove(&self, file_url: &str) -> Result<bool> {
        let Some(path) = self.resolve(file_url) else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("Failed to delete {}", path.display()))?;
        Ok(true)
    }
}

/// Lowercased extension of an uploaded file name, if it is a plain
/// alphanumeric one.
fn stored_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?;
    (!ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}
