//! Media storage for uploaded image and file items
//!
//! Uploads are written under the configured media root:
//! - images as `images/<uuid>.<ext>`
//! - files as `files/<uuid>/<original name>`, so the download keeps its name
//!
//! Stored paths are relative to the root and served under the URL prefix.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::models::ItemKind;

/// A file received from a form
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

pub struct MediaStorage {
    root: PathBuf,
    url_prefix: String,
    config: UploadConfig,
}

impl MediaStorage {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            root: config.path.clone(),
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
            config: config.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Validation messages for an upload of the given kind; empty when valid
    pub fn check(&self, kind: ItemKind, upload: &Upload) -> Vec<String> {
        let mut problems = Vec::new();

        if upload.data.is_empty() {
            problems.push("The submitted file is empty.".to_string());
        }
        if upload.data.len() as u64 > self.config.max_file_size {
            problems.push(format!(
                "File too large. Maximum size: {} MB.",
                self.config.max_file_size / 1024 / 1024
            ));
        }
        if kind == ItemKind::Image && !self.config.is_type_allowed(&upload.content_type) {
            problems.push(format!(
                "Upload a valid image. Unsupported type: {}.",
                upload.content_type
            ));
        }

        problems
    }

    /// Write an upload to disk and return its path relative to the root
    pub async fn store(&self, kind: ItemKind, upload: &Upload) -> Result<String> {
        let relative = match kind {
            ItemKind::Image => format!(
                "images/{}.{}",
                Uuid::new_v4(),
                extension_for(&upload.file_name, &upload.content_type)
            ),
            _ => format!("files/{}/{}", Uuid::new_v4(), sanitize_file_name(&upload.file_name)),
        };

        let path = self.root.join(&relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create media directory: {:?}", parent))?;
        }
        fs::write(&path, &upload.data)
            .await
            .with_context(|| format!("Failed to save upload: {:?}", path))?;

        tracing::debug!("Stored {} upload at {}", kind, relative);
        Ok(relative)
    }

    /// Remove a stored file. Missing files and paths outside the root are
    /// ignored.
    pub async fn remove(&self, relative: &str) {
        let Some(path) = self.resolve(relative) else {
            tracing::warn!("Refusing to remove media path outside root: {}", relative);
            return;
        };

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove media file {:?}: {}", path, e),
        }

        if relative.starts_with("files/") {
            if let Some(parent) = path.parent() {
                let _ = fs::remove_dir(parent).await;
            }
        }
    }

    /// Public URL of a stored file
    pub fn url_for(&self, relative: &str) -> String {
        format!("{}/{}", self.url_prefix, relative.trim_start_matches('/'))
    }

    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let rel = Path::new(relative);
        if rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            Some(self.root.join(rel))
        } else {
            None
        }
    }
}

/// Keep the last path segment and replace anything unusual with `_`
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload.bin".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Extension from the file name, falling back to the content type
fn extension_for(file_name: &str, content_type: &str) -> String {
    if let Some((_, ext)) = file_name.rsplit_once('.') {
        if !ext.is_empty() && ext.len() < 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_lowercase();
        }
    }

    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
    .to_string()
}

/// Original file name of a stored `files/<uuid>/<name>` path
pub fn display_name(relative: &str) -> &str {
    relative.rsplit('/').next().unwrap_or(relative)
}
