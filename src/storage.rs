//! Object storage for uploaded media, kept on local disk under the upload
//! directory and served back at `<public base>/uploads/<folder>/<name>`.

use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_UPLOAD_FOLDER: &str = "general";
pub const UPLOADS_ROUTE: &str = "uploads";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
    #[error("Empty upload: {0}")]
    Empty(String),
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Pdf,
    Document,
    File,
}

impl FileType {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime == "application/pdf" {
            Self::Pdf
        } else if mime.contains("word") || mime == "text/plain" || mime == "application/rtf" {
            Self::Document
        } else {
            Self::File
        }
    }
}

/// One file in an upload batch.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn mime(&self) -> String {
        self.content_type
            .clone()
            .filter(|c| !c.is_empty() && c != "application/octet-stream")
            .unwrap_or_else(|| {
                mime_guess::from_path(&self.name)
                    .first_or_octet_stream()
                    .to_string()
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    /// Original file name as uploaded.
    pub name: String,
    pub url: String,
    pub file_type: FileType,
    pub size: u64,
    /// Storage path relative to the upload directory.
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// URL prefix every stored file is served under.
    pub fn public_prefix(&self) -> String {
        format!("{}/{}/", self.public_base_url, UPLOADS_ROUTE)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.public_prefix(), path)
    }

    /// Maps a storage path onto disk. Only plain relative components are allowed.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !plain {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    pub async fn upload(&self, folder: &str, file: FileUpload) -> Result<UploadedFile, StorageError> {
        if file.bytes.is_empty() {
            return Err(StorageError::Empty(file.name));
        }

        let folder = sanitize_folder(folder);
        let stored_name = generate_file_name(&file.name);
        let path = format!("{}/{}", folder, stored_name);
        let target = self.resolve(&path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &file.bytes).await?;

        let mime = file.mime();
        info!(path = %path, size = file.bytes.len(), mime = %mime, "Stored upload");
        Ok(UploadedFile {
            id: stored_name,
            url: self.public_url(&path),
            file_type: FileType::from_mime(&mime),
            size: file.bytes.len() as u64,
            name: file.name,
            path,
        })
    }

    /// Stores every file concurrently; the first failure fails the batch.
    pub async fn upload_many(
        &self,
        folder: &str,
        files: Vec<FileUpload>,
    ) -> Result<Vec<UploadedFile>, StorageError> {
        try_join_all(files.into_iter().map(|file| self.upload(folder, file))).await
    }

    /// File contents and guessed MIME type.
    pub async fn read(&self, path: &str) -> Result<(Vec<u8>, String), StorageError> {
        let target = self.resolve(path)?;
        let bytes = fs::read(&target).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::Io(e),
        })?;
        let mime = mime_guess::from_path(&target)
            .first_or_octet_stream()
            .to_string();
        Ok((bytes, mime))
    }

    pub async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        fs::remove_file(&target).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::Io(e),
        })?;
        info!(path, "Deleted upload");
        Ok(())
    }
}

/// Sanitizes each segment of a folder path; blank input means the default folder.
pub fn sanitize_folder(folder: &str) -> String {
    let segments: Vec<String> = folder
        .split('/')
        .map(|s| sanitize_filename::sanitize(s.trim()))
        .filter(|s| !s.is_empty() && s != "." && s != "..")
        .collect();
    if segments.is_empty() {
        DEFAULT_UPLOAD_FOLDER.to_string()
    } else {
        segments.join("/")
    }
}

/// `<unix millis>-<random>.<ext>`, keeping the original extension.
pub fn generate_file_name(original: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    let stem = format!("{}-{}", Utc::now().timestamp_millis(), &random[..10]);
    let extension = Path::new(&sanitize_filename::sanitize(original))
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| !e.is_empty());
    match extension {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Human-readable size with 1024 steps, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
