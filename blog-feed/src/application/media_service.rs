use chrono::{DateTime, Datelike, Utc};
use tracing::info;

use crate::data::media_store::MediaStore;
use crate::domain::error::DomainError;
use crate::domain::user::ViewerContext;

pub const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub path: String,
    pub url: String,
    pub markdown: String,
}

pub struct MediaService<M> {
    store: M,
    max_bytes: u64,
}

impl<M: MediaStore> MediaService<M> {
    pub fn new(store: M, max_bytes: u64) -> Self {
        Self { store, max_bytes }
    }

    pub async fn upload_image(
        &self,
        viewer: &ViewerContext,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedImage, DomainError> {
        viewer.require_user()?;
        if !ALLOWED_IMAGE_TYPES.contains(&content_type) {
            return Err(DomainError::Validation {
                field: "content_type",
                message: "must be a JPEG, PNG, GIF or WebP image",
            });
        }
        if bytes.is_empty() {
            return Err(DomainError::Validation {
                field: "file",
                message: "must not be empty",
            });
        }
        if bytes.len() as u64 > self.max_bytes {
            return Err(DomainError::Validation {
                field: "file",
                message: "exceeds the maximum upload size",
            });
        }

        let path = object_path(file_name, Utc::now());
        let size = bytes.len();
        self.store.upload(&path, bytes, content_type).await?;
        let url = self.store.public_url(&path);
        info!(%path, size, "image uploaded");

        Ok(UploadedImage {
            markdown: format!("![{}]({url})", alt_text(file_name)),
            path,
            url,
        })
    }
}

pub fn object_path(file_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}/{:02}/{}-{}",
        now.year(),
        now.month(),
        now.timestamp_millis(),
        clean_file_name(file_name)
    )
}

pub fn clean_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn alt_text(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);
    stem.replace(['[', ']'], "")
}
