use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};

/// 5 MB upload limit for images
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// URL prefix the uploads directory is served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// On-disk image storage for issue photos and avatars.
///
/// Files are content-addressed as `{sha256}.{ext}`, so re-uploading the same
/// image reuses the stored copy.
pub struct Uploads {
    dir: PathBuf,
}

impl Uploads {
    pub async fn new(dir: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate and store an image, returning its public relative URL.
    pub async fn save_image(&self, file_name: &str, bytes: &[u8]) -> ApiResult<String> {
        if bytes.is_empty() {
            return Err(ApiError::validation("uploaded image is empty"));
        }
        if bytes.len() > MAX_IMAGE_SIZE {
            return Err(ApiError::PayloadTooLarge {
                limit_bytes: MAX_IMAGE_SIZE,
            });
        }

        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .filter(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
            .ok_or_else(|| {
                ApiError::validation(format!(
                    "image must be one of: {}",
                    IMAGE_EXTENSIONS.join(", ")
                ))
            })?;

        let digest = hex::encode(Sha256::digest(bytes));
        let stored_name = format!("{}.{}", digest, ext);
        let path = self.dir.join(&stored_name);

        if !fs::try_exists(&path).await.unwrap_or(false) {
            fs::write(&path, bytes).await.map_err(|e| {
                error!("Failed to write upload {}: {}", path.display(), e);
                ApiError::Internal
            })?;
        }

        Ok(format!("{}/{}", UPLOADS_ROUTE, stored_name))
    }
}

/// Text fields of a multipart form plus the stored URL of its image part.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    pub image_url: Option<String>,
}

impl MultipartForm {
    /// Drain a multipart body. The part named `file_field` is stored as an
    /// image; every other part is read as text.
    pub async fn read(
        mut multipart: Multipart,
        uploads: &Uploads,
        file_field: &str,
    ) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if name == file_field {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                // Browsers send an empty part when no file was chosen
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                form.image_url = Some(uploads.save_image(&file_name, &bytes).await?);
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Trimmed value, `None` when absent or blank.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn required(&self, name: &str) -> ApiResult<String> {
        self.text(name)
            .ok_or_else(|| ApiError::validation(format!("{} is required", name)))
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge {
            limit_bytes: MAX_IMAGE_SIZE,
        }
    } else {
        ApiError::validation(format!("malformed multipart body: {}", e.body_text()))
    }
}
