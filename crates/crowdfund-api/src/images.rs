use std::time::Duration;

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::form::UploadedFile;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// What an uploaded image is for; decides size and format limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Campaign,
    Avatar,
}

impl ImageKind {
    fn max_bytes(self) -> usize {
        match self {
            Self::Campaign => 5 * 1024 * 1024,
            Self::Avatar => 2 * 1024 * 1024,
        }
    }

    fn formats(self) -> &'static [&'static str] {
        match self {
            Self::Campaign => &["jpeg", "jpg", "png", "gif"],
            Self::Avatar => &["jpeg", "jpg", "png"],
        }
    }

    fn folder(self) -> &'static str {
        match self {
            Self::Campaign => "crowdfunding/campaigns",
            Self::Avatar => "crowdfunding/avatars",
        }
    }

    /// Both the file extension and the `image/*` content type must be an
    /// allowed format.
    pub fn check(self, file: &UploadedFile) -> Result<(), ApiError> {
        if file.bytes.len() > self.max_bytes() {
            return Err(ApiError::validation(format!(
                "File too large: limit is {} MB",
                self.max_bytes() / (1024 * 1024)
            )));
        }

        let formats = self.formats();
        let extension = file
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let subtype = file
            .content_type
            .as_deref()
            .and_then(|ct| ct.strip_prefix("image/"))
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if formats.contains(&extension.as_str()) && formats.contains(&subtype.as_str()) {
            Ok(())
        } else {
            Err(ApiError::validation(format!(
                "Only image files are allowed ({})",
                formats.join(", ")
            )))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageHostConfig {
    /// Unsigned upload endpoint, e.g. `https://api.cloudinary.com/v1_1/<cloud>/image/upload`.
    pub upload_url: Option<String>,
    pub upload_preset: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image host is not configured")]
    NotConfigured,

    #[error("image upload failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("image host returned {0}")]
    Status(reqwest::StatusCode),

    #[error("image host response has no secure_url")]
    MissingUrl,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
}

/// Client for a Cloudinary-style unsigned image upload endpoint.
#[derive(Clone)]
pub struct ImageHost {
    client: Client,
    endpoint: Option<(String, String)>,
}

impl ImageHost {
    pub fn new(config: ImageHostConfig) -> Self {
        let endpoint = match (config.upload_url, config.upload_preset) {
            (Some(url), Some(preset)) if !url.trim().is_empty() && !preset.trim().is_empty() => {
                Some((url.trim().to_string(), preset.trim().to_string()))
            }
            _ => None,
        };
        if endpoint.is_none() {
            warn!("Image host not configured, uploads will use defaults");
        }

        Self {
            client: Client::builder()
                .timeout(UPLOAD_TIMEOUT)
                .build()
                .unwrap_or_else(|e| {
                    warn!("Falling back to default HTTP client: {}", e);
                    Client::new()
                }),
            endpoint,
        }
    }

    pub fn disabled() -> Self {
        Self::new(ImageHostConfig::default())
    }

    /// Uploads `file` and returns its public URL.
    pub async fn upload(&self, kind: ImageKind, public_id: &str, file: UploadedFile) -> Result<String, ImageError> {
        let (url, preset) = self.endpoint.as_ref().ok_or(ImageError::NotConfigured)?;

        let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name);
        if let Some(content_type) = &file.content_type {
            part = part.mime_str(content_type)?;
        }
        let form = Form::new()
            .text("upload_preset", preset.clone())
            .text("folder", kind.folder())
            .text("public_id", public_id.to_string())
            .part("file", part);

        let response = self.client.post(url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(ImageError::Status(response.status()));
        }
        let body: UploadResponse = response.json().await?;
        let secure_url = body.secure_url.ok_or(ImageError::MissingUrl)?;

        info!("Uploaded image {} to {}", public_id, secure_url);
        Ok(secure_url)
    }

    /// Like [`ImageHost::upload`], but a failure is logged and yields `None`.
    pub async fn upload_or_warn(&self, kind: ImageKind, public_id: &str, file: UploadedFile) -> Option<String> {
        match self.upload(kind, public_id, file).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Image upload for {} skipped: {}", public_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn file(name: &str, content_type: &str, len: usize) -> UploadedFile {
        UploadedFile {
            file_name: name.into(),
            content_type: Some(content_type.into()),
            bytes: Bytes::from(vec![0u8; len]),
        }
    }

    #[test]
    fn campaign_images_allow_gif_avatars_do_not() {
        assert!(ImageKind::Campaign.check(&file("a.gif", "image/gif", 10)).is_ok());
        assert!(ImageKind::Avatar.check(&file("a.gif", "image/gif", 10)).is_err());
        assert!(ImageKind::Avatar.check(&file("A.PNG", "image/png", 10)).is_ok());
    }

    #[test]
    fn extension_and_content_type_must_agree_on_an_allowed_format() {
        assert!(ImageKind::Campaign.check(&file("a.png", "application/pdf", 10)).is_err());
        assert!(ImageKind::Campaign.check(&file("a.pdf", "image/png", 10)).is_err());
        assert!(ImageKind::Campaign.check(&file("noext", "image/png", 10)).is_err());
    }

    #[test]
    fn size_limits_differ_by_kind() {
        let three_mb = 3 * 1024 * 1024;
        assert!(ImageKind::Campaign.check(&file("a.jpg", "image/jpeg", three_mb)).is_ok());
        assert!(ImageKind::Avatar.check(&file("a.jpg", "image/jpeg", three_mb)).is_err());
        assert!(ImageKind::Campaign.check(&file("a.jpg", "image/jpeg", 5 * 1024 * 1024 + 1)).is_err());
    }

    #[tokio::test]
    async fn unconfigured_host_falls_back() {
        let host = ImageHost::disabled();
        let err = host
            .upload(ImageKind::Avatar, "avatar_0x1", file("a.png", "image/png", 4))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::NotConfigured));
        assert!(host.upload_or_warn(ImageKind::Avatar, "avatar_0x1", file("a.png", "image/png", 4)).await.is_none());
    }
}
