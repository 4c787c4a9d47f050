use std::collections::HashMap;

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::ApiError;

/// A file part from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Text fields plus at most one file from a multipart form.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl FormData {
    /// Reads the whole form. Only the part named `file_field` is kept as a
    /// file; other file parts are skipped. An empty file part counts as no
    /// file.
    pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if let Some(file_name) = field.file_name().map(str::to_string) {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if name != file_field {
                    warn!("Ignoring unexpected file field `{}`", name);
                    continue;
                }
                if bytes.is_empty() {
                    continue;
                }
                debug!("Received file `{}` ({} bytes)", file_name, bytes.len());
                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    pub fn take(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::validation("File too large");
    }
    ApiError::validation(format!("Malformed multipart body: {}", e.body_text()))
}
