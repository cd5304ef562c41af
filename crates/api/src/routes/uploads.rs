//! Multipart form spooling
//!
//! File parts are written to the upload temp directory so the core can hand
//! local paths to blob storage; text parts are collected by name.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use axum::extract::Multipart;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// A multipart form with its files on local disk
#[derive(Debug, Default)]
pub struct SpooledForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, PathBuf>,
}

impl SpooledForm {
    /// Text value of a field, empty when absent
    pub fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    /// Take ownership of a spooled file
    pub fn take_file(&mut self, name: &str) -> Option<PathBuf> {
        self.files.remove(name)
    }

    /// Delete any spooled files nobody took
    pub async fn discard(self) {
        for path in self.files.into_values() {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}

/// Spool name for an uploaded file: random, keeping only a safe extension
fn spool_name(original: &str) -> String {
    let extension = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext.to_ascii_lowercase()),
        None => Uuid::new_v4().to_string(),
    }
}

/// Read every part of `multipart`, writing file parts under `temp_dir`
pub async fn spool_multipart(mut multipart: Multipart, temp_dir: &Path) -> ApiResult<SpooledForm> {
    let mut form = SpooledForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                form.discard().await;
                return Err(ApiError::BadRequest(format!("Malformed multipart body: {}", e)));
            }
        };

        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        form.discard().await;
                        return Err(ApiError::BadRequest(format!("Failed to read file: {}", e)));
                    }
                };
                if bytes.is_empty() {
                    continue;
                }

                let path = temp_dir.join(spool_name(&file_name));
                let written = match tokio::fs::create_dir_all(temp_dir).await {
                    Ok(()) => tokio::fs::write(&path, &bytes).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    tracing::error!(path = %path.display(), error = %e, "Failed to spool upload");
                    form.discard().await;
                    return Err(ApiError::Internal("Failed to store upload".to_string()));
                }

                // Only the first file per field counts
                if form.files.contains_key(&name) {
                    let _ = tokio::fs::remove_file(&path).await;
                } else {
                    form.files.insert(name, path);
                }
            }
            None => {
                let text = match field.text().await {
                    Ok(text) => text,
                    Err(e) => {
                        form.discard().await;
                        return Err(ApiError::BadRequest(format!("Failed to read field: {}", e)));
                    }
                };
                form.fields.insert(name, text);
            }
        }
    }

    Ok(form)
}
