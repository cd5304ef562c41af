//! Blob storage for avatars and cover images
//!
//! Failures never bubble up as errors: an upload or delete that did not
//! happen comes back as `None` and the caller decides whether that matters.

mod cloudinary;

pub use cloudinary::CloudinaryStorage;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedAsset {
    pub url: String,
    pub public_id: String,
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Upload a local file. The local file is removed afterwards either way.
    async fn upload(&self, local_file: &Path) -> Option<UploadedAsset>;

    /// Delete an asset by public id
    async fn delete(&self, public_id: &str) -> Option<()>;
}

/// Stand-in used when no blob storage credentials are configured
pub struct DisabledBlobStorage;

#[async_trait]
impl BlobStorage for DisabledBlobStorage {
    async fn upload(&self, local_file: &Path) -> Option<UploadedAsset> {
        tracing::warn!(path = %local_file.display(), "Blob storage not configured - upload skipped");
        let _ = tokio::fs::remove_file(local_file).await;
        None
    }

    async fn delete(&self, public_id: &str) -> Option<()> {
        tracing::warn!(public_id, "Blob storage not configured - delete skipped");
        None
    }
}

/// Derive an asset's public id from its delivery URL: the last path segment
/// without its extension.
pub fn public_id_from_url(asset_url: &str) -> Option<String> {
    let parsed = url::Url::parse(asset_url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let stem = match last.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => last,
    };
    (!stem.is_empty()).then(|| stem.to_string())
}
