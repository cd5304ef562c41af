//! Cloudinary upload API client

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::{BlobStorage, UploadedAsset};

/// Cloudinary API base URL
const CLOUDINARY_API_URL: &str = "https://api.cloudinary.com";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    url: Option<String>,
    secure_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Client for the Cloudinary upload API
#[derive(Clone)]
pub struct CloudinaryStorage {
    client: Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryStorage {
    /// Create a new Cloudinary client
    pub fn new(cloud_name: String, api_key: String, api_secret: String) -> Self {
        Self::with_base_url(CLOUDINARY_API_URL.to_string(), cloud_name, api_key, api_secret)
    }

    /// Create a client against a custom API host
    pub fn with_base_url(
        base_url: String,
        cloud_name: String,
        api_key: String,
        api_secret: String,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cloud_name,
            api_key,
            api_secret,
        }
    }

    /// Create from config values, returns None if not configured
    pub fn from_config(
        cloud_name: Option<String>,
        api_key: Option<String>,
        api_secret: Option<String>,
    ) -> Option<Self> {
        match (cloud_name, api_key, api_secret) {
            (Some(cloud), Some(key), Some(secret))
                if !cloud.is_empty() && !key.is_empty() && !secret.is_empty() =>
            {
                Some(Self::new(cloud, key, secret))
            }
            _ => {
                warn!("Cloudinary not configured - avatar and cover uploads will fail");
                None
            }
        }
    }

    /// Sign request parameters: sorted `key=value` pairs joined with `&`,
    /// followed by the API secret, hashed with SHA-256.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn upload_bytes(&self, file_name: String, bytes: Vec<u8>) -> Result<UploadedAsset, String> {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
        let signature = self.sign(&[("timestamp", timestamp.as_str())]);

        let form = multipart::Form::new()
            .part("file", multipart::Part::bytes(bytes).file_name(file_name))
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(format!(
                "{}/v1_1/{}/auto/upload",
                self.base_url, self.cloud_name
            ))
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Upload rejected with {}: {}", status, body));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))?;

        let url = body
            .secure_url
            .or(body.url)
            .ok_or_else(|| "Response carried no URL".to_string())?;

        Ok(UploadedAsset {
            url,
            public_id: body.public_id,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), String> {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", timestamp.as_str())]);

        let response = self
            .client
            .post(format!(
                "{}/v1_1/{}/image/destroy",
                self.base_url, self.cloud_name
            ))
            .form(&[
                ("public_id", public_id),
                ("api_key", self.api_key.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Destroy rejected with {}", status));
        }

        let body: DestroyResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))?;

        if body.result != "ok" {
            return Err(format!("Destroy returned '{}'", body.result));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStorage for CloudinaryStorage {
    async fn upload(&self, local_file: &Path) -> Option<UploadedAsset> {
        let file_name = local_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let result = match tokio::fs::read(local_file).await {
            Ok(bytes) => self.upload_bytes(file_name, bytes).await,
            Err(e) => Err(format!("Failed to read local file: {}", e)),
        };

        // The spooled file is temporary whatever happened
        if let Err(e) = tokio::fs::remove_file(local_file).await {
            warn!(path = %local_file.display(), error = %e, "Failed to remove local upload");
        }

        match result {
            Ok(asset) => {
                info!(public_id = %asset.public_id, "Asset uploaded");
                Some(asset)
            }
            Err(e) => {
                error!(path = %local_file.display(), error = %e, "Asset upload failed");
                None
            }
        }
    }

    async fn delete(&self, public_id: &str) -> Option<()> {
        match self.destroy(public_id).await {
            Ok(()) => {
                info!(public_id, "Asset deleted");
                Some(())
            }
            Err(e) => {
                error!(public_id, error = %e, "Asset delete failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn storage(server: &mockito::ServerGuard) -> CloudinaryStorage {
        CloudinaryStorage::with_base_url(
            server.url(),
            "demo".to_string(),
            "key123".to_string(),
            "secret456".to_string(),
        )
    }

    async fn temp_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("avatar.jpg");
        tokio::fs::write(&path, b"fake-jpeg").await.unwrap();
        path
    }

    #[test]
    fn test_signature_is_order_independent() {
        let s = CloudinaryStorage::new("c".to_string(), "k".to_string(), "s".to_string());
        assert_eq!(
            s.sign(&[("timestamp", "1"), ("public_id", "a")]),
            s.sign(&[("public_id", "a"), ("timestamp", "1")])
        );
        assert_eq!(s.sign(&[("timestamp", "1")]).len(), 64);
    }

    #[test]
    fn test_from_config_requires_all_values() {
        assert!(CloudinaryStorage::from_config(None, None, None).is_none());
        assert!(CloudinaryStorage::from_config(
            Some("c".to_string()),
            Some(String::new()),
            Some("s".to_string())
        )
        .is_none());
        assert!(CloudinaryStorage::from_config(
            Some("c".to_string()),
            Some("k".to_string()),
            Some("s".to_string())
        )
        .is_some());
    }

    #[tokio::test]
    async fn test_upload_success_removes_local_file() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1_1/demo/auto/upload")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"public_id":"abc123","url":"http://res.cloudinary.com/demo/abc123.jpg","secure_url":"https://res.cloudinary.com/demo/abc123.jpg"}"#,
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir).await;
        let asset = storage(&server).upload(&path).await.expect("upload");

        assert_eq!(asset.public_id, "abc123");
        assert_eq!(asset.url, "https://res.cloudinary.com/demo/abc123.jpg");
        assert!(!path.exists());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_failure_is_none_and_removes_local_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1_1/demo/auto/upload")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Invalid Signature"}}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir).await;

        assert_eq!(storage(&server).upload(&path).await, None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_none() {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(
            storage(&server).upload(&dir.path().join("missing.jpg")).await,
            None
        );
    }

    #[tokio::test]
    async fn test_delete_ok_and_not_found() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("POST", "/v1_1/demo/image/destroy")
            .match_body(Matcher::Regex("public_id=old_avatar".to_string()))
            .with_status(200)
            .with_body(r#"{"result":"ok"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/v1_1/demo/image/destroy")
            .match_body(Matcher::Regex("public_id=missing".to_string()))
            .with_status(200)
            .with_body(r#"{"result":"not found"}"#)
            .create_async()
            .await;

        let storage = storage(&server);
        assert_eq!(storage.delete("old_avatar").await, Some(()));
        assert_eq!(storage.delete("missing").await, None);
        ok.assert_async().await;
    }
}
