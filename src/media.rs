//! Avatar image hosting.
//!
//! Uploads go to Cloudinary with a signed request; when no credentials are
//! configured the [`DisabledImageStore`] refuses every upload.

use crate::config::CloudinaryConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub secure_url: String,
}

/// Third-party image hosting collaborator.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, name: &str) -> Result<UploadedImage>;
}

#[derive(Clone)]
pub struct CloudinaryStore {
    client: Client,
    config: CloudinaryConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Cloudinary HTTP client")?;
        Ok(Self { client, config })
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        )
    }
}

/// SHA-256 request signature over the alphabetically sorted parameters.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Public id derived from an uploaded filename: the stem, restricted to
/// `[A-Za-z0-9_-]`, or a random id when nothing usable is left.
pub fn public_id_for(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = base.rsplit_once('.').map(|(s, _)| s).unwrap_or(base);
    let cleaned: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        uuid::Uuid::new_v4().simple().to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    async fn upload(&self, bytes: Vec<u8>, name: &str) -> Result<UploadedImage> {
        let public_id = public_id_for(name);
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[
                ("overwrite", "true"),
                ("public_id", &public_id),
                ("timestamp", &timestamp),
            ],
            &self.config.api_secret,
        );

        let size = bytes.len();
        let form = multipart::Form::new()
            .part("file", multipart::Part::bytes(bytes).file_name(name.to_string()))
            .text("api_key", self.config.api_key.clone())
            .text("overwrite", "true")
            .text("public_id", public_id.clone())
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        debug!(public_id = %public_id, bytes = size, "Uploading image");

        let resp = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .context("Cloudinary upload request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Cloudinary upload {}: {}", status, text));
        }

        let parsed = resp
            .json::<UploadResponse>()
            .await
            .context("Failed to parse Cloudinary response")?;

        info!(public_id = %public_id, url = %parsed.secure_url, "🖼️ Image uploaded");
        Ok(UploadedImage {
            secure_url: parsed.secure_url,
        })
    }
}

/// Used when no image host is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledImageStore;

#[async_trait]
impl ImageStore for DisabledImageStore {
    async fn upload(&self, _bytes: Vec<u8>, _name: &str) -> Result<UploadedImage> {
        anyhow::bail!("image uploads are not configured")
    }
}
