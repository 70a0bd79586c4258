// src/host.rs
//! Public object host: upload a file, get back a direct-download URL.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::HostConfig;

#[async_trait]
pub trait ObjectHost: Send + Sync {
    /// Upload `path`; returns the URL to hand out (already in direct-download form).
    async fn upload(&self, path: &Path) -> Result<String>;
}

/// Insert `dl` before the last two path segments:
/// `https://tmpfiles.org/123/a.jpg` → `https://tmpfiles.org/dl/123/a.jpg`.
pub fn direct_download_url(url: &str) -> String {
    let mut parts: Vec<&str> = url.split('/').collect();
    if parts.len() < 2 {
        return url.to_string();
    }
    let at = parts.len() - 2;
    parts.insert(at, "dl");
    parts.join("/")
}

/// tmpfiles.org style multipart upload.
pub struct TmpFilesHost {
    upload_url: String,
    client: reqwest::Client,
}

impl TmpFilesHost {
    pub fn new(cfg: &HostConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("building object host http client")?;
        Ok(Self {
            upload_url: cfg.upload_url.clone(),
            client,
        })
    }
}

#[derive(Deserialize)]
struct UploadResp {
    data: UploadData,
}

#[derive(Deserialize)]
struct UploadData {
    url: String,
}

#[async_trait]
impl ObjectHost for TmpFilesHost {
    async fn upload(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name),
        );

        let resp = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .context("object host upload")?;
        if !resp.status().is_success() {
            return Err(anyhow!("object host HTTP {}", resp.status()));
        }
        let body: UploadResp = resp.json().await.context("object host response body")?;
        Ok(direct_download_url(&body.data.url))
    }
}
