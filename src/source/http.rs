// src/source/http.rs
//! JSON-over-HTTP content source.
//!
//! Expects `GET {base_url}/accounts/{handle}/posts` to return a JSON array of
//! [`RemotePost`]; each media URL is fetched as-is.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{ContentSource, RemotePost, SourceError};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// How the HTTP client reaches the source: proxy, TLS override, identity, timeouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportPolicy {
    pub proxy: Option<String>,
    pub accept_invalid_certs: bool,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            proxy: None,
            accept_invalid_certs: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
        }
    }
}

impl TransportPolicy {
    pub fn build_client(&self) -> anyhow::Result<reqwest::Client> {
        let mut b = reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs.max(1)))
            .timeout(Duration::from_secs(self.request_timeout_secs.max(1)));
        if let Some(p) = self.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            b = b.proxy(reqwest::Proxy::all(p).with_context(|| format!("invalid proxy {p}"))?);
        }
        if self.accept_invalid_certs {
            tracing::warn!(target: "harvest", "TLS certificate validation disabled for content source");
            b = b.danger_accept_invalid_certs(true);
        }
        b.build().context("building content source http client")
    }
}

pub struct HttpContentSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpContentSource {
    pub fn new(base_url: &str, transport: &TransportPolicy) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: transport.build_client()?,
        })
    }

    fn posts_url(&self, handle: &str) -> String {
        format!("{}/accounts/{}/posts", self.base_url, handle)
    }
}

/// `2024-05-01_12-30-00_UTC.jpg` for single-media posts,
/// `2024-05-01_12-30-00_UTC_2.mp4` for the 2nd item of a carousel.
pub fn media_file_name(post: &RemotePost, index: usize) -> Option<String> {
    let item = post.media.get(index)?;
    let stem = post.taken_at.format("%Y-%m-%d_%H-%M-%S");
    let ext = item.kind.extension();
    if post.media.len() == 1 {
        Some(format!("{stem}_UTC.{ext}"))
    } else {
        Some(format!("{stem}_UTC_{}.{ext}", index + 1))
    }
}

fn classify_status(status: StatusCode, what: &str) -> Result<(), SourceError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound(what.to_string()));
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SourceError::Transient(format!("{what}: HTTP {status}")));
    }
    Err(SourceError::Other(anyhow!("{what}: HTTP {status}")))
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch_account_posts(&self, handle: &str) -> Result<Vec<RemotePost>, SourceError> {
        let resp = self.client.get(self.posts_url(handle)).send().await?;
        classify_status(resp.status(), handle)?;
        let posts: Vec<RemotePost> = resp.json().await?;
        Ok(posts)
    }

    async fn download_post_media(
        &self,
        post: &RemotePost,
        target_dir: &Path,
    ) -> Result<(), SourceError> {
        for (i, item) in post.media.iter().enumerate() {
            let Some(name) = media_file_name(post, i) else {
                continue;
            };
            let resp = self.client.get(&item.url).send().await?;
            classify_status(resp.status(), &item.url)?;
            let bytes = resp.bytes().await?;
            let path = target_dir.join(&name);
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::debug!(target: "harvest", post = %post.shortcode, file = %name, bytes = bytes.len(), "media saved");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use crate::source::RemoteMedia;
    use chrono::{TimeZone, Utc};

    fn post(n: usize) -> RemotePost {
        RemotePost {
            shortcode: "abc".into(),
            taken_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            caption: None,
            typename: "GraphSidecar".into(),
            likes: 0,
            comments: 0,
            media: (0..n)
                .map(|i| RemoteMedia {
                    url: format!("https://cdn.example/{i}"),
                    kind: if i % 2 == 0 { MediaKind::Image } else { MediaKind::Video },
                })
                .collect(),
        }
    }

    #[test]
    fn media_names_follow_timestamp_pattern() {
        assert_eq!(
            media_file_name(&post(1), 0).as_deref(),
            Some("2024-05-01_12-30-00_UTC.jpg")
        );
        let p = post(2);
        assert_eq!(
            media_file_name(&p, 1).as_deref(),
            Some("2024-05-01_12-30-00_UTC_2.mp4")
        );
        assert_eq!(media_file_name(&p, 2), None);
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::OK, "x").is_ok());
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "x"),
            Err(SourceError::NotFound(_))
        ));
        assert!(classify_status(StatusCode::BAD_GATEWAY, "x")
            .unwrap_err()
            .is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "x")
            .unwrap_err()
            .is_transient());
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "x"),
            Err(SourceError::Other(_))
        ));
    }

    #[test]
    fn transport_policy_builds_with_proxy_and_tls_override() {
        let policy = TransportPolicy {
            proxy: Some("http://127.0.0.1:3128".into()),
            accept_invalid_certs: true,
            ..TransportPolicy::default()
        };
        assert!(policy.build_client().is_ok());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let src =
            HttpContentSource::new("http://src.local/api/", &TransportPolicy::default()).unwrap();
        assert_eq!(src.posts_url("acct"), "http://src.local/api/accounts/acct/posts");
    }
}
