// src/orchestrator.rs
//! On-demand pipeline: pick one stored post, watermark + re-upload every media
//! item, rewrite the caption, then purge the source account's folder.
//!
//! Per-item failures degrade to marker strings; only "nothing to pick" and
//! "no metadata" abort a request.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::caption::{rewrite_caption, DynTextGenerator};
use crate::host::ObjectHost;
use crate::media::{MediaKind, MediaTransformer, WatermarkPlacement};
use crate::rng::SharedRng;
use crate::storage::{MetadataRecord, Storage, StorageError, PROCESSED_PREFIX};

pub const PROCESS_FAILED_PREFIX: &str = "Failed to process: ";
pub const UPLOAD_FAILED_PREFIX: &str = "Failed to upload: ";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("transform_requests_total", "Random-post transform requests.");
        describe_counter!(
            "transform_item_failures_total",
            "Media items replaced by a failure marker, by stage."
        );
    });
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("no content available")]
    NoContentAvailable,
    #[error("metadata file not found for {account}/{post_id}")]
    MetadataMissing { account: String, post_id: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Response payload of a successful transform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessedPost {
    pub original_post: MetadataRecord,
    /// One entry per media item, in order: a direct-download URL or a failure marker.
    pub processed_media: Vec<String>,
    pub new_caption: String,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub logo_path: PathBuf,
    pub placement: WatermarkPlacement,
}

pub struct Orchestrator {
    storage: Storage,
    transformer: Arc<dyn MediaTransformer>,
    host: Arc<dyn ObjectHost>,
    captions: DynTextGenerator,
    settings: OrchestratorSettings,
    rng: SharedRng,
}

impl Orchestrator {
    pub fn new(
        storage: Storage,
        transformer: Arc<dyn MediaTransformer>,
        host: Arc<dyn ObjectHost>,
        captions: DynTextGenerator,
        settings: OrchestratorSettings,
        rng: SharedRng,
    ) -> Self {
        Self {
            storage,
            transformer,
            host,
            captions,
            settings,
            rng,
        }
    }

    pub async fn process_random_post(&self) -> Result<ProcessedPost, TransformError> {
        ensure_metrics_described();
        counter!("transform_requests_total").increment(1);

        let (account, post_id) = self.pick_random_post()?;
        info!(target: "transform", %account, post = %post_id, "selected post");

        let original_post = self
            .storage
            .read_metadata(&account, &post_id)?
            .ok_or_else(|| TransformError::MetadataMissing {
                account: account.clone(),
                post_id: post_id.clone(),
            })?;

        let media = self.storage.list_media(&account, &post_id);
        let post_dir = self.storage.post_dir(&account, &post_id);
        let mut processed_media = Vec::with_capacity(media.len());
        for (i, input) in media.iter().enumerate() {
            processed_media.push(self.process_item(&post_dir, i + 1, input).await);
        }

        let new_caption = rewrite_caption(self.captions.as_ref(), &original_post).await;

        let out = ProcessedPost {
            original_post,
            processed_media,
            new_caption,
        };

        // Consumed posts are never kept, however many items failed.
        self.storage.delete_account_dir(&account);
        info!(
            target: "transform",
            %account,
            post = %post_id,
            items = out.processed_media.len(),
            "post processed"
        );
        Ok(out)
    }

    /// Uniform over non-empty accounts, then uniform over that account's posts.
    pub fn pick_random_post(&self) -> Result<(String, String), TransformError> {
        let accounts: Vec<String> = self
            .storage
            .list_accounts()
            .into_iter()
            .filter(|a| !self.storage.list_posts(a).is_empty())
            .collect();
        let ai = self
            .rng
            .pick_index(accounts.len())
            .ok_or(TransformError::NoContentAvailable)?;
        let account = accounts[ai].clone();

        // Re-list: a concurrent reset may have emptied it in between.
        let posts = self.storage.list_posts(&account);
        let pi = self
            .rng
            .pick_index(posts.len())
            .ok_or(TransformError::NoContentAvailable)?;
        Ok((account, posts[pi].clone()))
    }

    async fn process_item(&self, post_dir: &Path, index: usize, input: &Path) -> String {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = post_dir.join(format!("{PROCESSED_PREFIX}{index:02}_{name}"));

        let transformed = match self.watermark(input, &output).await {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "transform", input = %input.display(), error = %e, "error processing media");
                counter!("transform_item_failures_total", "stage" => "process").increment(1);
                return format!("{PROCESS_FAILED_PREFIX}{}", input.display());
            }
        };

        match self.host.upload(&transformed).await {
            Ok(url) => url,
            Err(e) => {
                warn!(target: "transform", file = %transformed.display(), error = %e, "upload failed");
                counter!("transform_item_failures_total", "stage" => "upload").increment(1);
                format!("{UPLOAD_FAILED_PREFIX}{}", transformed.display())
            }
        }
    }

    async fn watermark(&self, input: &Path, output: &Path) -> anyhow::Result<PathBuf> {
        let logo = self.settings.logo_path.as_path();
        match MediaKind::from_path(input) {
            Some(MediaKind::Image) => self.transformer.watermark_image(input, logo, output).await,
            Some(MediaKind::Video) => {
                let (w, h) = self.transformer.probe_dimensions(input).await?;
                let at = self.settings.placement.anchor(w, h);
                self.transformer
                    .watermark_video(input, logo, output, at)
                    .await
            }
            None => bail!("unsupported media file {}", input.display()),
        }
    }
}
