// src/bootstrap.rs
use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::api::{self, AppState};
use crate::caption::build_text_generator;
use crate::config::RelayConfig;
use crate::harvest::scheduler::HarvestJob;
use crate::harvest::Harvester;
use crate::host::TmpFilesHost;
use crate::media::ffmpeg::FfmpegTransformer;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::rng::SharedRng;
use crate::source::http::HttpContentSource;
use crate::storage::Storage;

/// Production wiring: real adapters built from config, sharing one storage root
/// and one randomness source.
pub struct RelayRuntime {
    pub cfg: RelayConfig,
    pub job: Arc<HarvestJob>,
    pub orchestrator: Arc<Orchestrator>,
}

impl RelayRuntime {
    pub fn from_config(cfg: RelayConfig) -> anyhow::Result<Self> {
        let rng = SharedRng::from_seed_opt(cfg.rng_seed);
        let storage = Storage::new(&cfg.dataset_root);

        let source = HttpContentSource::new(&cfg.source.base_url, &cfg.source.transport)?;
        let harvester = Harvester::new(
            storage.clone(),
            Arc::new(source),
            cfg.retry.policy(),
            rng.clone(),
        );
        let job = HarvestJob::new(harvester, cfg.accounts.clone(), cfg.window_hours);

        let placement = cfg.watermark.placement();
        let transformer = FfmpegTransformer::new(
            &cfg.watermark.ffmpeg_bin,
            &cfg.watermark.ffprobe_bin,
            placement,
        );
        let orchestrator = Orchestrator::new(
            storage,
            Arc::new(transformer),
            Arc::new(TmpFilesHost::new(&cfg.host)?),
            build_text_generator(&cfg.captions)?,
            OrchestratorSettings {
                logo_path: cfg.logo_path.clone(),
                placement,
            },
            rng,
        );

        // Safe diagnostics only: never log the caption API key itself.
        info!(
            dataset_root = %cfg.dataset_root.display(),
            accounts = ?cfg.accounts,
            window_hours = cfg.window_hours,
            interval_hours = cfg.interval_hours,
            captions_enabled = cfg.captions.enabled,
            key_len = cfg.captions.api_key.len(),
            "relay configured"
        );

        Ok(Self {
            cfg,
            job: Arc::new(job),
            orchestrator: Arc::new(orchestrator),
        })
    }

    pub fn router(&self) -> Router {
        api::router(AppState {
            orchestrator: Arc::clone(&self.orchestrator),
        })
    }
}
