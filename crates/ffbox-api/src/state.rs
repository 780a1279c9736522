//! Application state.

use std::sync::Arc;

use anyhow::Context;
use ffbox_media::{FfmpegRunner, FfmpegToolkit, MediaPipeline, MediaToolkit};
use ffbox_storage::{ArtifactRegistry, StorageRoot};
use tracing::info;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: MediaPipeline,
    pub registry: Arc<ArtifactRegistry>,
}

impl AppState {
    /// Open the storage root, adopt leftovers and wire the FFmpeg toolkit.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let root = StorageRoot::open(config.media.temp_dir.clone())
            .await
            .with_context(|| format!("opening {}", config.media.temp_dir.display()))?;
        let registry = Arc::new(ArtifactRegistry::new(root));

        let report = registry
            .adopt_existing()
            .await
            .context("scanning storage root")?;
        info!(
            adopted = report.adopted,
            removed = report.removed,
            "Storage root scanned"
        );

        let runner = FfmpegRunner::new().with_timeout(config.media.ffmpeg_timeout);
        let toolkit: Arc<dyn MediaToolkit> = Arc::new(FfmpegToolkit::new(runner));
        Self::with_toolkit(config, registry, toolkit)
    }

    /// Build state around an existing registry and toolkit.
    pub fn with_toolkit(
        config: ApiConfig,
        registry: Arc<ArtifactRegistry>,
        toolkit: Arc<dyn MediaToolkit>,
    ) -> anyhow::Result<Self> {
        let pipeline = MediaPipeline::new(config.media.clone(), Arc::clone(&registry), toolkit)
            .context("building media pipeline")?;
        Ok(Self {
            config,
            pipeline,
            registry,
        })
    }
}
