//! Import pipeline
//!
//! Runs one request through routing, decoding, format post-processing,
//! material canonicalization and spatial normalization, reporting
//! progress throughout. A failure at any stage ends the request with an
//! explicit error, a failure message on the credits sink and progress at 1.

use std::sync::Arc;

use futures::lock::Mutex;
use glam::Vec3;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{ImportError, Result};
use crate::fetch::ResourceFetcher;
use crate::format::ModelFormat;
use crate::loader::{FormatImporter, Importers};
use crate::material::canonical::remove_emission;
use crate::material::MaterialCanonicalizer;
use crate::progress::{Phase, ProgressAggregator, ProgressSink};
use crate::scene::SceneNode;
use crate::spatial::{Normalization, Placement, SpatialNormalizer};

/// Stage of the request currently being processed
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Routing,
    Decoding,
    Canonicalizing,
    Normalizing,
    Done,
    /// The request failed with this message
    Failed(String),
}

impl PipelineState {
    /// Whether the last request has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

/// One model to import
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub id: Uuid,
    pub locator: String,
    /// Index of refraction for converted transmissive materials
    pub ior: Option<f32>,
    pub position: Option<Vec3>,
    /// XYZ Euler angles in degrees
    pub rotation_degrees: Option<Vec3>,
    pub scale: Option<f32>,
    /// Message shown on success
    pub credit: Option<String>,
    pub remove_emission: bool,
    pub opacity_to_transmission: bool,
}

impl ImportRequest {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            locator: locator.into(),
            ior: None,
            position: None,
            rotation_degrees: None,
            scale: None,
            credit: None,
            remove_emission: false,
            opacity_to_transmission: true,
        }
    }

    pub fn with_ior(mut self, ior: f32) -> Self {
        self.ior = Some(ior);
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_rotation_degrees(mut self, rotation: Vec3) -> Self {
        self.rotation_degrees = Some(rotation);
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_credit(mut self, credit: impl Into<String>) -> Self {
        self.credit = Some(credit.into());
        self
    }

    pub fn with_remove_emission(mut self, remove: bool) -> Self {
        self.remove_emission = remove;
        self
    }

    pub fn with_opacity_to_transmission(mut self, convert: bool) -> Self {
        self.opacity_to_transmission = convert;
        self
    }

    pub fn placement(&self) -> Placement {
        Placement {
            position: self.position,
            rotation_degrees: self.rotation_degrees,
            scale: self.scale,
        }
    }
}

/// A successfully imported model, owned by the caller
#[derive(Debug)]
pub struct ImportResult {
    pub root: SceneNode,
    pub format: ModelFormat,
    pub normalization: Normalization,
    pub request_id: Uuid,
}

/// Orchestrates importers, canonicalization and normalization
pub struct ImportPipeline {
    fetcher: Arc<dyn ResourceFetcher>,
    progress: ProgressAggregator,
    config: PipelineConfig,
    importers: Importers,
    canonicalizer: MaterialCanonicalizer,
    normalizer: SpatialNormalizer,
    state: Arc<RwLock<PipelineState>>,
    /// Serializes requests
    turn: Mutex<()>,
}

impl std::fmt::Debug for ImportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportPipeline")
            .field("fetcher", &self.fetcher.fetcher_name())
            .field("state", &*self.state.read())
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl ImportPipeline {
    /// Create a pipeline with the default configuration
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, sink: Arc<dyn ProgressSink>) -> Self {
        Self::with_config(fetcher, sink, PipelineConfig::default())
    }

    pub fn with_config(
        fetcher: Arc<dyn ResourceFetcher>,
        sink: Arc<dyn ProgressSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            fetcher,
            progress: ProgressAggregator::with_decode_share(sink, config.progress.decode_share),
            importers: Importers::new(config.ldraw.clone()),
            canonicalizer: MaterialCanonicalizer::new(config.transmission.clone()),
            normalizer: SpatialNormalizer::new(),
            state: Arc::new(RwLock::new(PipelineState::Idle)),
            turn: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn importers(&self) -> &Importers {
        &self.importers
    }

    pub fn progress(&self) -> &ProgressAggregator {
        &self.progress
    }

    /// Current stage of the last request
    pub fn state(&self) -> PipelineState {
        self.state.read().clone()
    }

    fn set_state(&self, state: PipelineState) {
        log::trace!("Pipeline state -> {state:?}");
        *self.state.write() = state;
    }

    /// Import one model
    pub async fn import(&self, request: &ImportRequest) -> Result<ImportResult> {
        let _turn = self.turn.lock().await;

        self.set_state(PipelineState::Idle);
        self.progress.reset();
        log::info!("[{}] Importing {}", request.id, request.locator);

        match self.run(request).await {
            Ok(result) => {
                self.set_state(PipelineState::Done);
                self.progress
                    .set_credits(request.credit.as_deref().unwrap_or_default());
                self.progress.complete();
                log::info!(
                    "[{}] Imported {} as {} ({} nodes)",
                    request.id,
                    request.locator,
                    result.format,
                    result.root.node_count()
                );
                Ok(result)
            }
            Err(err) => {
                log::error!("[{}] Import of {} failed: {err}", request.id, request.locator);
                self.set_state(PipelineState::Failed(err.to_string()));
                self.progress
                    .set_credits(&format!("Failed to load model: {err}"));
                self.progress.complete();
                Err(err)
            }
        }
    }

    /// Import several models one after another, in order
    pub async fn import_all(&self, requests: &[ImportRequest]) -> Vec<Result<ImportResult>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.import(request).await);
        }
        results
    }

    async fn run(&self, request: &ImportRequest) -> Result<ImportResult> {
        self.set_state(PipelineState::Routing);
        let format = ModelFormat::from_locator(&request.locator)
            .ok_or_else(|| ImportError::UnsupportedFormat(request.locator.clone()))?;
        log::debug!("[{}] Routed {} to {format}", request.id, request.locator);

        self.set_state(PipelineState::Decoding);
        let importer = self.importers.get(format.importer_kind());
        let mut root = importer
            .decode(&request.locator, self.fetcher.as_ref(), &self.progress)
            .await
            .map_err(|source| ImportError::decode(&request.locator, source))?;
        importer.post_process(&mut root);
        self.progress.enter(Phase::PostProcess);

        self.set_state(PipelineState::Canonicalizing);
        if request.remove_emission {
            let cleared = remove_emission(&root);
            log::debug!("[{}] Cleared emission on {cleared} materials", request.id);
        }
        if request.opacity_to_transmission {
            let report = self.canonicalizer.canonicalize(&mut root, request.ior);
            log::debug!(
                "[{}] {} materials made transmissive, {} textures released",
                request.id,
                report.replaced,
                report.released_textures
            );
        }
        self.canonicalizer.force_thickness(&root);
        self.progress.report(0.5);

        self.set_state(PipelineState::Normalizing);
        let normalization = self.normalizer.normalize(&mut root)?;
        self.normalizer
            .place(&mut root, &normalization, &request.placement());

        Ok(ImportResult {
            root,
            format,
            normalization,
            request_id: request.id,
        })
    }
}
