//! Format importers
//!
//! Every supported format decodes into the same [`SceneNode`] tree and then
//! applies its own structural post-processing. Dispatch is closed over
//! [`Importer`]; [`FormatImporter`] is the shared interface.

pub mod collada;
pub mod gltf;
pub mod ldraw;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::config::LDrawConfig;
use crate::error::DecodeError;
use crate::fetch::ResourceFetcher;
use crate::format::ImporterKind;
use crate::progress::ProgressAggregator;
use crate::scene::SceneNode;

pub use collada::{ColladaError, ColladaImporter};
pub use gltf::{GltfError, GltfImporter};
pub use ldraw::{LDrawError, LDrawImporter};

/// Decoder for one model format
#[async_trait]
pub trait FormatImporter: Send + Sync + Debug {
    /// Fetch `locator` and decode it into a raw scene tree
    async fn decode(
        &self,
        locator: &str,
        fetcher: &dyn ResourceFetcher,
        progress: &ProgressAggregator,
    ) -> Result<SceneNode, DecodeError>;

    /// Format-specific structural rewrite applied after decoding
    fn post_process(&self, root: &mut SceneNode);

    fn kind(&self) -> ImporterKind;
}

#[async_trait]
impl FormatImporter for GltfImporter {
    async fn decode(
        &self,
        locator: &str,
        fetcher: &dyn ResourceFetcher,
        progress: &ProgressAggregator,
    ) -> Result<SceneNode, DecodeError> {
        GltfImporter::decode(self, locator, fetcher, progress).await
    }

    fn post_process(&self, _root: &mut SceneNode) {}

    fn kind(&self) -> ImporterKind {
        ImporterKind::Gltf
    }
}

#[async_trait]
impl FormatImporter for ColladaImporter {
    async fn decode(
        &self,
        locator: &str,
        fetcher: &dyn ResourceFetcher,
        progress: &ProgressAggregator,
    ) -> Result<SceneNode, DecodeError> {
        ColladaImporter::decode(self, locator, fetcher, progress).await
    }

    fn post_process(&self, root: &mut SceneNode) {
        ColladaImporter::post_process(self, root);
    }

    fn kind(&self) -> ImporterKind {
        ImporterKind::Collada
    }
}

#[async_trait]
impl FormatImporter for LDrawImporter {
    async fn decode(
        &self,
        locator: &str,
        fetcher: &dyn ResourceFetcher,
        progress: &ProgressAggregator,
    ) -> Result<SceneNode, DecodeError> {
        LDrawImporter::decode(self, locator, fetcher, progress).await
    }

    fn post_process(&self, root: &mut SceneNode) {
        LDrawImporter::post_process(self, root);
    }

    fn kind(&self) -> ImporterKind {
        ImporterKind::LDraw
    }
}

/// Closed set of importers
#[derive(Debug)]
pub enum Importer {
    Gltf(GltfImporter),
    Collada(ColladaImporter),
    LDraw(LDrawImporter),
}

impl Importer {
    fn as_dyn(&self) -> &dyn FormatImporter {
        match self {
            Importer::Gltf(importer) => importer,
            Importer::Collada(importer) => importer,
            Importer::LDraw(importer) => importer,
        }
    }
}

#[async_trait]
impl FormatImporter for Importer {
    async fn decode(
        &self,
        locator: &str,
        fetcher: &dyn ResourceFetcher,
        progress: &ProgressAggregator,
    ) -> Result<SceneNode, DecodeError> {
        self.as_dyn().decode(locator, fetcher, progress).await
    }

    fn post_process(&self, root: &mut SceneNode) {
        self.as_dyn().post_process(root);
    }

    fn kind(&self) -> ImporterKind {
        self.as_dyn().kind()
    }
}

/// One importer per [`ImporterKind`], shared across requests
#[derive(Debug)]
pub struct Importers {
    gltf: Importer,
    collada: Importer,
    ldraw: Importer,
}

impl Importers {
    pub fn new(ldraw: LDrawConfig) -> Self {
        Self {
            gltf: Importer::Gltf(GltfImporter::new()),
            collada: Importer::Collada(ColladaImporter::new()),
            ldraw: Importer::LDraw(LDrawImporter::new(ldraw)),
        }
    }

    pub fn get(&self, kind: ImporterKind) -> &Importer {
        match kind {
            ImporterKind::Gltf => &self.gltf,
            ImporterKind::Collada => &self.collada,
            ImporterKind::LDraw => &self.ldraw,
        }
    }
}

impl Default for Importers {
    fn default() -> Self {
        Self::new(LDrawConfig::default())
    }
}
