//! Import a model from disk and print what the pipeline produced
//!
//! ```text
//! cargo run --example import_model --features runtime-tokio -- path/to/model.glb [scale]
//! ```

use std::sync::Arc;

use anyhow::Context;
use archetype_import::{FileFetcher, ImportPipeline, ImportRequest, LogProgress, ModelSlot};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let locator = args
        .next()
        .context("usage: import_model <model> [scale]")?;
    let scale = args
        .next()
        .map(|s| s.parse::<f32>())
        .transpose()
        .context("scale must be a number")?;

    println!("archetype_import v{}", archetype_import::VERSION);

    let pipeline = ImportPipeline::new(Arc::new(FileFetcher::new()), Arc::new(LogProgress));
    let mut request = ImportRequest::new(locator).with_credit("Model loaded");
    if let Some(scale) = scale {
        request = request.with_scale(scale);
    }

    let result = pipeline.import(&request).await?;
    println!("Format:        {}", result.format);
    println!("Nodes:         {}", result.root.node_count());
    println!("Meshes:        {}", result.root.meshes().len());
    println!("Materials:     {}", result.root.materials().len());
    println!("Textures:      {}", result.root.textures().len());
    println!(
        "Source radius: {:.4} (scale {:.4})",
        result.normalization.source_sphere.radius, result.normalization.unit_scale
    );

    let mut slot = ModelSlot::new();
    slot.install(result.root);
    let released = slot.clear();
    println!("Released {released} textures");
    Ok(())
}
