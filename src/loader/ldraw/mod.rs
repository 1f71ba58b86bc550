//! LDraw (`.ldr`, `.mpd`) importer
//!
//! The shared colour configuration and every part file fetched from the
//! library are memoized for the lifetime of the importer, so repeated
//! imports of bricks from the same library only fetch what is new.
//!
//! The construction is merged into one hierarchy: one triangle mesh per
//! colour, plus one line mesh per edge colour. Post-processing flips the
//! model upright, drops the line meshes and softens roughness.

pub mod colours;
pub mod parse;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use futures::lock::Mutex;
use glam::{Mat4, Quat, Vec3};
use thiserror::Error;

use self::colours::{ColourDef, ColourTable, EDGE_COLOUR, MAIN_COLOUR};
use self::parse::{normalize_name, parse_document, Command, LDrawFile};
use crate::config::LDrawConfig;
use crate::error::DecodeError;
use crate::fetch::{join_locator, no_progress, strip_query, FetchError, ResourceFetcher};
use crate::geometry::{Geometry, PrimitiveType, Vertex};
use crate::material::{shared, MaterialProperty, PropertyValue};
use crate::progress::ProgressAggregator;
use crate::scene::{Mesh, SceneNode};

/// Error type for LDraw decoding
#[derive(Error, Debug)]
pub enum LDrawError {
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Document contains no LDraw data")]
    Empty,

    #[error("Part {0} was not found in the parts library or beside the model")]
    MissingPart(String),

    #[error("Subfiles nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("File is not UTF-8: {0}")]
    Encoding(String),
}

fn decode_text(data: Vec<u8>) -> Result<String, LDrawError> {
    String::from_utf8(data).map_err(|e| LDrawError::Encoding(e.to_string()))
}

#[derive(Default)]
struct LibraryMemo {
    colours: Option<Arc<ColourTable>>,
    /// Parsed documents keyed by the parts-library locator they came from
    parts: HashMap<String, Vec<Arc<LDrawFile>>>,
}

/// LDraw decoder with a parts-library memo
pub struct LDrawImporter {
    config: LDrawConfig,
    memo: Mutex<LibraryMemo>,
}

impl fmt::Debug for LDrawImporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LDrawImporter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for LDrawImporter {
    fn default() -> Self {
        Self::new(LDrawConfig::default())
    }
}

impl LDrawImporter {
    pub fn new(config: LDrawConfig) -> Self {
        Self {
            config,
            memo: Mutex::new(LibraryMemo::default()),
        }
    }

    pub fn config(&self) -> &LDrawConfig {
        &self.config
    }

    /// Number of library documents held in the memo
    pub async fn cached_parts(&self) -> usize {
        self.memo.lock().await.parts.len()
    }

    /// Shared colour configuration, fetched on first use
    pub async fn colour_table(
        &self,
        fetcher: &dyn ResourceFetcher,
    ) -> Result<Arc<ColourTable>, DecodeError> {
        let mut memo = self.memo.lock().await;
        if let Some(table) = &memo.colours {
            return Ok(table.clone());
        }

        log::info!("Preloading LDraw colours from {}", self.config.colour_config_url);
        let data = fetcher
            .fetch(&self.config.colour_config_url, &no_progress)
            .await?;
        let table = Arc::new(ColourTable::parse(&decode_text(data)?)?);
        memo.colours = Some(table.clone());
        Ok(table)
    }

    /// Parts-library locations tried for a part, in order
    fn library_candidates(&self, name: &str) -> Vec<String> {
        let library = &self.config.parts_library_url;
        ["parts/", "p/", "models/"]
            .iter()
            .map(|dir| format!("{library}{dir}{name}"))
            .collect()
    }

    /// Library document already fetched for `name`
    async fn memoized(&self, name: &str) -> Option<Vec<Arc<LDrawFile>>> {
        let memo = self.memo.lock().await;
        self.library_candidates(name)
            .iter()
            .find_map(|locator| memo.parts.get(locator).cloned())
    }

    /// Fetch a part from the library, then beside the model
    ///
    /// Only library hits are memoized; files beside the model belong to
    /// this request.
    async fn fetch_part(
        &self,
        model: &str,
        name: &str,
        fetcher: &dyn ResourceFetcher,
    ) -> Result<Vec<Arc<LDrawFile>>, DecodeError> {
        let candidates = self
            .library_candidates(name)
            .into_iter()
            .map(|locator| (locator, true))
            .chain(std::iter::once((join_locator(model, name), false)));

        for (candidate, in_library) in candidates {
            match fetcher.fetch(&candidate, &no_progress).await {
                Ok(data) => {
                    log::debug!("Resolved LDraw part {name} at {candidate}");
                    let files: Vec<Arc<LDrawFile>> = parse_document(&decode_text(data)?, name)?
                        .into_iter()
                        .map(Arc::new)
                        .collect();
                    if in_library {
                        self.memo.lock().await.parts.insert(candidate, files.clone());
                    }
                    return Ok(files);
                }
                Err(FetchError::NotFound(_)) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(LDrawError::MissingPart(name.to_string()).into())
    }

    /// Resolve every part the model references that is not embedded
    async fn resolve_parts(
        &self,
        locator: &str,
        embedded: &HashMap<String, Arc<LDrawFile>>,
        fetcher: &dyn ResourceFetcher,
        progress: &ProgressAggregator,
    ) -> Result<HashMap<String, Arc<LDrawFile>>, DecodeError> {
        let mut resolved: HashMap<String, Arc<LDrawFile>> = HashMap::new();
        let mut queue: VecDeque<String> = embedded
            .values()
            .flat_map(|file| file.references().map(str::to_string).collect::<Vec<_>>())
            .collect();
        let mut requested = queue.len().max(1);
        let mut done = 0;

        while let Some(name) = queue.pop_front() {
            done += 1;
            if embedded.contains_key(&name) || resolved.contains_key(&name) {
                continue;
            }

            let files = match self.memoized(&name).await {
                Some(files) => files,
                None => self.fetch_part(locator, &name, fetcher).await?,
            };
            let main = files.first().cloned().ok_or(LDrawError::Empty)?;

            for file in &files {
                for reference in file.references() {
                    queue.push_back(reference.to_string());
                    requested += 1;
                }
            }
            for extra in files.iter().skip(1) {
                resolved
                    .entry(extra.name.clone())
                    .or_insert_with(|| extra.clone());
            }
            resolved.insert(name, main);
            progress.report(done as f32 / requested as f32);
        }

        Ok(resolved)
    }

    /// Fetch and decode a model into a merged scene tree
    pub async fn decode(
        &self,
        locator: &str,
        fetcher: &dyn ResourceFetcher,
        progress: &ProgressAggregator,
    ) -> Result<SceneNode, DecodeError> {
        let colours = self.colour_table(fetcher).await?;

        let data = fetcher.fetch(locator, &no_progress).await?;
        let default_name = normalize_name(
            strip_query(locator)
                .rsplit('/')
                .next()
                .unwrap_or(locator),
        );
        let files = parse_document(&decode_text(data)?, &default_name)?;
        let main = files.first().map(|file| file.name.clone()).ok_or(LDrawError::Empty)?;

        let embedded: HashMap<String, Arc<LDrawFile>> = files
            .into_iter()
            .map(|file| (file.name.clone(), Arc::new(file)))
            .collect();
        let parts = self.resolve_parts(locator, &embedded, fetcher, progress).await?;
        progress.report(1.0);

        let mut table = (*colours).clone();
        for file in embedded.values() {
            for colour in &file.colours {
                table.insert(colour.clone());
            }
        }

        let mut builder = Builder {
            files: |name: &str| embedded.get(name).or_else(|| parts.get(name)).cloned(),
            table: &table,
            max_depth: self.config.max_depth,
            surfaces: BTreeMap::new(),
            edges: BTreeMap::new(),
        };
        let root_file = embedded.get(&main).cloned().ok_or(LDrawError::Empty)?;
        builder.walk(&root_file, Mat4::IDENTITY, MAIN_COLOUR, false, 0)?;
        Ok(builder.finish(&main))
    }

    /// Rotate upright, drop line meshes and scale roughness
    pub fn post_process(&self, root: &mut SceneNode) {
        root.transform.rotation = Quat::from_rotation_x(PI) * root.transform.rotation;

        let removed = root.remove_descendants(&|node: &SceneNode| {
            node.mesh.as_ref().is_some_and(Mesh::is_line)
        });

        let scale = self.config.roughness_scale;
        let materials = root.materials();
        for material in &materials {
            let mut material = material.write();
            if let Some(roughness) = material.scalar(MaterialProperty::Roughness) {
                material.set(MaterialProperty::Roughness, PropertyValue::Scalar(roughness * scale));
            }
        }
        log::debug!(
            "LDraw post-process removed {removed} line nodes, scaled {} materials",
            materials.len()
        );
    }
}

/// Colour resolved against the current parent colour
fn resolve_colour(code: u32, parent: u32) -> u32 {
    if code == MAIN_COLOUR {
        parent
    } else {
        code
    }
}

struct Builder<'t, F> {
    files: F,
    table: &'t ColourTable,
    max_depth: usize,
    surfaces: BTreeMap<u32, Vec<Vertex>>,
    edges: BTreeMap<u32, Vec<Vertex>>,
}

impl<'t, F> Builder<'t, F>
where
    F: Fn(&str) -> Option<Arc<LDrawFile>>,
{
    fn walk(
        &mut self,
        file: &LDrawFile,
        transform: Mat4,
        colour: u32,
        invert: bool,
        depth: usize,
    ) -> Result<(), LDrawError> {
        if depth > self.max_depth {
            return Err(LDrawError::TooDeep(self.max_depth));
        }

        let flip = invert ^ (transform.determinant() < 0.0) ^ file.clockwise;
        let place = |point: Vec3| Vertex::at(transform.transform_point3(point).to_array());

        for command in &file.commands {
            match command {
                Command::Subfile(reference) => {
                    let child = (self.files)(reference.name.as_str())
                        .ok_or_else(|| LDrawError::MissingPart(reference.name.clone()))?;
                    self.walk(
                        &child,
                        transform * reference.transform,
                        resolve_colour(reference.colour, colour),
                        invert ^ reference.invert,
                        depth + 1,
                    )?;
                }
                Command::Line { colour: code, points } => {
                    // Edge colour 24 resolves to the parent's edge entry
                    let owner = if *code == EDGE_COLOUR {
                        colour
                    } else {
                        resolve_colour(*code, colour)
                    };
                    self.edges
                        .entry(owner)
                        .or_default()
                        .extend(points.iter().map(|p| place(*p)));
                }
                Command::Triangle { colour: code, points } => {
                    let [a, b, c] = (*points).map(place);
                    let target = self.surfaces.entry(resolve_colour(*code, colour)).or_default();
                    if flip {
                        target.extend([a, c, b]);
                    } else {
                        target.extend([a, b, c]);
                    }
                }
                Command::Quad { colour: code, points } => {
                    let [a, b, c, d] = (*points).map(place);
                    let target = self.surfaces.entry(resolve_colour(*code, colour)).or_default();
                    if flip {
                        target.extend([a, c, b, a, d, c]);
                    } else {
                        target.extend([a, b, c, a, c, d]);
                    }
                }
            }
        }
        Ok(())
    }

    fn colour(&self, code: u32) -> ColourDef {
        self.table.resolve(code).unwrap_or_else(|| {
            log::warn!("LDraw colour {code} is not defined, using fallback");
            ColourDef::missing(code)
        })
    }

    fn finish(self, name: &str) -> SceneNode {
        let mut root = SceneNode::new(Some(name.to_string()));

        for (code, vertices) in &self.surfaces {
            let colour = self.colour(*code);
            let mut geometry = Geometry::new(PrimitiveType::Triangles, vertices.clone(), Vec::new());
            geometry.compute_normals();
            root.add_child(SceneNode::with_mesh(
                Some(colour.name.clone()),
                Mesh::new(geometry, shared(colour.material())),
            ));
        }

        for (code, vertices) in &self.edges {
            let colour = self.colour(*code);
            let geometry = Geometry::new(PrimitiveType::Lines, vertices.clone(), Vec::new());
            root.add_child(SceneNode::with_mesh(
                Some(format!("{}_edges", colour.name)),
                Mesh::new(geometry, shared(colour.edge_material())),
            ));
        }

        log::debug!(
            "Merged LDraw model {name}: {} colours, {} edge groups",
            self.surfaces.len(),
            self.edges.len()
        );
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;
    use crate::progress::NullProgress;
    use futures::executor::block_on;

    const COLOURS: &str = "\
0 !COLOUR Main_Colour CODE 16 VALUE #7F7F7F EDGE #333333
0 !COLOUR Edge_Colour CODE 24 VALUE #7F7F7F EDGE #333333
0 !COLOUR Red CODE 4 VALUE #C91A09 EDGE #333333
";

    fn config() -> LDrawConfig {
        LDrawConfig {
            colour_config_url: "lib/colours.ldr".to_string(),
            parts_library_url: "lib/".to_string(),
            ..LDrawConfig::default()
        }
    }

    fn decode(importer: &LDrawImporter, fetcher: &MemoryFetcher, locator: &str) -> Result<SceneNode, DecodeError> {
        let progress = ProgressAggregator::new(Arc::new(NullProgress));
        block_on(importer.decode(locator, fetcher, &progress))
    }

    #[test]
    fn test_parts_resolve_from_library_and_memo() {
        let fetcher = MemoryFetcher::new()
            .with_resource("lib/colours.ldr", COLOURS)
            .with_resource("lib/parts/brick.dat", "3 16 0 0 0 1 0 0 0 1 0\n2 24 0 0 0 1 0 0\n")
            .with_resource("model.ldr", "1 4 0 0 0 1 0 0 0 1 0 0 0 1 brick.dat\n");
        let importer = LDrawImporter::new(config());

        let root = decode(&importer, &fetcher, "model.ldr").unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].name.as_deref(), Some("Red"));
        assert_eq!(block_on(importer.cached_parts()), 1);

        decode(&importer, &fetcher, "model.ldr").unwrap();
        assert_eq!(fetcher.request_count_for("lib/colours.ldr"), 1);
        assert_eq!(fetcher.request_count_for("lib/parts/brick.dat"), 1);
    }

    #[test]
    fn test_parts_beside_model_are_not_shared() {
        let fetcher = MemoryFetcher::new()
            .with_resource("lib/colours.ldr", COLOURS)
            .with_resource("a/house.ldr", "1 4 0 0 0 1 0 0 0 1 0 0 0 1 roof.ldr\n")
            .with_resource("a/roof.ldr", "3 16 0 0 0 1 0 0 0 1 0\n")
            .with_resource("b/car.ldr", "1 4 0 0 0 1 0 0 0 1 0 0 0 1 roof.ldr\n")
            .with_resource("b/roof.ldr", "3 16 0 0 0 50 0 0 0 1 0\n");
        let importer = LDrawImporter::new(config());

        decode(&importer, &fetcher, "a/house.ldr").unwrap();
        let car = decode(&importer, &fetcher, "b/car.ldr").unwrap();

        assert_eq!(fetcher.request_count_for("a/roof.ldr"), 1);
        assert_eq!(fetcher.request_count_for("b/roof.ldr"), 1);
        let max_x = car.meshes()[0]
            .geometry
            .vertices
            .iter()
            .map(|v| v.position[0])
            .fold(f32::MIN, f32::max);
        assert_eq!(max_x, 50.0);
        assert_eq!(block_on(importer.cached_parts()), 0);
    }

    #[test]
    fn test_missing_part_fails() {
        let fetcher = MemoryFetcher::new()
            .with_resource("lib/colours.ldr", COLOURS)
            .with_resource("model.ldr", "1 4 0 0 0 1 0 0 0 1 0 0 0 1 nowhere.dat\n");
        let importer = LDrawImporter::new(config());

        let err = decode(&importer, &fetcher, "model.ldr").unwrap_err();
        assert!(matches!(err, DecodeError::LDraw(LDrawError::MissingPart(name)) if name == "nowhere.dat"));
    }

    #[test]
    fn test_reference_cycle_is_rejected() {
        let fetcher = MemoryFetcher::new()
            .with_resource("lib/colours.ldr", COLOURS)
            .with_resource(
                "loop.mpd",
                "0 FILE a.ldr\n1 16 0 0 0 1 0 0 0 1 0 0 0 1 b.ldr\n0 FILE b.ldr\n1 16 0 0 0 1 0 0 0 1 0 0 0 1 a.ldr\n",
            );
        let importer = LDrawImporter::new(config());

        let err = decode(&importer, &fetcher, "loop.mpd").unwrap_err();
        assert!(matches!(err, DecodeError::LDraw(LDrawError::TooDeep(64))));
    }

    #[test]
    fn test_mirrored_reference_flips_winding() {
        let fetcher = MemoryFetcher::new()
            .with_resource("lib/colours.ldr", COLOURS)
            .with_resource(
                "mirror.mpd",
                "0 FILE main.ldr\n\
                 1 4 0 0 0 -1 0 0 0 1 0 0 0 1 tri.ldr\n\
                 0 FILE tri.ldr\n\
                 3 16 0 0 0 1 0 0 0 1 0\n",
            );
        let importer = LDrawImporter::new(config());

        let root = decode(&importer, &fetcher, "mirror.mpd").unwrap();
        let geometry = &root.children[0].mesh.as_ref().unwrap().geometry;
        // Mirrored in X and flipped back, so the face still points +Z
        assert_eq!(geometry.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_post_process() {
        let fetcher = MemoryFetcher::new()
            .with_resource("lib/colours.ldr", COLOURS)
            .with_resource("model.ldr", "3 4 0 0 0 1 0 0 0 1 0\n2 24 0 0 0 1 0 0\n");
        let importer = LDrawImporter::new(config());

        let mut root = decode(&importer, &fetcher, "model.ldr").unwrap();
        importer.post_process(&mut root);

        assert_eq!(root.children.len(), 1);
        assert!(root.meshes().iter().all(|mesh| !mesh.is_line()));
        let roughness = root.materials()[0].read().scalar(MaterialProperty::Roughness);
        assert_eq!(roughness, Some(0.3 * 0.25));
        let up = root.transform.rotation * Vec3::Y;
        assert!((up - Vec3::NEG_Y).length() < 1e-5);
    }
}
