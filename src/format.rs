//! Model format detection

use std::fmt;

use crate::fetch::strip_query;

/// Supported model container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    /// JSON glTF with external or embedded buffers
    Gltf,
    /// Binary glTF container
    Glb,
    /// Collada XML
    Collada,
    /// LDraw model (`.ldr`) or multi-part document (`.mpd`)
    LDraw,
}

impl ModelFormat {
    /// Every format in registry order
    pub const ALL: [ModelFormat; 4] = [Self::Gltf, Self::Glb, Self::Collada, Self::LDraw];

    /// Match a file extension, case-insensitively
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "gltf" => Some(Self::Gltf),
            "glb" => Some(Self::Glb),
            "dae" => Some(Self::Collada),
            "mpd" | "ldr" => Some(Self::LDraw),
            _ => None,
        }
    }

    /// Detect the format of a locator from its extension
    ///
    /// Query strings and fragments are ignored.
    pub fn from_locator(locator: &str) -> Option<Self> {
        extension(locator).and_then(Self::from_extension)
    }

    /// Extensions routed to this format
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Gltf => &["gltf"],
            Self::Glb => &["glb"],
            Self::Collada => &["dae"],
            Self::LDraw => &["mpd", "ldr"],
        }
    }

    /// Which importer decodes this format
    pub fn importer_kind(&self) -> ImporterKind {
        match self {
            Self::Gltf | Self::Glb => ImporterKind::Gltf,
            Self::Collada => ImporterKind::Collada,
            Self::LDraw => ImporterKind::LDraw,
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gltf => "glTF",
            Self::Glb => "GLB",
            Self::Collada => "Collada",
            Self::LDraw => "LDraw",
        };
        f.write_str(name)
    }
}

/// Import strategy selected by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImporterKind {
    Gltf,
    Collada,
    LDraw,
}

/// Extension of the last path segment, without query or fragment
pub fn extension(locator: &str) -> Option<&str> {
    let path = strip_query(locator);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (stem, extension) = file_name.rsplit_once('.')?;
    (!stem.is_empty() && !extension.is_empty()).then_some(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        assert_eq!(ModelFormat::from_locator("cube.gltf"), Some(ModelFormat::Gltf));
        assert_eq!(ModelFormat::from_locator("cube.glb"), Some(ModelFormat::Glb));
        assert_eq!(ModelFormat::from_locator("scene.dae"), Some(ModelFormat::Collada));
        assert_eq!(ModelFormat::from_locator("car.mpd"), Some(ModelFormat::LDraw));
        assert_eq!(ModelFormat::from_locator("brick.ldr"), Some(ModelFormat::LDraw));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(ModelFormat::from_locator("CUBE.GLB"), Some(ModelFormat::Glb));
        assert_eq!(ModelFormat::from_locator("Scene.Dae"), Some(ModelFormat::Collada));
    }

    #[test]
    fn test_unsupported() {
        assert_eq!(ModelFormat::from_locator("model.obj"), None);
        assert_eq!(ModelFormat::from_locator("readme.txt"), None);
        assert_eq!(ModelFormat::from_locator("noextension"), None);
        assert_eq!(ModelFormat::from_locator("models.glb/file"), None);
        assert_eq!(ModelFormat::from_locator(".glb"), None);
    }

    #[test]
    fn test_query_and_fragment_ignored() {
        assert_eq!(
            ModelFormat::from_locator("https://cdn.example.com/a/cube.glb?v=2"),
            Some(ModelFormat::Glb)
        );
        assert_eq!(ModelFormat::from_locator("car.mpd#main"), Some(ModelFormat::LDraw));
    }

    #[test]
    fn test_importer_kinds() {
        assert_eq!(ModelFormat::Glb.importer_kind(), ImporterKind::Gltf);
        assert_eq!(ModelFormat::Gltf.importer_kind(), ImporterKind::Gltf);
        for format in ModelFormat::ALL {
            for ext in format.extensions() {
                assert_eq!(ModelFormat::from_extension(ext), Some(format));
            }
        }
    }
}
