//! Pipeline configuration
//!
//! Every empirical tuning constant the pipeline uses lives here so callers
//! can adjust them without touching the logic.

/// Default location of the LDraw colour configuration
pub const DEFAULT_LDRAW_COLOUR_CONFIG: &str =
    "https://raw.githubusercontent.com/gkjohnson/ldraw-parts-library/master/colors/ldcfgalt.ldr";

/// Default base path of the LDraw parts library
pub const DEFAULT_LDRAW_PARTS_LIBRARY: &str =
    "https://raw.githubusercontent.com/gkjohnson/ldraw-parts-library/master/complete/ldraw/";

/// Transparency heuristic and transmissive material settings
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionConfig {
    /// Opacity at or below which a material counts as invisible
    pub min_opacity: f32,
    /// Opacity at or above which a material counts as solid
    pub max_opacity: f32,
    /// Lower bound for the HSL lightness of converted materials
    pub lightness_floor: f32,
    /// Index of refraction used when the request does not supply one
    pub default_ior: f32,
    /// Thickness forced on every material of an imported model
    pub thickness: f32,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            min_opacity: 0.2,
            max_opacity: 0.65,
            lightness_floor: 0.35,
            default_ior: 1.5,
            thickness: 1.0,
        }
    }
}

/// LDraw import settings
#[derive(Debug, Clone, PartialEq)]
pub struct LDrawConfig {
    /// Locator of the shared colour configuration (`ldcfgalt.ldr`)
    pub colour_config_url: String,
    /// Base locator of the parts library, ending in `/`
    pub parts_library_url: String,
    /// Factor applied to every mesh material's roughness
    pub roughness_scale: f32,
    /// Maximum subfile nesting depth
    pub max_depth: usize,
}

impl Default for LDrawConfig {
    fn default() -> Self {
        Self {
            colour_config_url: DEFAULT_LDRAW_COLOUR_CONFIG.to_string(),
            parts_library_url: DEFAULT_LDRAW_PARTS_LIBRARY.to_string(),
            roughness_scale: 0.25,
            max_depth: 64,
        }
    }
}

/// Progress mapping settings
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressConfig {
    /// Share of the progress range taken by the decode phase
    pub decode_share: f32,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { decode_share: 0.5 }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub transmission: TransmissionConfig,
    pub ldraw: LDrawConfig,
    pub progress: ProgressConfig,
}

impl PipelineConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the transmission settings
    pub fn with_transmission(mut self, transmission: TransmissionConfig) -> Self {
        self.transmission = transmission;
        self
    }

    /// Replace the LDraw settings
    pub fn with_ldraw(mut self, ldraw: LDrawConfig) -> Self {
        self.ldraw = ldraw;
        self
    }

    /// Replace the progress settings
    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = PipelineConfig::default();
        assert_eq!(config.transmission.min_opacity, 0.2);
        assert_eq!(config.transmission.max_opacity, 0.65);
        assert_eq!(config.transmission.lightness_floor, 0.35);
        assert_eq!(config.transmission.default_ior, 1.5);
        assert_eq!(config.ldraw.roughness_scale, 0.25);
        assert_eq!(config.progress.decode_share, 0.5);
    }

    #[test]
    fn test_parts_library_is_a_directory() {
        assert!(LDrawConfig::default().parts_library_url.ends_with('/'));
    }
}
