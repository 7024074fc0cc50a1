use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

/// Catalog revision; bump when any preset's numbers change.
pub const CATALOG_VERSION: u32 = 1;

/// Immutable per-run configuration for the classical pipeline.
///
/// `sensitivity` and `edge_contrast` are expected in [0, 100]; clamping is the
/// caller's job, the pipeline consumes the values as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSettings {
    /// Inversely maps to the Canny low/high thresholds.
    pub sensitivity: f64,
    /// Pixel-area floor, in processing-resolution pixels before scale
    /// correction.
    pub min_grain_size: f64,
    /// Controls the edge-dilation kernel size; softer boundaries need more
    /// dilation to close gaps.
    pub edge_contrast: f64,
    /// Douglas-Peucker epsilon, processing-resolution pixels.
    pub simplify_tolerance: f64,
    pub simplify_outlines: bool,
    /// Provenance only, never affects behavior.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset_name: Option<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        PresetKind::Default.settings()
    }
}

/// Fixed preset catalog keyed by rock-type/imaging-mode identifiers.
///
/// Static data; not user-editable at the engine level.
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PresetKind {
    /// Balanced starting point for unknown lithologies
    Default,
    /// Coarse-grained granite under crossed polars
    GraniteXpl,
    /// Granite under plane-polarized light (weaker grain boundaries)
    GranitePpl,
    /// Fine-grained basalt groundmass
    Basalt,
    /// Marble with sutured calcite boundaries
    Marble,
    /// Well-sorted sandstone, high boundary contrast
    Sandstone,
}

impl PresetKind {
    /// All catalog keys, in declaration order.
    pub fn names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Default => "Balanced starting point for unknown lithologies",
            Self::GraniteXpl => "Coarse-grained granite under crossed polars",
            Self::GranitePpl => "Granite under plane-polarized light",
            Self::Basalt => "Fine-grained basalt groundmass",
            Self::Marble => "Marble with sutured calcite boundaries",
            Self::Sandstone => "Well-sorted sandstone, high boundary contrast",
        }
    }

    /// The parameter bundle for this preset.
    pub fn settings(&self) -> DetectionSettings {
        let (sensitivity, min_grain_size, edge_contrast, simplify_tolerance) = match self {
            Self::Default => (50.0, 100.0, 50.0, 2.0),
            Self::GraniteXpl => (60.0, 400.0, 65.0, 2.5),
            Self::GranitePpl => (75.0, 400.0, 35.0, 2.5),
            Self::Basalt => (70.0, 40.0, 55.0, 1.5),
            Self::Marble => (55.0, 250.0, 45.0, 2.0),
            Self::Sandstone => (40.0, 150.0, 70.0, 2.0),
        };
        DetectionSettings {
            sensitivity,
            min_grain_size,
            edge_contrast,
            simplify_tolerance,
            simplify_outlines: true,
            preset_name: Some(self.to_string()),
        }
    }
}
