use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tuning for collision detection. Defaults match what map styles expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Margin around the viewport covered by the collision grids, in pixels.
    pub viewport_padding: f64,
    pub grid_cell_size: f64,
    /// Fog opacity above which a symbol counts as occluded.
    pub fog_symbol_clipping_threshold: f64,
    /// Labels at or below this perspective ratio are rejected.
    pub min_perspective_ratio: f64,
    /// Circle diameter for line labels; the evaluated text size when unset.
    pub collision_circle_diameter: Option<f64>,
    pub text_pixel_padding: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            viewport_padding: 100.0,
            grid_cell_size: 25.0,
            fog_symbol_clipping_threshold: crate::terrain::FOG_SYMBOL_CLIPPING_THRESHOLD,
            min_perspective_ratio: 0.55,
            collision_circle_diameter: None,
            text_pixel_padding: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Record rejected boxes alongside placed ones.
    pub show_collision_boxes: bool,
    /// Keep testing circles after the first collision so every circle's
    /// state can be drawn.
    pub show_collision_circles: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub placement: PlacementConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacementConfigFile {
    viewport_padding: Option<f64>,
    grid_cell_size: Option<f64>,
    fog_symbol_clipping_threshold: Option<f64>,
    min_perspective_ratio: Option<f64>,
    collision_circle_diameter: Option<f64>,
    text_pixel_padding: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugConfigFile {
    show_collision_boxes: Option<bool>,
    show_collision_circles: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    placement: Option<PlacementConfigFile>,
    debug: Option<DebugConfigFile>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Merges a JSON config document over the defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = serde_json::from_str(contents)?;

    if let Some(placement) = parsed.placement {
        if let Some(v) = placement.viewport_padding {
            config.placement.viewport_padding = v;
        }
        if let Some(v) = placement.grid_cell_size {
            anyhow::ensure!(v > 0.0, "gridCellSize must be positive, got {v}");
            config.placement.grid_cell_size = v;
        }
        if let Some(v) = placement.fog_symbol_clipping_threshold {
            config.placement.fog_symbol_clipping_threshold = v;
        }
        if let Some(v) = placement.min_perspective_ratio {
            config.placement.min_perspective_ratio = v;
        }
        if let Some(v) = placement.collision_circle_diameter {
            config.placement.collision_circle_diameter = Some(v);
        }
        if let Some(v) = placement.text_pixel_padding {
            config.placement.text_pixel_padding = v;
        }
    }

    if let Some(debug) = parsed.debug {
        if let Some(v) = debug.show_collision_boxes {
            config.debug.show_collision_boxes = v;
        }
        if let Some(v) = debug.show_collision_circles {
            config.debug.show_collision_circles = v;
        }
    }

    Ok(config)
}
