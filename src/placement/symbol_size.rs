use serde::{Deserialize, Serialize};

use super::types::PlacedSymbol;
use crate::tile::interpolate;

/// Feature sizes are stored as fixed point with this many steps per pixel.
pub const SIZE_PACK_FACTOR: f64 = 128.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Interpolation {
    Linear,
    Exponential { base: f64 },
}

impl Interpolation {
    /// Progress of `input` between `lower` and `upper`, before clamping.
    pub fn factor(&self, input: f64, lower: f64, upper: f64) -> f64 {
        let base = match self {
            Interpolation::Linear => 1.0,
            Interpolation::Exponential { base } => *base,
        };
        let difference = upper - lower;
        let progress = input - lower;
        if difference == 0.0 {
            0.0
        } else if base == 1.0 {
            progress / difference
        } else {
            (base.powf(progress) - 1.0) / (base.powf(difference) - 1.0)
        }
    }
}

/// How a bucket's text size varies with zoom and feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SizeData {
    Constant {
        layout_size: f64,
    },
    /// Per-feature size, constant across zoom.
    Source,
    /// Zoom-dependent size shared by every feature.
    Camera {
        min_zoom: f64,
        max_zoom: f64,
        min_size: f64,
        max_size: f64,
        #[serde(default)]
        interpolation: Option<Interpolation>,
    },
    /// Zoom- and feature-dependent size; each feature packs its sizes at
    /// `min_zoom` and `max_zoom`.
    Composite {
        min_zoom: f64,
        max_zoom: f64,
        #[serde(default)]
        interpolation: Option<Interpolation>,
    },
}

impl Default for SizeData {
    fn default() -> Self {
        SizeData::Constant { layout_size: 16.0 }
    }
}

/// Zoom-only part of a size evaluation, shared by a bucket's symbols.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PartiallyEvaluatedSize {
    pub size: f64,
    pub size_t: f64,
}

pub fn evaluate_size_for_zoom(size_data: &SizeData, zoom: f64) -> PartiallyEvaluatedSize {
    let t_for = |interpolation: &Option<Interpolation>, min_zoom: f64, max_zoom: f64| match interpolation {
        Some(interpolation) => interpolation.factor(zoom, min_zoom, max_zoom).clamp(0.0, 1.0),
        None => 0.0,
    };
    match size_data {
        SizeData::Constant { layout_size } => PartiallyEvaluatedSize {
            size: *layout_size,
            size_t: 0.0,
        },
        SizeData::Source => PartiallyEvaluatedSize::default(),
        SizeData::Camera {
            min_zoom,
            max_zoom,
            min_size,
            max_size,
            interpolation,
        } => PartiallyEvaluatedSize {
            size: interpolate(*min_size, *max_size, t_for(interpolation, *min_zoom, *max_zoom)),
            size_t: 0.0,
        },
        SizeData::Composite {
            min_zoom,
            max_zoom,
            interpolation,
        } => PartiallyEvaluatedSize {
            size: 0.0,
            size_t: t_for(interpolation, *min_zoom, *max_zoom),
        },
    }
}

pub fn evaluate_size_for_feature(
    size_data: &SizeData,
    partial: PartiallyEvaluatedSize,
    symbol: &PlacedSymbol,
) -> f64 {
    let lower = symbol.lower_size as f64 / SIZE_PACK_FACTOR;
    let upper = symbol.upper_size as f64 / SIZE_PACK_FACTOR;
    match size_data {
        SizeData::Source => lower,
        SizeData::Composite { .. } => interpolate(lower, upper, partial.size_t),
        _ => partial.size,
    }
}
