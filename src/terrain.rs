// Interfaces to the terrain and fog collaborators. Placement only samples
// them; it never owns their data.

use glam::{DVec3, DVec4};
use serde::{Deserialize, Serialize};

use crate::tile::{CanonicalTileId, UnwrappedTileId, smoothstep};
use crate::transform::CameraTransform;

/// Fog opacity above which a symbol counts as hidden behind fog.
pub const FOG_SYMBOL_CLIPPING_THRESHOLD: f64 = 0.9;
const FOG_PITCH_START_DEGREES: f64 = 45.0;
const FOG_PITCH_END_DEGREES: f64 = 65.0;

/// Elevation sampler for terrain draping.
pub trait Elevation {
    /// Terrain height in meters at a tile-local point.
    fn elevation_at(&self, tile: &CanonicalTileId, x: f64, y: f64) -> f64;

    /// Offset that lifts a tile point onto the terrain surface, in the
    /// projector's tile space.
    fn tile_offset(&self, tr: &CameraTransform, tile: &CanonicalTileId, x: f64, y: f64) -> DVec3 {
        let elevation = self.elevation_at(tile, x, y);
        if elevation == 0.0 {
            return DVec3::ZERO;
        }
        let projector = tr.projector();
        let up = projector.up_vector(tile, x, y);
        let scale = projector.up_vector_scale(tile, tr.state.center.lat, tr.state.world_size);
        up * (elevation * scale)
    }
}

impl<F> Elevation for F
where
    F: Fn(&CanonicalTileId, f64, f64) -> f64,
{
    fn elevation_at(&self, tile: &CanonicalTileId, x: f64, y: f64) -> f64 {
        self(tile, x, y)
    }
}

/// Terrain with the same height everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatElevation(pub f64);

impl Elevation for FlatElevation {
    fn elevation_at(&self, _tile: &CanonicalTileId, _x: f64, _y: f64) -> f64 {
        self.0
    }
}

/// Fog parameters for the frame. `range` is measured in multiples of the
/// camera-to-center distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FogState {
    pub range: [f64; 2],
    pub alpha: f64,
}

impl Default for FogState {
    fn default() -> Self {
        Self {
            range: [0.5, 10.0],
            alpha: 1.0,
        }
    }
}

impl FogState {
    /// Opacity for a fragment at `depth` camera-to-center distances.
    pub fn opacity(&self, depth: f64, pitch_degrees: f64) -> f64 {
        let pitch_factor = smoothstep(FOG_PITCH_START_DEGREES, FOG_PITCH_END_DEGREES, pitch_degrees);
        let [start, end] = self.range;
        let span = (end - start).max(f64::EPSILON);
        let t = (depth - start) / span;
        const DECAY: f64 = 6.0;
        let mut falloff = 1.0 - (-DECAY * t).exp().min(1.0);
        falloff = falloff * falloff * falloff;
        falloff = (1.00747 * falloff).min(1.0);
        falloff * pitch_factor * self.alpha
    }

    /// Opacity at a point given in the tile's projected space.
    pub fn opacity_at_tile_coord(&self, tr: &CameraTransform, tile: &UnwrappedTileId, pos: DVec3) -> f64 {
        let world = tr.world_tile_matrix(tile) * DVec4::new(pos.x, pos.y, pos.z, 1.0);
        let world = world.truncate() / world.w;
        let depth = (world - tr.state.camera_world_position()).length() / tr.camera_to_center_distance();
        self.opacity(depth, tr.state.pitch.to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::LngLat;
    use crate::transform::TransformParams;

    #[test]
    fn fog_is_invisible_without_pitch() {
        let fog = FogState::default();
        assert_eq!(fog.opacity(20.0, 0.0), 0.0);
    }

    #[test]
    fn fog_thickens_with_distance() {
        let fog = FogState::default();
        let near = fog.opacity(1.0, 70.0);
        let far = fog.opacity(9.0, 70.0);
        assert!(near < far);
        assert!(far > FOG_SYMBOL_CLIPPING_THRESHOLD);
        assert_eq!(fog.opacity(0.2, 70.0), 0.0);
    }

    #[test]
    fn flat_elevation_lifts_along_z_in_mercator() {
        let tr = CameraTransform::new(TransformParams {
            center: LngLat::new(0.0, 0.0),
            zoom: 3.0,
            ..TransformParams::default()
        });
        let tile = CanonicalTileId::new(3, 4, 4);
        let offset = FlatElevation(250.0).tile_offset(&tr, &tile, 10.0, 10.0);
        assert_eq!(offset, DVec3::new(0.0, 0.0, 250.0));
    }

    #[test]
    fn closures_are_samplers() {
        let sampler = |_: &CanonicalTileId, x: f64, _y: f64| x * 2.0;
        assert_eq!(sampler.elevation_at(&CanonicalTileId::new(0, 0, 0), 3.0, 0.0), 6.0);
    }
}
