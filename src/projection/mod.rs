// Map projection capability shared by placement and collision code.
//
// Placement never branches on a concrete projection type beyond asking
// `is_spherical()`; everything else goes through the trait.

pub(crate) mod globe;
mod mercator;

pub use globe::{
    GLOBE_RADIUS, Globe, globe_denormalize_ecef, globe_normalize_ecef, globe_tile_bounds,
    globe_to_mercator_transition, lat_lng_to_ecef, tile_coord_to_ecef,
};
pub use mercator::Mercator;

use glam::{DMat4, DVec2, DVec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::tile::{CanonicalTileId, LngLat, UnwrappedTileId};
use crate::transform::{CameraState, CameraTransform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectionKind {
    #[default]
    Mercator,
    Globe,
}

impl ProjectionKind {
    pub fn projector(self) -> Arc<dyn Projector> {
        match self {
            ProjectionKind::Mercator => Arc::new(Mercator),
            ProjectionKind::Globe => Arc::new(Globe),
        }
    }
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionKind::Mercator => f.write_str("mercator"),
            ProjectionKind::Globe => f.write_str("globe"),
        }
    }
}

pub trait Projector: fmt::Debug + Send + Sync {
    fn kind(&self) -> ProjectionKind;

    fn is_spherical(&self) -> bool {
        self.kind() == ProjectionKind::Globe
    }

    /// Position of a tile-local point in the space expected by
    /// `create_tile_matrix`: normalized ECEF for the globe, tile units for
    /// mercator.
    fn project_tile_point(&self, x: f64, y: f64, tile: &CanonicalTileId) -> DVec3;

    /// Screen pixel position of a geographic location.
    fn location_point(&self, tr: &CameraTransform, lng_lat: LngLat) -> DVec2;

    /// Mercator coordinate (0..1 on both axes) under a screen pixel.
    fn point_coordinate(&self, tr: &CameraTransform, x: f64, y: f64) -> DVec2;

    /// Tile-local to world-pixel matrix, without the camera projection.
    fn create_tile_matrix(&self, tr: &CameraTransform, world_size: f64, tile: &UnwrappedTileId) -> DMat4;

    fn create_inversion_matrix(&self, tr: &CameraTransform, tile: &CanonicalTileId) -> DMat4;

    /// Depth of the farthest visible fragment, used for the far clip plane.
    fn farthest_pixel_distance(&self, state: &CameraState) -> f64;

    /// Local "up" direction in tile space at a tile-local point.
    fn up_vector(&self, tile: &CanonicalTileId, x: f64, y: f64) -> DVec3;

    /// Tile-space units per meter along `up_vector`.
    fn up_vector_scale(&self, tile: &CanonicalTileId, latitude: f64, world_size: f64) -> f64;
}

/// Distance along the view axis to the farthest visible point of the ground
/// plane, capped by the horizon.
pub(crate) fn farthest_pixel_distance_on_plane(state: &CameraState) -> f64 {
    let fov_above_center = state.fov_above_center();
    let camera_to_sea_level_distance = state.camera_to_center_distance;
    let top_half_surface_distance = fov_above_center.sin() * camera_to_sea_level_distance
        / (std::f64::consts::FRAC_PI_2 - state.pitch - fov_above_center)
            .max(0.01)
            .sin();
    let furthest_distance =
        state.pitch.sin() * top_half_surface_distance + camera_to_sea_level_distance;
    let horizon_distance = camera_to_sea_level_distance / state.horizon_shift;
    (furthest_distance * 1.01).min(horizon_distance)
}
