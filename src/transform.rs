use glam::{DMat2, DMat3, DMat4, DVec2, DVec3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::projection::{ProjectionKind, Projector};
use crate::terrain::FogState;
use crate::tile::{
    LngLat, MAX_MERCATOR_LATITUDE, OverscaledTileId, TILE_SIZE, UnwrappedTileId,
    lat_from_mercator_y, lng_from_mercator_x, mercator_x_from_lng, mercator_y_from_lat,
    pixels_to_tile_units, wrap,
};

const DEFAULT_FOV_DEGREES: f64 = 36.869_897_645_844_02;
const MAX_PITCH_DEGREES: f64 = 85.0;

/// Camera parameters for one frame, in the units a map API exposes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformParams {
    pub width: f64,
    pub height: f64,
    pub zoom: f64,
    pub center: LngLat,
    /// Degrees from nadir.
    pub pitch: f64,
    /// Degrees clockwise from north.
    pub bearing: f64,
    /// Vertical field of view in degrees.
    pub fov: f64,
    pub projection: ProjectionKind,
    pub fog: Option<FogState>,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            width: 1024.0,
            height: 768.0,
            zoom: 0.0,
            center: LngLat::new(0.0, 0.0),
            pitch: 0.0,
            bearing: 0.0,
            fov: DEFAULT_FOV_DEGREES,
            projection: ProjectionKind::Mercator,
            fog: None,
        }
    }
}

/// Scalar camera state plus the camera frame derived from it. Everything
/// here is available before any matrix is built.
#[derive(Debug, Clone)]
pub struct CameraState {
    pub width: f64,
    pub height: f64,
    pub zoom: f64,
    pub center: LngLat,
    /// Radians.
    pub pitch: f64,
    /// Map rotation in radians; the negated bearing.
    pub angle: f64,
    /// Radians.
    pub fov: f64,
    pub world_size: f64,
    /// Map center in world pixels.
    pub center_point: DVec2,
    pub camera_to_center_distance: f64,
    pub horizon_shift: f64,
}

impl CameraState {
    pub fn new(params: &TransformParams) -> Self {
        let width = params.width.max(1.0);
        let height = params.height.max(1.0);
        let fov = params.fov.to_radians();
        let world_size = TILE_SIZE * 2f64.powf(params.zoom);
        let lat = params.center.lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
        let center = LngLat::new(params.center.lng, lat);
        Self {
            width,
            height,
            zoom: params.zoom,
            center,
            pitch: params.pitch.clamp(0.0, MAX_PITCH_DEGREES).to_radians(),
            angle: -wrap(params.bearing, -180.0, 180.0).to_radians(),
            fov,
            world_size,
            center_point: DVec2::new(
                mercator_x_from_lng(center.lng) * world_size,
                mercator_y_from_lat(center.lat) * world_size,
            ),
            camera_to_center_distance: 0.5 / (fov / 2.0).tan() * height,
            horizon_shift: 0.1,
        }
    }

    pub fn fov_above_center(&self) -> f64 {
        self.fov * 0.5
    }

    pub fn bearing(&self) -> f64 {
        -self.angle.to_degrees()
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    /// World-to-camera rotation; its rows are the camera axes in world space.
    fn view_rotation(&self) -> DMat3 {
        DMat3::from_rotation_x(self.pitch) * DMat3::from_rotation_z(self.angle)
    }

    pub fn right(&self) -> DVec3 {
        self.view_rotation().row(0)
    }

    /// Screen-up direction. World y grows southward, so this is the
    /// negated second camera row.
    pub fn up(&self) -> DVec3 {
        -self.view_rotation().row(1)
    }

    pub fn forward(&self) -> DVec3 {
        -self.view_rotation().row(2)
    }

    /// Camera position relative to the map center, in world pixels.
    pub fn camera_position(&self) -> DVec3 {
        -self.forward() * self.camera_to_center_distance
    }

    pub fn camera_world_position(&self) -> DVec3 {
        self.center_point.extend(0.0) + self.camera_position()
    }
}

/// Immutable per-frame camera snapshot consumed by placement.
#[derive(Debug, Clone)]
pub struct CameraTransform {
    pub state: CameraState,
    pub projector: Arc<dyn Projector>,
    /// World pixels to clip space.
    pub proj_matrix: DMat4,
    /// Clip space to screen pixels.
    pub label_plane_matrix: DMat4,
    /// Screen pixels to clip space.
    pub gl_coord_matrix: DMat4,
    /// World pixels to screen pixels.
    pub pixel_matrix: DMat4,
    pub pixel_matrix_inverse: DMat4,
    /// Reference ECEF space to world pixels.
    pub globe_matrix: DMat4,
    pub near_z: f64,
    pub far_z: f64,
    pub fog: Option<FogState>,
}

impl CameraTransform {
    pub fn new(params: TransformParams) -> Self {
        let state = CameraState::new(&params);
        let projector = params.projection.projector();

        let near_z = state.height / 50.0;
        let far_z = projector.farthest_pixel_distance(&state).max(near_z * 2.0);

        let proj_matrix = DMat4::perspective_rh_gl(state.fov, state.aspect_ratio(), near_z, far_z)
            * DMat4::from_scale(DVec3::new(1.0, -1.0, 1.0))
            * DMat4::from_translation(DVec3::new(0.0, 0.0, -state.camera_to_center_distance))
            * DMat4::from_rotation_x(state.pitch)
            * DMat4::from_rotation_z(state.angle)
            * DMat4::from_translation(DVec3::new(-state.center_point.x, -state.center_point.y, 0.0));

        let label_plane_matrix = DMat4::from_scale(DVec3::new(state.width / 2.0, -state.height / 2.0, 1.0))
            * DMat4::from_translation(DVec3::new(1.0, -1.0, 0.0));
        let gl_coord_matrix = DMat4::from_scale(DVec3::new(1.0, -1.0, 1.0))
            * DMat4::from_translation(DVec3::new(-1.0, -1.0, 0.0))
            * DMat4::from_scale(DVec3::new(2.0 / state.width, 2.0 / state.height, 1.0));

        let pixel_matrix = label_plane_matrix * proj_matrix;
        let pixel_matrix_inverse = pixel_matrix.inverse();
        let globe_matrix = crate::projection::globe::calculate_globe_matrix(&state);

        Self {
            state,
            projector,
            proj_matrix,
            label_plane_matrix,
            gl_coord_matrix,
            pixel_matrix,
            pixel_matrix_inverse,
            globe_matrix,
            near_z,
            far_z,
            fog: params.fog,
        }
    }

    pub fn projector(&self) -> &dyn Projector {
        self.projector.as_ref()
    }

    pub fn camera_to_center_distance(&self) -> f64 {
        self.state.camera_to_center_distance
    }

    /// Tile units to world pixels.
    pub fn world_tile_matrix(&self, tile: &UnwrappedTileId) -> DMat4 {
        self.projector.create_tile_matrix(self, self.state.world_size, tile)
    }

    /// Tile units to clip space.
    pub fn tile_matrix(&self, tile: &UnwrappedTileId) -> DMat4 {
        self.proj_matrix * self.world_tile_matrix(tile)
    }

    /// 2x2 block converting label pixels into tile units for a tile.
    pub fn pixels_to_tile_units_matrix(&self, tile: &OverscaledTileId) -> DMat2 {
        let s = pixels_to_tile_units(tile, 1.0, self.state.zoom);
        DMat2::from_diagonal(DVec2::splat(s))
    }

    pub fn location_point(&self, lng_lat: LngLat) -> DVec2 {
        self.projector.location_point(self, lng_lat)
    }

    pub fn point_coordinate(&self, x: f64, y: f64) -> DVec2 {
        self.projector.point_coordinate(self, x, y)
    }

    pub fn point_location(&self, x: f64, y: f64) -> LngLat {
        let coord = self.point_coordinate(x, y);
        LngLat::new(lng_from_mercator_x(coord.x), lat_from_mercator_y(coord.y))
    }
}
