use glam::{DMat4, DVec2, DVec3, DVec4};

use super::{ProjectionKind, Projector, farthest_pixel_distance_on_plane};
use crate::tile::{
    CanonicalTileId, EXTENT, LngLat, UnwrappedTileId, mercator_x_from_lng, mercator_y_from_lat,
    mercator_z_from_altitude,
};
use crate::transform::{CameraState, CameraTransform};

/// Planar web-mercator projection. Tile points stay in tile units with z in
/// meters; the tile matrix scales them into world pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mercator;

impl Projector for Mercator {
    fn kind(&self) -> ProjectionKind {
        ProjectionKind::Mercator
    }

    fn project_tile_point(&self, x: f64, y: f64, _tile: &CanonicalTileId) -> DVec3 {
        DVec3::new(x, y, 0.0)
    }

    fn location_point(&self, tr: &CameraTransform, lng_lat: LngLat) -> DVec2 {
        let world_size = tr.state.world_size;
        let p = tr.pixel_matrix
            * DVec4::new(
                mercator_x_from_lng(lng_lat.lng) * world_size,
                mercator_y_from_lat(lng_lat.lat) * world_size,
                0.0,
                1.0,
            );
        DVec2::new(p.x / p.w, p.y / p.w)
    }

    fn point_coordinate(&self, tr: &CameraTransform, x: f64, y: f64) -> DVec2 {
        let c0 = tr.pixel_matrix_inverse * DVec4::new(x, y, 0.0, 1.0);
        let c1 = tr.pixel_matrix_inverse * DVec4::new(x, y, 1.0, 1.0);
        let p0 = c0.truncate() / c0.w;
        let p1 = c1.truncate() / c1.w;
        let t = if p0.z == p1.z { 0.0 } else { -p0.z / (p1.z - p0.z) };
        let hit = p0.lerp(p1, t);
        DVec2::new(hit.x, hit.y) / tr.state.world_size
    }

    fn create_tile_matrix(&self, tr: &CameraTransform, world_size: f64, tile: &UnwrappedTileId) -> DMat4 {
        let canonical = tile.canonical;
        let scale = world_size / canonical.tile_count();
        let unwrapped_x = canonical.x as f64 + canonical.tile_count() * tile.wrap as f64;
        let pixels_per_meter = mercator_z_from_altitude(1.0, tr.state.center.lat) * world_size;
        DMat4::from_translation(DVec3::new(unwrapped_x * scale, canonical.y as f64 * scale, 0.0))
            * DMat4::from_scale(DVec3::new(scale / EXTENT, scale / EXTENT, pixels_per_meter))
    }

    fn create_inversion_matrix(&self, _tr: &CameraTransform, _tile: &CanonicalTileId) -> DMat4 {
        DMat4::IDENTITY
    }

    fn farthest_pixel_distance(&self, state: &CameraState) -> f64 {
        farthest_pixel_distance_on_plane(state)
    }

    fn up_vector(&self, _tile: &CanonicalTileId, _x: f64, _y: f64) -> DVec3 {
        DVec3::Z
    }

    fn up_vector_scale(&self, _tile: &CanonicalTileId, _latitude: f64, _world_size: f64) -> f64 {
        1.0
    }
}
