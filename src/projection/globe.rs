// Spherical projection. Tile geometry is expressed in ECEF coordinates
// normalized per tile, so the 16-bit-ish range used by planar tiles is
// kept and the same tile-matrix plumbing works for both projections.

use glam::{DMat4, DVec2, DVec3, DVec4};
use std::f64::consts::PI;

use super::{ProjectionKind, Projector, farthest_pixel_distance_on_plane};
use crate::tile::{
    CanonicalTileId, EARTH_RADIUS, EXTENT, MAX_MERCATOR_LATITUDE, UnwrappedTileId, interpolate,
    mercator_x_from_lng, mercator_y_from_lat, shortest_angle, smoothstep, LngLat,
};
use crate::transform::{CameraState, CameraTransform};

/// Radius of the reference globe in tile units at zoom 0.
pub const GLOBE_RADIUS: f64 = EXTENT / PI / 2.0;
pub const GLOBE_ZOOM_THRESHOLD_MIN: f64 = 5.0;
pub const GLOBE_ZOOM_THRESHOLD_MAX: f64 = 6.0;
const GLOBE_NORMALIZATION_BIT_RANGE: u32 = 15;
const GLOBE_NORMALIZATION_MASK: f64 = ((1u32 << (GLOBE_NORMALIZATION_BIT_RANGE - 1)) - 1) as f64;

#[derive(Debug, Clone, Copy, Default)]
pub struct Globe;

/// 0 while the globe is fully spherical, 1 once it has blended into mercator.
pub fn globe_to_mercator_transition(zoom: f64) -> f64 {
    smoothstep(GLOBE_ZOOM_THRESHOLD_MIN, GLOBE_ZOOM_THRESHOLD_MAX, zoom)
}

pub fn lat_lng_to_ecef(lat: f64, lng: f64, radius: f64) -> DVec3 {
    let lat = lat.clamp(-90.0, 90.0).to_radians();
    let lng = lng.to_radians();
    DVec3::new(
        lat.cos() * lng.sin() * radius,
        -lat.sin() * radius,
        lat.cos() * lng.cos() * radius,
    )
}

pub fn tile_coord_to_ecef(x: f64, y: f64, tile: &CanonicalTileId, radius: f64) -> DVec3 {
    let lng_lat = tile.tile_point_to_lng_lat(x, y);
    lat_lng_to_ecef(lng_lat.lat, lng_lat.lng, radius)
}

/// Axis-aligned ECEF bounds of a tile's surface patch.
pub fn globe_tile_bounds(tile: &CanonicalTileId) -> (DVec3, DVec3) {
    if tile.z <= 1 {
        return (DVec3::splat(-GLOBE_RADIUS), DVec3::splat(GLOBE_RADIUS));
    }
    // The patch bulges outward between its corners, so sample the edges
    // and interior as well as the corners.
    const STEPS: usize = 4;
    let mut min = DVec3::splat(f64::INFINITY);
    let mut max = DVec3::splat(f64::NEG_INFINITY);
    for i in 0..=STEPS {
        for j in 0..=STEPS {
            let x = EXTENT * i as f64 / STEPS as f64;
            let y = EXTENT * j as f64 / STEPS as f64;
            let p = tile_coord_to_ecef(x, y, tile, GLOBE_RADIUS);
            min = min.min(p);
            max = max.max(p);
        }
    }
    (min, max)
}

pub fn globe_normalize_ecef(bounds: (DVec3, DVec3)) -> DMat4 {
    let (min, max) = bounds;
    let max_extent = (max - min).max_element().max(f64::EPSILON);
    let st = GLOBE_NORMALIZATION_MASK / max_extent;
    DMat4::from_scale(DVec3::splat(st)) * DMat4::from_translation(-min)
}

pub fn globe_denormalize_ecef(bounds: (DVec3, DVec3)) -> DMat4 {
    let (min, max) = bounds;
    let max_extent = (max - min).max_element().max(f64::EPSILON);
    let scale = max_extent / GLOBE_NORMALIZATION_MASK;
    DMat4::from_translation(min) * DMat4::from_scale(DVec3::splat(scale))
}

fn globe_meters_to_ecef(d: f64) -> f64 {
    d * GLOBE_RADIUS / EARTH_RADIUS
}

/// Globe model matrix: reference ECEF space into world pixels, with the
/// given lng/lat rotated to face the camera at pixel position (x, y).
pub(crate) fn calculate_globe_pos_matrix(x: f64, y: f64, world_size: f64, lng: f64, lat: f64) -> DMat4 {
    let ws_radius = world_size / (2.0 * PI);
    let scale = ws_radius / GLOBE_RADIUS;
    DMat4::from_translation(DVec3::new(x, y, -ws_radius))
        * DMat4::from_scale(DVec3::splat(scale))
        * DMat4::from_rotation_x((-lat).to_radians())
        * DMat4::from_rotation_y((-lng).to_radians())
}

pub(crate) fn calculate_globe_matrix(state: &CameraState) -> DMat4 {
    let lat = state.center.lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    let x = mercator_x_from_lng(state.center.lng) * state.world_size;
    let y = mercator_y_from_lat(lat) * state.world_size;
    calculate_globe_pos_matrix(x, y, state.world_size, state.center.lng, state.center.lat)
}

/// Map-aligned label plane on the globe: the unrotated globe in pixel units.
pub(crate) fn calculate_globe_label_matrix(tr: &CameraTransform, tile: &CanonicalTileId) -> DMat4 {
    let point = tr.state.center_point;
    calculate_globe_pos_matrix(point.x, point.y, tr.state.world_size, 0.0, 0.0)
        * globe_denormalize_ecef(globe_tile_bounds(tile))
}

pub(crate) struct SphereHit {
    /// Point on the sphere relative to its center.
    pub point: DVec3,
    pub intersects: bool,
}

/// Closest point on a sphere to a ray. When the ray misses, the point on
/// the sphere nearest to the ray is returned instead.
pub(crate) fn closest_point_on_sphere(origin: DVec3, dir: DVec3, center: DVec3, radius: f64) -> SphereHit {
    let dir = dir.normalize_or_zero();
    let p = origin - center;
    if p == DVec3::ZERO || radius == 0.0 || dir == DVec3::ZERO {
        return SphereHit { point: DVec3::ZERO, intersects: false };
    }
    let b = 2.0 * p.dot(dir);
    let c = p.length_squared() - radius * radius;
    let d = b * b - 4.0 * c;
    if d < 0.0 {
        let t = (-b / 2.0).max(0.0);
        let g = p + dir * t;
        return SphereHit { point: g * (radius / g.length()), intersects: false };
    }
    let t = (-b - d.sqrt()) / 2.0;
    if t < 0.0 {
        SphereHit { point: p * (radius / p.length()), intersects: false }
    } else {
        SphereHit { point: p + dir * t, intersects: true }
    }
}

fn farthest_pixel_distance_on_sphere(state: &CameraState) -> f64 {
    let forward = state.forward();
    let camera_position = state.camera_position();
    let globe_radius = state.world_size / (2.0 * PI);
    let globe_center = DVec3::new(0.0, 0.0, -globe_radius);
    let aspect_ratio = state.width / state.height;
    let tan_angle = state.fov_above_center().tan();
    let dir = forward + state.up() * tan_angle + state.right() * tan_angle * aspect_ratio;

    let hit = closest_point_on_sphere(camera_position, dir, globe_center, globe_radius);
    let pixel_distance = if hit.intersects {
        (hit.point + globe_center - camera_position).dot(forward)
    } else {
        // Horizon: the sphere point whose normal is perpendicular to the view ray.
        let to_globe = globe_center - camera_position;
        let h = to_globe.length() - globe_radius;
        let tangent = (h * (h + 2.0 * globe_radius)).max(0.0).sqrt();
        let angle = (tangent / (globe_radius + h)).clamp(-1.0, 1.0).acos()
            - forward.dot(to_globe.normalize()).clamp(-1.0, 1.0).acos();
        tangent * angle.cos()
    };
    pixel_distance * 1.01
}

impl Projector for Globe {
    fn kind(&self) -> ProjectionKind {
        ProjectionKind::Globe
    }

    fn project_tile_point(&self, x: f64, y: f64, tile: &CanonicalTileId) -> DVec3 {
        let pos = tile_coord_to_ecef(x, y, tile, GLOBE_RADIUS);
        globe_normalize_ecef(globe_tile_bounds(tile)).transform_point3(pos)
    }

    fn location_point(&self, tr: &CameraTransform, lng_lat: LngLat) -> DVec2 {
        let pos = lat_lng_to_ecef(lng_lat.lat, lng_lat.lng, GLOBE_RADIUS);
        let p = tr.pixel_matrix * tr.globe_matrix * pos.extend(1.0);
        DVec2::new(p.x / p.w, p.y / p.w)
    }

    fn point_coordinate(&self, tr: &CameraTransform, x: f64, y: f64) -> DVec2 {
        let state = &tr.state;
        let point0 = state.camera_world_position();
        let far = tr.pixel_matrix_inverse * DVec4::new(x, y, 1.0, 1.0);
        let point1 = far.truncate() / far.w;
        let mut dir = (point1 - point0).normalize();

        let m = tr.globe_matrix;
        let globe_center = m.w_axis.truncate();
        let p0_to_center = globe_center - point0;
        let p0_to_center_dist = p0_to_center.length();
        let center_dir = p0_to_center / p0_to_center_dist;
        let radius = state.world_size / (2.0 * PI);
        let cos_angle = center_dir.dot(dir);
        let origo_tangent_angle = (radius / p0_to_center_dist).clamp(-1.0, 1.0).asin();
        let origo_dir_angle = cos_angle.clamp(-1.0, 1.0).acos();

        if origo_tangent_angle < origo_dir_angle {
            // The ray misses the globe: bend it onto the tangent cone so the
            // result sticks to the visible horizon.
            let clamped_p1 = dir * (p0_to_center_dist / cos_angle);
            let origo_to_p1 = (clamped_p1 - p0_to_center).normalize();
            dir = (p0_to_center + origo_to_p1 * (origo_tangent_angle.tan() * p0_to_center_dist))
                .normalize();
        }

        let on_globe = closest_point_on_sphere(point0, dir, globe_center, radius).point;
        let xa = m.x_axis.truncate().normalize();
        let ya = m.y_axis.truncate().normalize();
        let za = m.z_axis.truncate().normalize();
        let xp = xa.dot(on_globe);
        let yp = ya.dot(on_globe);
        let zp = za.dot(on_globe);

        let lat = (-yp / radius).clamp(-1.0, 1.0).asin().to_degrees();
        let lng = xp.atan2(zp).to_degrees();
        let lng = state.center.lng + shortest_angle(state.center.lng, lng);
        DVec2::new(
            mercator_x_from_lng(lng),
            mercator_y_from_lat(lat).clamp(0.0, 1.0),
        )
    }

    fn create_tile_matrix(&self, tr: &CameraTransform, _world_size: f64, tile: &UnwrappedTileId) -> DMat4 {
        tr.globe_matrix * globe_denormalize_ecef(globe_tile_bounds(&tile.canonical))
    }

    fn create_inversion_matrix(&self, tr: &CameraTransform, tile: &CanonicalTileId) -> DMat4 {
        let center = tr.state.center;
        globe_normalize_ecef(globe_tile_bounds(tile))
            * DMat4::from_rotation_y(center.lng.to_radians())
            * DMat4::from_rotation_x(center.lat.to_radians())
    }

    fn farthest_pixel_distance(&self, state: &CameraState) -> f64 {
        let pixel_distance = farthest_pixel_distance_on_sphere(state);
        let t = globe_to_mercator_transition(state.zoom);
        if t > 0.0 {
            let mercator_pixel_distance = farthest_pixel_distance_on_plane(state);
            let pixel_radius = state.world_size / (2.0 * PI);
            let approx_tile_arc_half_angle = state.width.max(state.height) / state.world_size * PI;
            let padding = pixel_radius * (1.0 - approx_tile_arc_half_angle.cos());
            // Damped so far geometry keeps being culled during the blend.
            return interpolate(pixel_distance, mercator_pixel_distance + padding, t.powi(10));
        }
        pixel_distance
    }

    fn up_vector(&self, tile: &CanonicalTileId, x: f64, y: f64) -> DVec3 {
        tile_coord_to_ecef(x, y, tile, 1.0)
    }

    fn up_vector_scale(&self, tile: &CanonicalTileId, _latitude: f64, _world_size: f64) -> f64 {
        let normalize = globe_normalize_ecef(globe_tile_bounds(tile));
        globe_meters_to_ecef(normalize.x_axis.x)
    }
}
