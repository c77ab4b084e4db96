// Tile identifiers and web-mercator conversions shared by the projectors
// and the placement code.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tile-local coordinate extent. Tile units run from 0 to EXTENT on both axes.
pub const EXTENT: f64 = 8192.0;
/// Pixel size of a tile at its own zoom level.
pub const TILE_SIZE: f64 = 512.0;
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051129;
/// Mean earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_008.8;
pub const EARTH_CIRCUMFERENCE: f64 = 2.0 * PI * EARTH_RADIUS;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Longitude wrapped into [-180, 180).
    pub fn wrap(self) -> Self {
        Self {
            lng: wrap(self.lng, -180.0, 180.0),
            lat: self.lat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalTileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl CanonicalTileId {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    pub fn tile_count(&self) -> f64 {
        (1u64 << self.z) as f64
    }

    /// Mercator coordinate of a tile-local point.
    pub fn tile_point_to_mercator(&self, x: f64, y: f64) -> (f64, f64) {
        let count = self.tile_count();
        (
            (x / EXTENT + self.x as f64) / count,
            (y / EXTENT + self.y as f64) / count,
        )
    }

    /// Geographic location of a tile-local point.
    pub fn tile_point_to_lng_lat(&self, x: f64, y: f64) -> LngLat {
        let (mx, my) = self.tile_point_to_mercator(x, y);
        LngLat::new(lng_from_mercator_x(mx), lat_from_mercator_y(my))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnwrappedTileId {
    #[serde(default)]
    pub wrap: i32,
    pub canonical: CanonicalTileId,
}

impl UnwrappedTileId {
    pub fn new(wrap: i32, canonical: CanonicalTileId) -> Self {
        Self { wrap, canonical }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverscaledTileId {
    pub overscaled_z: u8,
    #[serde(default)]
    pub wrap: i32,
    pub canonical: CanonicalTileId,
}

impl OverscaledTileId {
    pub fn new(overscaled_z: u8, wrap: i32, canonical: CanonicalTileId) -> Self {
        Self {
            overscaled_z,
            wrap,
            canonical,
        }
    }

    pub fn to_unwrapped(&self) -> UnwrappedTileId {
        UnwrappedTileId::new(self.wrap, self.canonical)
    }

    pub fn overscale_factor(&self) -> f64 {
        (1u64 << self.overscaled_z.saturating_sub(self.canonical.z)) as f64
    }
}

pub fn wrap(n: f64, min: f64, max: f64) -> f64 {
    let d = max - min;
    let w = ((n - min) % d + d) % d + min;
    if w == min { min } else { w }
}

pub fn mercator_x_from_lng(lng: f64) -> f64 {
    (180.0 + lng) / 360.0
}

pub fn mercator_y_from_lat(lat: f64) -> f64 {
    (180.0 - (180.0 / PI) * ((PI / 4.0 + lat * PI / 360.0).tan()).ln()) / 360.0
}

pub fn lng_from_mercator_x(x: f64) -> f64 {
    x * 360.0 - 180.0
}

pub fn lat_from_mercator_y(y: f64) -> f64 {
    let y2 = 180.0 - y * 360.0;
    360.0 / PI * (y2 * PI / 180.0).exp().atan() - 90.0
}

/// Mercator z units per meter of altitude at the given latitude.
pub fn mercator_z_from_altitude(altitude: f64, lat: f64) -> f64 {
    altitude / circumference_at_latitude(lat)
}

pub fn circumference_at_latitude(lat: f64) -> f64 {
    EARTH_CIRCUMFERENCE * lat.to_radians().cos()
}

/// Number of tile units covered by `pixel_value` screen pixels at `zoom`.
/// An overscaled tile spans `TILE_SIZE * overscale_factor` pixels at its
/// own zoom.
pub fn pixels_to_tile_units(tile: &OverscaledTileId, pixel_value: f64, zoom: f64) -> f64 {
    let tile_size = TILE_SIZE * tile.overscale_factor();
    pixel_value * (EXTENT / (tile_size * 2f64.powf(zoom - tile.overscaled_z as f64)))
}

/// Signed shortest angular distance in degrees from `a` to `b`.
pub fn shortest_angle(a: f64, b: f64) -> f64 {
    wrap(b - a, -180.0, 180.0)
}

pub fn smoothstep(e0: f64, e1: f64, x: f64) -> f64 {
    let t = ((x - e0) / (e1 - e0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

pub fn interpolate(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}
