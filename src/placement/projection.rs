// Label-plane and clip-space matrices for symbols, and the projection
// helpers shared by line placement and collision detection.
//
// The label plane is the space glyph layout happens in: screen pixels for
// viewport-aligned labels, pixel-scaled tile units for map-aligned ones and
// the unrotated globe in pixels for map-aligned labels on the globe.

use glam::{DMat2, DMat4, DVec2, DVec3, DVec4};

use crate::tile::CanonicalTileId;
use crate::transform::CameraTransform;

/// Upper bound of the perspective correction applied to near labels.
pub const MAX_PERSPECTIVE_RATIO: f64 = 1.5;
/// Extra room around the viewport, in pixels, before a line label's anchor
/// counts as invisible.
pub const CLIPPING_BUFFER_PIXELS: f64 = 256.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    /// Position after the perspective divide.
    pub point: DVec3,
    pub signed_distance_from_camera: f64,
}

impl ProjectedPoint {
    pub fn xy(&self) -> DVec2 {
        self.point.truncate()
    }
}

fn embed_mat2(m: DMat2) -> DMat4 {
    DMat4::from_cols(
        DVec4::new(m.x_axis.x, m.x_axis.y, 0.0, 0.0),
        DVec4::new(m.y_axis.x, m.y_axis.y, 0.0, 0.0),
        DVec4::Z,
        DVec4::W,
    )
}

/// Tile units to label-plane space, as used when drawing.
pub fn label_plane_matrix(
    tile_matrix: &DMat4,
    tile_id: &CanonicalTileId,
    pitch_with_map: bool,
    rotate_with_map: bool,
    tr: &CameraTransform,
    pixels_to_tile_units: DMat2,
) -> DMat4 {
    if !pitch_with_map {
        return tr.label_plane_matrix * *tile_matrix;
    }
    if tr.projector().is_spherical() {
        return crate::projection::globe::calculate_globe_label_matrix(tr, tile_id);
    }
    let m = embed_mat2(pixels_to_tile_units.inverse());
    if rotate_with_map {
        m
    } else {
        m * DMat4::from_rotation_z(tr.state.angle)
    }
}

/// Label-plane matrix for placement. Glyph placement runs in two
/// dimensions, so the z output is dropped except for map-aligned labels on
/// the globe.
pub fn label_plane_matrix_for_placement(
    tile_matrix: &DMat4,
    tile_id: &CanonicalTileId,
    pitch_with_map: bool,
    rotate_with_map: bool,
    tr: &CameraTransform,
    pixels_to_tile_units: DMat2,
) -> DMat4 {
    let mut m = label_plane_matrix(
        tile_matrix,
        tile_id,
        pitch_with_map,
        rotate_with_map,
        tr,
        pixels_to_tile_units,
    );
    if !tr.projector().is_spherical() || !pitch_with_map {
        m.x_axis.z = 0.0;
        m.y_axis.z = 0.0;
        m.z_axis.z = 0.0;
        m.w_axis.z = 0.0;
    }
    m
}

/// Label-plane space back to clip space.
pub fn gl_coord_matrix(
    tile_matrix: &DMat4,
    tile_id: &CanonicalTileId,
    pitch_with_map: bool,
    rotate_with_map: bool,
    tr: &CameraTransform,
    pixels_to_tile_units: DMat2,
) -> DMat4 {
    if !pitch_with_map {
        return tr.gl_coord_matrix;
    }
    if tr.projector().is_spherical() {
        let label = label_plane_matrix(
            tile_matrix,
            tile_id,
            pitch_with_map,
            rotate_with_map,
            tr,
            pixels_to_tile_units,
        );
        return *tile_matrix * label.inverse();
    }
    let m = *tile_matrix * embed_mat2(pixels_to_tile_units);
    if rotate_with_map {
        m
    } else {
        m * DMat4::from_rotation_z(-tr.state.angle)
    }
}

/// Transforms a point and divides by w. Points on the z = 0 plane skip the
/// z column.
pub fn project(point: DVec3, matrix: &DMat4) -> ProjectedPoint {
    let p = if point.z != 0.0 {
        *matrix * point.extend(1.0)
    } else {
        xy_transform(point.x, point.y, matrix)
    };
    let w = p.w;
    ProjectedPoint {
        point: DVec3::new(p.x / w, p.y / w, p.z / w),
        signed_distance_from_camera: w,
    }
}

pub(crate) fn xy_transform(x: f64, y: f64, m: &DMat4) -> DVec4 {
    DVec4::new(
        m.x_axis.x * x + m.y_axis.x * y + m.w_axis.x,
        m.x_axis.y * x + m.y_axis.y * y + m.w_axis.y,
        m.x_axis.z * x + m.y_axis.z * y + m.w_axis.z,
        m.x_axis.w * x + m.y_axis.w * y + m.w_axis.w,
    )
}

/// Size correction for perspective foreshortening: 1 at the map center,
/// growing towards the camera and shrinking with distance.
pub fn perspective_ratio(camera_to_center_distance: f64, signed_distance_from_camera: f64) -> f64 {
    (0.5 + 0.5 * (camera_to_center_distance / signed_distance_from_camera)).min(MAX_PERSPECTIVE_RATIO)
}

/// Clip-space half extents of the padded viewport.
pub fn clipping_buffer(width: f64, height: f64) -> DVec2 {
    DVec2::new(
        CLIPPING_BUFFER_PIXELS / width * 2.0 + 1.0,
        CLIPPING_BUFFER_PIXELS / height * 2.0 + 1.0,
    )
}

/// Whether a clip-space anchor lies inside the padded viewport.
pub fn is_visible(anchor_pos: DVec4, clipping_buffer: DVec2) -> bool {
    let x = anchor_pos.x / anchor_pos.w;
    let y = anchor_pos.y / anchor_pos.w;
    x >= -clipping_buffer.x && x <= clipping_buffer.x && y >= -clipping_buffer.y && y <= clipping_buffer.y
}
