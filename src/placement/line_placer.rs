// Line-following label placement.
//
// Every frame each symbol's glyphs are walked along its line in label-plane
// space, starting from the anchor. Orientation is decided from the first and
// last glyph, kept stable near vertical through the symbol's flip state, and
// the results land in the bucket's dynamic vertex buffer.

use glam::{DMat4, DVec2, DVec3};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::f64::consts::PI;

use super::projection::{ProjectedPoint, clipping_buffer, is_visible, perspective_ratio, project};
use super::symbol_size::{SizeData, evaluate_size_for_feature, evaluate_size_for_zoom};
use super::types::{
    DynamicVertexArray, FlipState, GlyphOffsetArray, LineVertexArray, PlacedSymbol, WritingMode,
};
use crate::projection::Projector;
use crate::terrain::Elevation;
use crate::tile::{CanonicalTileId, OverscaledTileId};
use crate::transform::CameraTransform;

/// Font size the glyph offsets are laid out at.
pub const ONE_EM: f64 = 24.0;

/// Lines within 5 degrees of screen vertical keep last frame's flip decision.
static MAX_TANGENT: Lazy<f64> = Lazy::new(|| 85f64.to_radians().tan());

/// Label-plane positions of line vertices, keyed by vertex index. Lives for
/// one symbol's placement only.
pub type ProjectionCache = HashMap<usize, DVec3>;

/// Terrain sampler bound to one tile.
#[derive(Clone, Copy)]
pub struct TileElevation<'a> {
    pub source: &'a dyn Elevation,
    pub transform: &'a CameraTransform,
    pub tile: CanonicalTileId,
}

impl TileElevation<'_> {
    pub fn offset(&self, p: DVec2) -> DVec3 {
        self.source.tile_offset(self.transform, &self.tile, p.x, p.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedGlyph {
    pub point: DVec3,
    pub angle: f64,
    /// Label-plane path from the anchor to the glyph.
    pub path: Vec<DVec3>,
    /// The same path in tile units, when requested.
    pub tile_path: Vec<DVec2>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirstAndLastGlyph {
    pub first: PlacedGlyph,
    pub last: PlacedGlyph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationChange {
    /// The paired vertical symbol should be drawn instead.
    UseVertical,
    NeedsFlipping,
}

/// Result of placing one symbol's glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePlacement {
    Placed,
    NotEnoughRoom,
    UseVertical,
    NeedsFlipping,
}

impl From<OrientationChange> for LinePlacement {
    fn from(change: OrientationChange) -> Self {
        match change {
            OrientationChange::UseVertical => LinePlacement::UseVertical,
            OrientationChange::NeedsFlipping => LinePlacement::NeedsFlipping,
        }
    }
}

/// Per-call glyph walk parameters derived from a symbol.
#[derive(Debug, Clone, Copy)]
pub struct GlyphRun {
    /// Anchor in label-plane space.
    pub anchor_point: DVec3,
    pub tile_anchor: DVec2,
    pub segment: usize,
    pub line_start: usize,
    pub line_end: usize,
    pub line_offset_x: f64,
    pub line_offset_y: f64,
    pub flip: bool,
}

impl GlyphRun {
    pub fn new(symbol: &PlacedSymbol, anchor_point: DVec3, font_scale: f64, flip: bool) -> Self {
        Self {
            anchor_point,
            tile_anchor: symbol.tile_anchor(),
            segment: symbol.segment,
            line_start: symbol.line_start_index,
            line_end: symbol.line_end_index(),
            line_offset_x: symbol.line_offset_x * font_scale,
            line_offset_y: symbol.line_offset_y * font_scale,
            flip,
        }
    }
}

/// Matrices used to judge a label's on-screen orientation.
#[derive(Debug, Clone, Copy)]
pub struct OrientationFrame {
    pub tile_matrix: DMat4,
    pub gl_coord_matrix: DMat4,
    pub aspect_ratio: f64,
}

/// Projects a tile-unit vertex through `matrix`, lifting it onto the terrain
/// when a sampler is given.
pub fn project_vertex(
    projector: &dyn Projector,
    tile: &CanonicalTileId,
    elevation: Option<&TileElevation<'_>>,
    p: DVec2,
    matrix: &DMat4,
) -> ProjectedPoint {
    let mut pos = projector.project_tile_point(p.x, p.y, tile);
    if let Some(elevation) = elevation {
        pos += elevation.offset(p);
    }
    project(pos, matrix)
}

/// Stand-in for a vertex behind the camera: a point `minimum_length` away
/// from `previous_projected` in the projected direction of the segment.
/// `previous_tile_point` itself must project in front of the camera.
#[allow(clippy::too_many_arguments)]
pub fn project_truncated_line_segment(
    projector: &dyn Projector,
    tile: &CanonicalTileId,
    elevation: Option<&TileElevation<'_>>,
    previous_tile_point: DVec2,
    current_tile_point: DVec2,
    previous_projected: DVec3,
    minimum_length: f64,
    matrix: &DMat4,
) -> DVec3 {
    let unit_vertex = previous_tile_point + (previous_tile_point - current_tile_point).normalize_or_zero();
    let projected_unit_vertex = project_vertex(projector, tile, elevation, unit_vertex, matrix).point;
    let projected_unit_segment = previous_projected - projected_unit_vertex;
    previous_projected + projected_unit_segment * (minimum_length / projected_unit_segment.length())
}

/// True when the segment is within the flip retain range of vertical.
/// Points are in clip space; `aspect_ratio` restores pixel proportions.
pub fn is_in_flip_retain_range(first: DVec2, last: DVec2, aspect_ratio: f64) -> bool {
    let delta_y = last.y - first.y;
    let delta_x = (last.x - first.x) * aspect_ratio;
    if delta_x == 0.0 {
        return true;
    }
    (delta_y / delta_x).abs() > *MAX_TANGENT
}

pub fn requires_orientation_change(
    writing_mode: WritingMode,
    flip_state: FlipState,
    first: DVec2,
    last: DVec2,
    aspect_ratio: f64,
) -> Option<OrientationChange> {
    if writing_mode == WritingMode::Horizontal {
        // Decided on screen, so pitched labels switch the other way round.
        let rise = (last.y - first.y).abs();
        let run = (last.x - first.x).abs() * aspect_ratio;
        if rise > run {
            return Some(OrientationChange::UseVertical);
        }
    }

    if writing_mode == WritingMode::Vertical {
        return (first.y < last.y).then_some(OrientationChange::NeedsFlipping);
    }

    if flip_state != FlipState::Unknown && is_in_flip_retain_range(first, last, aspect_ratio) {
        return (flip_state == FlipState::FlipRequired).then_some(OrientationChange::NeedsFlipping);
    }

    (first.x > last.x).then_some(OrientationChange::NeedsFlipping)
}

/// One bucket's line geometry as seen from the label plane.
pub struct LineGeometry<'a> {
    pub projector: &'a dyn Projector,
    pub tile: CanonicalTileId,
    pub label_plane_matrix: DMat4,
    pub line_vertices: &'a LineVertexArray,
    pub glyph_offsets: &'a GlyphOffsetArray,
    /// Terrain used while walking the line; unset for map-aligned labels.
    pub elevation: Option<TileElevation<'a>>,
}

impl LineGeometry<'_> {
    pub fn project_vertex(&self, p: DVec2) -> ProjectedPoint {
        project_vertex(
            self.projector,
            &self.tile,
            self.elevation.as_ref(),
            p,
            &self.label_plane_matrix,
        )
    }

    fn truncated_segment(&self, previous_tile: DVec2, current_tile: DVec2, previous: DVec3, minimum_length: f64) -> DVec3 {
        project_truncated_line_segment(
            self.projector,
            &self.tile,
            self.elevation.as_ref(),
            previous_tile,
            current_tile,
            previous,
            minimum_length,
            &self.label_plane_matrix,
        )
    }

    /// Walks the line from the anchor until `offset_x` label-plane units have
    /// been covered. Returns `None` when the line ends first.
    pub fn place_glyph_along_line(
        &self,
        cache: &mut ProjectionCache,
        run: &GlyphRun,
        offset_x: f64,
        end_glyph: bool,
        return_tile_path: bool,
    ) -> Option<PlacedGlyph> {
        let combined_offset_x = if run.flip {
            offset_x - run.line_offset_x
        } else {
            offset_x + run.line_offset_x
        };

        let mut dir: isize = if combined_offset_x > 0.0 { 1 } else { -1 };
        let mut angle = 0.0;
        if run.flip {
            // Walk the other way to keep the text upright.
            dir = -dir;
            angle = PI;
        }
        if dir < 0 {
            angle += PI;
        }

        let line_start = run.line_start as isize;
        let line_end = run.line_end as isize;
        let mut current_index = line_start + run.segment as isize + if dir > 0 { 0 } else { 1 };

        let mut current = run.anchor_point;
        let mut prev = run.anchor_point;
        let mut distance_to_prev = 0.0;
        let mut current_segment_distance = 0.0;
        let abs_offset_x = combined_offset_x.abs();
        let mut path = Vec::new();
        let mut tile_path = Vec::new();

        let mut current_vertex = run.tile_anchor;
        let mut prev_vertex = current_vertex;

        while distance_to_prev + current_segment_distance <= abs_offset_x {
            current_index += dir;
            if current_index < line_start || current_index >= line_end {
                return None;
            }
            let index = current_index as usize;

            prev = current;
            path.push(current);
            if return_tile_path {
                tile_path.push(current_vertex);
            }

            prev_vertex = current_vertex;
            current_vertex = self.line_vertices.get(index);

            current = match cache.get(&index) {
                Some(cached) => *cached,
                None => {
                    let projected = self.project_vertex(current_vertex);
                    if projected.signed_distance_from_camera > 0.0 {
                        cache.insert(index, projected.point);
                        projected.point
                    } else {
                        // Not cached: a later glyph may need a longer stand-in.
                        self.truncated_segment(prev_vertex, current_vertex, prev, abs_offset_x - distance_to_prev + 1.0)
                    }
                }
            };

            distance_to_prev += current_segment_distance;
            current_segment_distance = prev.distance(current);
        }

        if end_glyph && self.elevation.is_some() {
            // Terrain bends the projected line, so end glyphs always come from
            // a truncated segment. A vertex that was already truncated stays.
            let index = current_index as usize;
            if cache.contains_key(&index) {
                current = self.truncated_segment(prev_vertex, current_vertex, prev, abs_offset_x - distance_to_prev + 1.0);
                current_segment_distance = prev.distance(current);
            }
            cache.insert(index, current);
        }

        let t = (abs_offset_x - distance_to_prev) / current_segment_distance;
        let prev_to_current = current - prev;
        let mut point = prev + prev_to_current * t;

        let normal = DVec2::new(-prev_to_current.y, prev_to_current.x).normalize_or_zero();
        let shift = normal * (run.line_offset_y * dir as f64);
        point.x += shift.x;
        point.y += shift.y;

        let segment_angle = angle + (current.y - prev.y).atan2(current.x - prev.x);

        path.push(point);
        if return_tile_path {
            let tile_point = prev_vertex + (current_vertex - prev_vertex) * t;
            tile_path.push(tile_point);
        }

        Some(PlacedGlyph {
            point,
            angle: segment_angle,
            path,
            tile_path,
        })
    }

    pub fn place_first_and_last_glyph(
        &self,
        cache: &mut ProjectionCache,
        font_scale: f64,
        run: &GlyphRun,
        symbol: &PlacedSymbol,
        return_tile_path: bool,
    ) -> Option<FirstAndLastGlyph> {
        let first_offset = self.glyph_offsets.offset_x(symbol.glyph_start_index);
        let last_offset = self.glyph_offsets.offset_x(symbol.glyph_end_index() - 1);
        let first = self.place_glyph_along_line(cache, run, font_scale * first_offset, true, return_tile_path)?;
        let last = self.place_glyph_along_line(cache, run, font_scale * last_offset, true, return_tile_path)?;
        Some(FirstAndLastGlyph { first, last })
    }

    /// Places all glyphs of `symbol`, or reports why it could not. On
    /// success the glyphs are appended to `dynamic`. With `keep_upright` on
    /// an unflipped pass the orientation decision is stored on the symbol.
    #[allow(clippy::too_many_arguments)]
    pub fn place_glyphs_along_line(
        &self,
        cache: &mut ProjectionCache,
        symbol: &mut PlacedSymbol,
        font_size: f64,
        flip: bool,
        keep_upright: bool,
        anchor_point: DVec3,
        frame: &OrientationFrame,
        dynamic: &mut DynamicVertexArray,
    ) -> LinePlacement {
        let font_scale = font_size / ONE_EM;
        let run = GlyphRun::new(symbol, anchor_point, font_scale, flip);
        let mut placed = Vec::with_capacity(symbol.num_glyphs);

        if symbol.num_glyphs > 1 {
            // First and last glyph settle the orientation before the rest.
            let Some(ends) = self.place_first_and_last_glyph(cache, font_scale, &run, symbol, false) else {
                return LinePlacement::NotEnoughRoom;
            };
            let first_point = project(ends.first.point, &frame.gl_coord_matrix).xy();
            let last_point = project(ends.last.point, &frame.gl_coord_matrix).xy();

            if keep_upright && !flip {
                let change = requires_orientation_change(
                    symbol.writing_mode,
                    symbol.flip_state,
                    first_point,
                    last_point,
                    frame.aspect_ratio,
                );
                symbol.flip_state = flip_state_for(change);
                if let Some(change) = change {
                    return change.into();
                }
            }

            placed.push((ends.first.point, ends.first.angle));
            for glyph_index in symbol.glyph_start_index + 1..symbol.glyph_end_index() - 1 {
                let offset = font_scale * self.glyph_offsets.offset_x(glyph_index);
                // Offsets outside the end glyphs' range can still run off the line.
                let Some(glyph) = self.place_glyph_along_line(cache, &run, offset, false, false) else {
                    return LinePlacement::NotEnoughRoom;
                };
                placed.push((glyph.point, glyph.angle));
            }
            placed.push((ends.last.point, ends.last.angle));
        } else {
            if keep_upright && !flip {
                let change = self.single_glyph_orientation(symbol, frame);
                symbol.flip_state = flip_state_for(change);
                if let Some(change) = change {
                    return change.into();
                }
            }
            let offset = font_scale * self.glyph_offsets.offset_x(symbol.glyph_start_index);
            let Some(glyph) = self.place_glyph_along_line(cache, &run, offset, false, false) else {
                return LinePlacement::NotEnoughRoom;
            };
            placed.push((glyph.point, glyph.angle));
        }

        for (point, angle) in placed {
            dynamic.add_glyph(point, angle);
        }
        LinePlacement::Placed
    }

    /// Orientation of a single glyph from the direction of the anchor's
    /// segment in clip space.
    fn single_glyph_orientation(&self, symbol: &PlacedSymbol, frame: &OrientationFrame) -> Option<OrientationChange> {
        let tile_anchor = symbol.tile_anchor();
        let a = project_vertex(self.projector, &self.tile, None, tile_anchor, &frame.tile_matrix);
        let end_index = symbol.line_start_index + symbol.segment + 1;
        let segment_end = self.line_vertices.get(end_index);
        let projected_end = project_vertex(self.projector, &self.tile, None, segment_end, &frame.tile_matrix);
        // The anchor is visible, but the segment end may be behind the camera;
        // any closer point on the segment gives the same direction.
        let b = if projected_end.signed_distance_from_camera > 0.0 {
            projected_end.xy()
        } else {
            project_truncated_line_segment(
                self.projector,
                &self.tile,
                None,
                tile_anchor,
                segment_end,
                a.point,
                1.0,
                &frame.tile_matrix,
            )
            .truncate()
        };
        requires_orientation_change(symbol.writing_mode, symbol.flip_state, a.xy(), b, frame.aspect_ratio)
    }
}

fn flip_state_for(change: Option<OrientationChange>) -> FlipState {
    if change == Some(OrientationChange::NeedsFlipping) {
        FlipState::FlipRequired
    } else {
        FlipState::FlipNotRequired
    }
}

/// Inputs shared by every symbol of a bucket for one line-label update.
pub struct LineLabelParams<'a> {
    pub transform: &'a CameraTransform,
    pub tile_id: OverscaledTileId,
    /// Tile units to clip space.
    pub tile_matrix: DMat4,
    pub label_plane_matrix: DMat4,
    pub gl_coord_matrix: DMat4,
    pub pitch_with_map: bool,
    pub keep_upright: bool,
    pub elevation: Option<&'a dyn Elevation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineLabelStats {
    pub placed: usize,
    pub hidden: usize,
    pub flipped: usize,
}

/// Recomputes glyph positions for every symbol of a bucket, in array order.
/// `dynamic` is cleared first and receives four vertices per glyph.
pub fn update_line_labels(
    params: &LineLabelParams<'_>,
    size_data: &SizeData,
    symbols: &mut [PlacedSymbol],
    glyph_offsets: &GlyphOffsetArray,
    line_vertices: &LineVertexArray,
    dynamic: &mut DynamicVertexArray,
) -> LineLabelStats {
    let tr = params.transform;
    let projector = tr.projector();
    let tile = params.tile_id.canonical;
    let partial_size = evaluate_size_for_zoom(size_data, tr.state.zoom);
    let clipping = clipping_buffer(tr.state.width, tr.state.height);
    let frame = OrientationFrame {
        tile_matrix: params.tile_matrix,
        gl_coord_matrix: params.gl_coord_matrix,
        aspect_ratio: tr.state.aspect_ratio(),
    };
    let tile_elevation = params.elevation.map(|source| TileElevation {
        source,
        transform: tr,
        tile,
    });
    // Map-aligned labels are placed in scaled tile space where height does
    // not move them.
    let line = LineGeometry {
        projector,
        tile,
        label_plane_matrix: params.label_plane_matrix,
        line_vertices,
        glyph_offsets,
        elevation: if params.pitch_with_map { None } else { tile_elevation },
    };

    dynamic.clear();
    let mut stats = LineLabelStats::default();
    let mut use_vertical = false;
    let mut prev_writing_mode = None;

    for symbol in symbols.iter_mut() {
        let num_glyphs = symbol.num_glyphs;
        let writing_mode = symbol.writing_mode;

        // A vertical symbol normally follows its horizontal twin. Vertical-only
        // labels have no twin and are always candidates.
        if writing_mode == WritingMode::Vertical
            && !use_vertical
            && prev_writing_mode != Some(WritingMode::Horizontal)
        {
            use_vertical = true;
        }
        prev_writing_mode = Some(writing_mode);

        if symbol.hidden || (writing_mode == WritingMode::Vertical && !use_vertical) {
            dynamic.hide_glyphs(num_glyphs);
            stats.hidden += 1;
            continue;
        }
        use_vertical = false;

        let tile_anchor = symbol.tile_anchor();
        let mut anchor = projector.project_tile_point(tile_anchor.x, tile_anchor.y, &tile);
        if let Some(elevation) = &tile_elevation {
            anchor += elevation.offset(tile_anchor);
        }

        let anchor_pos = params.tile_matrix * anchor.extend(1.0);
        if anchor_pos.w <= 0.0 || !is_visible(anchor_pos, clipping) {
            dynamic.hide_glyphs(num_glyphs);
            stats.hidden += 1;
            continue;
        }

        let ratio = perspective_ratio(tr.camera_to_center_distance(), anchor_pos.w);
        let font_size = evaluate_size_for_feature(size_data, partial_size, symbol);
        let pitch_scaled_font_size = if params.pitch_with_map {
            font_size / ratio
        } else {
            font_size * ratio
        };

        let label_plane_anchor = project(anchor, &params.label_plane_matrix);
        if label_plane_anchor.signed_distance_from_camera <= 0.0 {
            dynamic.hide_glyphs(num_glyphs);
            stats.hidden += 1;
            continue;
        }

        let mut cache = ProjectionCache::new();
        let unflipped = line.place_glyphs_along_line(
            &mut cache,
            symbol,
            pitch_scaled_font_size,
            false,
            params.keep_upright,
            label_plane_anchor.point,
            &frame,
            dynamic,
        );
        use_vertical = unflipped == LinePlacement::UseVertical;

        if line.elevation.is_some() && unflipped == LinePlacement::NeedsFlipping {
            // Truncated end points were computed for the other direction.
            cache.clear();
        }

        let hide = match unflipped {
            LinePlacement::Placed => false,
            LinePlacement::NotEnoughRoom | LinePlacement::UseVertical => true,
            LinePlacement::NeedsFlipping => {
                stats.flipped += 1;
                line.place_glyphs_along_line(
                    &mut cache,
                    symbol,
                    pitch_scaled_font_size,
                    true,
                    params.keep_upright,
                    label_plane_anchor.point,
                    &frame,
                    dynamic,
                ) == LinePlacement::NotEnoughRoom
            }
        };

        if hide {
            dynamic.hide_glyphs(num_glyphs);
            stats.hidden += 1;
        } else {
            stats.placed += 1;
        }
    }

    stats
}
