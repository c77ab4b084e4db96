// Collision detection for one placement pass.
//
// Two grids cover the viewport plus padding: the active grid rejects
// overlapping candidates, the ignored grid only records placements that may
// be overlapped but must still be found by feature queries. Entries are
// accepted first come, first served.

use glam::{DMat4, DVec2, DVec3};
use std::collections::{BTreeMap, HashSet};

use super::grid_index::{GridIndex, GridPredicate};
use super::line_placer::{GlyphRun, LineGeometry, ONE_EM, ProjectionCache, TileElevation};
use super::projection::{perspective_ratio, project, xy_transform};
use super::types::{
    CollisionBox, CollisionCircle, GlyphOffsetArray, GridEntryKey, LineVertexArray, PlacedSymbol,
    ScreenBox,
};
use crate::config::{Config, PlacementConfig};
use crate::geometry::{PathInterpolator, box_ring, clip_line, polygon_intersects_polygon};
use crate::terrain::Elevation;
use crate::tile::OverscaledTileId;
use crate::transform::CameraTransform;

/// A point projected into collision-grid pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenProjection {
    pub point: DVec2,
    pub perspective_ratio: f64,
    pub signed_distance_from_camera: f64,
    /// Beyond the far plane or hidden by fog.
    pub occluded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedBox {
    /// Grid-space box, absent when rejected.
    pub bounds: Option<ScreenBox>,
    pub offscreen: bool,
    pub occluded: bool,
}

impl PlacedBox {
    fn rejected(occluded: bool) -> Self {
        Self {
            bounds: None,
            offscreen: false,
            occluded,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedCircles {
    /// Accepted circles; empty when rejected unless debug circles are on.
    pub circles: Vec<CollisionCircle>,
    pub offscreen: bool,
    pub collision_detected: bool,
    pub occluded: bool,
}

/// Per-bucket inputs for line-label collision circles.
pub struct LineCollisionParams<'a> {
    pub tile_id: OverscaledTileId,
    /// Tile units to clip space.
    pub tile_matrix: DMat4,
    pub label_plane_matrix: DMat4,
    /// Label plane to screen pixels, for map-aligned labels only.
    pub label_to_screen_matrix: Option<DMat4>,
    pub pitch_with_map: bool,
    pub line_vertices: &'a LineVertexArray,
    pub glyph_offsets: &'a GlyphOffsetArray,
    pub elevation: Option<&'a dyn Elevation>,
}

pub struct CollisionIndex<'a> {
    transform: &'a CameraTransform,
    grid: GridIndex,
    ignored_grid: GridIndex,
    viewport_padding: f64,
    screen_right_boundary: f64,
    screen_bottom_boundary: f64,
    grid_right_boundary: f64,
    grid_bottom_boundary: f64,
    min_perspective_ratio: f64,
    fog_threshold: f64,
    circle_diameter: Option<f64>,
    text_pixel_padding: f64,
    show_collision_circles: bool,
}

impl<'a> CollisionIndex<'a> {
    pub fn new(transform: &'a CameraTransform, config: &Config) -> Self {
        let PlacementConfig {
            viewport_padding,
            grid_cell_size,
            fog_symbol_clipping_threshold,
            min_perspective_ratio,
            collision_circle_diameter,
            text_pixel_padding,
        } = config.placement;
        let width = transform.state.width;
        let height = transform.state.height;
        let grid_width = width + 2.0 * viewport_padding;
        let grid_height = height + 2.0 * viewport_padding;
        Self {
            transform,
            grid: GridIndex::new(grid_width, grid_height, grid_cell_size),
            ignored_grid: GridIndex::new(grid_width, grid_height, grid_cell_size),
            viewport_padding,
            screen_right_boundary: width + viewport_padding,
            screen_bottom_boundary: height + viewport_padding,
            grid_right_boundary: grid_width,
            grid_bottom_boundary: grid_height,
            min_perspective_ratio,
            fog_threshold: fog_symbol_clipping_threshold,
            circle_diameter: collision_circle_diameter,
            text_pixel_padding,
            show_collision_circles: config.debug.show_collision_circles,
        }
    }

    pub fn transform(&self) -> &'a CameraTransform {
        self.transform
    }

    pub fn viewport_padding(&self) -> f64 {
        self.viewport_padding
    }

    /// Places a point label's box. `scale` and `text_pixel_ratio` take the
    /// box's tile-unit extents to pixels at the anchor.
    #[allow(clippy::too_many_arguments)]
    pub fn place_collision_box(
        &self,
        scale: f64,
        collision_box: &CollisionBox,
        shift: DVec2,
        allow_overlap: bool,
        text_pixel_ratio: f64,
        tile_matrix: &DMat4,
        predicate: GridPredicate<'_>,
    ) -> PlacedBox {
        let tr = self.transform;
        let check_occlusion =
            tr.projector().is_spherical() || collision_box.elevation != 0.0 || tr.state.pitch > 0.0;
        let projected = self.project_and_get_perspective_ratio(
            tile_matrix,
            collision_box.projected_anchor,
            collision_box.tile_id.as_ref(),
            check_occlusion,
        );

        let tile_to_viewport = text_pixel_ratio * projected.perspective_ratio;
        let b = collision_box;
        let x1 = (b.x1 * scale + shift.x - b.padding) * tile_to_viewport + projected.point.x;
        let y1 = (b.y1 * scale + shift.y - b.padding) * tile_to_viewport + projected.point.y;
        let x2 = (b.x2 * scale + shift.x + b.padding) * tile_to_viewport + projected.point.x;
        let y2 = (b.y2 * scale + shift.y + b.padding) * tile_to_viewport + projected.point.y;

        let clipped = projected.perspective_ratio <= self.min_perspective_ratio || projected.occluded;
        if !self.is_inside_grid(x1, y1, x2, y2)
            || (!allow_overlap && self.grid.hit_test(x1, y1, x2, y2, predicate))
            || clipped
        {
            return PlacedBox::rejected(projected.occluded);
        }

        PlacedBox {
            bounds: Some(ScreenBox::new(x1, y1, x2, y2)),
            offscreen: self.is_offscreen(x1, y1, x2, y2),
            occluded: false,
        }
    }

    /// Covers a line label's glyph path with circles and tests them against
    /// the active grid.
    pub fn place_collision_circles(
        &self,
        params: &LineCollisionParams<'_>,
        symbol: &PlacedSymbol,
        font_size: f64,
        allow_overlap: bool,
        predicate: GridPredicate<'_>,
    ) -> PlacedCircles {
        let tr = self.transform;
        let projector = tr.projector();
        let tile = params.tile_id.canonical;
        let tile_elevation = params.elevation.map(|source| TileElevation {
            source,
            transform: tr,
            tile,
        });

        let tile_anchor = symbol.tile_anchor();
        let mut anchor = projector.project_tile_point(tile_anchor.x, tile_anchor.y, &tile);
        if let Some(elevation) = &tile_elevation {
            anchor += elevation.offset(tile_anchor);
        }

        let check_occlusion = projector.is_spherical() || params.elevation.is_some() || tr.state.pitch > 0.0;
        let projected_anchor =
            self.project_and_get_perspective_ratio(&params.tile_matrix, anchor, Some(&params.tile_id), check_occlusion);
        let ratio = projected_anchor.perspective_ratio;

        let label_plane_font_scale =
            (if params.pitch_with_map { font_size / ratio } else { font_size * ratio }) / ONE_EM;
        let label_plane_anchor = project(anchor, &params.label_plane_matrix);

        let return_tile_path = params.pitch_with_map && params.elevation.is_some();
        let line = LineGeometry {
            projector,
            tile,
            label_plane_matrix: params.label_plane_matrix,
            line_vertices: params.line_vertices,
            glyph_offsets: params.glyph_offsets,
            elevation: if params.pitch_with_map { None } else { tile_elevation },
        };
        let run = GlyphRun::new(symbol, label_plane_anchor.point, label_plane_font_scale, false);
        let mut cache = ProjectionCache::new();
        let ends = if projected_anchor.signed_distance_from_camera > 0.0 {
            line.place_first_and_last_glyph(&mut cache, label_plane_font_scale, &run, symbol, return_tile_path)
        } else {
            None
        };

        let mut placed = Vec::new();
        let mut collision_detected = false;
        let mut in_grid = false;
        let mut entirely_offscreen = true;

        if let Some(ends) = ends.filter(|_| !projected_anchor.occluded) {
            let diameter = self.circle_diameter.unwrap_or(font_size);
            let radius = diameter * 0.5 * ratio + self.text_pixel_padding;
            // Slightly more than one diameter between neighbouring circles.
            let circle_dist = radius * 2.5;

            // Anchor-to-glyph paths joined end to end, without the anchor.
            let first = &ends.first;
            let last = &ends.last;
            let label_path: Vec<DVec3> = first.path[1..]
                .iter()
                .rev()
                .chain(&last.path[1..])
                .copied()
                .collect();
            debug_assert!(label_path.len() >= 2, "collision path needs two points");

            let projected_path: Vec<DVec2> = match params.label_to_screen_matrix {
                Some(label_to_screen) => {
                    debug_assert!(params.pitch_with_map);
                    let first_len = first.path.len();
                    let screen_path: Vec<_> = label_path
                        .iter()
                        .enumerate()
                        .map(|(index, p)| {
                            let mut p = *p;
                            if let (Some(elevation), true) = (&tile_elevation, return_tile_path) {
                                let tile_point = if index < first_len - 1 {
                                    first.tile_path[first_len - 1 - index]
                                } else {
                                    last.tile_path[index + 2 - first_len]
                                };
                                p.z = elevation.offset(tile_point).z;
                            }
                            project(p, &label_to_screen)
                        })
                        .collect();
                    // Steep pitch can put part of the path behind the camera.
                    if screen_path.iter().any(|p| p.signed_distance_from_camera <= 0.0) {
                        Vec::new()
                    } else {
                        screen_path.iter().map(|p| p.xy()).collect()
                    }
                }
                None => label_path.iter().map(|p| p.truncate()).collect(),
            };

            let segments = self.visible_segments(projected_path);
            let mut interpolator = PathInterpolator::default();
            for segment in segments {
                debug_assert!(!segment.is_empty());
                interpolator.reset(segment, radius * 0.5);
                let num_circles = if interpolator.length <= 0.5 * radius {
                    1
                } else {
                    (interpolator.padded_length / circle_dist).ceil() as usize + 1
                };

                for i in 0..num_circles {
                    let t = if num_circles <= 1 { 0.0 } else { i as f64 / (num_circles - 1) as f64 };
                    let position = interpolator.lerp(t);
                    let circle = CollisionCircle {
                        x: position.x + self.viewport_padding,
                        y: position.y + self.viewport_padding,
                        radius,
                    };
                    placed.push(circle);

                    let b = circle.bounds();
                    entirely_offscreen = entirely_offscreen && self.is_offscreen(b.x1, b.y1, b.x2, b.y2);
                    in_grid = in_grid || self.is_inside_grid(b.x1, b.y1, b.x2, b.y2);

                    if !allow_overlap && self.grid.hit_test_circle(circle.x, circle.y, radius, predicate) {
                        collision_detected = true;
                        // Debug circles keep going so every circle's state is known.
                        if !self.show_collision_circles {
                            return PlacedCircles {
                                circles: Vec::new(),
                                offscreen: false,
                                collision_detected,
                                occluded: false,
                            };
                        }
                    }
                }
            }
        }

        let keep = !((!self.show_collision_circles && collision_detected) || !in_grid);
        PlacedCircles {
            circles: if keep { placed } else { Vec::new() },
            offscreen: entirely_offscreen,
            collision_detected,
            occluded: projected_anchor.occluded,
        }
    }

    /// Parts of a screen path inside the padded viewport.
    fn visible_segments(&self, path: Vec<DVec2>) -> Vec<Vec<DVec2>> {
        if path.is_empty() {
            return Vec::new();
        }
        let min_bound = DVec2::splat(-self.viewport_padding);
        let max_bound = DVec2::new(self.screen_right_boundary, self.screen_bottom_boundary);
        let (min, max) = path
            .iter()
            .fold((path[0], path[0]), |(lo, hi), p| (lo.min(*p), hi.max(*p)));

        if min.x >= min_bound.x && max.x <= max_bound.x && min.y >= min_bound.y && max.y <= max_bound.y {
            vec![path]
        } else if max.x < min_bound.x || min.x > max_bound.x || max.y < min_bound.y || min.y > max_bound.y {
            Vec::new()
        } else {
            clip_line(&path, min_bound.x, min_bound.y, max_bound.x, max_bound.y)
        }
    }

    pub fn insert_collision_box(
        &mut self,
        bounds: &ScreenBox,
        ignore_placement: bool,
        bucket_instance_id: u32,
        feature_index: u32,
        collision_group_id: u16,
    ) {
        let key = GridEntryKey {
            bucket_instance_id,
            feature_index,
            collision_group_id,
        };
        let grid = if ignore_placement { &mut self.ignored_grid } else { &mut self.grid };
        grid.insert(key, bounds.x1, bounds.y1, bounds.x2, bounds.y2);
    }

    pub fn insert_collision_circles(
        &mut self,
        circles: &[CollisionCircle],
        ignore_placement: bool,
        bucket_instance_id: u32,
        feature_index: u32,
        collision_group_id: u16,
    ) {
        let key = GridEntryKey {
            bucket_instance_id,
            feature_index,
            collision_group_id,
        };
        let grid = if ignore_placement { &mut self.ignored_grid } else { &mut self.grid };
        for circle in circles {
            grid.insert_circle(key, circle.x, circle.y, circle.radius);
        }
    }

    /// Features whose placed geometry meets a viewport-pixel polygon, by
    /// bucket instance id. Circles are matched by their bounding boxes.
    pub fn query_rendered_symbols(&self, query_geometry: &[DVec2]) -> BTreeMap<u32, Vec<u32>> {
        let mut result: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        if query_geometry.is_empty() || (self.grid.is_empty() && self.ignored_grid.is_empty()) {
            return result;
        }

        let padding = DVec2::splat(self.viewport_padding);
        let query: Vec<DVec2> = query_geometry.iter().map(|p| *p + padding).collect();
        let (min, max) = query
            .iter()
            .fold((query[0], query[0]), |(lo, hi), p| (lo.min(*p), hi.max(*p)));

        let mut features = self.grid.query(min.x, min.y, max.x, max.y, None);
        features.extend(self.ignored_grid.query(min.x, min.y, max.x, max.y, None));

        let mut seen = HashSet::new();
        for feature in features {
            let key = feature.key;
            if seen.contains(&(key.bucket_instance_id, key.feature_index)) {
                continue;
            }
            let b = feature.bounds;
            if !polygon_intersects_polygon(&query, &box_ring(b.x1, b.y1, b.x2, b.y2)) {
                continue;
            }
            seen.insert((key.bucket_instance_id, key.feature_index));
            result.entry(key.bucket_instance_id).or_default().push(key.feature_index);
        }
        result
    }

    /// Projects a tile-space point to grid pixels with its perspective ratio.
    pub fn project_and_get_perspective_ratio(
        &self,
        tile_matrix: &DMat4,
        point: DVec3,
        tile_id: Option<&OverscaledTileId>,
        check_occlusion: bool,
    ) -> ScreenProjection {
        let tr = self.transform;
        let mut behind_fog = false;
        let p = if point.z != 0.0 || tr.state.pitch > 0.0 {
            // Fog has a fixed range on the globe and never hides symbols there.
            if let (Some(fog), Some(tile_id)) = (tr.fog.as_ref(), tile_id) {
                if !tr.projector().is_spherical() {
                    let opacity = fog.opacity_at_tile_coord(tr, &tile_id.to_unwrapped(), point);
                    behind_fog = opacity > self.fog_threshold;
                }
            }
            *tile_matrix * point.extend(1.0)
        } else {
            xy_transform(point.x, point.y, tile_matrix)
        };

        let w = p.w;
        ScreenProjection {
            point: DVec2::new(
                ((p.x / w + 1.0) / 2.0) * tr.state.width + self.viewport_padding,
                ((-p.y / w + 1.0) / 2.0) * tr.state.height + self.viewport_padding,
            ),
            perspective_ratio: perspective_ratio(tr.camera_to_center_distance(), w),
            signed_distance_from_camera: w,
            occluded: (check_occlusion && p.z > p.w) || behind_fog,
        }
    }

    pub fn is_offscreen(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
        x2 < self.viewport_padding
            || x1 >= self.screen_right_boundary
            || y2 < self.viewport_padding
            || y1 > self.screen_bottom_boundary
    }

    pub fn is_inside_grid(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
        x2 >= 0.0 && x1 < self.grid_right_boundary && y2 >= 0.0 && y1 < self.grid_bottom_boundary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::projection::{gl_coord_matrix, label_plane_matrix_for_placement};
    use crate::placement::types::{CollisionBoxGeometry, FlipState, WritingMode};
    use crate::projection::{Mercator, ProjectionKind};
    use crate::tile::{CanonicalTileId, EXTENT, LngLat, TILE_SIZE};
    use crate::transform::TransformParams;

    const CENTER: f64 = 4096.0;

    fn camera(pitch: f64) -> CameraTransform {
        CameraTransform::new(TransformParams {
            zoom: 4.0,
            center: LngLat::new(0.0, 0.0),
            pitch,
            ..TransformParams::default()
        })
    }

    fn tile_id() -> OverscaledTileId {
        OverscaledTileId::new(4, 0, CanonicalTileId::new(0, 0, 0))
    }

    fn pixel_ratio() -> f64 {
        TILE_SIZE * tile_id().overscale_factor() / EXTENT
    }

    fn point_box(x: f64, y: f64) -> CollisionBox {
        let geometry = CollisionBoxGeometry {
            anchor_x: x,
            anchor_y: y,
            x1: -20.0,
            y1: -10.0,
            x2: 20.0,
            y2: 10.0,
            padding: 0.0,
        };
        CollisionBox::from_geometry(&geometry, &Mercator, tile_id(), 0.0, DVec3::ZERO)
    }

    fn place(index: &CollisionIndex<'_>, b: &CollisionBox, allow_overlap: bool) -> PlacedBox {
        let tile_matrix = index.transform().tile_matrix(&tile_id().to_unwrapped());
        index.place_collision_box(1.0, b, DVec2::ZERO, allow_overlap, pixel_ratio(), &tile_matrix, None)
    }

    #[test]
    fn box_centered_on_screen_maps_to_grid_pixels() {
        let tr = camera(0.0);
        let config = Config::default();
        let index = CollisionIndex::new(&tr, &config);
        let placed = place(&index, &point_box(CENTER, CENTER), false);
        let bounds = placed.bounds.unwrap();
        assert!((bounds.x1 - 592.0).abs() < 1e-6);
        assert!((bounds.y1 - 474.0).abs() < 1e-6);
        assert!((bounds.x2 - 632.0).abs() < 1e-6);
        assert!((bounds.y2 - 494.0).abs() < 1e-6);
        assert!(!placed.offscreen);
    }

    #[test]
    fn first_placed_box_wins() {
        let tr = camera(0.0);
        let config = Config::default();
        let a = point_box(CENTER, CENTER);
        let b = point_box(CENTER + 10.0, CENTER);

        let mut index = CollisionIndex::new(&tr, &config);
        let placed_a = place(&index, &a, false);
        index.insert_collision_box(&placed_a.bounds.unwrap(), false, 0, 0, 0);
        assert!(place(&index, &b, false).bounds.is_none());

        let mut reversed = CollisionIndex::new(&tr, &config);
        let placed_b = place(&reversed, &b, false);
        reversed.insert_collision_box(&placed_b.bounds.unwrap(), false, 0, 1, 0);
        assert!(place(&reversed, &a, false).bounds.is_none());
    }

    #[test]
    fn placement_is_idempotent_on_unchanged_grid() {
        let tr = camera(30.0);
        let config = Config::default();
        let mut index = CollisionIndex::new(&tr, &config);
        let first = place(&index, &point_box(CENTER - 200.0, CENTER), false);
        index.insert_collision_box(&first.bounds.unwrap(), false, 0, 0, 0);
        let candidate = point_box(CENTER + 150.0, CENTER + 40.0);
        assert_eq!(place(&index, &candidate, false), place(&index, &candidate, false));
    }

    #[test]
    fn overlap_allowed_boxes_are_accepted() {
        let tr = camera(0.0);
        let config = Config::default();
        let mut index = CollisionIndex::new(&tr, &config);
        let a = place(&index, &point_box(CENTER, CENTER), false);
        index.insert_collision_box(&a.bounds.unwrap(), false, 0, 0, 0);
        assert!(place(&index, &point_box(CENTER, CENTER), true).bounds.is_some());
    }

    #[test]
    fn ignored_placements_do_not_block() {
        let tr = camera(0.0);
        let config = Config::default();
        let mut index = CollisionIndex::new(&tr, &config);
        let a = place(&index, &point_box(CENTER, CENTER), false);
        index.insert_collision_box(&a.bounds.unwrap(), true, 0, 0, 0);
        assert!(place(&index, &point_box(CENTER, CENTER), false).bounds.is_some());
    }

    #[test]
    fn group_predicate_limits_collisions() {
        let tr = camera(0.0);
        let config = Config::default();
        let mut index = CollisionIndex::new(&tr, &config);
        let a = place(&index, &point_box(CENTER, CENTER), false);
        index.insert_collision_box(&a.bounds.unwrap(), false, 0, 0, 1);

        let tile_matrix = tr.tile_matrix(&tile_id().to_unwrapped());
        let same_group = |key: &GridEntryKey| key.collision_group_id == 1;
        let other_group = |key: &GridEntryKey| key.collision_group_id == 2;
        let b = point_box(CENTER, CENTER);
        let blocked =
            index.place_collision_box(1.0, &b, DVec2::ZERO, false, pixel_ratio(), &tile_matrix, Some(&same_group));
        let free =
            index.place_collision_box(1.0, &b, DVec2::ZERO, false, pixel_ratio(), &tile_matrix, Some(&other_group));
        assert!(blocked.bounds.is_none());
        assert!(free.bounds.is_some());
    }

    #[test]
    fn boxes_outside_the_grid_are_rejected() {
        let tr = camera(0.0);
        let config = Config::default();
        let index = CollisionIndex::new(&tr, &config);
        assert!(place(&index, &point_box(CENTER + 900.0, CENTER), false).bounds.is_none());
        // Inside the padding: accepted but off screen.
        let padded = place(&index, &point_box(CENTER + 560.0, CENTER), false);
        assert!(padded.bounds.is_some());
        assert!(padded.offscreen);
    }

    #[test]
    fn labels_at_or_below_min_perspective_ratio_are_rejected() {
        let tr = camera(0.0);
        let index = CollisionIndex::new(&tr, &Config::default());
        let d = tr.camera_to_center_distance();
        // Scaling w alone moves the anchor away from the camera.
        let matrix_at = |distance: f64| {
            let mut m = DMat4::IDENTITY;
            m.w_axis.w = d * distance;
            m
        };
        let mut b = point_box(0.0, 0.0);
        b.projected_anchor = DVec3::ZERO;
        let place_at = |distance: f64| {
            index.place_collision_box(1.0, &b, DVec2::ZERO, false, 1.0, &matrix_at(distance), None)
        };
        assert!(place_at(9.0).bounds.is_some());
        assert!(place_at(11.0).bounds.is_none());

        let projected = index.project_and_get_perspective_ratio(&matrix_at(11.0), DVec3::ZERO, None, false);
        assert!(projected.perspective_ratio < 0.55);
        assert!((projected.point - DVec2::new(612.0, 484.0)).length() < 1e-9);
    }

    #[test]
    fn points_beyond_far_plane_are_occluded() {
        let tr = camera(60.0);
        let index = CollisionIndex::new(&tr, &Config::default());
        let mut m = DMat4::IDENTITY;
        m.w_axis.z = 2.0;
        let projected = index.project_and_get_perspective_ratio(&m, DVec3::new(0.0, 0.0, 0.0), None, true);
        assert!(projected.occluded);
        let unchecked = index.project_and_get_perspective_ratio(&m, DVec3::ZERO, None, false);
        assert!(!unchecked.occluded);
    }

    #[test]
    fn query_dedupes_features_across_grids() {
        let tr = camera(0.0);
        let mut index = CollisionIndex::new(&tr, &Config::default());
        let bounds = ScreenBox::new(150.0, 150.0, 200.0, 200.0);
        index.insert_collision_box(&bounds, false, 7, 3, 0);
        index.insert_collision_box(&bounds, true, 7, 3, 0);
        index.insert_collision_circles(
            &[CollisionCircle { x: 400.0, y: 400.0, radius: 10.0 }],
            false,
            9,
            1,
            0,
        );
        let everything = [
            DVec2::new(0.0, 0.0),
            DVec2::new(500.0, 0.0),
            DVec2::new(500.0, 500.0),
            DVec2::new(0.0, 500.0),
        ];
        let result = index.query_rendered_symbols(&everything);
        assert_eq!(result.get(&7), Some(&vec![3]));
        assert_eq!(result.get(&9), Some(&vec![1]));

        // Viewport point (60, 60) is grid point (160, 160).
        let point = index.query_rendered_symbols(&[DVec2::new(60.0, 60.0)]);
        assert_eq!(point.len(), 1);
        assert!(index.query_rendered_symbols(&[DVec2::new(5.0, 5.0)]).is_empty());
    }

    fn line_symbol(num_glyphs: usize) -> PlacedSymbol {
        PlacedSymbol {
            tile_anchor_x: CENTER,
            tile_anchor_y: CENTER,
            writing_mode: WritingMode::HorizontalOnly,
            glyph_start_index: 0,
            num_glyphs,
            line_start_index: 0,
            line_length: 2,
            segment: 0,
            line_offset_x: 0.0,
            line_offset_y: 0.0,
            lower_size: 0,
            upper_size: 0,
            flip_state: FlipState::Unknown,
            hidden: false,
        }
    }

    fn line_params<'a>(
        tr: &CameraTransform,
        line: &'a LineVertexArray,
        offsets: &'a GlyphOffsetArray,
    ) -> LineCollisionParams<'a> {
        aligned_line_params(tr, line, offsets, false)
    }

    fn aligned_line_params<'a>(
        tr: &CameraTransform,
        line: &'a LineVertexArray,
        offsets: &'a GlyphOffsetArray,
        pitch_with_map: bool,
    ) -> LineCollisionParams<'a> {
        let tile = tile_id();
        let tile_matrix = tr.tile_matrix(&tile.to_unwrapped());
        let p2t = tr.pixels_to_tile_units_matrix(&tile);
        let gl_coord = gl_coord_matrix(&tile_matrix, &tile.canonical, pitch_with_map, false, tr, p2t);
        LineCollisionParams {
            tile_id: tile,
            tile_matrix,
            label_plane_matrix: label_plane_matrix_for_placement(
                &tile_matrix,
                &tile.canonical,
                pitch_with_map,
                false,
                tr,
                p2t,
            ),
            label_to_screen_matrix: pitch_with_map.then(|| tr.label_plane_matrix * gl_coord),
            pitch_with_map,
            line_vertices: line,
            glyph_offsets: offsets,
            elevation: None,
        }
    }

    fn assert_same_circles(actual: &[CollisionCircle], expected: &[CollisionCircle], tolerance: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!(
                (a.x - e.x).abs() < tolerance && (a.y - e.y).abs() < tolerance,
                "circle at ({}, {}), expected ({}, {})",
                a.x,
                a.y,
                e.x,
                e.y
            );
            assert!((a.radius - e.radius).abs() < 1e-6);
        }
    }

    fn straight_line() -> LineVertexArray {
        LineVertexArray::new(vec![
            DVec2::new(CENTER - 100.0, CENTER),
            DVec2::new(CENTER + 100.0, CENTER),
        ])
    }

    #[test]
    fn circles_follow_the_glyph_path() {
        let tr = camera(0.0);
        let index = CollisionIndex::new(&tr, &Config::default());
        let line = straight_line();
        let offsets = GlyphOffsetArray::new(vec![-40.0, 40.0]);
        let placed =
            index.place_collision_circles(&line_params(&tr, &line, &offsets), &line_symbol(2), 24.0, false, None);
        assert!(!placed.collision_detected);
        assert!(!placed.circles.is_empty());
        // Radius: half the text size plus padding.
        let radius = placed.circles[0].radius;
        assert!((radius - 14.0).abs() < 1e-6);
        for circle in &placed.circles {
            assert!((circle.y - (384.0 + 100.0)).abs() < 1e-6);
            assert!(circle.x > 472.0 + 100.0 - 1e-6 && circle.x < 552.0 + 100.0 + 1e-6);
        }
        // Spaced no further than 2.5 radii apart.
        for pair in placed.circles.windows(2) {
            assert!(pair[1].x - pair[0].x <= 2.5 * radius + 1e-9);
        }
    }

    #[test]
    fn colliding_circles_are_dropped() {
        let tr = camera(0.0);
        let mut index = CollisionIndex::new(&tr, &Config::default());
        index.insert_collision_box(&ScreenBox::new(600.0, 470.0, 620.0, 500.0), false, 1, 0, 0);
        let line = straight_line();
        let offsets = GlyphOffsetArray::new(vec![-40.0, 40.0]);
        let placed =
            index.place_collision_circles(&line_params(&tr, &line, &offsets), &line_symbol(2), 24.0, false, None);
        assert!(placed.collision_detected);
        assert!(placed.circles.is_empty());
    }

    #[test]
    fn debug_circles_survive_collisions() {
        let tr = camera(0.0);
        let mut config = Config::default();
        config.debug.show_collision_circles = true;
        let mut index = CollisionIndex::new(&tr, &config);
        index.insert_collision_box(&ScreenBox::new(600.0, 470.0, 620.0, 500.0), false, 1, 0, 0);
        let line = straight_line();
        let offsets = GlyphOffsetArray::new(vec![-40.0, 40.0]);
        let placed =
            index.place_collision_circles(&line_params(&tr, &line, &offsets), &line_symbol(2), 24.0, false, None);
        assert!(placed.collision_detected);
        assert!(placed.circles.len() > 1);
    }

    #[test]
    fn lines_too_short_for_the_text_place_no_circles() {
        let tr = camera(0.0);
        let index = CollisionIndex::new(&tr, &Config::default());
        let line = straight_line();
        let offsets = GlyphOffsetArray::new(vec![-140.0, 140.0]);
        let placed =
            index.place_collision_circles(&line_params(&tr, &line, &offsets), &line_symbol(2), 24.0, false, None);
        assert!(placed.circles.is_empty());
        assert!(!placed.collision_detected);
    }

    #[test]
    fn circles_span_the_padded_glyph_path() {
        let tr = camera(0.0);
        let index = CollisionIndex::new(&tr, &Config::default());
        let line = straight_line();
        let offsets = GlyphOffsetArray::new(vec![-40.0, 40.0]);
        let placed =
            index.place_collision_circles(&line_params(&tr, &line, &offsets), &line_symbol(2), 24.0, false, None);
        let circles = &placed.circles;
        assert_eq!(circles.len(), 3);
        // Glyphs at 472..552 px, shifted by the 100 px grid padding and
        // pulled in by half a radius at each end.
        assert!((circles[0].x - 579.0).abs() < 1e-6);
        assert!((circles[2].x - 645.0).abs() < 1e-6);
    }

    #[test]
    fn map_aligned_circles_match_viewport_circles() {
        let tr = camera(0.0);
        let index = CollisionIndex::new(&tr, &Config::default());
        let line = straight_line();
        let offsets = GlyphOffsetArray::new(vec![-40.0, 40.0]);
        let viewport =
            index.place_collision_circles(&line_params(&tr, &line, &offsets), &line_symbol(2), 24.0, false, None);
        let params = aligned_line_params(&tr, &line, &offsets, true);
        assert!(params.label_to_screen_matrix.is_some());
        let map_aligned = index.place_collision_circles(&params, &line_symbol(2), 24.0, false, None);
        assert!(!map_aligned.collision_detected);
        assert_same_circles(&map_aligned.circles, &viewport.circles, 1e-6);
    }

    #[test]
    fn globe_circles_track_mercator_circles() {
        let mercator = camera(0.0);
        let line = straight_line();
        let offsets = GlyphOffsetArray::new(vec![-40.0, 40.0]);
        let expected = CollisionIndex::new(&mercator, &Config::default())
            .place_collision_circles(&line_params(&mercator, &line, &offsets), &line_symbol(2), 24.0, false, None)
            .circles;

        let globe = CameraTransform::new(TransformParams {
            zoom: 4.0,
            center: LngLat::new(0.0, 0.0),
            projection: ProjectionKind::Globe,
            ..TransformParams::default()
        });
        let index = CollisionIndex::new(&globe, &Config::default());
        // Near the center at zoom 4 the sphere bends the path by a fraction
        // of a pixel.
        for pitch_with_map in [false, true] {
            let params = aligned_line_params(&globe, &line, &offsets, pitch_with_map);
            let placed = index.place_collision_circles(&params, &line_symbol(2), 24.0, false, None);
            assert!(!placed.occluded);
            assert!(!placed.collision_detected);
            assert_same_circles(&placed.circles, &expected, 0.5);
        }
    }
}
