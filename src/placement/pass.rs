// One placement pass over a scene.
//
// Buckets are handled in input order. Each bucket first refreshes its line
// label glyphs, then its features are tested against a single collision
// index owned by the pass, first come, first served.

use glam::{DVec2, DVec3};
use log::{debug, trace};
use serde::Serialize;
use std::collections::BTreeMap;

use super::collision_index::{CollisionIndex, LineCollisionParams};
use super::grid_index::GridPredicate;
use super::line_placer::{LineLabelParams, LineLabelStats, update_line_labels};
use super::projection::{gl_coord_matrix, label_plane_matrix, label_plane_matrix_for_placement};
use super::symbol_size::{evaluate_size_for_feature, evaluate_size_for_zoom};
use super::types::{CollisionBox, CollisionCircle, DynamicVertexArray, FlipState, GridEntryKey, ScreenBox};
use crate::config::Config;
use crate::error::SceneResult;
use crate::scene::{Bucket, Feature, Scene};
use crate::terrain::{Elevation, FlatElevation};
use crate::tile::{EXTENT, TILE_SIZE};
use crate::transform::CameraTransform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturePlacement {
    pub feature_index: u32,
    pub placed: bool,
    pub offscreen: bool,
    pub occluded: bool,
}

#[derive(Debug, Clone)]
pub struct BucketPlacement {
    pub bucket_instance_id: u32,
    pub dynamic_vertices: DynamicVertexArray,
    /// Flip state of every symbol after this pass, in symbol order.
    pub flip_states: Vec<FlipState>,
    pub line_labels: LineLabelStats,
    pub features: Vec<FeaturePlacement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxRecord {
    pub bucket_instance_id: u32,
    pub feature_index: u32,
    /// Grid-space box; absent for rejected boxes.
    pub bounds: Option<ScreenBox>,
    pub used: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleRecord {
    pub bucket_instance_id: u32,
    pub feature_index: u32,
    pub circle: CollisionCircle,
    pub used: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementCounts {
    pub placed: usize,
    pub rejected: usize,
    pub offscreen: usize,
    pub occluded: usize,
}

impl PlacementCounts {
    fn record(&mut self, placement: &FeaturePlacement) {
        if placement.placed {
            self.placed += 1;
            if placement.offscreen {
                self.offscreen += 1;
            }
        } else {
            self.rejected += 1;
        }
        if placement.occluded {
            self.occluded += 1;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlacementResult {
    pub buckets: Vec<BucketPlacement>,
    /// Accepted boxes, plus rejected ones when collision boxes are shown.
    pub boxes: Vec<BoxRecord>,
    /// Accepted circles, plus rejected ones when collision circles are shown.
    pub circles: Vec<CircleRecord>,
    pub counts: PlacementCounts,
    /// Features under each of the scene's query polygons.
    pub query_results: Vec<BTreeMap<u32, Vec<u32>>>,
}

/// Places every bucket of `scene` and answers its queries. Symbol flip
/// states are updated in place so the next pass can reuse them.
///
/// The scene is validated first, so one built in code gets the same index
/// checks as one read with [`Scene::parse`].
pub fn place_scene(scene: &mut Scene, config: &Config) -> SceneResult<PlacementResult> {
    scene.validate()?;
    let transform = CameraTransform::new(scene.transform.clone());
    let terrain = scene.elevation.map(FlatElevation);
    let elevation = terrain.as_ref().map(|terrain| terrain as &dyn Elevation);

    let mut index = CollisionIndex::new(&transform, config);
    let mut result = PlacementResult::default();
    for bucket in &mut scene.buckets {
        let placement = place_bucket(&mut index, bucket, elevation, config, &mut result);
        result.buckets.push(placement);
    }

    result.query_results = scene
        .queries
        .iter()
        .map(|polygon| index.query_rendered_symbols(polygon))
        .collect();

    debug!(
        "placement pass: {} buckets, {} placed, {} rejected, {} occluded",
        result.buckets.len(),
        result.counts.placed,
        result.counts.rejected,
        result.counts.occluded
    );
    Ok(result)
}

fn place_bucket(
    index: &mut CollisionIndex<'_>,
    bucket: &mut Bucket,
    elevation: Option<&dyn Elevation>,
    config: &Config,
    result: &mut PlacementResult,
) -> BucketPlacement {
    let tr = index.transform();
    let layout = bucket.layout.clone();
    let tile_id = bucket.tile_id;
    let tile = tile_id.canonical;
    let tile_matrix = tr.tile_matrix(&tile_id.to_unwrapped());
    let pixels_to_tile_units = tr.pixels_to_tile_units_matrix(&tile_id);
    let (pitch_with_map, rotate_with_map) = (layout.pitch_with_map, layout.rotate_with_map);

    let render_label_plane =
        label_plane_matrix(&tile_matrix, &tile, pitch_with_map, rotate_with_map, tr, pixels_to_tile_units);
    let gl_coord = gl_coord_matrix(&tile_matrix, &tile, pitch_with_map, rotate_with_map, tr, pixels_to_tile_units);

    let mut dynamic_vertices = DynamicVertexArray::new();
    let line_labels = update_line_labels(
        &LineLabelParams {
            transform: tr,
            tile_id,
            tile_matrix,
            label_plane_matrix: render_label_plane,
            gl_coord_matrix: gl_coord,
            pitch_with_map,
            keep_upright: layout.keep_upright,
            elevation,
        },
        &bucket.text_size,
        &mut bucket.symbols,
        &bucket.glyph_offsets,
        &bucket.line_vertices,
        &mut dynamic_vertices,
    );

    let line_params = LineCollisionParams {
        tile_id,
        tile_matrix,
        label_plane_matrix: label_plane_matrix_for_placement(
            &tile_matrix,
            &tile,
            pitch_with_map,
            rotate_with_map,
            tr,
            pixels_to_tile_units,
        ),
        label_to_screen_matrix: pitch_with_map.then(|| tr.label_plane_matrix * gl_coord),
        pitch_with_map,
        line_vertices: &bucket.line_vertices,
        glyph_offsets: &bucket.glyph_offsets,
        elevation,
    };
    let text_pixel_ratio = TILE_SIZE * tile_id.overscale_factor() / EXTENT;
    let scale = 2f64.powf(tr.state.zoom - tile_id.overscaled_z as f64);
    let partial_size = evaluate_size_for_zoom(&bucket.text_size, tr.state.zoom);

    let group = layout.collision_group_id;
    let same_group = move |key: &GridEntryKey| key.collision_group_id == group;
    let predicate: GridPredicate<'_> = if group == 0 { None } else { Some(&same_group) };

    let bucket_id = bucket.bucket_instance_id;
    let mut features = Vec::with_capacity(bucket.features.len());
    for feature in &bucket.features {
        let feature_index = feature.feature_index();
        let placement = match feature {
            Feature::Point { collision_box, .. } => {
                let anchor = DVec2::new(collision_box.anchor_x, collision_box.anchor_y);
                let (height, lift) = match elevation {
                    Some(source) => (
                        source.elevation_at(&tile, anchor.x, anchor.y),
                        source.tile_offset(tr, &tile, anchor.x, anchor.y),
                    ),
                    None => (0.0, DVec3::ZERO),
                };
                let candidate = CollisionBox::from_geometry(collision_box, tr.projector(), tile_id, height, lift);
                let placed = index.place_collision_box(
                    scale,
                    &candidate,
                    DVec2::ZERO,
                    layout.allow_overlap,
                    text_pixel_ratio,
                    &tile_matrix,
                    predicate,
                );

                if let Some(bounds) = placed.bounds {
                    index.insert_collision_box(&bounds, layout.ignore_placement, bucket_id, feature_index, group);
                }
                if placed.bounds.is_some() || config.debug.show_collision_boxes {
                    result.boxes.push(BoxRecord {
                        bucket_instance_id: bucket_id,
                        feature_index,
                        bounds: placed.bounds,
                        used: placed.bounds.is_some(),
                    });
                }
                FeaturePlacement {
                    feature_index,
                    placed: placed.bounds.is_some(),
                    offscreen: placed.offscreen,
                    occluded: placed.occluded,
                }
            }
            Feature::Line { symbol_index, .. } => {
                let symbol = &bucket.symbols[*symbol_index];
                let font_size = evaluate_size_for_feature(&bucket.text_size, partial_size, symbol);
                let placed =
                    index.place_collision_circles(&line_params, symbol, font_size, layout.allow_overlap, predicate);

                let place_text = !placed.occluded
                    && (layout.allow_overlap || (!placed.circles.is_empty() && !placed.collision_detected));
                let used = place_text && !placed.collision_detected;
                if used {
                    index.insert_collision_circles(
                        &placed.circles,
                        layout.ignore_placement,
                        bucket_id,
                        feature_index,
                        group,
                    );
                }
                if used || config.debug.show_collision_circles {
                    result.circles.extend(placed.circles.iter().map(|circle| CircleRecord {
                        bucket_instance_id: bucket_id,
                        feature_index,
                        circle: *circle,
                        used,
                    }));
                }
                FeaturePlacement {
                    feature_index,
                    placed: place_text,
                    offscreen: placed.offscreen,
                    occluded: placed.occluded,
                }
            }
        };

        if !placement.placed {
            trace!(
                "bucket {bucket_id}: feature {feature_index} rejected (occluded: {})",
                placement.occluded
            );
        }
        result.counts.record(&placement);
        features.push(placement);
    }

    debug!(
        "bucket {bucket_id}: {} line labels placed, {} hidden, {} flipped; {} features",
        line_labels.placed,
        line_labels.hidden,
        line_labels.flipped,
        features.len()
    );

    BucketPlacement {
        bucket_instance_id: bucket_id,
        dynamic_vertices,
        flip_states: bucket.symbols.iter().map(|symbol| symbol.flip_state).collect(),
        line_labels,
        features,
    }
}
