use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use glam::DVec2;
use std::hint::black_box;
use symbol_placement::config::Config;
use symbol_placement::placement::{
    CollisionBoxGeometry, FlipState, GlyphOffsetArray, LineVertexArray, PlacedSymbol, SizeData, WritingMode,
    place_scene,
};
use symbol_placement::scene::{Bucket, BucketLayout, Feature, Scene};
use symbol_placement::tile::{CanonicalTileId, LngLat, OverscaledTileId};
use symbol_placement::transform::TransformParams;

fn frame(pitch: f64, bearing: f64, buckets: Vec<Bucket>) -> Scene {
    Scene {
        transform: TransformParams {
            zoom: 4.0,
            center: LngLat::new(0.0, 0.0),
            pitch,
            bearing,
            ..TransformParams::default()
        },
        elevation: None,
        buckets,
        queries: Vec::new(),
    }
}

fn empty_bucket(id: u32) -> Bucket {
    Bucket {
        bucket_instance_id: id,
        tile_id: OverscaledTileId::new(4, 0, CanonicalTileId::new(0, 0, 0)),
        layout: BucketLayout::default(),
        text_size: SizeData::Constant { layout_size: 16.0 },
        symbols: Vec::new(),
        glyph_offsets: GlyphOffsetArray::default(),
        line_vertices: LineVertexArray::default(),
        features: Vec::new(),
    }
}

/// Wavy lines across the viewport, one label each.
fn dense_line_scene(lines: usize, glyphs: usize) -> Scene {
    let mut bucket = empty_bucket(1);
    let mut vertices = Vec::new();
    let mut offsets = Vec::new();
    for i in 0..lines {
        let y = 3800.0 + (i as f64 * 600.0 / lines as f64);
        let line_start = vertices.len();
        for step in 0..40 {
            let x = 3500.0 + step as f64 * 30.0;
            vertices.push(DVec2::new(x, y + (step as f64 * 0.7).sin() * 12.0));
        }
        let glyph_start = offsets.len();
        for g in 0..glyphs {
            offsets.push((g as f64 - glyphs as f64 / 2.0) * 14.0);
        }
        bucket.symbols.push(PlacedSymbol {
            tile_anchor_x: vertices[line_start + 20].x,
            tile_anchor_y: vertices[line_start + 20].y,
            writing_mode: WritingMode::Horizontal,
            glyph_start_index: glyph_start,
            num_glyphs: glyphs,
            line_start_index: line_start,
            line_length: 40,
            segment: 20,
            line_offset_x: 0.0,
            line_offset_y: 0.0,
            lower_size: 0,
            upper_size: 0,
            flip_state: FlipState::Unknown,
            hidden: false,
        });
        bucket.features.push(Feature::Line {
            feature_index: i as u32,
            symbol_index: i,
        });
    }
    bucket.line_vertices = LineVertexArray::new(vertices);
    bucket.glyph_offsets = GlyphOffsetArray::new(offsets);
    frame(45.0, 20.0, vec![bucket])
}

/// A square lattice of point labels, most of them overlapping.
fn dense_point_scene(side: usize) -> Scene {
    let mut bucket = empty_bucket(1);
    for row in 0..side {
        for col in 0..side {
            bucket.features.push(Feature::Point {
                feature_index: (row * side + col) as u32,
                collision_box: CollisionBoxGeometry {
                    anchor_x: 3600.0 + col as f64 * 1000.0 / side as f64,
                    anchor_y: 3800.0 + row as f64 * 600.0 / side as f64,
                    x1: -30.0,
                    y1: -8.0,
                    x2: 30.0,
                    y2: 8.0,
                    padding: 2.0,
                },
            });
        }
    }
    frame(30.0, 0.0, vec![bucket])
}

fn bench_line_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement_line_labels");
    let config = Config::default();
    for (lines, glyphs) in [(50usize, 8usize), (200, 12), (500, 16)] {
        let scene = dense_line_scene(lines, glyphs);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("lines_{lines}_{glyphs}")),
            &scene,
            |b, scene| {
                b.iter(|| {
                    let mut scene = scene.clone();
                    let result = place_scene(black_box(&mut scene), &config).expect("valid scene");
                    black_box(result.counts.placed);
                });
            },
        );
    }
    group.finish();
}

fn bench_point_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement_point_labels");
    let config = Config::default();
    for side in [20usize, 50, 100] {
        let scene = dense_point_scene(side);
        group.bench_with_input(BenchmarkId::from_parameter(format!("grid_{side}")), &scene, |b, scene| {
            b.iter(|| {
                let mut scene = scene.clone();
                let result = place_scene(black_box(&mut scene), &config).expect("valid scene");
                black_box(result.counts.placed);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_line_labels, bench_point_labels);
criterion_main!(benches);
