// Input model for one frame: the camera plus the symbol buckets of every
// visible tile, as produced by upstream text layout.

use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{SceneError, SceneResult};
use crate::placement::{CollisionBoxGeometry, GlyphOffsetArray, LineVertexArray, PlacedSymbol, SizeData};
use crate::tile::OverscaledTileId;
use crate::transform::TransformParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub transform: TransformParams,
    /// Height of a flat terrain in meters. No terrain when absent.
    #[serde(default)]
    pub elevation: Option<f64>,
    pub buckets: Vec<Bucket>,
    /// Picking polygons in viewport pixels, answered after placement.
    #[serde(default)]
    pub queries: Vec<Vec<DVec2>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BucketLayout {
    pub pitch_with_map: bool,
    pub rotate_with_map: bool,
    pub keep_upright: bool,
    pub allow_overlap: bool,
    pub ignore_placement: bool,
    /// Buckets only collide within their group; 0 collides with everything.
    pub collision_group_id: u16,
}

impl Default for BucketLayout {
    fn default() -> Self {
        Self {
            pitch_with_map: false,
            rotate_with_map: false,
            keep_upright: true,
            allow_overlap: false,
            ignore_placement: false,
            collision_group_id: 0,
        }
    }
}

/// Collision geometry of one feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Feature {
    /// Label centred on an anchor, tested as a box.
    Point {
        feature_index: u32,
        collision_box: CollisionBoxGeometry,
    },
    /// Label following a line, tested as circles along its glyphs.
    Line { feature_index: u32, symbol_index: usize },
}

impl Feature {
    pub fn feature_index(&self) -> u32 {
        match self {
            Feature::Point { feature_index, .. } | Feature::Line { feature_index, .. } => *feature_index,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub bucket_instance_id: u32,
    pub tile_id: OverscaledTileId,
    #[serde(default)]
    pub layout: BucketLayout,
    #[serde(default)]
    pub text_size: SizeData,
    #[serde(default)]
    pub symbols: Vec<PlacedSymbol>,
    #[serde(default)]
    pub glyph_offsets: GlyphOffsetArray,
    #[serde(default)]
    pub line_vertices: LineVertexArray,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl Bucket {
    pub fn validate(&self) -> SceneResult<()> {
        let bucket = self.bucket_instance_id;
        for (index, symbol) in self.symbols.iter().enumerate() {
            let glyph_end = symbol.glyph_end_index();
            if symbol.num_glyphs == 0 || glyph_end > self.glyph_offsets.len() {
                return Err(SceneError::GlyphRange {
                    bucket,
                    symbol: index,
                    start: symbol.glyph_start_index,
                    end: glyph_end,
                    available: self.glyph_offsets.len(),
                });
            }
            let line_end = symbol.line_end_index();
            if line_end > self.line_vertices.len() {
                return Err(SceneError::LineRange {
                    bucket,
                    symbol: index,
                    start: symbol.line_start_index,
                    end: line_end,
                    available: self.line_vertices.len(),
                });
            }
            if symbol.segment + 1 >= symbol.line_length {
                return Err(SceneError::Segment {
                    bucket,
                    symbol: index,
                    segment: symbol.segment,
                    length: symbol.line_length,
                });
            }
        }
        for feature in &self.features {
            if let Feature::Line {
                feature_index,
                symbol_index,
            } = feature
            {
                if *symbol_index >= self.symbols.len() {
                    return Err(SceneError::UnknownSymbol {
                        bucket,
                        feature: *feature_index,
                        symbol: *symbol_index,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Scene {
    /// Parses a scene, accepting JSON5 for hand-written files.
    pub fn parse(input: &str) -> SceneResult<Self> {
        let scene: Scene = match serde_json::from_str(input) {
            Ok(scene) => scene,
            Err(json_err) => json5::from_str(input)
                .map_err(|json5_err| SceneError::Parse(format!("{json_err} (as JSON5: {json5_err})")))?,
        };
        scene.validate()?;
        Ok(scene)
    }

    pub fn validate(&self) -> SceneResult<()> {
        let TransformParams { width, height, .. } = self.transform;
        if !(width > 0.0 && height > 0.0) {
            return Err(SceneError::DegenerateViewport { width, height });
        }
        let mut ids = HashSet::new();
        for bucket in &self.buckets {
            if !ids.insert(bucket.bucket_instance_id) {
                return Err(SceneError::DuplicateBucket(bucket.bucket_instance_id));
            }
            bucket.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"{
        "transform": {"width": 800, "height": 600, "zoom": 4, "center": {"lng": 0, "lat": 0}},
        "buckets": [{
            "bucketInstanceId": 1,
            "tileId": {"overscaledZ": 4, "canonical": {"z": 0, "x": 0, "y": 0}},
            "layout": {"allowOverlap": true},
            "textSize": {"kind": "constant", "layoutSize": 12},
            "symbols": [{
                "tileAnchorX": 4096, "tileAnchorY": 4096,
                "glyphStartIndex": 0, "numGlyphs": 2,
                "lineStartIndex": 0, "lineLength": 2, "segment": 0
            }],
            "glyphOffsets": [-5, 5],
            "lineVertices": [[4000, 4096], [4200, 4096]],
            "features": [
                {"type": "line", "featureIndex": 0, "symbolIndex": 0},
                {"type": "point", "featureIndex": 1, "collisionBox":
                    {"anchorX": 100, "anchorY": 100, "x1": -5, "y1": -5, "x2": 5, "y2": 5, "padding": 0}}
            ]
        }],
        "queries": [[[0, 0], [10, 0], [10, 10]]]
    }"#;

    #[test]
    fn parses_scene_with_defaults() {
        let scene = Scene::parse(SCENE).unwrap();
        assert_eq!(scene.transform.width, 800.0);
        assert_eq!(scene.elevation, None);
        let bucket = &scene.buckets[0];
        assert!(bucket.layout.allow_overlap);
        assert!(bucket.layout.keep_upright);
        assert_eq!(bucket.text_size, SizeData::Constant { layout_size: 12.0 });
        assert_eq!(bucket.line_vertices.get(1), DVec2::new(4200.0, 4096.0));
        assert_eq!(bucket.features[1].feature_index(), 1);
        assert_eq!(scene.queries[0].len(), 3);
    }

    #[test]
    fn accepts_json5() {
        let input = "{transform: {width: 10, height: 10}, buckets: [], // none\n}";
        let scene = Scene::parse(input).unwrap();
        assert!(scene.buckets.is_empty());
    }

    #[test]
    fn rejects_glyph_ranges_past_the_offsets() {
        let input = SCENE.replace(r#""numGlyphs": 2"#, r#""numGlyphs": 3"#);
        assert!(matches!(Scene::parse(&input), Err(SceneError::GlyphRange { end: 3, .. })));
    }

    #[test]
    fn rejects_segments_off_the_line() {
        let input = SCENE.replace(r#""segment": 0"#, r#""segment": 1"#);
        assert!(matches!(Scene::parse(&input), Err(SceneError::Segment { segment: 1, .. })));
    }

    #[test]
    fn rejects_missing_symbols() {
        let input = SCENE.replace(r#""symbolIndex": 0"#, r#""symbolIndex": 4"#);
        assert!(matches!(Scene::parse(&input), Err(SceneError::UnknownSymbol { symbol: 4, .. })));
    }

    #[test]
    fn rejects_empty_viewports() {
        let input = SCENE.replace(r#""width": 800"#, r#""width": 0"#);
        assert!(matches!(Scene::parse(&input), Err(SceneError::DegenerateViewport { .. })));
    }

    #[test]
    fn reports_unparseable_input() {
        assert!(matches!(Scene::parse("not a scene"), Err(SceneError::Parse(_))));
    }
}
