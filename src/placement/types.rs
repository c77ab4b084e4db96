use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::projection::Projector;
use crate::tile::OverscaledTileId;

/// Orientation decision carried from one frame to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlipState {
    #[default]
    Unknown,
    FlipRequired,
    FlipNotRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WritingMode {
    None,
    /// Horizontal glyphs that may hand over to a paired vertical symbol
    /// when the line runs steeply on screen.
    #[default]
    Horizontal,
    Vertical,
    /// Horizontal glyphs with no vertical counterpart.
    HorizontalOnly,
}

/// One placeable label instance produced by text layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedSymbol {
    pub tile_anchor_x: f64,
    pub tile_anchor_y: f64,
    #[serde(default)]
    pub writing_mode: WritingMode,
    pub glyph_start_index: usize,
    pub num_glyphs: usize,
    pub line_start_index: usize,
    pub line_length: usize,
    /// Index of the line segment the anchor sits on, relative to
    /// `line_start_index`.
    pub segment: usize,
    #[serde(default)]
    pub line_offset_x: f64,
    #[serde(default)]
    pub line_offset_y: f64,
    /// Packed feature sizes for source/composite size expressions.
    #[serde(default)]
    pub lower_size: u16,
    #[serde(default)]
    pub upper_size: u16,
    #[serde(default)]
    pub flip_state: FlipState,
    #[serde(default)]
    pub hidden: bool,
}

impl PlacedSymbol {
    pub fn tile_anchor(&self) -> DVec2 {
        DVec2::new(self.tile_anchor_x, self.tile_anchor_y)
    }

    pub fn glyph_end_index(&self) -> usize {
        self.glyph_start_index + self.num_glyphs
    }

    pub fn line_end_index(&self) -> usize {
        self.line_start_index + self.line_length
    }
}

/// Per-glyph horizontal offsets along the line, in ems at `ONE_EM`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlyphOffsetArray(Vec<f64>);

impl GlyphOffsetArray {
    pub fn new(offsets: Vec<f64>) -> Self {
        Self(offsets)
    }

    pub fn offset_x(&self, index: usize) -> f64 {
        self.0[index]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Tile-unit vertices of every line in a bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineVertexArray(Vec<DVec2>);

impl LineVertexArray {
    pub fn new(vertices: Vec<DVec2>) -> Self {
        Self(vertices)
    }

    pub fn get(&self, index: usize) -> DVec2 {
        self.0[index]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-vertex glyph position and rotation written every frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub angle: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicVertexArray {
    vertices: Vec<DynamicVertex>,
}

impl DynamicVertexArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Writes the four corner vertices of one glyph quad.
    pub fn add_glyph(&mut self, point: DVec3, angle: f64) {
        let vertex = DynamicVertex {
            x: point.x as f32,
            y: point.y as f32,
            z: point.z as f32,
            angle: angle as f32,
        };
        self.vertices.extend([vertex; 4]);
    }

    /// Writes the off-screen sentinel for `num_glyphs` glyphs.
    pub fn hide_glyphs(&mut self, num_glyphs: usize) {
        let offscreen = DVec3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, 0.0);
        for _ in 0..num_glyphs {
            self.add_glyph(offscreen, 0.0);
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn as_slice(&self) -> &[DynamicVertex] {
        &self.vertices
    }
}

/// Collision box geometry as laid out in tile units around an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionBoxGeometry {
    pub anchor_x: f64,
    pub anchor_y: f64,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    #[serde(default)]
    pub padding: f64,
}

/// A box ready for placement: tile-unit extents around an anchor that has
/// already been taken into the projector's tile space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionBox {
    pub projected_anchor: DVec3,
    pub tile_anchor: DVec2,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub padding: f64,
    /// Terrain height at the anchor in meters.
    pub elevation: f64,
    pub tile_id: Option<OverscaledTileId>,
}

impl CollisionBox {
    /// Projects the geometry's anchor with `projector` and lifts it by
    /// `lift`, the terrain offset at the anchor.
    pub fn from_geometry(
        geometry: &CollisionBoxGeometry,
        projector: &dyn Projector,
        tile_id: OverscaledTileId,
        elevation: f64,
        lift: DVec3,
    ) -> Self {
        let projected_anchor =
            projector.project_tile_point(geometry.anchor_x, geometry.anchor_y, &tile_id.canonical) + lift;
        Self {
            projected_anchor,
            tile_anchor: DVec2::new(geometry.anchor_x, geometry.anchor_y),
            x1: geometry.x1,
            y1: geometry.y1,
            x2: geometry.x2,
            y2: geometry.y2,
            padding: geometry.padding,
            elevation,
            tile_id: Some(tile_id),
        }
    }
}

/// Axis-aligned box in collision-grid pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl ScreenBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// One circle of the chain covering a line-following label, in
/// collision-grid pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionCircle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl CollisionCircle {
    pub fn bounds(&self) -> ScreenBox {
        ScreenBox::new(
            self.x - self.radius,
            self.y - self.radius,
            self.x + self.radius,
            self.y + self.radius,
        )
    }
}

/// Identifies the feature that owns a grid entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridEntryKey {
    pub bucket_instance_id: u32,
    pub feature_index: u32,
    pub collision_group_id: u16,
}
