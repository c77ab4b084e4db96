// Symbol placement: line-label glyph layout and collision detection.

mod collision_index;
mod grid_index;
mod line_placer;
mod pass;
pub mod projection;
mod symbol_size;
mod types;

pub use collision_index::{CollisionIndex, LineCollisionParams, PlacedBox, PlacedCircles, ScreenProjection};
pub use grid_index::{GridEntry, GridIndex, GridPredicate};
pub use line_placer::{
    FirstAndLastGlyph, GlyphRun, LineGeometry, LineLabelParams, LineLabelStats, LinePlacement, ONE_EM,
    OrientationChange, OrientationFrame, PlacedGlyph, ProjectionCache, TileElevation, is_in_flip_retain_range,
    requires_orientation_change, update_line_labels,
};
pub use pass::{
    BoxRecord, BucketPlacement, CircleRecord, FeaturePlacement, PlacementCounts, PlacementResult, place_scene,
};
pub use symbol_size::{
    Interpolation, PartiallyEvaluatedSize, SIZE_PACK_FACTOR, SizeData, evaluate_size_for_feature,
    evaluate_size_for_zoom,
};
pub use types::{
    CollisionBox, CollisionBoxGeometry, CollisionCircle, DynamicVertex, DynamicVertexArray, FlipState,
    GlyphOffsetArray, GridEntryKey, LineVertexArray, PlacedSymbol, ScreenBox, WritingMode,
};
