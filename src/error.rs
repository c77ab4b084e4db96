use thiserror::Error;

pub type SceneResult<T> = Result<T, SceneError>;

/// Problems with a scene's input data. Geometry that merely cannot be
/// placed is never an error.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to parse scene: {0}")]
    Parse(String),

    #[error("viewport must have a positive size, got {width}x{height}")]
    DegenerateViewport { width: f64, height: f64 },

    #[error("bucket {bucket}: symbol {symbol} uses glyphs {start}..{end} but only {available} offsets exist")]
    GlyphRange {
        bucket: u32,
        symbol: usize,
        start: usize,
        end: usize,
        available: usize,
    },

    #[error("bucket {bucket}: symbol {symbol} uses line vertices {start}..{end} but only {available} exist")]
    LineRange {
        bucket: u32,
        symbol: usize,
        start: usize,
        end: usize,
        available: usize,
    },

    #[error("bucket {bucket}: symbol {symbol} anchors on segment {segment} of a {length}-vertex line")]
    Segment {
        bucket: u32,
        symbol: usize,
        segment: usize,
        length: usize,
    },

    #[error("bucket {bucket}: feature {feature} refers to missing symbol {symbol}")]
    UnknownSymbol { bucket: u32, feature: u32, symbol: usize },

    #[error("bucket id {0} is used more than once")]
    DuplicateBucket(u32),
}
