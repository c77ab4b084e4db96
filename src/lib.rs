#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod placement;
pub mod placement_dump;
pub mod projection;
pub mod scene;
pub mod terrain;
pub mod tile;
pub mod transform;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, load_config};
pub use error::{SceneError, SceneResult};
pub use placement::{PlacementResult, place_scene};
pub use scene::Scene;
pub use transform::{CameraTransform, TransformParams};
