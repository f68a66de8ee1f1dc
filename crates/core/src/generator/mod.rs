//! Generation collaborators: narrative writing, decomposition, media and video.
//!
//! The pipeline only talks to these traits. [`HttpGenerator`] implements every
//! role against a remote service; tests use the mocks in `crate::testing`.

mod config;
mod error;
mod http;
mod traits;
mod types;

pub use config::GeneratorConfig;
pub use error::GeneratorError;
pub use http::HttpGenerator;
pub use traits::{AudioGenerator, Generators, ImageGenerator, NarrativeGenerator, VideoComposer};
pub use types::{
    CaptionRequest, CaptionSegment, CaptionedVideo, ComposedShot, DecomposeRequest,
    NarrativeRequest, RenderFormat, SceneAssemblyRequest, ShotCompositionRequest,
    ShotMediaRequest, StoryAssemblyRequest,
};
