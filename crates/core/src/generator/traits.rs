//! Trait definitions for generation collaborators.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::GeneratorError;
use super::types::{
    CaptionRequest, CaptionedVideo, ComposedShot, DecomposeRequest, NarrativeRequest,
    SceneAssemblyRequest, ShotCompositionRequest, ShotMediaRequest, StoryAssemblyRequest,
};
use crate::story::SceneDraft;

/// Writes narratives and splits them into scenes and shots.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Returns the name of this implementation.
    fn name(&self) -> &str;

    /// Writes the story text for a prompt.
    async fn write_story(&self, request: &NarrativeRequest) -> Result<String, GeneratorError>;

    /// Splits a narrative into ordered scenes of ordered shots.
    async fn decompose(&self, request: &DecomposeRequest)
        -> Result<Vec<SceneDraft>, GeneratorError>;
}

/// Produces the still image for a shot.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the URL of the generated image.
    async fn generate_image(&self, request: &ShotMediaRequest) -> Result<String, GeneratorError>;
}

/// Produces the narration audio for a shot.
#[async_trait]
pub trait AudioGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the URL of the generated narration.
    async fn generate_audio(&self, request: &ShotMediaRequest) -> Result<String, GeneratorError>;
}

/// Composes and assembles video.
#[async_trait]
pub trait VideoComposer: Send + Sync {
    fn name(&self) -> &str;

    /// Composes one shot clip from its image and narration.
    async fn compose_shot(
        &self,
        request: &ShotCompositionRequest,
    ) -> Result<ComposedShot, GeneratorError>;

    /// Joins the shot clips of a scene, returning the scene video URL.
    async fn assemble_scene(&self, request: &SceneAssemblyRequest)
        -> Result<String, GeneratorError>;

    /// Joins scene videos into the story video, returning its URL.
    async fn assemble_story(&self, request: &StoryAssemblyRequest)
        -> Result<String, GeneratorError>;

    /// Burns captions into the story video.
    async fn apply_captions(&self, request: &CaptionRequest)
        -> Result<CaptionedVideo, GeneratorError>;
}

/// The set of collaborators a pipeline runs against.
#[derive(Clone)]
pub struct Generators {
    pub narrative: Arc<dyn NarrativeGenerator>,
    pub image: Arc<dyn ImageGenerator>,
    pub audio: Arc<dyn AudioGenerator>,
    pub video: Arc<dyn VideoComposer>,
}

impl Generators {
    /// Uses one implementation for every role.
    pub fn from_single<G>(generator: Arc<G>) -> Self
    where
        G: NarrativeGenerator + ImageGenerator + AudioGenerator + VideoComposer + 'static,
    {
        Self {
            narrative: generator.clone(),
            image: generator.clone(),
            audio: generator.clone(),
            video: generator,
        }
    }
}

impl std::fmt::Debug for Generators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generators")
            .field("narrative", &self.narrative.name())
            .field("image", &self.image.name())
            .field("audio", &self.audio.name())
            .field("video", &self.video.name())
            .finish()
    }
}
