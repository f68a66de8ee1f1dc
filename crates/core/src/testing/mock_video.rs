//! Mock video composer for testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::generator::{
    CaptionRequest, CaptionedVideo, ComposedShot, GeneratorError, SceneAssemblyRequest,
    ShotCompositionRequest, StoryAssemblyRequest, VideoComposer,
};

use super::control::Control;
use super::mock_media::MOCK_CDN;

/// One operation of the video composer, for targeted failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoOperation {
    Compose,
    AssembleScene,
    AssembleStory,
    Captions,
}

/// Mock implementation of [`VideoComposer`].
///
/// Tracks every call per operation so tests can assert how often
/// composition, assembly and captioning ran.
///
/// # Example
///
/// ```rust,ignore
/// use storyreel_core::testing::MockVideoComposer;
///
/// let video = MockVideoComposer::new();
/// // ... run the pipeline ...
/// assert_eq!(video.story_assembly_count().await, 1);
/// ```
#[derive(Debug, Default)]
pub struct MockVideoComposer {
    control: Control,
    compose_control: Control,
    scene_control: Control,
    story_control: Control,
    caption_control: Control,
    compositions: Arc<RwLock<Vec<ShotCompositionRequest>>>,
    scene_assemblies: Arc<RwLock<Vec<SceneAssemblyRequest>>>,
    story_assemblies: Arc<RwLock<Vec<StoryAssemblyRequest>>>,
    captions: Arc<RwLock<Vec<CaptionRequest>>>,
}

impl MockVideoComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call (of any operation) with the given error.
    pub async fn fail_next(&self, error: GeneratorError) {
        self.control.push_error(error).await;
    }

    /// Fail the next call of one operation only.
    pub async fn fail_next_on(&self, operation: VideoOperation, error: GeneratorError) {
        self.control_for(operation).push_error(error).await;
    }

    fn control_for(&self, operation: VideoOperation) -> &Control {
        match operation {
            VideoOperation::Compose => &self.compose_control,
            VideoOperation::AssembleScene => &self.scene_control,
            VideoOperation::AssembleStory => &self.story_control,
            VideoOperation::Captions => &self.caption_control,
        }
    }

    async fn before_call(&self, operation: VideoOperation) -> Result<(), GeneratorError> {
        self.control.before_call().await?;
        self.control_for(operation).before_call().await
    }

    /// Delay every call.
    pub async fn set_delay(&self, delay: Duration) {
        self.control.set_delay(delay).await;
    }

    pub async fn composed_count(&self) -> usize {
        self.compositions.read().await.len()
    }

    pub async fn scene_assembly_count(&self) -> usize {
        self.scene_assemblies.read().await.len()
    }

    pub async fn story_assembly_count(&self) -> usize {
        self.story_assemblies.read().await.len()
    }

    pub async fn caption_count(&self) -> usize {
        self.captions.read().await.len()
    }

    pub async fn recorded_scene_assemblies(&self) -> Vec<SceneAssemblyRequest> {
        self.scene_assemblies.read().await.clone()
    }

    pub async fn recorded_story_assemblies(&self) -> Vec<StoryAssemblyRequest> {
        self.story_assemblies.read().await.clone()
    }

    pub async fn recorded_captions(&self) -> Vec<CaptionRequest> {
        self.captions.read().await.clone()
    }
}

#[async_trait]
impl VideoComposer for MockVideoComposer {
    fn name(&self) -> &str {
        "mock-video"
    }

    async fn compose_shot(
        &self,
        request: &ShotCompositionRequest,
    ) -> Result<ComposedShot, GeneratorError> {
        self.compositions.write().await.push(request.clone());
        self.before_call(VideoOperation::Compose).await?;
        Ok(ComposedShot {
            video_url: format!("{}/clips/{}.mp4", MOCK_CDN, request.shot_id),
            final_url: format!("{}/clips/{}-final.mp4", MOCK_CDN, request.shot_id),
        })
    }

    async fn assemble_scene(
        &self,
        request: &SceneAssemblyRequest,
    ) -> Result<String, GeneratorError> {
        self.scene_assemblies.write().await.push(request.clone());
        self.before_call(VideoOperation::AssembleScene).await?;
        Ok(format!("{}/scenes/{}.mp4", MOCK_CDN, request.scene_id))
    }

    async fn assemble_story(
        &self,
        request: &StoryAssemblyRequest,
    ) -> Result<String, GeneratorError> {
        self.story_assemblies.write().await.push(request.clone());
        self.before_call(VideoOperation::AssembleStory).await?;
        Ok(format!("{}/stories/{}.mp4", MOCK_CDN, request.story_id))
    }

    async fn apply_captions(
        &self,
        request: &CaptionRequest,
    ) -> Result<CaptionedVideo, GeneratorError> {
        self.captions.write().await.push(request.clone());
        self.before_call(VideoOperation::Captions).await?;

        let subtitles = request
            .segments
            .iter()
            .enumerate()
            .map(|(i, segment)| format!("{}\n{}\n", i + 1, segment.text))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(CaptionedVideo {
            video_url: format!("{}/stories/{}-captioned.mp4", MOCK_CDN, request.story_id),
            subtitles,
        })
    }
}
