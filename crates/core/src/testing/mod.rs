//! Testing utilities and mock implementations.
//!
//! Mock implementations of every generation collaborator, so the pipeline can
//! be exercised end to end without a generation service.
//!
//! # Example
//!
//! ```rust,ignore
//! use storyreel_core::testing::MockGenerators;
//!
//! let mocks = MockGenerators::new();
//! mocks.image.set_delay(Duration::from_millis(50)).await;
//! mocks.video.fail_next(GeneratorError::rejected("bad clip")).await;
//!
//! let controller = PipelineController::new(store, mocks.generators(), PipelineConfig::default());
//! ```

mod control;
mod mock_media;
mod mock_narrative;
mod mock_video;

use std::sync::Arc;

use crate::generator::Generators;

pub use mock_media::{MediaKind, MockMediaGenerator, MOCK_CDN};
pub use mock_narrative::MockNarrativeGenerator;
pub use mock_video::{MockVideoComposer, VideoOperation};

/// One mock per collaborator role, with handles kept for assertions.
#[derive(Debug, Clone)]
pub struct MockGenerators {
    pub narrative: Arc<MockNarrativeGenerator>,
    pub image: Arc<MockMediaGenerator>,
    pub audio: Arc<MockMediaGenerator>,
    pub video: Arc<MockVideoComposer>,
}

impl Default for MockGenerators {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerators {
    pub fn new() -> Self {
        Self {
            narrative: Arc::new(MockNarrativeGenerator::new()),
            image: Arc::new(MockMediaGenerator::images()),
            audio: Arc::new(MockMediaGenerator::audio()),
            video: Arc::new(MockVideoComposer::new()),
        }
    }

    /// The collaborator set to hand to the pipeline.
    pub fn generators(&self) -> Generators {
        Generators {
            narrative: self.narrative.clone(),
            image: self.image.clone(),
            audio: self.audio.clone(),
            video: self.video.clone(),
        }
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::story::{CreateStoryRequest, SceneDraft, SourceType};

    /// A prompt-sourced story request on the portrait template.
    pub fn prompt_story(name: &str) -> CreateStoryRequest {
        CreateStoryRequest::new(name, "portrait", "A lighthouse keeper receives a late letter")
    }

    /// A text-sourced story request whose source is used verbatim as the narrative.
    pub fn text_story(name: &str, story_type_id: &str) -> CreateStoryRequest {
        CreateStoryRequest::new(
            name,
            story_type_id,
            "The train left at dawn. Nobody waved. The station cat watched it go.",
        )
        .with_source_type(SourceType::Text)
    }

    /// Scenes holding `shots_per_scene` shots each.
    pub fn scenes(scene_count: usize, shots_per_scene: usize) -> Vec<SceneDraft> {
        (0..scene_count)
            .map(|s| {
                (0..shots_per_scene).fold(
                    SceneDraft::new(format!("Scene {}", s + 1)),
                    |draft, i| {
                        draft.with_shot(
                            format!("Shot {}.{}", s + 1, i + 1),
                            format!("Line {} of scene {}.", i + 1, s + 1),
                        )
                    },
                )
            })
            .collect()
    }
}
