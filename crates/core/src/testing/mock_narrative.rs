//! Mock narrative generator for testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::generator::{DecomposeRequest, GeneratorError, NarrativeGenerator, NarrativeRequest};
use crate::story::SceneDraft;

use super::control::Control;

/// Mock implementation of [`NarrativeGenerator`].
///
/// Writes a fixed narrative and decomposes every narrative into the
/// configured scenes (two scenes of two shots by default).
///
/// # Example
///
/// ```rust,ignore
/// use storyreel_core::testing::MockNarrativeGenerator;
///
/// let narrative = MockNarrativeGenerator::new();
/// narrative.set_scenes(vec![SceneDraft::new("Only").with_shot("a", "Hello")]).await;
/// narrative.fail_next(GeneratorError::rejected("no")).await;
/// ```
#[derive(Debug)]
pub struct MockNarrativeGenerator {
    control: Control,
    narrative: Arc<RwLock<String>>,
    scenes: Arc<RwLock<Vec<SceneDraft>>>,
    written: Arc<RwLock<Vec<NarrativeRequest>>>,
    decomposed: Arc<RwLock<Vec<DecomposeRequest>>>,
}

impl Default for MockNarrativeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNarrativeGenerator {
    pub fn new() -> Self {
        Self {
            control: Control::default(),
            narrative: Arc::new(RwLock::new(
                "The lighthouse keeper found a letter. It was addressed to him, forty years late."
                    .to_string(),
            )),
            scenes: Arc::new(RwLock::new(vec![
                SceneDraft::new("The letter")
                    .with_shot("Lighthouse", "The lighthouse keeper found a letter.")
                    .with_shot("Envelope", "It was addressed to him."),
                SceneDraft::new("The date")
                    .with_shot("Postmark", "Forty years late.")
                    .with_shot("Sea", "The sea said nothing."),
            ])),
            written: Arc::new(RwLock::new(Vec::new())),
            decomposed: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Set the narrative returned by `write_story`.
    pub async fn set_narrative(&self, narrative: impl Into<String>) {
        *self.narrative.write().await = narrative.into();
    }

    /// Set the scenes returned by `decompose`.
    pub async fn set_scenes(&self, scenes: Vec<SceneDraft>) {
        *self.scenes.write().await = scenes;
    }

    /// Fail the next call with the given error.
    pub async fn fail_next(&self, error: GeneratorError) {
        self.control.push_error(error).await;
    }

    /// Delay every call.
    pub async fn set_delay(&self, delay: Duration) {
        self.control.set_delay(delay).await;
    }

    /// Requests passed to `write_story`.
    pub async fn recorded_writes(&self) -> Vec<NarrativeRequest> {
        self.written.read().await.clone()
    }

    /// Requests passed to `decompose`.
    pub async fn recorded_decompositions(&self) -> Vec<DecomposeRequest> {
        self.decomposed.read().await.clone()
    }
}

#[async_trait]
impl NarrativeGenerator for MockNarrativeGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn write_story(&self, request: &NarrativeRequest) -> Result<String, GeneratorError> {
        self.written.write().await.push(request.clone());
        self.control.before_call().await?;
        Ok(self.narrative.read().await.clone())
    }

    async fn decompose(
        &self,
        request: &DecomposeRequest,
    ) -> Result<Vec<SceneDraft>, GeneratorError> {
        self.decomposed.write().await.push(request.clone());
        self.control.before_call().await?;
        Ok(self.scenes.read().await.clone())
    }
}
