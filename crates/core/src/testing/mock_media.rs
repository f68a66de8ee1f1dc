//! Mock image and audio generators for testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::generator::{AudioGenerator, GeneratorError, ImageGenerator, ShotMediaRequest};

use super::control::Control;

/// Base URL of every asset the mocks hand out.
pub const MOCK_CDN: &str = "https://cdn.storyreel.test";

/// Which kind of asset a [`MockMediaGenerator`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    fn url_for(&self, request: &ShotMediaRequest) -> String {
        match self {
            MediaKind::Image => format!("{}/images/{}.png", MOCK_CDN, request.shot_id),
            MediaKind::Audio => format!("{}/audio/{}.mp3", MOCK_CDN, request.shot_id),
        }
    }
}

/// Mock implementation of [`ImageGenerator`] and [`AudioGenerator`].
///
/// Returns a deterministic URL per shot and records every request.
#[derive(Debug)]
pub struct MockMediaGenerator {
    kind: MediaKind,
    control: Control,
    requests: Arc<RwLock<Vec<ShotMediaRequest>>>,
}

impl MockMediaGenerator {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            control: Control::default(),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn images() -> Self {
        Self::new(MediaKind::Image)
    }

    pub fn audio() -> Self {
        Self::new(MediaKind::Audio)
    }

    /// Fail the next call with the given error.
    pub async fn fail_next(&self, error: GeneratorError) {
        self.control.push_error(error).await;
    }

    /// Reject every call until cleared with `None`.
    pub async fn fail_always(&self, reason: Option<&str>) {
        self.control
            .set_always_fail(reason.map(str::to_string))
            .await;
    }

    /// Delay every call.
    pub async fn set_delay(&self, delay: Duration) {
        self.control.set_delay(delay).await;
    }

    /// Number of generation calls received.
    pub async fn call_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Requests received, in call order.
    pub async fn recorded_requests(&self) -> Vec<ShotMediaRequest> {
        self.requests.read().await.clone()
    }

    async fn generate(&self, request: &ShotMediaRequest) -> Result<String, GeneratorError> {
        self.requests.write().await.push(request.clone());
        self.control.before_call().await?;
        Ok(self.kind.url_for(request))
    }
}

#[async_trait]
impl ImageGenerator for MockMediaGenerator {
    fn name(&self) -> &str {
        "mock-image"
    }

    async fn generate_image(&self, request: &ShotMediaRequest) -> Result<String, GeneratorError> {
        self.generate(request).await
    }
}

#[async_trait]
impl AudioGenerator for MockMediaGenerator {
    fn name(&self) -> &str {
        "mock-audio"
    }

    async fn generate_audio(&self, request: &ShotMediaRequest) -> Result<String, GeneratorError> {
        self.generate(request).await
    }
}
