//! Types for the story pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generator::GeneratorError;
use crate::story::{ProgressSnapshot, Story, StoryError, StoryStatus};

/// Errors that can occur while advancing a story.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Story not found.
    #[error("story not found: {0}")]
    NotFound(String),

    /// Another caller changed the record first.
    #[error("conflict on {unit} {id}")]
    Conflict { unit: &'static str, id: String },

    /// Input or stored data is unusable.
    #[error("validation error: {0}")]
    Validation(String),

    /// A generation collaborator failed.
    #[error("generation failed: {0}")]
    Generation(#[from] GeneratorError),

    /// Final assembly could not be completed.
    #[error("finalization failed: {0}")]
    Finalization(String),

    /// The operation needs a live story.
    #[error("story {story_id} is already {status}")]
    AlreadyTerminal {
        story_id: String,
        status: StoryStatus,
    },

    /// Story store error.
    #[error("story store error: {0}")]
    Store(#[from] StoryError),
}

impl PipelineError {
    /// Map a store error, lifting conflicts and missing stories into their own variants.
    pub(crate) fn from_store(err: StoryError) -> Self {
        match err {
            StoryError::Conflict { kind, id, .. } => PipelineError::Conflict { unit: kind, id },
            StoryError::NotFound { kind: "story", id } => PipelineError::NotFound(id),
            other => PipelineError::Store(other),
        }
    }
}

/// What a single advance call did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Narrative written and scenes decomposed.
    Prepared,
    /// One shot went through its media stages.
    ShotCompleted,
    /// Another caller claimed the unit first.
    ClaimLost,
    /// Work is in flight elsewhere; nothing to claim right now.
    Busy,
    /// Scenes assembled and the story completed.
    Finalized,
    /// The story failed during this call.
    Failed,
    /// The story was already completed or failed.
    Terminal,
}

impl StepOutcome {
    /// Label used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Prepared => "prepared",
            StepOutcome::ShotCompleted => "shot_completed",
            StepOutcome::ClaimLost => "claim_lost",
            StepOutcome::Busy => "busy",
            StepOutcome::Finalized => "finalized",
            StepOutcome::Failed => "failed",
            StepOutcome::Terminal => "terminal",
        }
    }
}

/// Result of one [`advance`](super::PipelineController::advance) call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub story_id: String,
    pub status: StoryStatus,
    /// Persisted story progress (0-100).
    pub progress: u8,
    pub completed_shots: u32,
    pub total_shots: u32,
    /// True once the story is completed or failed.
    pub done: bool,
    /// Suggested delay before calling again, when there is more to do.
    pub retry_after_secs: Option<u64>,
    pub outcome: StepOutcome,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl StepResult {
    /// Build a result describing the given story state.
    pub fn new(story: &Story, snapshot: ProgressSnapshot, outcome: StepOutcome) -> Self {
        Self {
            story_id: story.id.clone(),
            status: story.status,
            progress: story.progress,
            completed_shots: snapshot.completed_shots,
            total_shots: snapshot.total_shots,
            done: story.status.is_terminal(),
            retry_after_secs: None,
            outcome,
            message: None,
            error: if story.status == StoryStatus::Failed {
                story.error_message.clone()
            } else {
                None
            },
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        if !self.done {
            self.retry_after_secs = Some(secs);
        }
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
