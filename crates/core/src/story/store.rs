//! Story storage trait and request types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{
    ProgressSnapshot, ResourceStatus, Scene, SceneDraft, Shot, ShotField, SourceType, Story,
    StoryStatus, StoryType,
};

/// Maximum accepted length of a story name.
pub const MAX_NAME_LEN: usize = 200;

/// Maximum accepted length of the source content.
pub const MAX_SOURCE_LEN: usize = 50_000;

/// Error type for story storage operations.
#[derive(Debug, Error)]
pub enum StoryError {
    /// Story, scene or shot not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Conditional update lost: the record no longer matches the expected state.
    #[error("conflict on {kind} {id}: expected {expected}")]
    Conflict {
        kind: &'static str,
        id: String,
        expected: String,
    },

    /// Requested status change is not a legal pipeline move.
    #[error("invalid transition for story {story_id}: {from} -> {to}")]
    InvalidTransition {
        story_id: String,
        from: StoryStatus,
        to: StoryStatus,
    },

    /// Creation input rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl StoryError {
    pub fn story_not_found(id: impl Into<String>) -> Self {
        StoryError::NotFound {
            kind: "story",
            id: id.into(),
        }
    }

    pub fn shot_not_found(id: impl Into<String>) -> Self {
        StoryError::NotFound {
            kind: "shot",
            id: id.into(),
        }
    }

    pub fn scene_not_found(id: impl Into<String>) -> Self {
        StoryError::NotFound {
            kind: "scene",
            id: id.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoryError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoryError::NotFound { .. })
    }
}

impl From<rusqlite::Error> for StoryError {
    fn from(e: rusqlite::Error) -> Self {
        StoryError::Database(e.to_string())
    }
}

/// Request to create a new story.
#[derive(Debug, Clone)]
pub struct CreateStoryRequest {
    pub name: String,
    pub story_type_id: String,
    pub source_content: String,
    pub source_type: SourceType,
}

impl CreateStoryRequest {
    pub fn new(
        name: impl Into<String>,
        story_type_id: impl Into<String>,
        source_content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            story_type_id: story_type_id.into(),
            source_content: source_content.into(),
            source_type: SourceType::Prompt,
        }
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    /// Checks the request shape. Story type existence is checked by the store.
    pub fn validate(&self) -> Result<(), StoryError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(StoryError::Validation("name must not be empty".into()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(StoryError::Validation(format!(
                "name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        if self.story_type_id.trim().is_empty() {
            return Err(StoryError::Validation("storyTypeId must not be empty".into()));
        }
        if self.source_content.trim().is_empty() {
            return Err(StoryError::Validation(
                "sourceContent must not be empty".into(),
            ));
        }
        if self.source_content.chars().count() > MAX_SOURCE_LEN {
            return Err(StoryError::Validation(format!(
                "sourceContent must be at most {} characters",
                MAX_SOURCE_LEN
            )));
        }
        Ok(())
    }
}

/// Field changes applied to a story, alongside a status transition or on their own.
#[derive(Debug, Clone, Default)]
pub struct StoryUpdate {
    /// New progress. The store never lets persisted progress decrease.
    pub progress: Option<u8>,
    pub narrative: Option<String>,
    pub final_video_url: Option<String>,
    pub captioned_video_url: Option<String>,
    pub subtitles: Option<String>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StoryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_narrative(mut self, narrative: impl Into<String>) -> Self {
        self.narrative = Some(narrative.into());
        self
    }

    pub fn with_final_video_url(mut self, url: impl Into<String>) -> Self {
        self.final_video_url = Some(url.into());
        self
    }

    pub fn with_captioned_video_url(mut self, url: impl Into<String>) -> Self {
        self.captioned_video_url = Some(url.into());
        self
    }

    pub fn with_subtitles(mut self, subtitles: impl Into<String>) -> Self {
        self.subtitles = Some(subtitles.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.progress.is_none()
            && self.narrative.is_none()
            && self.final_video_url.is_none()
            && self.captioned_video_url.is_none()
            && self.subtitles.is_none()
            && self.error_message.is_none()
            && self.completed_at.is_none()
    }
}

/// Field changes applied to a shot.
#[derive(Debug, Clone, Default)]
pub struct ShotUpdate {
    pub statuses: Vec<(ShotField, ResourceStatus)>,
    pub urls: Vec<(ShotField, String)>,
    pub error_message: Option<String>,
}

impl ShotUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(mut self, field: ShotField, status: ResourceStatus) -> Self {
        self.statuses.retain(|(f, _)| *f != field);
        self.statuses.push((field, status));
        self
    }

    pub fn set_url(mut self, field: ShotField, url: impl Into<String>) -> Self {
        self.urls.retain(|(f, _)| *f != field);
        self.urls.push((field, url.into()));
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty() && self.urls.is_empty() && self.error_message.is_none()
    }
}

/// Expected field values for a conditional shot update.
///
/// The shot's status fields act as its version: an update only applies when
/// every listed field still holds the expected value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShotExpectation {
    pub fields: Vec<(ShotField, ResourceStatus)>,
}

impl ShotExpectation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: ShotField, status: ResourceStatus) -> Self {
        self.fields.retain(|(f, _)| *f != field);
        self.fields.push((field, status));
        self
    }

    /// Expects every status field to match the given snapshot.
    pub fn matching(shot: &Shot) -> Self {
        ShotField::ALL
            .iter()
            .fold(Self::new(), |exp, field| exp.with(*field, shot.status(*field)))
    }

    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|(field, status)| format!("{}={}", field, status))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Field changes applied to a scene.
#[derive(Debug, Clone, Default)]
pub struct SceneUpdate {
    pub status: Option<ResourceStatus>,
    pub video_url: Option<String>,
}

impl SceneUpdate {
    pub fn status(status: ResourceStatus) -> Self {
        Self {
            status: Some(status),
            video_url: None,
        }
    }

    pub fn with_video_url(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }
}

/// Row order for story listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoryOrder {
    /// Most recently created first.
    #[default]
    NewestFirst,
    /// Least recently touched first, so repeated scans take turns.
    LeastRecentlyUpdated,
}

/// Filter for querying stories.
#[derive(Debug, Clone)]
pub struct StoryFilter {
    /// Restrict to these statuses (empty = any).
    pub statuses: Vec<StoryStatus>,
    pub order: StoryOrder,
    pub limit: i64,
    pub offset: i64,
}

impl Default for StoryFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl StoryFilter {
    pub fn new() -> Self {
        Self {
            statuses: Vec::new(),
            order: StoryOrder::NewestFirst,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: StoryStatus) -> Self {
        self.statuses.push(status);
        self
    }

    /// Stories that still have work left.
    pub fn active() -> Self {
        StoryStatus::ALL
            .iter()
            .filter(|s| !s.is_terminal())
            .fold(Self::new(), |filter, status| filter.with_status(*status))
    }

    pub fn with_order(mut self, order: StoryOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// A processing field reset by the stale-work sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleShotReset {
    pub story_id: String,
    pub shot_id: String,
    pub fields: Vec<ShotField>,
}

/// Trait for story storage backends.
///
/// Every mutating method that takes an expected state is a compare-and-set:
/// it returns [`StoryError::Conflict`] when the record exists but no longer
/// matches, and [`StoryError::NotFound`] when it does not exist.
pub trait StoryStore: Send + Sync {
    /// List all story types.
    fn list_story_types(&self) -> Result<Vec<StoryType>, StoryError>;

    /// Get a story type by ID.
    fn get_story_type(&self, id: &str) -> Result<Option<StoryType>, StoryError>;

    /// Create a story in `pending` with progress 0 and no scenes.
    fn create_story(&self, request: CreateStoryRequest) -> Result<Story, StoryError>;

    /// Get a story by ID.
    fn get_story(&self, id: &str) -> Result<Option<Story>, StoryError>;

    /// List stories matching the filter, newest first.
    fn list_stories(&self, filter: &StoryFilter) -> Result<Vec<Story>, StoryError>;

    /// Count stories matching the filter.
    fn count_stories(&self, filter: &StoryFilter) -> Result<i64, StoryError>;

    /// Move a story from `from` to `to` if it is still in `from`, applying `update`.
    fn transition_story(
        &self,
        id: &str,
        from: StoryStatus,
        to: StoryStatus,
        update: StoryUpdate,
    ) -> Result<Story, StoryError>;

    /// Apply field changes without touching the status.
    fn update_story(&self, id: &str, update: StoryUpdate) -> Result<Story, StoryError>;

    /// Delete a story with its scenes and shots, returning the deleted story.
    fn delete_story(&self, id: &str) -> Result<Story, StoryError>;

    /// Insert the decomposed scenes and shots of a story in one transaction.
    ///
    /// Also records the scene and shot totals on the story.
    fn insert_scenes(
        &self,
        story_id: &str,
        drafts: &[SceneDraft],
    ) -> Result<(Vec<Scene>, Vec<Shot>), StoryError>;

    /// Scenes of a story ordered by `sort_order`.
    fn get_scenes_by_story(&self, story_id: &str) -> Result<Vec<Scene>, StoryError>;

    /// Update a scene's assembly status and clip.
    fn update_scene(&self, scene_id: &str, update: SceneUpdate) -> Result<Scene, StoryError>;

    /// Shots of a story ordered by scene then shot order.
    fn get_shots_by_story(&self, story_id: &str) -> Result<Vec<Shot>, StoryError>;

    /// Get a shot by ID.
    fn get_shot(&self, id: &str) -> Result<Option<Shot>, StoryError>;

    /// Apply `update` to a shot, conditioned on `expected` when given.
    fn update_shot(
        &self,
        id: &str,
        update: ShotUpdate,
        expected: Option<&ShotExpectation>,
    ) -> Result<Shot, StoryError>;

    /// Shot completion counts for a story.
    fn calculate_progress(&self, story_id: &str) -> Result<ProgressSnapshot, StoryError>;

    /// Reset shot fields stuck in `processing` since before `cutoff` back to `pending`.
    fn reset_stale_shots(&self, cutoff: DateTime<Utc>) -> Result<Vec<StaleShotReset>, StoryError>;

    /// Stories holding a claimed unit whose last update is older than `cutoff`.
    fn list_stale_stories(&self, cutoff: DateTime<Utc>) -> Result<Vec<Story>, StoryError>;
}
