//! Core story data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Story Types (output templates)
// ============================================================================

/// Output template for a story: dimensions, aspect ratio, caption support.
///
/// Story types are seeded by the store and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoryType {
    pub id: String,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: String,
    pub captions_enabled: bool,
}

// ============================================================================
// Story status
// ============================================================================

/// Story-level pipeline status.
///
/// Statuses are ordered; a story only ever moves forward, except for
/// `Failed` which can be entered from any non-terminal status and is absorbing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Pending,
    GeneratingStory,
    GeneratingScenes,
    GeneratingMedia,
    BuildingVideo,
    AddingCaptions,
    Completed,
    Failed,
}

impl StoryStatus {
    /// All statuses in pipeline order.
    pub const ALL: [StoryStatus; 8] = [
        StoryStatus::Pending,
        StoryStatus::GeneratingStory,
        StoryStatus::GeneratingScenes,
        StoryStatus::GeneratingMedia,
        StoryStatus::BuildingVideo,
        StoryStatus::AddingCaptions,
        StoryStatus::Completed,
        StoryStatus::Failed,
    ];

    /// Statuses in which some caller holds an exclusive, non-idempotent unit of work.
    pub const CLAIMED: [StoryStatus; 4] = [
        StoryStatus::GeneratingStory,
        StoryStatus::GeneratingScenes,
        StoryStatus::BuildingVideo,
        StoryStatus::AddingCaptions,
    ];

    /// Returns the persisted name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Pending => "pending",
            StoryStatus::GeneratingStory => "generating_story",
            StoryStatus::GeneratingScenes => "generating_scenes",
            StoryStatus::GeneratingMedia => "generating_media",
            StoryStatus::BuildingVideo => "building_video",
            StoryStatus::AddingCaptions => "adding_captions",
            StoryStatus::Completed => "completed",
            StoryStatus::Failed => "failed",
        }
    }

    /// Whether this is a terminal status (`completed` or `failed`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, StoryStatus::Completed | StoryStatus::Failed)
    }

    /// Whether this status marks a unit owned by a single caller.
    pub fn is_claimed_unit(&self) -> bool {
        Self::CLAIMED.contains(self)
    }

    /// Position in the linear pipeline. `Failed` has no position.
    fn stage_index(&self) -> Option<u8> {
        match self {
            StoryStatus::Pending => Some(0),
            StoryStatus::GeneratingStory => Some(1),
            StoryStatus::GeneratingScenes => Some(2),
            StoryStatus::GeneratingMedia => Some(3),
            StoryStatus::BuildingVideo => Some(4),
            StoryStatus::AddingCaptions => Some(5),
            StoryStatus::Completed => Some(6),
            StoryStatus::Failed => None,
        }
    }

    /// Whether a story in this status may move to `next`.
    ///
    /// Forward moves may skip stages (a story created with its shots already
    /// decomposed goes straight from `pending` to `generating_media`).
    pub fn can_transition_to(&self, next: StoryStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == StoryStatus::Failed {
            return true;
        }
        match (self.stage_index(), next.stage_index()) {
            (Some(current), Some(target)) => target > current,
            _ => false,
        }
    }

    /// Human-readable label for the step the story is currently on.
    pub fn current_step(&self) -> &'static str {
        match self {
            StoryStatus::Pending => "Waiting to start",
            StoryStatus::GeneratingStory => "Writing the story",
            StoryStatus::GeneratingScenes => "Breaking the story into scenes",
            StoryStatus::GeneratingMedia => "Generating images, narration and clips",
            StoryStatus::BuildingVideo => "Assembling the video",
            StoryStatus::AddingCaptions => "Adding captions",
            StoryStatus::Completed => "Done",
            StoryStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoryStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown story status: {}", s))
    }
}

// ============================================================================
// Per-resource status (shots and scenes)
// ============================================================================

/// Status of one shot resource (or of a scene's assembly).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Processing => "processing",
            ResourceStatus::Completed => "completed",
            ResourceStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ResourceStatus::Pending),
            "processing" => Ok(ResourceStatus::Processing),
            "completed" => Ok(ResourceStatus::Completed),
            "failed" => Ok(ResourceStatus::Failed),
            other => Err(format!("unknown resource status: {}", other)),
        }
    }
}

/// One of the four independently tracked shot resources.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShotField {
    Image,
    Audio,
    Video,
    Final,
}

impl ShotField {
    pub const ALL: [ShotField; 4] = [
        ShotField::Image,
        ShotField::Audio,
        ShotField::Video,
        ShotField::Final,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShotField::Image => "image",
            ShotField::Audio => "audio",
            ShotField::Video => "video",
            ShotField::Final => "final",
        }
    }

    /// Column holding this resource's status.
    pub fn status_column(&self) -> &'static str {
        match self {
            ShotField::Image => "image_status",
            ShotField::Audio => "audio_status",
            ShotField::Video => "video_status",
            ShotField::Final => "final_status",
        }
    }

    /// Column holding this resource's URL.
    pub fn url_column(&self) -> &'static str {
        match self {
            ShotField::Image => "image_url",
            ShotField::Audio => "audio_url",
            ShotField::Video => "video_url",
            ShotField::Final => "final_url",
        }
    }
}

impl fmt::Display for ShotField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Story
// ============================================================================

/// How the source content of a story should be interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A short prompt; the narrative is written from it.
    #[default]
    Prompt,
    /// Ready-made narrative text, used as-is.
    Text,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Prompt => "prompt",
            SourceType::Text => "text",
        }
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(SourceType::Prompt),
            "text" => Ok(SourceType::Text),
            other => Err(format!("unknown source type: {}", other)),
        }
    }
}

/// One generation job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Story {
    pub id: String,
    pub name: String,
    pub story_type_id: String,
    pub source_content: String,
    pub source_type: SourceType,
    pub status: StoryStatus,
    /// Persisted progress (0-100). Only reaches 100 on completion.
    pub progress: u8,
    /// Generated narrative text, once produced.
    pub narrative: Option<String>,
    pub total_scenes: u32,
    pub total_shots: u32,
    pub final_video_url: Option<String>,
    pub captioned_video_url: Option<String>,
    pub subtitles: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Ordered group of shots within a story.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scene {
    pub id: String,
    pub story_id: String,
    pub name: String,
    pub sort_order: u32,
    pub status: ResourceStatus,
    pub video_url: Option<String>,
}

/// Smallest unit of work: one image, one narration clip, one composed clip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shot {
    pub id: String,
    pub story_id: String,
    pub scene_id: String,
    pub name: String,
    /// Narration / caption text for this shot.
    pub script: String,
    /// Order of the parent scene within the story.
    pub scene_order: u32,
    /// Order of this shot within its scene.
    pub sort_order: u32,
    pub image_status: ResourceStatus,
    pub audio_status: ResourceStatus,
    pub video_status: ResourceStatus,
    pub final_status: ResourceStatus,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    pub final_url: Option<String>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Shot {
    /// Returns the status of the given resource.
    pub fn status(&self, field: ShotField) -> ResourceStatus {
        match field {
            ShotField::Image => self.image_status,
            ShotField::Audio => self.audio_status,
            ShotField::Video => self.video_status,
            ShotField::Final => self.final_status,
        }
    }

    /// Returns the URL of the given resource, if produced.
    pub fn url(&self, field: ShotField) -> Option<&str> {
        match field {
            ShotField::Image => self.image_url.as_deref(),
            ShotField::Audio => self.audio_url.as_deref(),
            ShotField::Video => self.video_url.as_deref(),
            ShotField::Final => self.final_url.as_deref(),
        }
    }

    /// Whether any resource of this shot is currently being worked on.
    pub fn has_work_in_flight(&self) -> bool {
        ShotField::ALL
            .iter()
            .any(|field| self.status(*field) == ResourceStatus::Processing)
    }

    /// A shot can be claimed when it is not finished and nothing is in flight on it.
    pub fn is_eligible(&self) -> bool {
        self.final_status == ResourceStatus::Pending && !self.has_work_in_flight()
    }

    /// Fields that the next claim must move to `processing`.
    ///
    /// Image and audio are independent and are claimed together; video is
    /// claimed only once both of them are completed.
    pub fn stages_to_claim(&self) -> Vec<ShotField> {
        let parallel: Vec<ShotField> = [ShotField::Image, ShotField::Audio]
            .into_iter()
            .filter(|field| self.status(*field) != ResourceStatus::Completed)
            .collect();

        if !parallel.is_empty() {
            return parallel;
        }
        if self.video_status != ResourceStatus::Completed {
            return vec![ShotField::Video];
        }
        Vec::new()
    }

    /// Sort key giving the deterministic processing order across a story.
    pub fn processing_order(&self) -> (u32, u32) {
        (self.scene_order, self.sort_order)
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Aggregate shot completion for a story.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    /// round(100 * completed / total), 0 when there are no shots.
    pub progress: u8,
    pub total_shots: u32,
    pub completed_shots: u32,
}

impl ProgressSnapshot {
    /// Builds a snapshot from raw counts.
    pub fn from_counts(completed_shots: u32, total_shots: u32) -> Self {
        let progress = if total_shots == 0 {
            0
        } else {
            let ratio = f64::from(completed_shots.min(total_shots)) / f64::from(total_shots);
            (ratio * 100.0).round().clamp(0.0, 100.0) as u8
        };

        Self {
            progress,
            total_shots,
            completed_shots,
        }
    }

    /// Whether every shot has reached final completion.
    pub fn all_completed(&self) -> bool {
        self.total_shots > 0 && self.completed_shots >= self.total_shots
    }
}

// ============================================================================
// Drafts (decomposition output)
// ============================================================================

/// Scene produced by decomposition, before it is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SceneDraft {
    pub name: String,
    pub shots: Vec<ShotDraft>,
}

/// Shot produced by decomposition, before it is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShotDraft {
    pub name: String,
    pub script: String,
}

impl SceneDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shots: Vec::new(),
        }
    }

    pub fn with_shot(mut self, name: impl Into<String>, script: impl Into<String>) -> Self {
        self.shots.push(ShotDraft {
            name: name.into(),
            script: script.into(),
        });
        self
    }
}
