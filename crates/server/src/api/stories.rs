//! Story API handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use storyreel_core::{
    AuditEvent, CreateStoryRequest, PipelineError, ResourceStatus, Scene, Shot, SourceType,
    StepResult, Story, StoryError, StoryFilter, StoryStatus,
};

use super::audit::{run_query, AuditErrorResponse, AuditQueryParams, AuditQueryResponse};
use crate::metrics::{STORIES_CREATED_TOTAL, STORIES_DELETED_TOTAL};
use crate::state::AppState;

/// Maximum allowed limit for story queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for story queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a story
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoryBody {
    pub name: String,
    pub story_type_id: String,
    pub source_content: String,
    /// `prompt` (default) or `text`
    pub source_type: Option<String>,
}

/// Query parameters for listing stories
#[derive(Debug, Deserialize)]
pub struct ListStoriesParams {
    /// Filter by status
    pub status: Option<String>,
    /// Maximum number of stories to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Query parameters for a story's audit trail
#[derive(Debug, Deserialize)]
pub struct StoryEventsParams {
    pub event_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for story creation
#[derive(Debug, Serialize)]
pub struct CreatedStoryResponse {
    pub id: String,
    pub status: StoryStatus,
    pub progress: u8,
}

/// Story summary in listings
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorySummary {
    pub id: String,
    pub name: String,
    pub story_type_id: String,
    pub status: StoryStatus,
    pub current_step: String,
    pub progress: u8,
    pub total_shots: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Story> for StorySummary {
    fn from(story: Story) -> Self {
        Self {
            current_step: story.status.current_step().to_string(),
            id: story.id,
            name: story.name,
            story_type_id: story.story_type_id,
            status: story.status,
            progress: story.progress,
            total_shots: story.total_shots,
            created_at: story.created_at.to_rfc3339(),
            updated_at: story.updated_at.to_rfc3339(),
        }
    }
}

/// Response for listing stories
#[derive(Debug, Serialize)]
pub struct ListStoriesResponse {
    pub stories: Vec<StorySummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Per-shot breakdown
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotResponse {
    pub id: String,
    pub name: String,
    pub script: String,
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
}

impl From<Shot> for ShotResponse {
    fn from(shot: Shot) -> Self {
        Self {
            id: shot.id,
            name: shot.name,
            script: shot.script,
            sort_order: shot.sort_order,
            image_status: shot.image_status,
            audio_status: shot.audio_status,
            video_status: shot.video_status,
            final_status: shot.final_status,
            image_url: shot.image_url,
            audio_url: shot.audio_url,
            video_url: shot.video_url,
            final_url: shot.final_url,
            error_message: shot.error_message,
        }
    }
}

/// Per-scene breakdown with its shots
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneResponse {
    pub id: String,
    pub name: String,
    pub sort_order: u32,
    pub status: ResourceStatus,
    pub video_url: Option<String>,
    pub shots: Vec<ShotResponse>,
}

/// Full story state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryDetailResponse {
    pub id: String,
    pub name: String,
    pub story_type_id: String,
    pub source_type: SourceType,
    pub source_content: String,
    pub status: StoryStatus,
    pub current_step: String,
    pub progress: u8,
    pub narrative: Option<String>,
    pub total_scenes: u32,
    pub total_shots: u32,
    pub completed_shots: u32,
    pub final_video_url: Option<String>,
    pub captioned_video_url: Option<String>,
    pub subtitles: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub scenes: Vec<SceneResponse>,
}

impl StoryDetailResponse {
    fn build(story: Story, scenes: Vec<Scene>, shots: Vec<Shot>) -> Self {
        let completed_shots = shots
            .iter()
            .filter(|shot| shot.final_status == ResourceStatus::Completed)
            .count() as u32;

        let mut shots = shots;
        let scenes = scenes
            .into_iter()
            .map(|scene| {
                let (own, rest): (Vec<Shot>, Vec<Shot>) = std::mem::take(&mut shots)
                    .into_iter()
                    .partition(|shot| shot.scene_id == scene.id);
                shots = rest;
                SceneResponse {
                    id: scene.id,
                    name: scene.name,
                    sort_order: scene.sort_order,
                    status: scene.status,
                    video_url: scene.video_url,
                    shots: own.into_iter().map(ShotResponse::from).collect(),
                }
            })
            .collect();

        Self {
            current_step: story.status.current_step().to_string(),
            id: story.id,
            name: story.name,
            story_type_id: story.story_type_id,
            source_type: story.source_type,
            source_content: story.source_content,
            status: story.status,
            progress: story.progress,
            narrative: story.narrative,
            total_scenes: story.total_scenes,
            total_shots: story.total_shots,
            completed_shots,
            final_video_url: story.final_video_url,
            captioned_video_url: story.captioned_video_url,
            subtitles: story.subtitles,
            error_message: story.error_message,
            created_at: story.created_at.to_rfc3339(),
            updated_at: story.updated_at.to_rfc3339(),
            completed_at: story.completed_at.map(|at| at.to_rfc3339()),
            scenes,
        }
    }
}

/// Result of one advance call
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResponse {
    pub done: bool,
    pub status: StoryStatus,
    pub progress: u8,
    pub completed_shots: u32,
    pub total_shots: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<StepResult> for AdvanceResponse {
    fn from(step: StepResult) -> Self {
        Self {
            done: step.done,
            status: step.status,
            progress: step.progress,
            completed_shots: step.completed_shots,
            total_shots: step.total_shots,
            retry_after: step.retry_after_secs,
            message: step.message,
            error: step.error,
        }
    }
}

/// Response for story deletion
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedStoryResponse {
    pub id: String,
    pub deleted: bool,
    pub previous_status: StoryStatus,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct StoryErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<StoryErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(StoryErrorResponse {
            error: error.into(),
        }),
    )
}

fn store_error(e: StoryError) -> ApiError {
    match e {
        StoryError::NotFound { .. } => api_error(StatusCode::NOT_FOUND, e.to_string()),
        StoryError::Validation(_) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        StoryError::Conflict { .. } | StoryError::InvalidTransition { .. } => {
            api_error(StatusCode::CONFLICT, e.to_string())
        }
        _ => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn story_not_found(id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("Story not found: {}", id))
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a story and kick off its first unit of work
pub async fn create_story(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateStoryBody>, JsonRejection>,
) -> Result<Json<CreatedStoryResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;

    let source_type = match body.source_type.as_deref() {
        None => SourceType::Prompt,
        Some(raw) => {
            SourceType::from_str(raw).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?
        }
    };

    let request = CreateStoryRequest::new(body.name, body.story_type_id, body.source_content)
        .with_source_type(source_type);

    let story = state.story_store().create_story(request).map_err(store_error)?;

    STORIES_CREATED_TOTAL.inc();
    state.audit().try_emit(AuditEvent::StoryCreated {
        story_id: story.id.clone(),
        name: story.name.clone(),
        story_type_id: story.story_type_id.clone(),
        source_type: story.source_type.as_str().to_string(),
    });
    info!(story_id = %story.id, story_type = %story.story_type_id, "Story created");

    // Fire-and-forget first advance; clients continue by polling.
    let controller = state.controller();
    let story_id = story.id.clone();
    tokio::spawn(async move {
        if let Err(e) = controller.advance(&story_id).await {
            warn!(story_id = %story_id, error = %e, "Initial advance failed");
        }
    });

    Ok(Json(CreatedStoryResponse {
        id: story.id,
        status: story.status,
        progress: story.progress,
    }))
}

/// List stories with optional status filter
pub async fn list_stories(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListStoriesParams>,
) -> Result<Json<ListStoriesResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = StoryFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref status) = params.status {
        let status =
            StoryStatus::from_str(status).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
        filter = filter.with_status(status);
    }

    let stories = state.story_store().list_stories(&filter).map_err(store_error)?;

    let count_filter = StoryFilter {
        limit: i64::MAX,
        offset: 0,
        ..filter.clone()
    };
    let total = state
        .story_store()
        .count_stories(&count_filter)
        .map_err(store_error)?;

    Ok(Json(ListStoriesResponse {
        stories: stories.into_iter().map(StorySummary::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Get a story with its scene and shot breakdown
pub async fn get_story(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StoryDetailResponse>, ApiError> {
    let store = state.story_store();

    let story = store
        .get_story(&id)
        .map_err(store_error)?
        .ok_or_else(|| story_not_found(&id))?;
    let scenes = store.get_scenes_by_story(&id).map_err(store_error)?;
    let shots = store.get_shots_by_story(&id).map_err(store_error)?;

    Ok(Json(StoryDetailResponse::build(story, scenes, shots)))
}

/// Advance a story by one unit of work
pub async fn advance_story(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AdvanceResponse>, ApiError> {
    match state.controller().advance(&id).await {
        Ok(step) => Ok(Json(AdvanceResponse::from(step))),
        Err(PipelineError::NotFound(_)) => Err(story_not_found(&id)),
        Err(PipelineError::Store(e)) => Err(store_error(e)),
        Err(e @ PipelineError::Conflict { .. }) => {
            Err(api_error(StatusCode::CONFLICT, e.to_string()))
        }
        Err(e @ PipelineError::Validation(_)) => {
            Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
        }
        Err(e) => {
            warn!(story_id = %id, error = %e, "Advance failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Delete a story with its scenes and shots
pub async fn delete_story(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeletedStoryResponse>, ApiError> {
    let story = state.story_store().delete_story(&id).map_err(|e| match e {
        StoryError::NotFound { .. } => story_not_found(&id),
        other => store_error(other),
    })?;

    STORIES_DELETED_TOTAL.inc();
    state.audit().try_emit(AuditEvent::StoryDeleted {
        story_id: story.id.clone(),
        previous_status: story.status.as_str().to_string(),
    });
    info!(story_id = %story.id, status = %story.status, "Story deleted");

    Ok(Json(DeletedStoryResponse {
        id: story.id,
        deleted: true,
        previous_status: story.status,
    }))
}

/// Audit trail of one story
///
/// Records outlive the story, so a deleted story still has its trail.
pub async fn story_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<StoryEventsParams>,
) -> Result<Json<AuditQueryResponse>, (StatusCode, Json<AuditErrorResponse>)> {
    let params = AuditQueryParams {
        story_id: Some(id),
        event_type: params.event_type,
        limit: params.limit,
        offset: params.offset,
        ..Default::default()
    };
    run_query(state.audit_store(), &params).map(Json)
}
