//! Story type API handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use storyreel_core::StoryType;

use crate::state::AppState;

/// One available template
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryTypeResponse {
    pub id: String,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: String,
    pub captions_enabled: bool,
}

impl From<StoryType> for StoryTypeResponse {
    fn from(story_type: StoryType) -> Self {
        Self {
            id: story_type.id,
            name: story_type.name,
            width: story_type.width,
            height: story_type.height,
            aspect_ratio: story_type.aspect_ratio,
            captions_enabled: story_type.captions_enabled,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListStoryTypesResponse {
    pub story_types: Vec<StoryTypeResponse>,
}

#[derive(Debug, Serialize)]
pub struct StoryTypeErrorResponse {
    pub error: String,
}

/// List available story types
pub async fn list_story_types(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListStoryTypesResponse>, (StatusCode, Json<StoryTypeErrorResponse>)> {
    match state.story_store().list_story_types() {
        Ok(types) => Ok(Json(ListStoryTypesResponse {
            story_types: types.into_iter().map(StoryTypeResponse::from).collect(),
        })),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StoryTypeErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}
