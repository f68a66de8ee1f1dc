use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storyreel_core::{AuditFilter, AuditRecord, AuditStore};

use crate::state::AppState;

/// Maximum allowed limit for audit queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for audit queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for audit endpoint
#[derive(Debug, Default, Deserialize)]
pub struct AuditQueryParams {
    /// Filter by story ID
    pub story_id: Option<String>,
    /// Filter by shot ID
    pub shot_id: Option<String>,
    /// Filter by event type
    pub event_type: Option<String>,
    /// Filter events after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Filter events before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of events to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

impl AuditQueryParams {
    /// Filter without pagination, shared by the query and the count.
    fn base_filter(&self) -> AuditFilter {
        let mut filter = AuditFilter::new();

        if let Some(ref story_id) = self.story_id {
            filter = filter.with_story_id(story_id);
        }
        if let Some(ref shot_id) = self.shot_id {
            filter = filter.with_shot_id(shot_id);
        }
        if let Some(ref event_type) = self.event_type {
            filter = filter.with_event_type(event_type);
        }
        if self.from.is_some() || self.to.is_some() {
            filter = filter.with_time_range(self.from, self.to);
        }

        filter
    }
}

/// Response for audit query endpoint
#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    /// List of audit events
    pub events: Vec<AuditRecord>,
    /// Total number of matching events
    pub total: i64,
    /// Limit used for this query
    pub limit: i64,
    /// Offset used for this query
    pub offset: i64,
}

/// Error response for audit queries
#[derive(Debug, Serialize)]
pub struct AuditErrorResponse {
    pub error: String,
}

/// Run an audit query with pagination.
pub(crate) fn run_query(
    store: &dyn AuditStore,
    params: &AuditQueryParams,
) -> Result<AuditQueryResponse, (StatusCode, Json<AuditErrorResponse>)> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let base_filter = params.base_filter();
    let query_filter = AuditFilter {
        limit,
        offset,
        ..base_filter.clone()
    };

    let events = store.query(&query_filter).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AuditErrorResponse {
                error: format!("Failed to query audit events: {}", e),
            }),
        )
    })?;

    let total = store.count(&base_filter).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AuditErrorResponse {
                error: format!("Failed to count audit events: {}", e),
            }),
        )
    })?;

    Ok(AuditQueryResponse {
        events,
        total,
        limit,
        offset,
    })
}

/// Query audit events
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, (StatusCode, Json<AuditErrorResponse>)> {
    run_query(state.audit_store(), &params).map(Json)
}
