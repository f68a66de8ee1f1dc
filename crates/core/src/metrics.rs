//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Shot processing (claims, stages, outcomes)
//! - Story lifecycle (preparation, finalization, terminal states)
//! - Recovery (stale work reset)
//! - Generation service calls

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Pipeline - Advance Metrics
// =============================================================================

/// Advance calls by outcome.
pub static ADVANCE_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("storyreel_advance_calls_total", "Total pipeline advance calls"),
        &["outcome"], // "prepared", "shot_completed", "claim_lost", "busy", "finalized", ...
    )
    .unwrap()
});

/// Conditional updates lost to another caller.
pub static CLAIM_CONFLICTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "storyreel_claim_conflicts_total",
            "Total claims lost to a concurrent caller",
        ),
        &["unit"], // "shot", "preparation", "finalization"
    )
    .unwrap()
});

// =============================================================================
// Pipeline - Shot Metrics
// =============================================================================

/// Shots processed by result.
pub static SHOTS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("storyreel_shots_processed_total", "Total shots processed"),
        &["result"], // "completed", "failed", "lost"
    )
    .unwrap()
});

/// Duration of one shot processing unit.
pub static SHOT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "storyreel_shot_duration_seconds",
            "Duration of shot processing",
        )
        .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["result"],
    )
    .unwrap()
});

/// Duration of individual shot stages.
pub static SHOT_STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "storyreel_shot_stage_duration_seconds",
            "Duration of image, audio and video stages",
        )
        .buckets(vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["stage", "result"], // stage: "image", "audio", "video"
    )
    .unwrap()
});

// =============================================================================
// Pipeline - Story Metrics
// =============================================================================

/// Preparations by result.
pub static PREPARATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "storyreel_preparations_total",
            "Total narrative and decomposition runs",
        ),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Finalizations by result.
pub static FINALIZATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("storyreel_finalizations_total", "Total story finalizations"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Finalization duration in seconds.
pub static FINALIZATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "storyreel_finalization_duration_seconds",
            "Duration of scene assembly, story assembly and captioning",
        )
        .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
        &["result"],
    )
    .unwrap()
});

/// Stories completed total.
pub static STORIES_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "storyreel_stories_completed_total",
        "Total stories completed successfully",
    )
    .unwrap()
});

/// Stories failed total, by the status they failed from.
pub static STORIES_FAILED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("storyreel_stories_failed_total", "Total stories failed"),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// Recovery Metrics
// =============================================================================

/// Shot fields reset from processing back to pending.
pub static STALE_SHOT_FIELDS_RESET: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "storyreel_stale_shot_fields_reset_total",
        "Total abandoned shot fields reset to pending",
    )
    .unwrap()
});

/// Stories failed because a claimed unit stalled.
pub static STALLED_STORIES_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "storyreel_stalled_stories_failed_total",
        "Total stories failed after a stalled unit of work",
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// Generation service request duration.
pub static GENERATOR_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "storyreel_generator_request_duration_seconds",
            "Duration of generation service calls",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["operation"],
    )
    .unwrap()
});

/// Generation service requests total.
pub static GENERATOR_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "storyreel_generator_requests_total",
            "Total generation service requests",
        ),
        &["operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Advance
        Box::new(ADVANCE_CALLS.clone()),
        Box::new(CLAIM_CONFLICTS.clone()),
        // Shots
        Box::new(SHOTS_PROCESSED.clone()),
        Box::new(SHOT_DURATION.clone()),
        Box::new(SHOT_STAGE_DURATION.clone()),
        // Stories
        Box::new(PREPARATIONS_TOTAL.clone()),
        Box::new(FINALIZATIONS_TOTAL.clone()),
        Box::new(FINALIZATION_DURATION.clone()),
        Box::new(STORIES_COMPLETED.clone()),
        Box::new(STORIES_FAILED.clone()),
        // Recovery
        Box::new(STALE_SHOT_FIELDS_RESET.clone()),
        Box::new(STALLED_STORIES_FAILED.clone()),
        // External services
        Box::new(GENERATOR_REQUEST_DURATION.clone()),
        Box::new(GENERATOR_REQUESTS.clone()),
    ]
}
