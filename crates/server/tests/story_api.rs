//! Story API tests against the in-process router with mock generators.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::TestFixture;
use storyreel_core::StoryStore;

fn story_body(name: &str) -> Value {
    json!({
        "name": name,
        "storyTypeId": "portrait",
        "sourceContent": "A lighthouse keeper receives a late letter",
        "sourceType": "prompt"
    })
}

/// Wait for the audit writer to persist at least `min` matching events.
async fn wait_for_events(fixture: &TestFixture, story_id: &str, event_type: &str, min: u64) {
    let path = format!(
        "/api/v1/stories/{}/events?event_type={}",
        story_id, event_type
    );
    for _ in 0..100 {
        let response = fixture.get(&path).await;
        assert_eq!(response.status, StatusCode::OK);
        if response.body["total"].as_u64().unwrap_or(0) >= min {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("audit events for {} were not written", story_id);
}

// ============================================================================
// Health, config, story types
// ============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["generators"]["api_key_configured"], false);
    assert!(response.body["generators"].get("api_key").is_none());
    assert_eq!(response.body["pipeline"]["retry_after_secs"], 2);
}

#[tokio::test]
async fn test_list_story_types() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/story-types").await;

    assert_eq!(response.status, StatusCode::OK);
    let types = response.body["storyTypes"].as_array().unwrap();
    assert_eq!(types.len(), 3);

    let portrait = types.iter().find(|t| t["id"] == "portrait").unwrap();
    assert_eq!(portrait["aspectRatio"], "9:16");
    assert_eq!(portrait["captionsEnabled"], true);
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_create_story() {
    let fixture = TestFixture::new().await;
    let response = fixture.post("/api/v1/stories", story_body("Letter")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["id"].is_string());
    assert_eq!(response.body["status"], "pending");
    assert_eq!(response.body["progress"], 0);
}

#[tokio::test]
async fn test_create_story_defaults_to_prompt_source() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .create_story(json!({
            "name": "Default source",
            "storyTypeId": "square",
            "sourceContent": "Two robots share an umbrella"
        }))
        .await;

    let response = fixture.get(&format!("/api/v1/stories/{}", id)).await;
    assert_eq!(response.body["sourceType"], "prompt");
}

#[tokio::test]
async fn test_create_story_validation_errors() {
    let fixture = TestFixture::new().await;

    let cases = [
        json!({"name": "", "storyTypeId": "portrait", "sourceContent": "x"}),
        json!({"name": "n", "storyTypeId": "portrait", "sourceContent": "   "}),
        json!({"name": "n", "storyTypeId": "cinemascope", "sourceContent": "x"}),
        json!({"name": "n", "storyTypeId": "portrait", "sourceContent": "x", "sourceType": "poem"}),
        json!({"name": "n", "storyTypeId": "portrait"}),
    ];

    for body in cases {
        let response = fixture.post("/api/v1/stories", body.clone()).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert!(response.body["error"].is_string());
    }

    let malformed = fixture.post_raw("/api/v1/stories", "{not json").await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let list = fixture.get("/api/v1/stories").await;
    assert_eq!(list.body["total"], 0);
}

// ============================================================================
// Advancing
// ============================================================================

#[tokio::test]
async fn test_story_runs_to_completion_over_http() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_story(story_body("Full run")).await;

    let last = fixture.advance_until_done(&id).await;
    assert_eq!(last.body["done"], true);
    assert_eq!(last.body["status"], "completed");
    assert_eq!(last.body["progress"], 100);
    assert_eq!(last.body["completedShots"], 4);
    assert_eq!(last.body["totalShots"], 4);
    assert!(last.body.get("retryAfter").is_none());

    let detail = fixture.get(&format!("/api/v1/stories/{}", id)).await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.body["currentStep"], "Done");
    assert_eq!(detail.body["completedShots"], 4);
    assert!(detail.body["captionedVideoUrl"].is_string());
    assert!(detail.body["subtitles"].is_string());
    assert!(detail.body["completedAt"].is_string());

    let scenes = detail.body["scenes"].as_array().unwrap();
    assert_eq!(scenes.len(), 2);
    for scene in scenes {
        assert_eq!(scene["status"], "completed");
        let shots = scene["shots"].as_array().unwrap();
        assert_eq!(shots.len(), 2);
        for shot in shots {
            assert_eq!(shot["finalStatus"], "completed");
            assert!(shot["finalUrl"].is_string());
        }
    }

    assert_eq!(fixture.mocks.video.story_assembly_count().await, 1);
}

#[tokio::test]
async fn test_advance_in_progress_returns_retry_hint() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_story(story_body("Hinted")).await;

    let response = fixture.post_empty(&format!("/api/v1/stories/{}", id)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["done"], false);
    assert!(response.body["retryAfter"].as_u64().unwrap() > 0);
    assert!(response.body["progress"].as_u64().unwrap() < 100);
}

#[tokio::test]
async fn test_completed_story_advance_is_idempotent() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_story(story_body("Again")).await;
    fixture.advance_until_done(&id).await;

    let before = fixture.get(&format!("/api/v1/stories/{}", id)).await;
    let again = fixture.post_empty(&format!("/api/v1/stories/{}", id)).await;
    let after = fixture.get(&format!("/api/v1/stories/{}", id)).await;

    assert_eq!(again.body["done"], true);
    assert_eq!(again.body["status"], "completed");
    assert_eq!(before.body, after.body);
    assert_eq!(fixture.mocks.video.story_assembly_count().await, 1);
}

#[tokio::test]
async fn test_generation_failure_fails_story() {
    let fixture = TestFixture::new().await;
    fixture
        .mocks
        .image
        .fail_always(Some("image backend down"))
        .await;
    let id = fixture.create_story(story_body("Doomed")).await;

    let last = fixture.advance_until_done(&id).await;
    assert_eq!(last.body["status"], "failed");
    assert!(last.body["error"]
        .as_str()
        .unwrap()
        .contains("image backend down"));

    let detail = fixture.get(&format!("/api/v1/stories/{}", id)).await;
    assert_eq!(detail.body["currentStep"], "Failed");
    assert!(detail.body["errorMessage"].is_string());
}

#[tokio::test]
async fn test_missing_story_returns_404() {
    let fixture = TestFixture::new().await;
    let path = "/api/v1/stories/550e8400-e29b-41d4-a716-446655440000";

    assert_eq!(fixture.get(path).await.status, StatusCode::NOT_FOUND);
    assert_eq!(fixture.post_empty(path).await.status, StatusCode::NOT_FOUND);
    assert_eq!(fixture.delete(path).await.status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Listing, deletion, events
// ============================================================================

#[tokio::test]
async fn test_list_stories_with_filters() {
    let fixture = TestFixture::new().await;
    let first = fixture.create_story(story_body("One")).await;
    fixture.create_story(story_body("Two")).await;
    fixture.advance_until_done(&first).await;

    let all = fixture.get("/api/v1/stories").await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["total"], 2);

    let completed = fixture.get("/api/v1/stories?status=completed").await;
    assert_eq!(completed.body["total"], 1);
    assert_eq!(completed.body["stories"][0]["id"], first.as_str());

    let paged = fixture.get("/api/v1/stories?limit=1&offset=1").await;
    assert_eq!(paged.body["stories"].as_array().unwrap().len(), 1);
    assert_eq!(paged.body["total"], 2);

    let bad = fixture.get("/api/v1/stories?status=exploded").await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_story_cascades() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_story(story_body("Short lived")).await;
    fixture.advance_until_done(&id).await;

    let response = fixture.delete(&format!("/api/v1/stories/{}", id)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["deleted"], true);
    assert_eq!(response.body["previousStatus"], "completed");

    assert_eq!(
        fixture.get(&format!("/api/v1/stories/{}", id)).await.status,
        StatusCode::NOT_FOUND
    );
    assert!(fixture.store.get_shots_by_story(&id).unwrap().is_empty());
    assert!(fixture.store.get_scenes_by_story(&id).unwrap().is_empty());

    // the trail outlives the story
    wait_for_events(&fixture, &id, "story_deleted", 1).await;
    let events = fixture
        .get(&format!("/api/v1/stories/{}/events", id))
        .await;
    assert_eq!(events.status, StatusCode::OK);
    assert!(events.body["total"].as_u64().unwrap() > 1);
}

#[tokio::test]
async fn test_story_events_trail() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_story(story_body("Traced")).await;
    fixture.advance_until_done(&id).await;

    // the last status change is written after everything else
    wait_for_events(&fixture, &id, "story_status_changed", 6).await;
    let body = fixture
        .get(&format!("/api/v1/stories/{}/events?limit=1000", id))
        .await
        .body;
    let types: Vec<&str> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["event_type"].as_str())
        .collect();

    assert_eq!(types.first(), Some(&"story_created"));
    assert!(types.contains(&"narrative_written"));
    assert!(types.contains(&"story_assembled"));
    assert_eq!(types.iter().filter(|t| **t == "shot_completed").count(), 4);

    let filtered = fixture
        .get(&format!(
            "/api/v1/stories/{}/events?event_type=story_status_changed",
            id
        ))
        .await;
    assert_eq!(filtered.body["total"], 6);

    let global = fixture
        .get(&format!("/api/v1/audit?story_id={}&limit=1", id))
        .await;
    assert_eq!(global.body["limit"], 1);
    assert!(global.body["total"].as_i64().unwrap() >= 15);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_story(story_body("Measured")).await;
    fixture.advance_until_done(&id).await;

    let (status, text) = fixture.get_text("/api/v1/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("storyreel_stories_by_status"));
    assert!(text.contains("storyreel_http_requests_total"));
    assert!(text.contains("storyreel_advance_calls_total"));
    assert!(text.contains("storyreel_shots_processed_total"));
}
