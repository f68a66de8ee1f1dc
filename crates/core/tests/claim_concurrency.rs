//! Concurrency tests for unit claims.
//!
//! Several callers advance the same story at once; every unit of work must
//! run exactly once regardless of how the calls interleave.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use storyreel_core::{
    story::{ResourceStatus, ShotExpectation, ShotField, ShotUpdate},
    testing::{fixtures, MockGenerators},
    PipelineConfig, PipelineController, SqliteStoryStore, StepOutcome, StoryError, StoryStatus,
    StoryStore,
};

fn setup() -> (Arc<SqliteStoryStore>, MockGenerators, Arc<PipelineController>) {
    let store = Arc::new(SqliteStoryStore::in_memory().unwrap());
    let mocks = MockGenerators::new();
    let controller = Arc::new(PipelineController::new(
        store.clone(),
        mocks.generators(),
        PipelineConfig::default(),
    ));
    (store, mocks, controller)
}

fn decomposed(store: &SqliteStoryStore, scenes: usize, shots: usize) -> String {
    let story = store
        .create_story(fixtures::text_story("Concurrent", "square"))
        .unwrap();
    store
        .insert_scenes(&story.id, &fixtures::scenes(scenes, shots))
        .unwrap();
    story.id
}

#[tokio::test]
async fn test_second_caller_sees_busy_shot() {
    let (store, mocks, controller) = setup();
    let story_id = decomposed(&store, 1, 1);
    mocks.image.set_delay(Duration::from_millis(50)).await;

    let (a, b) = tokio::join!(controller.advance(&story_id), controller.advance(&story_id));
    let outcomes = [a.unwrap().outcome, b.unwrap().outcome];

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == StepOutcome::ShotCompleted)
            .count(),
        1
    );
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, StepOutcome::Busy | StepOutcome::ClaimLost)));
    assert_eq!(mocks.image.call_count().await, 1);
    assert_eq!(mocks.audio.call_count().await, 1);
}

#[tokio::test]
async fn test_parallel_callers_split_shots() {
    let (store, mocks, controller) = setup();
    let story_id = decomposed(&store, 2, 2);
    mocks.audio.set_delay(Duration::from_millis(20)).await;

    let calls = (0..4).map(|_| {
        let controller = controller.clone();
        let story_id = story_id.clone();
        tokio::spawn(async move { controller.advance(&story_id).await })
    });
    let results = join_all(calls).await;

    let completed = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(|step| step.outcome == StepOutcome::ShotCompleted)
        .count();
    assert!(completed >= 1);

    // Each shot's media was requested at most once.
    let requests = mocks.image.recorded_requests().await;
    let unique: HashSet<_> = requests.iter().map(|r| r.shot_id.clone()).collect();
    assert_eq!(unique.len(), requests.len());
}

#[tokio::test]
async fn test_many_callers_finish_story_without_duplicates() {
    let (store, mocks, controller) = setup();
    let story_id = decomposed(&store, 2, 3);

    for _ in 0..20 {
        let calls = (0..3).map(|_| controller.advance(&story_id));
        let steps = join_all(calls).await;
        if steps.into_iter().any(|step| step.unwrap().done) {
            break;
        }
    }

    let story = store.get_story(&story_id).unwrap().unwrap();
    assert_eq!(story.status, StoryStatus::Completed);
    assert_eq!(mocks.image.call_count().await, 6);
    assert_eq!(mocks.audio.call_count().await, 6);
    assert_eq!(mocks.video.composed_count().await, 6);
    assert_eq!(mocks.video.story_assembly_count().await, 1);
    assert_eq!(mocks.video.caption_count().await, 0);
}

#[test]
fn test_conditional_shot_write_rejects_stale_snapshot() {
    let store = SqliteStoryStore::in_memory().unwrap();
    let story_id = decomposed(&store, 1, 1);
    let shot = store.get_shots_by_story(&story_id).unwrap().remove(0);
    let expected = ShotExpectation::matching(&shot);

    let claim = ShotUpdate::new().set_status(ShotField::Image, ResourceStatus::Processing);
    let first = store.update_shot(&shot.id, claim.clone(), Some(&expected));
    let second = store.update_shot(&shot.id, claim, Some(&expected));

    tokio_test::assert_ok!(first);
    assert!(matches!(second, Err(StoryError::Conflict { .. })));
}
