//! Story progress accounting.

use std::sync::Arc;

use crate::story::{ProgressSnapshot, Story, StoryError, StoryStatus, StoryStore, StoryUpdate};

/// Highest progress a story can show before it is completed.
pub const MAX_PROGRESS_BEFORE_COMPLETION: u8 = 99;

/// Progress value to persist for a snapshot.
///
/// 100 is reserved for completed stories.
pub fn persisted_progress(snapshot: &ProgressSnapshot, status: StoryStatus) -> u8 {
    if status == StoryStatus::Completed {
        100
    } else {
        snapshot.progress.min(MAX_PROGRESS_BEFORE_COMPLETION)
    }
}

/// Recomputes and stores story progress from shot state.
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn StoryStore>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn StoryStore>) -> Self {
        Self { store }
    }

    /// Current snapshot without writing anything.
    pub fn snapshot(&self, story_id: &str) -> Result<ProgressSnapshot, StoryError> {
        self.store.calculate_progress(story_id)
    }

    /// Recalculate progress and persist it on the story.
    ///
    /// The store keeps the maximum of the old and new values, so a stale
    /// snapshot from a slower caller never moves progress backwards. A story
    /// that reached a terminal status in the meantime is left untouched.
    pub fn record(&self, story: &Story) -> Result<(Story, ProgressSnapshot), StoryError> {
        let snapshot = self.store.calculate_progress(&story.id)?;
        let current = self
            .store
            .get_story(&story.id)?
            .ok_or_else(|| StoryError::story_not_found(&story.id))?;
        if current.status.is_terminal() {
            return Ok((current, snapshot));
        }

        let progress = persisted_progress(&snapshot, current.status);
        let updated = self
            .store
            .update_story(&story.id, StoryUpdate::new().with_progress(progress))?;
        Ok((updated, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::{
        CreateStoryRequest, ResourceStatus, SceneDraft, ShotField, ShotUpdate, SqliteStoryStore,
    };

    #[test]
    fn test_cap_before_completion() {
        let full = ProgressSnapshot::from_counts(3, 3);
        assert_eq!(persisted_progress(&full, StoryStatus::GeneratingMedia), 99);
        assert_eq!(persisted_progress(&full, StoryStatus::Completed), 100);

        let partial = ProgressSnapshot::from_counts(1, 3);
        assert_eq!(persisted_progress(&partial, StoryStatus::GeneratingMedia), 33);
    }

    #[test]
    fn test_record_persists_progress() {
        let store = Arc::new(SqliteStoryStore::in_memory().unwrap());
        let story = store
            .create_story(CreateStoryRequest::new("Test", "portrait", "prompt"))
            .unwrap();
        let (_, shots) = store
            .insert_scenes(
                &story.id,
                &[SceneDraft::new("One")
                    .with_shot("a", "first")
                    .with_shot("b", "second")],
            )
            .unwrap();

        store
            .update_shot(
                &shots[0].id,
                ShotUpdate::new().set_status(ShotField::Final, ResourceStatus::Completed),
                None,
            )
            .unwrap();

        let tracker = ProgressTracker::new(store.clone());
        let (updated, snapshot) = tracker.record(&story).unwrap();
        assert_eq!(snapshot.completed_shots, 1);
        assert_eq!(snapshot.total_shots, 2);
        assert_eq!(updated.progress, 50);

        store
            .update_shot(
                &shots[1].id,
                ShotUpdate::new().set_status(ShotField::Final, ResourceStatus::Completed),
                None,
            )
            .unwrap();
        let (updated, snapshot) = tracker.record(&story).unwrap();
        assert!(snapshot.all_completed());
        assert_eq!(updated.progress, 99);
    }

    #[test]
    fn test_record_skips_terminal_story() {
        let store = Arc::new(SqliteStoryStore::in_memory().unwrap());
        let story = store
            .create_story(CreateStoryRequest::new("Test", "portrait", "prompt"))
            .unwrap();
        let (_, shots) = store
            .insert_scenes(&story.id, &[SceneDraft::new("One").with_shot("a", "only")])
            .unwrap();
        store
            .update_shot(
                &shots[0].id,
                ShotUpdate::new().set_status(ShotField::Final, ResourceStatus::Completed),
                None,
            )
            .unwrap();
        let failed = store
            .transition_story(
                &story.id,
                StoryStatus::Pending,
                StoryStatus::Failed,
                StoryUpdate::new().with_error("another caller gave up"),
            )
            .unwrap();

        // The caller still holds the snapshot it read before the failure.
        let tracker = ProgressTracker::new(store.clone());
        let (current, snapshot) = tracker.record(&story).unwrap();
        assert!(snapshot.all_completed());
        assert_eq!(current.status, StoryStatus::Failed);
        assert_eq!(current.progress, 0);
        assert_eq!(current.updated_at, failed.updated_at);
    }
}
