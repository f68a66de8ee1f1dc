//! Pipeline controller: advances a story by one unit of work per call.
//!
//! Each call re-reads the story and decides what to do:
//! - terminal stories are reported as-is
//! - pending stories are prepared (narrative and decomposition)
//! - stories generating media get exactly one shot processed
//! - fully generated stories are finalized
//!
//! Callers (the HTTP endpoint, the background driver, polling clients) are
//! expected to call again after `retry_after_secs`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::generator::Generators;
use crate::metrics;
use crate::story::{
    ResourceStatus, Shot, Story, StoryStatus, StoryStore, StoryType, StoryUpdate,
};

use super::config::PipelineConfig;
use super::finalizer::{Finalization, StoryFinalizer};
use super::lifecycle::Lifecycle;
use super::preparation::{Preparation, StoryPreparer};
use super::progress::ProgressTracker;
use super::shot_processor::{ShotProcessor, ShotRun};
use super::types::{PipelineError, StepOutcome, StepResult};

/// Entry point for advancing stories.
pub struct PipelineController {
    store: Arc<dyn StoryStore>,
    generators: Generators,
    config: PipelineConfig,
    audit: Option<AuditHandle>,
}

impl PipelineController {
    pub fn new(
        store: Arc<dyn StoryStore>,
        generators: Generators,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            generators,
            config,
            audit: None,
        }
    }

    /// Emit audit events through `audit`.
    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Advance the story by at most one unit of work.
    pub async fn advance(&self, story_id: &str) -> Result<StepResult, PipelineError> {
        let story = self
            .store
            .get_story(story_id)?
            .ok_or_else(|| PipelineError::NotFound(story_id.to_string()))?;

        let result = match story.status {
            StoryStatus::Completed | StoryStatus::Failed => self.terminal(&story),
            StoryStatus::Pending => self.advance_pending(story).await,
            StoryStatus::GeneratingMedia => self.advance_media(story).await,
            StoryStatus::GeneratingStory
            | StoryStatus::GeneratingScenes
            | StoryStatus::BuildingVideo
            | StoryStatus::AddingCaptions => self.unit_in_progress(&story),
        }?;

        metrics::ADVANCE_CALLS
            .with_label_values(&[result.outcome.as_str()])
            .inc();
        debug!(
            story_id = %story_id,
            status = %result.status,
            outcome = result.outcome.as_str(),
            progress = result.progress,
            "Advanced story"
        );

        Ok(result)
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.store.clone(), self.audit.clone())
    }

    fn progress(&self) -> ProgressTracker {
        ProgressTracker::new(self.store.clone())
    }

    fn story_type(&self, story: &Story) -> Result<StoryType, PipelineError> {
        self.store
            .get_story_type(&story.story_type_id)?
            .ok_or_else(|| {
                PipelineError::Validation(format!("unknown story type: {}", story.story_type_id))
            })
    }

    fn result(&self, story: &Story, outcome: StepOutcome) -> Result<StepResult, PipelineError> {
        let snapshot = self.progress().snapshot(&story.id)?;
        Ok(StepResult::new(story, snapshot, outcome))
    }

    fn terminal(&self, story: &Story) -> Result<StepResult, PipelineError> {
        let message = match story.status {
            StoryStatus::Completed => "Story is complete",
            _ => "Story has failed",
        };
        Ok(self
            .result(story, StepOutcome::Terminal)?
            .with_message(message))
    }

    fn unit_in_progress(&self, story: &Story) -> Result<StepResult, PipelineError> {
        Ok(self
            .result(story, StepOutcome::Busy)?
            .with_retry_after(self.config.busy_retry_after_secs)
            .with_message(format!("{}, retry later", story.status.current_step())))
    }

    async fn advance_pending(&self, story: Story) -> Result<StepResult, PipelineError> {
        let shots = self.store.get_shots_by_story(&story.id)?;

        if !shots.is_empty() {
            // Created with its shots already decomposed.
            return match self
                .lifecycle()
                .transition(
                    &story.id,
                    StoryStatus::Pending,
                    StoryStatus::GeneratingMedia,
                    StoryUpdate::new(),
                )
                .await
            {
                Ok(story) => self.advance_media(story).await,
                Err(e) if e.is_conflict() => self.claim_lost(&story),
                Err(e) => Err(PipelineError::from_store(e)),
            };
        }

        let story_type = self.story_type(&story)?;
        let preparer = StoryPreparer::new(
            self.store.clone(),
            self.generators.clone(),
            self.lifecycle(),
            self.audit.clone(),
        );

        match preparer.prepare(&story, &story_type).await? {
            Preparation::Prepared {
                story, shot_count, ..
            } => Ok(self
                .result(&story, StepOutcome::Prepared)?
                .with_retry_after(self.config.retry_after_secs)
                .with_message(format!("Story prepared with {} shots", shot_count))),
            Preparation::ClaimLost => self.claim_lost(&story),
            Preparation::Failed { story: failed, error } => {
                self.failed(failed.as_ref().unwrap_or(&story), error)
            }
        }
    }

    async fn advance_media(&self, story: Story) -> Result<StepResult, PipelineError> {
        let shots = self.store.get_shots_by_story(&story.id)?;

        if shots.is_empty() {
            return self.fail_story(&story, "story has no shots".to_string()).await;
        }

        let failed: Vec<&Shot> = shots
            .iter()
            .filter(|shot| shot.final_status == ResourceStatus::Failed)
            .collect();
        if !failed.is_empty() {
            return self.fail_story(&story, failed_shots_message(&failed)).await;
        }

        let story_type = self.story_type(&story)?;

        if shots.iter().any(Shot::is_eligible) {
            let processor =
                ShotProcessor::new(self.store.clone(), self.generators.clone(), self.audit.clone());
            return match processor.process_next(&story_type, &shots).await? {
                Some(ShotRun::Completed(shot)) => self.shot_completed(&story, &shot).await,
                Some(ShotRun::Failed { shot, error }) => {
                    let message = format!("shot {} failed: {}", shot.name, error);
                    self.fail_story(&story, message).await
                }
                Some(ShotRun::ClaimLost { .. }) | None => self.claim_lost(&story),
            };
        }

        if shots.iter().any(Shot::has_work_in_flight) {
            return Ok(self
                .result(&story, StepOutcome::Busy)?
                .with_retry_after(self.config.busy_retry_after_secs)
                .with_message("Shots are being generated, retry later"));
        }

        if shots
            .iter()
            .all(|shot| shot.final_status == ResourceStatus::Completed)
        {
            return self.finalize(&story, &story_type).await;
        }

        // Not reachable with the statuses above; answer like a busy story.
        warn!(story_id = %story.id, "No claimable shot and nothing in flight");
        Ok(self
            .result(&story, StepOutcome::Busy)?
            .with_retry_after(self.config.busy_retry_after_secs))
    }

    async fn shot_completed(&self, story: &Story, shot: &Shot) -> Result<StepResult, PipelineError> {
        let (story, snapshot) = self.progress().record(story)?;

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::ShotCompleted {
                    story_id: story.id.clone(),
                    shot_id: shot.id.clone(),
                    progress: story.progress,
                })
                .await;
        }
        info!(
            story_id = %story.id,
            shot = %shot.name,
            completed = snapshot.completed_shots,
            total = snapshot.total_shots,
            "Shot completed"
        );

        Ok(StepResult::new(&story, snapshot, StepOutcome::ShotCompleted)
            .with_retry_after(self.config.retry_after_secs)
            .with_message(format!(
                "Completed shot {} ({}/{})",
                shot.name, snapshot.completed_shots, snapshot.total_shots
            )))
    }

    async fn finalize(&self, story: &Story, story_type: &StoryType) -> Result<StepResult, PipelineError> {
        let finalizer = StoryFinalizer::new(
            self.store.clone(),
            self.generators.clone(),
            self.lifecycle(),
            self.audit.clone(),
        );

        match finalizer.finalize(story, story_type).await? {
            Finalization::Completed(story) => Ok(self
                .result(&story, StepOutcome::Finalized)?
                .with_message("Story completed")),
            Finalization::ClaimLost => self.claim_lost(story),
            Finalization::Failed { story: failed, error } => {
                self.failed(failed.as_ref().unwrap_or(story), error)
            }
        }
    }

    /// Mark the story failed from generating_media.
    async fn fail_story(&self, story: &Story, message: String) -> Result<StepResult, PipelineError> {
        match self.lifecycle().fail(&story.id, story.status, &message).await? {
            Some(failed) => self.failed(&failed, message),
            // Someone else moved the story on; report what it is now.
            None => {
                let current = self
                    .store
                    .get_story(&story.id)?
                    .ok_or_else(|| PipelineError::NotFound(story.id.clone()))?;
                if current.status.is_terminal() {
                    self.terminal(&current)
                } else {
                    self.claim_lost(&current)
                }
            }
        }
    }

    fn failed(&self, story: &Story, error: String) -> Result<StepResult, PipelineError> {
        Ok(self.result(story, StepOutcome::Failed)?.with_error(error))
    }

    fn claim_lost(&self, story: &Story) -> Result<StepResult, PipelineError> {
        Ok(self
            .result(story, StepOutcome::ClaimLost)?
            .with_retry_after(self.config.busy_retry_after_secs)
            .with_message("Claimed by another caller, retry"))
    }
}

/// Aggregate error for a story whose shots failed.
fn failed_shots_message(failed: &[&Shot]) -> String {
    let details = failed
        .iter()
        .map(|shot| {
            format!(
                "{}: {}",
                shot.name,
                shot.error_message.as_deref().unwrap_or("unknown error")
            )
        })
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} shot(s) failed: {}", failed.len(), details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorError;
    use crate::story::{ShotField, ShotUpdate, SqliteStoryStore};
    use crate::testing::{fixtures, MockGenerators};

    fn setup() -> (Arc<SqliteStoryStore>, MockGenerators, PipelineController) {
        let store = Arc::new(SqliteStoryStore::in_memory().unwrap());
        let mocks = MockGenerators::new();
        let controller =
            PipelineController::new(store.clone(), mocks.generators(), PipelineConfig::default());
        (store, mocks, controller)
    }

    #[tokio::test]
    async fn test_advance_missing_story() {
        let (_, _, controller) = setup();
        let err = controller.advance("nope").await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_prompt_story_runs_to_completion() {
        let (store, mocks, controller) = setup();
        let story = store.create_story(fixtures::prompt_story("Letter")).unwrap();

        let first = controller.advance(&story.id).await.unwrap();
        assert_eq!(first.outcome, StepOutcome::Prepared);
        assert_eq!(first.status, StoryStatus::GeneratingMedia);
        assert_eq!(first.total_shots, 4);
        assert_eq!(first.retry_after_secs, Some(2));

        let mut last_progress = first.progress;
        for _ in 0..4 {
            let step = controller.advance(&story.id).await.unwrap();
            assert_eq!(step.outcome, StepOutcome::ShotCompleted);
            assert!(step.progress >= last_progress);
            assert!(step.progress < 100);
            last_progress = step.progress;
        }

        let last = controller.advance(&story.id).await.unwrap();
        assert_eq!(last.outcome, StepOutcome::Finalized);
        assert_eq!(last.status, StoryStatus::Completed);
        assert_eq!(last.progress, 100);
        assert!(last.done);
        assert!(last.retry_after_secs.is_none());
        assert_eq!(mocks.video.story_assembly_count().await, 1);
    }

    #[tokio::test]
    async fn test_terminal_story_is_idempotent() {
        let (store, mocks, controller) = setup();
        let story = store.create_story(fixtures::prompt_story("Done")).unwrap();
        for _ in 0..6 {
            controller.advance(&story.id).await.unwrap();
        }

        let before = store.get_story(&story.id).unwrap().unwrap();
        let again = controller.advance(&story.id).await.unwrap();
        let after = store.get_story(&story.id).unwrap().unwrap();

        assert_eq!(again.outcome, StepOutcome::Terminal);
        assert!(again.done);
        assert_eq!(before, after);
        assert_eq!(mocks.video.story_assembly_count().await, 1);
    }

    #[tokio::test]
    async fn test_shot_failure_poisons_story() {
        let (store, mocks, controller) = setup();
        let story = store.create_story(fixtures::prompt_story("Broken")).unwrap();
        controller.advance(&story.id).await.unwrap();

        mocks
            .audio
            .fail_next(GeneratorError::rejected("voice unavailable"))
            .await;
        let step = controller.advance(&story.id).await.unwrap();

        assert_eq!(step.outcome, StepOutcome::Failed);
        assert_eq!(step.status, StoryStatus::Failed);
        assert!(step.done);
        assert!(step.error.unwrap().contains("voice unavailable"));

        let images_before = mocks.image.call_count().await;
        let again = controller.advance(&story.id).await.unwrap();
        assert_eq!(again.outcome, StepOutcome::Terminal);
        assert_eq!(mocks.image.call_count().await, images_before);
    }

    #[tokio::test]
    async fn test_existing_failed_shot_fails_story_with_aggregate_message() {
        let (store, _, controller) = setup();
        let story = store.create_story(fixtures::prompt_story("Poisoned")).unwrap();
        let (_, shots) = store
            .insert_scenes(&story.id, &fixtures::scenes(1, 3))
            .unwrap();
        store
            .transition_story(
                &story.id,
                StoryStatus::Pending,
                StoryStatus::GeneratingMedia,
                StoryUpdate::new(),
            )
            .unwrap();
        store
            .update_shot(
                &shots[1].id,
                ShotUpdate::new()
                    .set_status(ShotField::Final, ResourceStatus::Failed)
                    .with_error("render timeout"),
                None,
            )
            .unwrap();

        let step = controller.advance(&story.id).await.unwrap();
        assert_eq!(step.status, StoryStatus::Failed);
        let error = step.error.unwrap();
        assert!(error.starts_with("1 shot(s) failed"));
        assert!(error.contains("render timeout"));
    }

    #[tokio::test]
    async fn test_busy_when_work_in_flight() {
        let (store, mocks, controller) = setup();
        let story = store.create_story(fixtures::prompt_story("Busy")).unwrap();
        let (_, shots) = store
            .insert_scenes(&story.id, &fixtures::scenes(1, 1))
            .unwrap();
        store
            .transition_story(
                &story.id,
                StoryStatus::Pending,
                StoryStatus::GeneratingMedia,
                StoryUpdate::new(),
            )
            .unwrap();
        store
            .update_shot(
                &shots[0].id,
                ShotUpdate::new().set_status(ShotField::Image, ResourceStatus::Processing),
                None,
            )
            .unwrap();

        let before = store.get_shots_by_story(&story.id).unwrap();
        let step = controller.advance(&story.id).await.unwrap();
        let after = store.get_shots_by_story(&story.id).unwrap();

        assert_eq!(step.outcome, StepOutcome::Busy);
        assert_eq!(step.retry_after_secs, Some(5));
        assert_eq!(before, after);
        assert_eq!(mocks.image.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_claimed_unit_returns_retry_hint() {
        let (store, _, controller) = setup();
        let story = store.create_story(fixtures::prompt_story("Owned")).unwrap();
        store
            .transition_story(
                &story.id,
                StoryStatus::Pending,
                StoryStatus::GeneratingStory,
                StoryUpdate::new(),
            )
            .unwrap();

        let step = controller.advance(&story.id).await.unwrap();
        assert_eq!(step.outcome, StepOutcome::Busy);
        assert!(!step.done);
        assert_eq!(step.retry_after_secs, Some(5));
        assert!(step.message.unwrap().contains("Writing the story"));
    }

    #[test]
    fn test_failed_shots_message() {
        let shot = |name: &str, error: Option<&str>| Shot {
            id: name.to_string(),
            story_id: "s".to_string(),
            scene_id: "sc".to_string(),
            name: name.to_string(),
            script: String::new(),
            scene_order: 0,
            sort_order: 0,
            image_status: ResourceStatus::Failed,
            audio_status: ResourceStatus::Completed,
            video_status: ResourceStatus::Pending,
            final_status: ResourceStatus::Failed,
            image_url: None,
            audio_url: None,
            video_url: None,
            final_url: None,
            error_message: error.map(str::to_string),
            updated_at: chrono::Utc::now(),
        };
        let a = shot("A", Some("nsfw"));
        let b = shot("B", None);
        assert_eq!(
            failed_shots_message(&[&a, &b]),
            "2 shot(s) failed: A: nsfw; B: unknown error"
        );
    }
}
