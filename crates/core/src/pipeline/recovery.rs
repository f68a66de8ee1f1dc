//! Recovery of abandoned work.
//!
//! A caller that crashes or times out in the middle of a unit leaves shot
//! fields stuck in `processing` or the story stuck in a claimed status. The
//! sweeper periodically returns stale shot fields to `pending` so they can be
//! claimed again, and fails stories whose claimed unit stopped moving.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::story::{StoryError, StoryStore};

use super::config::RecoveryConfig;
use super::lifecycle::Lifecycle;

/// What a single sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Shots with at least one field returned to `pending`.
    pub shots_reset: usize,
    /// Total shot fields returned to `pending`.
    pub fields_reset: usize,
    /// Stories failed because their claimed unit stalled.
    pub stories_failed: usize,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.shots_reset == 0 && self.stories_failed == 0
    }
}

/// Periodic sweep over stale shots and stalled stories.
pub struct RecoverySweeper {
    store: Arc<dyn StoryStore>,
    config: RecoveryConfig,
    audit: Option<AuditHandle>,

    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RecoverySweeper {
    pub fn new(
        store: Arc<dyn StoryStore>,
        config: RecoveryConfig,
        audit: Option<AuditHandle>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            store,
            config,
            audit,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the sweep loop in the background.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Recovery sweeper already running");
            return;
        }

        let running = Arc::clone(&self.running);
        let sweeper = Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            audit: self.audit.clone(),
            running: Arc::clone(&self.running),
            shutdown_tx: self.shutdown_tx.clone(),
        };
        let interval = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Recovery loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Recovery loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = sweeper.sweep_once().await {
                            warn!("Recovery sweep error: {}", e);
                        }
                    }
                }
            }
            info!("Recovery loop stopped");
        });
    }

    /// Stop the sweep loop.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    /// Run one sweep against the current time.
    pub async fn sweep_once(&self) -> Result<RecoveryReport, StoryError> {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep as if the current time were `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<RecoveryReport, StoryError> {
        let cutoff = now - chrono::Duration::seconds(self.config.stale_after_secs as i64);
        let mut report = RecoveryReport::default();

        for reset in self.store.reset_stale_shots(cutoff)? {
            report.shots_reset += 1;
            report.fields_reset += reset.fields.len();
            metrics::STALE_SHOT_FIELDS_RESET.inc_by(reset.fields.len() as u64);

            let stages: Vec<String> = reset
                .fields
                .iter()
                .map(|field| field.as_str().to_string())
                .collect();
            info!(
                story_id = %reset.story_id,
                shot_id = %reset.shot_id,
                stages = ?stages,
                "Reset stale shot"
            );

            if let Some(ref audit) = self.audit {
                audit
                    .emit(AuditEvent::StaleShotReset {
                        story_id: reset.story_id,
                        shot_id: reset.shot_id,
                        stages,
                    })
                    .await;
            }
        }

        let lifecycle = Lifecycle::new(Arc::clone(&self.store), self.audit.clone());
        for story in self.store.list_stale_stories(cutoff)? {
            let message = format!(
                "stalled while {} for more than {}s",
                story.status, self.config.stale_after_secs
            );
            match lifecycle.fail(&story.id, story.status, &message).await? {
                Some(_) => {
                    report.stories_failed += 1;
                    metrics::STALLED_STORIES_FAILED.inc();
                }
                None => {
                    debug!(story_id = %story.id, "Stalled story moved on before it was failed");
                }
            }
        }

        if !report.is_empty() {
            info!(
                shots_reset = report.shots_reset,
                fields_reset = report.fields_reset,
                stories_failed = report.stories_failed,
                "Recovery sweep finished"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::{
        ResourceStatus, ShotField, ShotUpdate, SqliteStoryStore, StoryStatus, StoryUpdate,
    };
    use crate::testing::fixtures;

    fn config() -> RecoveryConfig {
        RecoveryConfig {
            enabled: true,
            sweep_interval_secs: 60,
            stale_after_secs: 900,
        }
    }

    fn later() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn test_sweep_resets_stale_shot_fields() {
        let store = Arc::new(SqliteStoryStore::in_memory().unwrap());
        let story = store.create_story(fixtures::prompt_story("Stale")).unwrap();
        let (_, shots) = store
            .insert_scenes(&story.id, &fixtures::scenes(1, 2))
            .unwrap();
        store
            .update_shot(
                &shots[0].id,
                ShotUpdate::new()
                    .set_status(ShotField::Image, ResourceStatus::Processing)
                    .set_status(ShotField::Audio, ResourceStatus::Processing),
                None,
            )
            .unwrap();

        let sweeper = RecoverySweeper::new(store.clone(), config(), None);

        let early = sweeper.sweep_once().await.unwrap();
        assert!(early.is_empty());

        let report = sweeper.sweep_at(later()).await.unwrap();
        assert_eq!(report.shots_reset, 1);
        assert_eq!(report.fields_reset, 2);

        let shot = store.get_shot(&shots[0].id).unwrap().unwrap();
        assert_eq!(shot.image_status, ResourceStatus::Pending);
        assert_eq!(shot.audio_status, ResourceStatus::Pending);
        assert!(shot.is_eligible());
    }

    #[tokio::test]
    async fn test_sweep_makes_abandoned_claim_claimable() {
        let store = Arc::new(SqliteStoryStore::in_memory().unwrap());
        let story = store.create_story(fixtures::prompt_story("Crashed")).unwrap();
        let (_, shots) = store
            .insert_scenes(&story.id, &fixtures::scenes(1, 1))
            .unwrap();
        store
            .update_shot(
                &shots[0].id,
                ShotUpdate::new()
                    .set_status(ShotField::Image, ResourceStatus::Processing)
                    .set_status(ShotField::Audio, ResourceStatus::Processing),
                None,
            )
            .unwrap();
        store.backdate_story(&story.id, chrono::Duration::hours(2));

        let sweeper = RecoverySweeper::new(store.clone(), config(), None);
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report.shots_reset, 1);
        assert_eq!(report.fields_reset, 2);

        let shot = store.get_shot(&shots[0].id).unwrap().unwrap();
        assert_eq!(shot.image_status, ResourceStatus::Pending);
        assert_eq!(shot.audio_status, ResourceStatus::Pending);
        assert!(shot.is_eligible());
    }

    #[tokio::test]
    async fn test_sweep_fails_stalled_story() {
        let store = Arc::new(SqliteStoryStore::in_memory().unwrap());
        let story = store.create_story(fixtures::prompt_story("Stuck")).unwrap();
        store
            .transition_story(
                &story.id,
                StoryStatus::Pending,
                StoryStatus::GeneratingStory,
                StoryUpdate::new(),
            )
            .unwrap();

        let sweeper = RecoverySweeper::new(store.clone(), config(), None);
        let report = sweeper.sweep_at(later()).await.unwrap();
        assert_eq!(report.stories_failed, 1);

        let story = store.get_story(&story.id).unwrap().unwrap();
        assert_eq!(story.status, StoryStatus::Failed);
        assert!(story.error_message.unwrap().contains("stalled"));
    }

    #[tokio::test]
    async fn test_sweep_leaves_media_stories_alone() {
        let store = Arc::new(SqliteStoryStore::in_memory().unwrap());
        let story = store.create_story(fixtures::prompt_story("Media")).unwrap();
        store
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

        let sweeper = RecoverySweeper::new(store.clone(), config(), None);
        let report = sweeper.sweep_at(later()).await.unwrap();
        assert!(report.is_empty());

        let story = store.get_story(&story.id).unwrap().unwrap();
        assert_eq!(story.status, StoryStatus::GeneratingMedia);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let store = Arc::new(SqliteStoryStore::in_memory().unwrap());
        let sweeper = RecoverySweeper::new(store, config(), None);

        sweeper.start();
        assert!(sweeper.is_running());
        sweeper.start();
        assert!(sweeper.is_running());

        sweeper.stop();
        assert!(!sweeper.is_running());
    }
}
