//! Background driver that advances active stories without a polling client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::story::{StoryError, StoryFilter, StoryOrder, StoryStore};

use super::config::PipelineConfig;
use super::controller::PipelineController;
use super::types::StepOutcome;

/// Stories considered per tick.
const TICK_BATCH_SIZE: i64 = 100;

/// Calls [`PipelineController::advance`] on every active story, on an interval.
///
/// The driver is just another caller: it relies on the same claims as the
/// HTTP endpoint, so running both at once is safe.
pub struct StoryDriver {
    controller: Arc<PipelineController>,
    store: Arc<dyn StoryStore>,
    config: PipelineConfig,

    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl StoryDriver {
    pub fn new(
        controller: Arc<PipelineController>,
        store: Arc<dyn StoryStore>,
        config: PipelineConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            controller,
            store,
            config,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the driver loop in the background.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Story driver already running");
            return;
        }

        let running = Arc::clone(&self.running);
        let driver = Self {
            controller: Arc::clone(&self.controller),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            running: Arc::clone(&self.running),
            shutdown_tx: self.shutdown_tx.clone(),
        };
        let interval = Duration::from_millis(self.config.driver_poll_interval_ms.max(10));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Story driver loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Story driver loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = driver.tick().await {
                            warn!("Story driver error: {}", e);
                        }
                    }
                }
            }
            info!("Story driver loop stopped");
        });
    }

    /// Stop the driver loop. Calls in flight finish on their own.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    /// Advance every active story once. Returns how many calls made progress.
    pub async fn tick(&self) -> Result<usize, StoryError> {
        // Stories touched least recently go first, so a backlog larger than
        // one batch is worked through in turns.
        let filter = StoryFilter::active()
            .with_order(StoryOrder::LeastRecentlyUpdated)
            .with_limit(TICK_BATCH_SIZE);
        let stories = self.store.list_stories(&filter)?;
        if stories.is_empty() {
            return Ok(0);
        }

        let concurrency = self.config.max_concurrent_stories.max(1);
        let controller = &self.controller;

        let progressed = stream::iter(stories)
            .map(|story| async move {
                match controller.advance(&story.id).await {
                    Ok(step) => {
                        debug!(
                            story_id = %story.id,
                            outcome = step.outcome.as_str(),
                            "Driver advanced story"
                        );
                        matches!(
                            step.outcome,
                            StepOutcome::Prepared
                                | StepOutcome::ShotCompleted
                                | StepOutcome::Finalized
                                | StepOutcome::Failed
                        )
                    }
                    Err(e) => {
                        warn!(story_id = %story.id, error = %e, "Driver failed to advance story");
                        false
                    }
                }
            })
            .buffer_unordered(concurrency)
            .filter(|progressed| futures::future::ready(*progressed))
            .count()
            .await;

        Ok(progressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::{SqliteStoryStore, StoryStatus};
    use crate::testing::{fixtures, MockGenerators};

    fn driver() -> (Arc<SqliteStoryStore>, MockGenerators, StoryDriver) {
        let store = Arc::new(SqliteStoryStore::in_memory().unwrap());
        let mocks = MockGenerators::new();
        let config = PipelineConfig::default();
        let controller = Arc::new(PipelineController::new(
            store.clone(),
            mocks.generators(),
            config.clone(),
        ));
        let driver = StoryDriver::new(controller, store.clone(), config);
        (store, mocks, driver)
    }

    #[tokio::test]
    async fn test_tick_with_no_stories() {
        let (_, _, driver) = driver();
        assert_eq!(driver.tick().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ticks_drive_stories_to_completion() {
        let (store, mocks, driver) = driver();
        let a = store.create_story(fixtures::prompt_story("A")).unwrap();
        let b = store
            .create_story(fixtures::text_story("B", "square"))
            .unwrap();

        let mut ticks = 0;
        while driver.tick().await.unwrap() > 0 {
            ticks += 1;
            assert!(ticks < 20, "driver did not settle");
        }

        for id in [&a.id, &b.id] {
            let story = store.get_story(id).unwrap().unwrap();
            assert_eq!(story.status, StoryStatus::Completed);
            assert_eq!(story.progress, 100);
        }
        assert_eq!(mocks.video.story_assembly_count().await, 2);
        assert_eq!(mocks.video.caption_count().await, 1);
    }

    #[tokio::test]
    async fn test_tick_reaches_oldest_story_in_large_backlog() {
        let (store, _mocks, driver) = driver();
        let oldest = store.create_story(fixtures::prompt_story("Oldest")).unwrap();
        for i in 0..TICK_BATCH_SIZE {
            store
                .create_story(fixtures::prompt_story(&format!("Newer {}", i)))
                .unwrap();
        }

        driver.tick().await.unwrap();

        let oldest = store.get_story(&oldest.id).unwrap().unwrap();
        assert_ne!(oldest.status, StoryStatus::Pending);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (_, _, driver) = driver();
        driver.start();
        driver.start();
        assert!(driver.is_running());
        driver.stop();
        assert!(!driver.is_running());
    }
}
