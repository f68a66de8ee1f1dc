//! Story status changes with their audit trail.

use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::AuditHandle;
use crate::metrics;
use crate::story::{Story, StoryError, StoryStatus, StoryStore, StoryUpdate};

/// Applies story status transitions through the store's compare-and-set and
/// records each successful one.
#[derive(Clone)]
pub(crate) struct Lifecycle {
    store: Arc<dyn StoryStore>,
    audit: Option<AuditHandle>,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn StoryStore>, audit: Option<AuditHandle>) -> Self {
        Self { store, audit }
    }

    /// Move a story from `from` to `to`. Fails with a conflict if the story
    /// is no longer in `from`.
    pub async fn transition(
        &self,
        story_id: &str,
        from: StoryStatus,
        to: StoryStatus,
        update: StoryUpdate,
    ) -> Result<Story, StoryError> {
        let reason = update.error_message.clone();
        let story = self.store.transition_story(story_id, from, to, update)?;

        info!(story_id = %story_id, from = %from, to = %to, "Story status changed");

        if let Some(ref audit) = self.audit {
            audit.status_changed(story_id, from, to, reason).await;
        }

        Ok(story)
    }

    /// Mark a story failed from `from`.
    ///
    /// Returns `None` when the story had already moved on, in which case
    /// whoever moved it owns the outcome.
    pub async fn fail(
        &self,
        story_id: &str,
        from: StoryStatus,
        message: &str,
    ) -> Result<Option<Story>, StoryError> {
        match self
            .transition(
                story_id,
                from,
                StoryStatus::Failed,
                StoryUpdate::new().with_error(message),
            )
            .await
        {
            Ok(story) => {
                metrics::STORIES_FAILED
                    .with_label_values(&[from.as_str()])
                    .inc();
                warn!(story_id = %story_id, from = %from, error = %message, "Story failed");
                Ok(Some(story))
            }
            Err(e) if e.is_conflict() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
