//! Story preparation: narrative writing and decomposition into scenes and shots.

use std::sync::Arc;

use tracing::{debug, info};

use crate::audit::{AuditEvent, AuditHandle};
use crate::generator::{DecomposeRequest, Generators, NarrativeRequest, RenderFormat};
use crate::metrics;
use crate::story::{
    SceneDraft, SourceType, Story, StoryStatus, StoryStore, StoryType, StoryUpdate,
};

use super::lifecycle::Lifecycle;
use super::types::PipelineError;

/// Outcome of a preparation attempt.
#[derive(Debug, Clone)]
pub enum Preparation {
    /// Scenes and shots exist; the story is generating media.
    Prepared {
        story: Story,
        scene_count: usize,
        shot_count: usize,
    },
    /// Another caller is already preparing the story.
    ClaimLost,
    /// Preparation failed and the story was marked failed.
    Failed { story: Option<Story>, error: String },
}

/// Runs the preparation unit for pending stories.
pub struct StoryPreparer {
    store: Arc<dyn StoryStore>,
    generators: Generators,
    lifecycle: Lifecycle,
    audit: Option<AuditHandle>,
}

impl StoryPreparer {
    pub(crate) fn new(
        store: Arc<dyn StoryStore>,
        generators: Generators,
        lifecycle: Lifecycle,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            store,
            generators,
            lifecycle,
            audit,
        }
    }

    /// Claim a pending story and prepare it.
    pub async fn prepare(
        &self,
        story: &Story,
        story_type: &StoryType,
    ) -> Result<Preparation, PipelineError> {
        if story.status.is_terminal() {
            return Err(PipelineError::AlreadyTerminal {
                story_id: story.id.clone(),
                status: story.status,
            });
        }

        let claimed = match self
            .lifecycle
            .transition(
                &story.id,
                StoryStatus::Pending,
                StoryStatus::GeneratingStory,
                StoryUpdate::new(),
            )
            .await
        {
            Ok(claimed) => claimed,
            Err(e) if e.is_conflict() => {
                debug!(story_id = %story.id, "Preparation claimed by another caller");
                metrics::CLAIM_CONFLICTS
                    .with_label_values(&["preparation"])
                    .inc();
                return Ok(Preparation::ClaimLost);
            }
            Err(e) => return Err(PipelineError::from_store(e)),
        };

        let mut at = StoryStatus::GeneratingStory;
        match self.run(&claimed, story_type, &mut at).await {
            Ok(prepared) => {
                metrics::PREPARATIONS_TOTAL
                    .with_label_values(&["success"])
                    .inc();
                Ok(prepared)
            }
            Err(e) => {
                metrics::PREPARATIONS_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                let error = e.to_string();
                let story = self.lifecycle.fail(&claimed.id, at, &error).await?;
                Ok(Preparation::Failed { story, error })
            }
        }
    }

    async fn run(
        &self,
        story: &Story,
        story_type: &StoryType,
        at: &mut StoryStatus,
    ) -> Result<Preparation, PipelineError> {
        let format = RenderFormat::from(story_type);

        let narrative = match story.source_type {
            SourceType::Text => story.source_content.clone(),
            SourceType::Prompt => {
                self.generators
                    .narrative
                    .write_story(&NarrativeRequest {
                        story_id: story.id.clone(),
                        title: story.name.clone(),
                        prompt: story.source_content.clone(),
                        format: format.clone(),
                    })
                    .await?
            }
        };
        let narrative = narrative.trim().to_string();
        if narrative.is_empty() {
            return Err(PipelineError::Validation("narrative is empty".to_string()));
        }

        self.lifecycle
            .transition(
                &story.id,
                StoryStatus::GeneratingStory,
                StoryStatus::GeneratingScenes,
                StoryUpdate::new().with_narrative(narrative.clone()),
            )
            .await
            .map_err(PipelineError::from_store)?;
        *at = StoryStatus::GeneratingScenes;

        self.emit(AuditEvent::NarrativeWritten {
            story_id: story.id.clone(),
            source_type: story.source_type.as_str().to_string(),
            length: narrative.chars().count(),
        })
        .await;

        let drafts = self
            .generators
            .narrative
            .decompose(&DecomposeRequest {
                story_id: story.id.clone(),
                narrative,
                format,
            })
            .await?;
        let drafts = non_empty_scenes(drafts);

        let shot_count: usize = drafts.iter().map(|draft| draft.shots.len()).sum();
        if shot_count == 0 {
            return Err(PipelineError::Validation(
                "decomposition produced no shots".to_string(),
            ));
        }

        let (scenes, shots) = self
            .store
            .insert_scenes(&story.id, &drafts)
            .map_err(PipelineError::from_store)?;

        self.emit(AuditEvent::ScenesCreated {
            story_id: story.id.clone(),
            scene_count: scenes.len(),
            shot_count: shots.len(),
        })
        .await;

        let prepared = self
            .lifecycle
            .transition(
                &story.id,
                StoryStatus::GeneratingScenes,
                StoryStatus::GeneratingMedia,
                StoryUpdate::new(),
            )
            .await
            .map_err(PipelineError::from_store)?;

        info!(
            story_id = %story.id,
            scenes = scenes.len(),
            shots = shots.len(),
            "Story prepared"
        );

        Ok(Preparation::Prepared {
            story: prepared,
            scene_count: scenes.len(),
            shot_count: shots.len(),
        })
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }
}

/// Drop scenes without shots and shots without a script.
fn non_empty_scenes(drafts: Vec<SceneDraft>) -> Vec<SceneDraft> {
    drafts
        .into_iter()
        .map(|mut draft| {
            draft.shots.retain(|shot| !shot.script.trim().is_empty());
            draft
        })
        .filter(|draft| !draft.shots.is_empty())
        .collect()
}
