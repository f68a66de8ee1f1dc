//! Story finalization: scene assembly, story assembly and captioning.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::audit::{AuditEvent, AuditHandle};
use crate::generator::{
    CaptionRequest, CaptionSegment, Generators, RenderFormat, SceneAssemblyRequest,
    StoryAssemblyRequest,
};
use crate::metrics;
use crate::story::{
    ResourceStatus, Scene, SceneUpdate, Shot, Story, StoryStatus, StoryStore, StoryType,
    StoryUpdate,
};

use super::lifecycle::Lifecycle;
use super::types::PipelineError;

/// Outcome of a finalization attempt.
#[derive(Debug, Clone)]
pub enum Finalization {
    /// The story is completed.
    Completed(Story),
    /// Another caller is already finalizing.
    ClaimLost,
    /// Finalization failed and the story was marked failed.
    Failed { story: Option<Story>, error: String },
}

/// Assembles a fully generated story into its final video.
pub struct StoryFinalizer {
    store: Arc<dyn StoryStore>,
    generators: Generators,
    lifecycle: Lifecycle,
    audit: Option<AuditHandle>,
}

impl StoryFinalizer {
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

    /// Claim the story for finalization and run it to completion.
    pub async fn finalize(
        &self,
        story: &Story,
        story_type: &StoryType,
    ) -> Result<Finalization, PipelineError> {
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
                StoryStatus::GeneratingMedia,
                StoryStatus::BuildingVideo,
                StoryUpdate::new(),
            )
            .await
        {
            Ok(claimed) => claimed,
            Err(e) if e.is_conflict() => {
                debug!(story_id = %story.id, "Finalization claimed by another caller");
                metrics::CLAIM_CONFLICTS
                    .with_label_values(&["finalization"])
                    .inc();
                return Ok(Finalization::ClaimLost);
            }
            Err(e) => return Err(PipelineError::from_store(e)),
        };

        let started = Instant::now();
        let mut at = StoryStatus::BuildingVideo;
        let result = self.run(&claimed, story_type, &mut at).await;

        let label = if result.is_ok() { "success" } else { "failed" };
        metrics::FINALIZATIONS_TOTAL.with_label_values(&[label]).inc();
        metrics::FINALIZATION_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(completed) => {
                metrics::STORIES_COMPLETED.inc();
                info!(
                    story_id = %completed.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Story completed"
                );
                Ok(Finalization::Completed(completed))
            }
            Err(e) => {
                let error = e.to_string();
                let story = self.lifecycle.fail(&claimed.id, at, &error).await?;
                Ok(Finalization::Failed { story, error })
            }
        }
    }

    async fn run(
        &self,
        story: &Story,
        story_type: &StoryType,
        at: &mut StoryStatus,
    ) -> Result<Story, PipelineError> {
        let format = RenderFormat::from(story_type);
        let scenes = self.store.get_scenes_by_story(&story.id)?;
        let shots = self.store.get_shots_by_story(&story.id)?;

        if scenes.is_empty() {
            return Err(PipelineError::Finalization("story has no scenes".to_string()));
        }

        let mut scene_urls = Vec::with_capacity(scenes.len());
        for scene in &scenes {
            let url = self.assemble_scene(story, scene, &shots, &format).await?;
            scene_urls.push(url);
        }

        let video_url = self
            .generators
            .video
            .assemble_story(&StoryAssemblyRequest {
                story_id: story.id.clone(),
                scene_urls,
                format: format.clone(),
            })
            .await?;

        self.lifecycle
            .transition(
                &story.id,
                StoryStatus::BuildingVideo,
                StoryStatus::AddingCaptions,
                StoryUpdate::new().with_final_video_url(video_url.clone()),
            )
            .await
            .map_err(PipelineError::from_store)?;
        *at = StoryStatus::AddingCaptions;

        self.emit(AuditEvent::StoryAssembled {
            story_id: story.id.clone(),
            video_url: video_url.clone(),
            scene_count: scenes.len(),
        })
        .await;

        let mut completion = StoryUpdate::new()
            .with_progress(100)
            .with_completed_at(Utc::now());

        if story_type.captions_enabled {
            let segments: Vec<CaptionSegment> = shots
                .iter()
                .filter(|shot| !shot.script.trim().is_empty())
                .map(|shot| CaptionSegment {
                    shot_id: shot.id.clone(),
                    text: shot.script.clone(),
                })
                .collect();

            let captioned = self
                .generators
                .video
                .apply_captions(&CaptionRequest {
                    story_id: story.id.clone(),
                    video_url,
                    segments,
                    format,
                })
                .await?;

            self.emit(AuditEvent::CaptionsApplied {
                story_id: story.id.clone(),
                video_url: captioned.video_url.clone(),
            })
            .await;

            completion = completion
                .with_captioned_video_url(captioned.video_url)
                .with_subtitles(captioned.subtitles);
        } else {
            debug!(story_id = %story.id, story_type = %story_type.id, "Captions disabled");
        }

        self.lifecycle
            .transition(
                &story.id,
                StoryStatus::AddingCaptions,
                StoryStatus::Completed,
                completion,
            )
            .await
            .map_err(PipelineError::from_store)
    }

    /// Join one scene's shot clips.
    async fn assemble_scene(
        &self,
        story: &Story,
        scene: &Scene,
        shots: &[Shot],
        format: &RenderFormat,
    ) -> Result<String, PipelineError> {
        let mut clip_urls = Vec::new();
        for shot in shots.iter().filter(|shot| shot.scene_id == scene.id) {
            match (shot.final_status, shot.final_url.as_deref()) {
                (ResourceStatus::Completed, Some(url)) => clip_urls.push(url.to_string()),
                _ => {
                    return Err(PipelineError::Finalization(format!(
                        "shot {} in scene {} is not complete",
                        shot.name, scene.name
                    )))
                }
            }
        }
        if clip_urls.is_empty() {
            return Err(PipelineError::Finalization(format!(
                "scene {} has no shots",
                scene.name
            )));
        }

        self.store
            .update_scene(&scene.id, SceneUpdate::status(ResourceStatus::Processing))?;

        let video_url = match self
            .generators
            .video
            .assemble_scene(&SceneAssemblyRequest {
                story_id: story.id.clone(),
                scene_id: scene.id.clone(),
                clip_urls,
                format: format.clone(),
            })
            .await
        {
            Ok(url) => url,
            Err(e) => {
                self.store
                    .update_scene(&scene.id, SceneUpdate::status(ResourceStatus::Failed))?;
                return Err(e.into());
            }
        };

        self.store.update_scene(
            &scene.id,
            SceneUpdate::status(ResourceStatus::Completed).with_video_url(video_url.clone()),
        )?;

        self.emit(AuditEvent::SceneAssembled {
            story_id: story.id.clone(),
            scene_id: scene.id.clone(),
            video_url: video_url.clone(),
        })
        .await;

        Ok(video_url)
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }
}
