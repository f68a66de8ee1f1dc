//! Shot processing: claim one eligible shot and drive it through its stages.
//!
//! A shot is claimed with a single conditional update that expects every
//! status field to still hold the value the caller observed. Image and audio
//! run concurrently; their results are written together with the hand-off of
//! the video stage, so no other caller can slip in between the two. Every
//! write after the claim is conditioned on the written field still being
//! `processing`, so a shot reset by the recovery sweep never receives results
//! from the abandoned run.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::generator::{GeneratorError, Generators, ShotCompositionRequest, ShotMediaRequest};
use crate::metrics;
use crate::story::{
    ResourceStatus, Shot, ShotExpectation, ShotField, ShotUpdate, StoryError, StoryStore,
    StoryType,
};

use super::types::PipelineError;

/// Outcome of processing one shot.
#[derive(Debug, Clone)]
pub enum ShotRun {
    /// All stages finished; the shot is final.
    Completed(Shot),
    /// A stage failed; the shot is terminally failed.
    Failed { shot: Shot, error: String },
    /// Another caller claimed the shot first, or it was reset while we worked.
    ClaimLost { shot_id: String },
}

impl ShotRun {
    fn result_label(&self) -> &'static str {
        match self {
            ShotRun::Completed(_) => "completed",
            ShotRun::Failed { .. } => "failed",
            ShotRun::ClaimLost { .. } => "lost",
        }
    }
}

/// One stage execution, reported after its result is persisted.
struct StageReport {
    field: ShotField,
    elapsed: Duration,
    outcome: Result<String, String>,
}

enum Step {
    Next(Shot),
    Done(ShotRun),
}

/// Claims and processes shots.
pub struct ShotProcessor {
    store: Arc<dyn StoryStore>,
    generators: Generators,
    audit: Option<AuditHandle>,
}

impl ShotProcessor {
    pub fn new(
        store: Arc<dyn StoryStore>,
        generators: Generators,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            store,
            generators,
            audit,
        }
    }

    /// First eligible shot in (scene order, shot order).
    pub fn select_eligible(shots: &[Shot]) -> Option<&Shot> {
        shots
            .iter()
            .filter(|shot| shot.is_eligible())
            .min_by_key(|shot| shot.processing_order())
    }

    /// Process the first eligible shot, if any.
    pub async fn process_next(
        &self,
        story_type: &StoryType,
        shots: &[Shot],
    ) -> Result<Option<ShotRun>, PipelineError> {
        match Self::select_eligible(shots) {
            Some(shot) => Ok(Some(self.process(story_type, shot).await?)),
            None => Ok(None),
        }
    }

    /// Claim `observed` and run its remaining stages.
    pub async fn process(
        &self,
        story_type: &StoryType,
        observed: &Shot,
    ) -> Result<ShotRun, PipelineError> {
        let started = Instant::now();

        let run = match self.claim(observed).await? {
            Some((shot, stages)) => self.run_claimed(story_type, shot, &stages).await?,
            None => ShotRun::ClaimLost {
                shot_id: observed.id.clone(),
            },
        };

        let label = run.result_label();
        metrics::SHOTS_PROCESSED.with_label_values(&[label]).inc();
        metrics::SHOT_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        Ok(run)
    }

    /// Atomically move the shot's next stages to `processing`.
    ///
    /// Returns `None` if any status field changed since `observed` was read.
    pub async fn claim(
        &self,
        observed: &Shot,
    ) -> Result<Option<(Shot, Vec<ShotField>)>, PipelineError> {
        let mut stages = observed.stages_to_claim();
        if stages.is_empty() {
            // Composed but never marked final.
            stages.push(ShotField::Final);
        }

        let update = stages.iter().fold(ShotUpdate::new(), |update, field| {
            update.set_status(*field, ResourceStatus::Processing)
        });

        match self.store.update_shot(
            &observed.id,
            update,
            Some(&ShotExpectation::matching(observed)),
        ) {
            Ok(shot) => {
                debug!(shot_id = %shot.id, stages = ?stages, "Claimed shot");
                self.emit(AuditEvent::ShotClaimed {
                    story_id: shot.story_id.clone(),
                    shot_id: shot.id.clone(),
                    stages: stages.iter().map(|f| f.as_str().to_string()).collect(),
                })
                .await;
                Ok(Some((shot, stages)))
            }
            Err(e) if e.is_conflict() => {
                debug!(shot_id = %observed.id, "Shot claimed by another caller");
                metrics::CLAIM_CONFLICTS.with_label_values(&["shot"]).inc();
                self.emit(AuditEvent::ShotClaimLost {
                    story_id: observed.story_id.clone(),
                    shot_id: observed.id.clone(),
                })
                .await;
                Ok(None)
            }
            Err(e) => Err(PipelineError::Store(e)),
        }
    }

    async fn run_claimed(
        &self,
        story_type: &StoryType,
        shot: Shot,
        stages: &[ShotField],
    ) -> Result<ShotRun, PipelineError> {
        let mut shot = shot;

        if stages.contains(&ShotField::Image) || stages.contains(&ShotField::Audio) {
            match self.run_media(story_type, shot, stages).await? {
                Step::Next(next) => shot = next,
                Step::Done(run) => return Ok(run),
            }
        }

        if shot.video_status == ResourceStatus::Processing {
            match self.run_video(story_type, shot).await? {
                Step::Next(next) => shot = next,
                Step::Done(run) => return Ok(run),
            }
        }

        if shot.final_status == ResourceStatus::Processing {
            return self.mark_final(shot).await;
        }

        if shot.final_status == ResourceStatus::Completed {
            info!(shot_id = %shot.id, "Shot completed");
            return Ok(ShotRun::Completed(shot));
        }

        // Only reachable if the claimed fields changed under us.
        Ok(ShotRun::ClaimLost { shot_id: shot.id })
    }

    /// Run image and audio concurrently and persist both results in one write.
    async fn run_media(
        &self,
        story_type: &StoryType,
        shot: Shot,
        stages: &[ShotField],
    ) -> Result<Step, PipelineError> {
        let request = ShotMediaRequest::for_shot(&shot, story_type);

        let image = async {
            if stages.contains(&ShotField::Image) {
                Some(timed(ShotField::Image, self.generators.image.generate_image(&request)).await)
            } else {
                None
            }
        };
        let audio = async {
            if stages.contains(&ShotField::Audio) {
                Some(timed(ShotField::Audio, self.generators.audio.generate_audio(&request)).await)
            } else {
                None
            }
        };
        let (image, audio) = tokio::join!(image, audio);
        let reports: Vec<StageReport> = [image, audio].into_iter().flatten().collect();

        let mut update = ShotUpdate::new();
        let mut expected = ShotExpectation::new()
            .with(ShotField::Video, ResourceStatus::Pending)
            .with(ShotField::Final, ResourceStatus::Pending);
        let mut failure: Option<String> = None;

        for report in &reports {
            expected = expected.with(report.field, ResourceStatus::Processing);
            match report.outcome {
                Ok(ref url) => {
                    update = update
                        .set_status(report.field, ResourceStatus::Completed)
                        .set_url(report.field, url.clone());
                }
                Err(ref message) => {
                    update = update.set_status(report.field, ResourceStatus::Failed);
                    failure.get_or_insert_with(|| message.clone());
                }
            }
        }

        update = match failure {
            Some(ref message) => update
                .set_status(ShotField::Final, ResourceStatus::Failed)
                .with_error(message.clone()),
            None => update.set_status(ShotField::Video, ResourceStatus::Processing),
        };

        let Some(updated) = self.write(&shot, update, expected).await? else {
            return Ok(Step::Done(ShotRun::ClaimLost { shot_id: shot.id }));
        };

        for report in &reports {
            self.report_stage(&updated, report).await;
        }

        Ok(match failure {
            Some(error) => Step::Done(ShotRun::Failed {
                shot: updated,
                error,
            }),
            None => Step::Next(updated),
        })
    }

    /// Compose the shot clip from its image and narration.
    async fn run_video(&self, story_type: &StoryType, shot: Shot) -> Result<Step, PipelineError> {
        let request = match (shot.image_url.clone(), shot.audio_url.clone()) {
            (Some(image_url), Some(audio_url)) => Some(ShotCompositionRequest {
                story_id: shot.story_id.clone(),
                shot_id: shot.id.clone(),
                image_url,
                audio_url,
                script: shot.script.clone(),
                format: story_type.into(),
            }),
            _ => None,
        };

        let started = Instant::now();
        let result = match request {
            Some(ref request) => self
                .generators
                .video
                .compose_shot(request)
                .await
                .map_err(|e| stage_error(ShotField::Video, &e)),
            None => Err("video composition failed: image or audio URL missing".to_string()),
        };
        let elapsed = started.elapsed();

        let expected = ShotExpectation::new()
            .with(ShotField::Video, ResourceStatus::Processing)
            .with(ShotField::Final, ResourceStatus::Pending);

        let (update, report) = match result {
            Ok(composed) => (
                ShotUpdate::new()
                    .set_status(ShotField::Video, ResourceStatus::Completed)
                    .set_url(ShotField::Video, composed.video_url.clone())
                    .set_status(ShotField::Final, ResourceStatus::Completed)
                    .set_url(ShotField::Final, composed.final_url),
                StageReport {
                    field: ShotField::Video,
                    elapsed,
                    outcome: Ok(composed.video_url),
                },
            ),
            Err(message) => (
                ShotUpdate::new()
                    .set_status(ShotField::Video, ResourceStatus::Failed)
                    .set_status(ShotField::Final, ResourceStatus::Failed)
                    .with_error(message.clone()),
                StageReport {
                    field: ShotField::Video,
                    elapsed,
                    outcome: Err(message),
                },
            ),
        };

        let Some(updated) = self.write(&shot, update, expected).await? else {
            return Ok(Step::Done(ShotRun::ClaimLost { shot_id: shot.id }));
        };
        self.report_stage(&updated, &report).await;

        Ok(match report.outcome {
            Ok(_) => Step::Next(updated),
            Err(error) => Step::Done(ShotRun::Failed {
                shot: updated,
                error,
            }),
        })
    }

    /// Mark an already composed shot final.
    async fn mark_final(&self, shot: Shot) -> Result<ShotRun, PipelineError> {
        let expected = ShotExpectation::new().with(ShotField::Final, ResourceStatus::Processing);

        let final_url = shot
            .final_url
            .clone()
            .or_else(|| shot.video_url.clone());

        let (update, error) = match final_url {
            Some(url) => (
                ShotUpdate::new()
                    .set_status(ShotField::Final, ResourceStatus::Completed)
                    .set_url(ShotField::Final, url),
                None,
            ),
            None => {
                let message = "shot has no composed clip".to_string();
                (
                    ShotUpdate::new()
                        .set_status(ShotField::Final, ResourceStatus::Failed)
                        .with_error(message.clone()),
                    Some(message),
                )
            }
        };

        let Some(updated) = self.write(&shot, update, expected).await? else {
            return Ok(ShotRun::ClaimLost { shot_id: shot.id });
        };

        Ok(match error {
            None => ShotRun::Completed(updated),
            Some(error) => ShotRun::Failed {
                shot: updated,
                error,
            },
        })
    }

    /// Conditional write; `None` means the shot was reset or taken over.
    async fn write(
        &self,
        shot: &Shot,
        update: ShotUpdate,
        expected: ShotExpectation,
    ) -> Result<Option<Shot>, PipelineError> {
        match self.store.update_shot(&shot.id, update, Some(&expected)) {
            Ok(updated) => Ok(Some(updated)),
            Err(e) if e.is_conflict() => {
                warn!(
                    shot_id = %shot.id,
                    expected = %expected.describe(),
                    "Shot changed while in flight, discarding results"
                );
                Ok(None)
            }
            Err(StoryError::NotFound { .. }) => {
                warn!(shot_id = %shot.id, "Shot deleted while in flight");
                Ok(None)
            }
            Err(e) => Err(PipelineError::Store(e)),
        }
    }

    async fn report_stage(&self, shot: &Shot, report: &StageReport) {
        let result = if report.outcome.is_ok() { "success" } else { "failure" };
        metrics::SHOT_STAGE_DURATION
            .with_label_values(&[report.field.as_str(), result])
            .observe(report.elapsed.as_secs_f64());

        let event = match report.outcome {
            Ok(ref url) => {
                debug!(shot_id = %shot.id, stage = %report.field, "Stage completed");
                AuditEvent::ShotStageCompleted {
                    story_id: shot.story_id.clone(),
                    shot_id: shot.id.clone(),
                    stage: report.field.as_str().to_string(),
                    url: url.clone(),
                    duration_ms: report.elapsed.as_millis() as u64,
                }
            }
            Err(ref error) => {
                warn!(shot_id = %shot.id, stage = %report.field, error = %error, "Stage failed");
                AuditEvent::ShotStageFailed {
                    story_id: shot.story_id.clone(),
                    shot_id: shot.id.clone(),
                    stage: report.field.as_str().to_string(),
                    error: error.clone(),
                }
            }
        };
        self.emit(event).await;
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }
}

fn stage_error(field: ShotField, err: &GeneratorError) -> String {
    format!("{} generation failed: {}", field, err)
}

async fn timed<F>(field: ShotField, call: F) -> StageReport
where
    F: Future<Output = Result<String, GeneratorError>>,
{
    let started = Instant::now();
    let outcome = call.await.map_err(|e| stage_error(field, &e));
    StageReport {
        field,
        elapsed: started.elapsed(),
        outcome,
    }
}
