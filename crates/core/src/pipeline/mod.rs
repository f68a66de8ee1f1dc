//! Story pipeline: advancing stories one unit of work at a time.
//!
//! A unit is one of:
//! - preparation (narrative writing and decomposition)
//! - one shot (image and audio in parallel, then the composed clip)
//! - finalization (scene and story assembly, then captions)
//!
//! Every unit is claimed with a conditional write before any collaborator is
//! called, so concurrent callers never duplicate work.

mod config;
mod controller;
mod driver;
mod finalizer;
mod lifecycle;
mod preparation;
mod progress;
mod recovery;
mod shot_processor;
mod types;

pub use config::{PipelineConfig, RecoveryConfig};
pub use controller::PipelineController;
pub use driver::StoryDriver;
pub use finalizer::{Finalization, StoryFinalizer};
pub use preparation::{Preparation, StoryPreparer};
pub use progress::{persisted_progress, ProgressTracker, MAX_PROGRESS_BEFORE_COMPLETION};
pub use recovery::{RecoveryReport, RecoverySweeper};
pub use shot_processor::{ShotProcessor, ShotRun};
pub use types::{PipelineError, StepOutcome, StepResult};
