pub mod audit;
pub mod config;
pub mod generator;
pub mod metrics;
pub mod pipeline;
pub mod story;
pub mod testing;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditEventEnvelope, AuditFilter, AuditHandle,
    AuditRecord, AuditStore, AuditWriter, SqliteAuditStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use generator::{GeneratorConfig, GeneratorError, Generators, HttpGenerator};
pub use pipeline::{
    PipelineConfig, PipelineController, PipelineError, RecoveryConfig, RecoveryReport,
    RecoverySweeper, StepOutcome, StepResult, StoryDriver,
};
pub use story::{
    CreateStoryRequest, ProgressSnapshot, ResourceStatus, Scene, Shot, SourceType,
    SqliteStoryStore, Story, StoryError, StoryFilter, StoryOrder, StoryStatus, StoryStore, StoryType,
};
