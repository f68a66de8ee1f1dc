use std::sync::Arc;

use storyreel_core::{
    AuditHandle, AuditStore, Config, PipelineController, SanitizedConfig, StoryStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    story_store: Arc<dyn StoryStore>,
    audit: AuditHandle,
    audit_store: Arc<dyn AuditStore>,
    controller: Arc<PipelineController>,
}

impl AppState {
    pub fn new(
        config: Config,
        story_store: Arc<dyn StoryStore>,
        audit: AuditHandle,
        audit_store: Arc<dyn AuditStore>,
        controller: Arc<PipelineController>,
    ) -> Self {
        Self {
            config,
            story_store,
            audit,
            audit_store,
            controller,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn story_store(&self) -> &dyn StoryStore {
        self.story_store.as_ref()
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    /// Shared handle, for work spawned past the request.
    pub fn controller(&self) -> Arc<PipelineController> {
        Arc::clone(&self.controller)
    }
}
