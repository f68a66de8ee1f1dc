use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::AuditEvent;
use crate::story::StoryStatus;

/// Envelope wrapping an audit event with metadata
#[derive(Debug, Clone)]
pub struct AuditEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
}

impl AuditEventEnvelope {
    fn now(event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Handle for emitting audit events
///
/// Cheap to clone. Events go through a bounded channel to the [`AuditWriter`](super::AuditWriter);
/// a full or closed channel is logged and never fails the caller.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditEventEnvelope>,
}

impl AuditHandle {
    /// Create a new audit handle from a channel sender
    pub fn new(tx: mpsc::Sender<AuditEventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an audit event, waiting for channel capacity
    pub async fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.tx.send(AuditEventEnvelope::now(event)).await {
            tracing::error!("Failed to emit audit event: {}", e);
        }
    }

    /// Try to emit an audit event without waiting
    ///
    /// Returns true if the event was queued.
    pub fn try_emit(&self, event: AuditEvent) -> bool {
        match self.tx.try_send(AuditEventEnvelope::now(event)) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to emit audit event: {}", e);
                false
            }
        }
    }

    /// Record a story status transition.
    pub async fn status_changed(
        &self,
        story_id: &str,
        from: StoryStatus,
        to: StoryStatus,
        reason: Option<String>,
    ) {
        self.emit(AuditEvent::StoryStatusChanged {
            story_id: story_id.to_string(),
            from_status: from.as_str().to_string(),
            to_status: to.as_str().to_string(),
            reason,
        })
        .await;
    }
}
