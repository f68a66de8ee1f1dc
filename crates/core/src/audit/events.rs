use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Story lifecycle
    StoryCreated {
        story_id: String,
        name: String,
        story_type_id: String,
        source_type: String,
    },
    StoryStatusChanged {
        story_id: String,
        from_status: String,
        to_status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Story was permanently deleted with its scenes and shots.
    StoryDeleted {
        story_id: String,
        previous_status: String,
    },

    // Preparation
    NarrativeWritten {
        story_id: String,
        source_type: String,
        length: usize,
    },
    ScenesCreated {
        story_id: String,
        scene_count: usize,
        shot_count: usize,
    },

    // Shot processing
    ShotClaimed {
        story_id: String,
        shot_id: String,
        stages: Vec<String>,
    },
    /// Another caller claimed the shot first.
    ShotClaimLost {
        story_id: String,
        shot_id: String,
    },
    ShotStageCompleted {
        story_id: String,
        shot_id: String,
        stage: String,
        url: String,
        duration_ms: u64,
    },
    ShotStageFailed {
        story_id: String,
        shot_id: String,
        stage: String,
        error: String,
    },
    ShotCompleted {
        story_id: String,
        shot_id: String,
        progress: u8,
    },

    // Finalization
    SceneAssembled {
        story_id: String,
        scene_id: String,
        video_url: String,
    },
    StoryAssembled {
        story_id: String,
        video_url: String,
        scene_count: usize,
    },
    CaptionsApplied {
        story_id: String,
        video_url: String,
    },

    // Recovery
    StaleShotReset {
        story_id: String,
        shot_id: String,
        stages: Vec<String>,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::StoryCreated { .. } => "story_created",
            Self::StoryStatusChanged { .. } => "story_status_changed",
            Self::StoryDeleted { .. } => "story_deleted",
            Self::NarrativeWritten { .. } => "narrative_written",
            Self::ScenesCreated { .. } => "scenes_created",
            Self::ShotClaimed { .. } => "shot_claimed",
            Self::ShotClaimLost { .. } => "shot_claim_lost",
            Self::ShotStageCompleted { .. } => "shot_stage_completed",
            Self::ShotStageFailed { .. } => "shot_stage_failed",
            Self::ShotCompleted { .. } => "shot_completed",
            Self::SceneAssembled { .. } => "scene_assembled",
            Self::StoryAssembled { .. } => "story_assembled",
            Self::CaptionsApplied { .. } => "captions_applied",
            Self::StaleShotReset { .. } => "stale_shot_reset",
        }
    }

    /// Extract story_id if this event is story-related
    pub fn story_id(&self) -> Option<&str> {
        match self {
            Self::StoryCreated { story_id, .. }
            | Self::StoryStatusChanged { story_id, .. }
            | Self::StoryDeleted { story_id, .. }
            | Self::NarrativeWritten { story_id, .. }
            | Self::ScenesCreated { story_id, .. }
            | Self::ShotClaimed { story_id, .. }
            | Self::ShotClaimLost { story_id, .. }
            | Self::ShotStageCompleted { story_id, .. }
            | Self::ShotStageFailed { story_id, .. }
            | Self::ShotCompleted { story_id, .. }
            | Self::SceneAssembled { story_id, .. }
            | Self::StoryAssembled { story_id, .. }
            | Self::CaptionsApplied { story_id, .. }
            | Self::StaleShotReset { story_id, .. } => Some(story_id),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }

    /// Extract shot_id if this event concerns a single shot
    pub fn shot_id(&self) -> Option<&str> {
        match self {
            Self::ShotClaimed { shot_id, .. }
            | Self::ShotClaimLost { shot_id, .. }
            | Self::ShotStageCompleted { shot_id, .. }
            | Self::ShotStageFailed { shot_id, .. }
            | Self::ShotCompleted { shot_id, .. }
            | Self::StaleShotReset { shot_id, .. } => Some(shot_id),
            _ => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub story_id: Option<String>,
    pub shot_id: Option<String>,
    pub data: AuditEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_service_started() {
        let event = AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        };
        assert_eq!(event.event_type(), "service_started");
        assert_eq!(event.story_id(), None);
        assert_eq!(event.shot_id(), None);
    }

    #[test]
    fn test_story_status_changed_ids() {
        let event = AuditEvent::StoryStatusChanged {
            story_id: "s-1".to_string(),
            from_status: "pending".to_string(),
            to_status: "generating_story".to_string(),
            reason: None,
        };
        assert_eq!(event.event_type(), "story_status_changed");
        assert_eq!(event.story_id(), Some("s-1"));
        assert_eq!(event.shot_id(), None);
    }

    #[test]
    fn test_shot_event_ids() {
        let event = AuditEvent::ShotStageFailed {
            story_id: "s-1".to_string(),
            shot_id: "sh-9".to_string(),
            stage: "image".to_string(),
            error: "rejected".to_string(),
        };
        assert_eq!(event.story_id(), Some("s-1"));
        assert_eq!(event.shot_id(), Some("sh-9"));
    }

    #[test]
    fn test_serialization_tagged() {
        let event = AuditEvent::ShotClaimed {
            story_id: "s-1".to_string(),
            shot_id: "sh-1".to_string(),
            stages: vec!["image".to_string(), "audio".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "shot_claimed");
        assert_eq!(json["stages"][1], "audio");

        let back: AuditEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_optional_reason_skipped() {
        let event = AuditEvent::StoryStatusChanged {
            story_id: "s-1".to_string(),
            from_status: "a".to_string(),
            to_status: "b".to_string(),
            reason: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("reason"));
    }
}
