//! Request and response types exchanged with generation collaborators.

use serde::{Deserialize, Serialize};

use crate::story::{Shot, StoryType};

/// Output format a collaborator should render for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderFormat {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: String,
}

impl From<&StoryType> for RenderFormat {
    fn from(story_type: &StoryType) -> Self {
        Self {
            width: story_type.width,
            height: story_type.height,
            aspect_ratio: story_type.aspect_ratio.clone(),
        }
    }
}

/// Request to write a narrative from a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeRequest {
    pub story_id: String,
    pub title: String,
    pub prompt: String,
    pub format: RenderFormat,
}

/// Request to split a narrative into scenes and shots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecomposeRequest {
    pub story_id: String,
    pub narrative: String,
    pub format: RenderFormat,
}

/// Request for one shot's image or narration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShotMediaRequest {
    pub story_id: String,
    pub scene_id: String,
    pub shot_id: String,
    pub script: String,
    pub format: RenderFormat,
}

impl ShotMediaRequest {
    pub fn for_shot(shot: &Shot, story_type: &StoryType) -> Self {
        Self {
            story_id: shot.story_id.clone(),
            scene_id: shot.scene_id.clone(),
            shot_id: shot.id.clone(),
            script: shot.script.clone(),
            format: RenderFormat::from(story_type),
        }
    }
}

/// Request to compose a shot clip from its image and narration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShotCompositionRequest {
    pub story_id: String,
    pub shot_id: String,
    pub image_url: String,
    pub audio_url: String,
    pub script: String,
    pub format: RenderFormat,
}

/// Output of shot composition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComposedShot {
    /// The raw composed clip.
    pub video_url: String,
    /// The shot's deliverable, used for scene assembly.
    pub final_url: String,
}

/// Request to join a scene's shot clips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneAssemblyRequest {
    pub story_id: String,
    pub scene_id: String,
    pub clip_urls: Vec<String>,
    pub format: RenderFormat,
}

/// Request to join scene videos into the story video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryAssemblyRequest {
    pub story_id: String,
    pub scene_urls: Vec<String>,
    pub format: RenderFormat,
}

/// One caption cue, in story order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptionSegment {
    pub shot_id: String,
    pub text: String,
}

/// Request to burn captions into the story video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionRequest {
    pub story_id: String,
    pub video_url: String,
    pub segments: Vec<CaptionSegment>,
    pub format: RenderFormat,
}

/// Output of captioning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptionedVideo {
    pub video_url: String,
    /// Subtitle track content (e.g. SRT).
    pub subtitles: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_format_from_story_type() {
        let story_type = StoryType {
            id: "landscape".into(),
            name: "Landscape".into(),
            width: 1920,
            height: 1080,
            aspect_ratio: "16:9".into(),
            captions_enabled: true,
        };
        let format = RenderFormat::from(&story_type);
        assert_eq!(format.width, 1920);
        assert_eq!(format.aspect_ratio, "16:9");
    }

    #[test]
    fn test_composed_shot_deserialize() {
        let json = r#"{"video_url":"https://cdn/v.mp4","final_url":"https://cdn/f.mp4"}"#;
        let composed: ComposedShot = serde_json::from_str(json).unwrap();
        assert_eq!(composed.final_url, "https://cdn/f.mp4");
    }
}
