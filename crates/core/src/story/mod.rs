//! Story records: stories, scenes, shots and their storage.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteStoryStore;
pub use store::{
    CreateStoryRequest, SceneUpdate, ShotExpectation, ShotUpdate, StaleShotReset, StoryError,
    StoryFilter, StoryOrder, StoryStore, StoryUpdate, MAX_NAME_LEN, MAX_SOURCE_LEN,
};
pub use types::{
    ProgressSnapshot, ResourceStatus, Scene, SceneDraft, Shot, ShotDraft, ShotField, SourceType,
    Story, StoryStatus, StoryType,
};
