//! SQLite-backed story store implementation.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    CreateStoryRequest, ProgressSnapshot, ResourceStatus, Scene, SceneDraft, SceneUpdate, Shot,
    ShotExpectation, ShotField, ShotUpdate, StaleShotReset, Story, StoryError, StoryFilter,
    StoryOrder, StoryStatus, StoryStore, StoryType, StoryUpdate,
};

const STORY_COLUMNS: &str = "id, name, story_type_id, source_content, source_type, status, progress, narrative, total_scenes, total_shots, final_video_url, captioned_video_url, subtitles, error_message, created_at, updated_at, completed_at";

const SCENE_COLUMNS: &str = "id, story_id, name, sort_order, status, video_url";

const SHOT_COLUMNS: &str = "id, story_id, scene_id, name, script, scene_order, sort_order, image_status, audio_status, video_status, final_status, image_url, audio_url, video_url, final_url, error_message, updated_at";

/// Story types seeded into every database.
const SEED_STORY_TYPES: &[(&str, &str, u32, u32, &str, bool)] = &[
    ("portrait", "Portrait (Shorts / Reels)", 1080, 1920, "9:16", true),
    ("landscape", "Landscape (YouTube)", 1920, 1080, "16:9", true),
    ("square", "Square (Feed)", 1080, 1080, "1:1", false),
];

/// Fixed-width timestamps so that text comparison matches time order.
fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

/// SQLite-backed story store.
pub struct SqliteStoryStore {
    conn: Mutex<Connection>,
}

impl SqliteStoryStore {
    /// Create a new SQLite story store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoryError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite story store (useful for testing).
    pub fn in_memory() -> Result<Self, StoryError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS story_types (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                aspect_ratio TEXT NOT NULL,
                captions_enabled INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                story_type_id TEXT NOT NULL REFERENCES story_types(id),
                source_content TEXT NOT NULL,
                source_type TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                narrative TEXT,
                total_scenes INTEGER NOT NULL DEFAULT 0,
                total_shots INTEGER NOT NULL DEFAULT 0,
                final_video_url TEXT,
                captioned_video_url TEXT,
                subtitles TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS scenes (
                id TEXT PRIMARY KEY,
                story_id TEXT NOT NULL REFERENCES stories(id),
                name TEXT NOT NULL,
                sort_order INTEGER NOT NULL,
                status TEXT NOT NULL,
                video_url TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS shots (
                id TEXT PRIMARY KEY,
                story_id TEXT NOT NULL REFERENCES stories(id),
                scene_id TEXT NOT NULL REFERENCES scenes(id),
                name TEXT NOT NULL,
                script TEXT NOT NULL,
                scene_order INTEGER NOT NULL,
                sort_order INTEGER NOT NULL,
                image_status TEXT NOT NULL,
                audio_status TEXT NOT NULL,
                video_status TEXT NOT NULL,
                final_status TEXT NOT NULL,
                image_url TEXT,
                audio_url TEXT,
                video_url TEXT,
                final_url TEXT,
                error_message TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_stories_status ON stories(status);
            CREATE INDEX IF NOT EXISTS idx_stories_created_at ON stories(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_scenes_story ON scenes(story_id, sort_order);
            CREATE INDEX IF NOT EXISTS idx_shots_story ON shots(story_id, scene_order, sort_order);
            CREATE INDEX IF NOT EXISTS idx_shots_updated_at ON shots(updated_at);
            "#,
        )?;

        for (id, name, width, height, aspect_ratio, captions) in SEED_STORY_TYPES {
            conn.execute(
                "INSERT OR IGNORE INTO story_types (id, name, width, height, aspect_ratio, captions_enabled) VALUES (?, ?, ?, ?, ?, ?)",
                params![id, name, width, height, aspect_ratio, captions],
            )?;
        }

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoryError> {
        self.conn
            .lock()
            .map_err(|_| StoryError::Database("connection lock poisoned".to_string()))
    }

    /// Push every shot's and the story's `updated_at` back in time.
    #[cfg(test)]
    pub(crate) fn backdate_story(&self, story_id: &str, by: chrono::Duration) {
        let conn = self.lock().unwrap();
        let at = format_ts(&(Utc::now() - by));
        conn.execute(
            "UPDATE shots SET updated_at = ? WHERE story_id = ?",
            params![at, story_id],
        )
        .unwrap();
        conn.execute(
            "UPDATE stories SET updated_at = ? WHERE id = ?",
            params![at, story_id],
        )
        .unwrap();
    }

    fn build_where_clause(filter: &StoryFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if filter.statuses.is_empty() {
            return (String::new(), params);
        }

        let placeholders = vec!["?"; filter.statuses.len()].join(", ");
        for status in &filter.statuses {
            params.push(Box::new(status.as_str()));
        }

        (format!("WHERE status IN ({})", placeholders), params)
    }

    /// Appends SET fragments for a story update.
    fn push_story_update(
        update: &StoryUpdate,
        sets: &mut Vec<&'static str>,
        values: &mut Vec<Box<dyn rusqlite::ToSql>>,
    ) {
        if let Some(progress) = update.progress {
            // Persisted progress never goes backwards.
            sets.push("progress = MAX(progress, ?)");
            values.push(Box::new(progress));
        }
        if let Some(ref narrative) = update.narrative {
            sets.push("narrative = ?");
            values.push(Box::new(narrative.clone()));
        }
        if let Some(ref url) = update.final_video_url {
            sets.push("final_video_url = ?");
            values.push(Box::new(url.clone()));
        }
        if let Some(ref url) = update.captioned_video_url {
            sets.push("captioned_video_url = ?");
            values.push(Box::new(url.clone()));
        }
        if let Some(ref subtitles) = update.subtitles {
            sets.push("subtitles = ?");
            values.push(Box::new(subtitles.clone()));
        }
        if let Some(ref message) = update.error_message {
            sets.push("error_message = ?");
            values.push(Box::new(message.clone()));
        }
        if let Some(ref at) = update.completed_at {
            sets.push("completed_at = ?");
            values.push(Box::new(format_ts(at)));
        }
    }

    fn row_to_story_type(row: &rusqlite::Row) -> rusqlite::Result<StoryType> {
        Ok(StoryType {
            id: row.get(0)?,
            name: row.get(1)?,
            width: row.get(2)?,
            height: row.get(3)?,
            aspect_ratio: row.get(4)?,
            captions_enabled: row.get(5)?,
        })
    }

    fn row_to_story(row: &rusqlite::Row) -> rusqlite::Result<Story> {
        let source_type: String = row.get(4)?;
        let status: String = row.get(5)?;
        let created_at: String = row.get(14)?;
        let updated_at: String = row.get(15)?;
        let completed_at: Option<String> = row.get(16)?;

        Ok(Story {
            id: row.get(0)?,
            name: row.get(1)?,
            story_type_id: row.get(2)?,
            source_content: row.get(3)?,
            source_type: parse_column(4, &source_type)?,
            status: parse_column(5, &status)?,
            progress: row.get(6)?,
            narrative: row.get(7)?,
            total_scenes: row.get(8)?,
            total_shots: row.get(9)?,
            final_video_url: row.get(10)?,
            captioned_video_url: row.get(11)?,
            subtitles: row.get(12)?,
            error_message: row.get(13)?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
            completed_at: completed_at.as_deref().map(parse_ts),
        })
    }

    fn row_to_scene(row: &rusqlite::Row) -> rusqlite::Result<Scene> {
        let status: String = row.get(4)?;
        Ok(Scene {
            id: row.get(0)?,
            story_id: row.get(1)?,
            name: row.get(2)?,
            sort_order: row.get(3)?,
            status: parse_column(4, &status)?,
            video_url: row.get(5)?,
        })
    }

    fn row_to_shot(row: &rusqlite::Row) -> rusqlite::Result<Shot> {
        let image_status: String = row.get(7)?;
        let audio_status: String = row.get(8)?;
        let video_status: String = row.get(9)?;
        let final_status: String = row.get(10)?;
        let updated_at: String = row.get(16)?;

        Ok(Shot {
            id: row.get(0)?,
            story_id: row.get(1)?,
            scene_id: row.get(2)?,
            name: row.get(3)?,
            script: row.get(4)?,
            scene_order: row.get(5)?,
            sort_order: row.get(6)?,
            image_status: parse_column(7, &image_status)?,
            audio_status: parse_column(8, &audio_status)?,
            video_status: parse_column(9, &video_status)?,
            final_status: parse_column(10, &final_status)?,
            image_url: row.get(11)?,
            audio_url: row.get(12)?,
            video_url: row.get(13)?,
            final_url: row.get(14)?,
            error_message: row.get(15)?,
            updated_at: parse_ts(&updated_at),
        })
    }

    fn query_story(conn: &Connection, id: &str) -> Result<Option<Story>, StoryError> {
        let sql = format!("SELECT {} FROM stories WHERE id = ?", STORY_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_story)
            .optional()?)
    }

    fn query_scene(conn: &Connection, id: &str) -> Result<Option<Scene>, StoryError> {
        let sql = format!("SELECT {} FROM scenes WHERE id = ?", SCENE_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_scene)
            .optional()?)
    }

    fn query_shot(conn: &Connection, id: &str) -> Result<Option<Shot>, StoryError> {
        let sql = format!("SELECT {} FROM shots WHERE id = ?", SHOT_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_shot)
            .optional()?)
    }

    fn query_shots(conn: &Connection, story_id: &str) -> Result<Vec<Shot>, StoryError> {
        let sql = format!(
            "SELECT {} FROM shots WHERE story_id = ? ORDER BY scene_order ASC, sort_order ASC",
            SHOT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![story_id], Self::row_to_shot)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn query_scenes(conn: &Connection, story_id: &str) -> Result<Vec<Scene>, StoryError> {
        let sql = format!(
            "SELECT {} FROM scenes WHERE story_id = ? ORDER BY sort_order ASC",
            SCENE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![story_id], Self::row_to_scene)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl StoryStore for SqliteStoryStore {
    fn list_story_types(&self) -> Result<Vec<StoryType>, StoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, width, height, aspect_ratio, captions_enabled FROM story_types ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], Self::row_to_story_type)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn get_story_type(&self, id: &str) -> Result<Option<StoryType>, StoryError> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id, name, width, height, aspect_ratio, captions_enabled FROM story_types WHERE id = ?",
                params![id],
                Self::row_to_story_type,
            )
            .optional()?)
    }

    fn create_story(&self, request: CreateStoryRequest) -> Result<Story, StoryError> {
        request.validate()?;

        let conn = self.lock()?;

        let type_exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM story_types WHERE id = ?",
                params![request.story_type_id],
                |row| row.get(0),
            )
            .optional()?;
        if type_exists.is_none() {
            return Err(StoryError::Validation(format!(
                "unknown story type: {}",
                request.story_type_id
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let status = StoryStatus::Pending;

        conn.execute(
            "INSERT INTO stories (id, name, story_type_id, source_content, source_type, status, progress, total_scenes, total_shots, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, 0, 0, 0, ?, ?)",
            params![
                id,
                request.name.trim(),
                request.story_type_id,
                request.source_content,
                request.source_type.as_str(),
                status.as_str(),
                format_ts(&now),
                format_ts(&now),
            ],
        )?;

        Ok(Story {
            id,
            name: request.name.trim().to_string(),
            story_type_id: request.story_type_id,
            source_content: request.source_content,
            source_type: request.source_type,
            status,
            progress: 0,
            narrative: None,
            total_scenes: 0,
            total_shots: 0,
            final_video_url: None,
            captioned_video_url: None,
            subtitles: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    fn get_story(&self, id: &str) -> Result<Option<Story>, StoryError> {
        let conn = self.lock()?;
        Self::query_story(&conn, id)
    }

    fn list_stories(&self, filter: &StoryFilter) -> Result<Vec<Story>, StoryError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let order_by = match filter.order {
            StoryOrder::NewestFirst => "created_at DESC",
            StoryOrder::LeastRecentlyUpdated => "updated_at ASC, created_at ASC",
        };
        let sql = format!(
            "SELECT {} FROM stories {} ORDER BY {} LIMIT ? OFFSET ?",
            STORY_COLUMNS, where_clause, order_by
        );

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_story)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_stories(&self, filter: &StoryFilter) -> Result<i64, StoryError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM stories {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }

    fn transition_story(
        &self,
        id: &str,
        from: StoryStatus,
        to: StoryStatus,
        update: StoryUpdate,
    ) -> Result<Story, StoryError> {
        if !from.can_transition_to(to) {
            return Err(StoryError::InvalidTransition {
                story_id: id.to_string(),
                from,
                to,
            });
        }

        let conn = self.lock()?;

        let mut sets = vec!["status = ?", "updated_at = ?"];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(to.as_str()),
            Box::new(format_ts(&Utc::now())),
        ];
        Self::push_story_update(&update, &mut sets, &mut values);
        values.push(Box::new(id.to_string()));
        values.push(Box::new(from.as_str()));

        let sql = format!(
            "UPDATE stories SET {} WHERE id = ? AND status = ?",
            sets.join(", ")
        );
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, param_refs.as_slice())?;

        if changed == 0 {
            return match Self::query_story(&conn, id)? {
                Some(_) => Err(StoryError::Conflict {
                    kind: "story",
                    id: id.to_string(),
                    expected: format!("status={}", from),
                }),
                None => Err(StoryError::story_not_found(id)),
            };
        }

        Self::query_story(&conn, id)?.ok_or_else(|| StoryError::story_not_found(id))
    }

    fn update_story(&self, id: &str, update: StoryUpdate) -> Result<Story, StoryError> {
        let conn = self.lock()?;

        let mut sets = vec!["updated_at = ?"];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(format_ts(&Utc::now()))];
        Self::push_story_update(&update, &mut sets, &mut values);
        values.push(Box::new(id.to_string()));

        let sql = format!("UPDATE stories SET {} WHERE id = ?", sets.join(", "));
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();

        if conn.execute(&sql, param_refs.as_slice())? == 0 {
            return Err(StoryError::story_not_found(id));
        }

        Self::query_story(&conn, id)?.ok_or_else(|| StoryError::story_not_found(id))
    }

    fn delete_story(&self, id: &str) -> Result<Story, StoryError> {
        let mut conn = self.lock()?;
        let story = Self::query_story(&conn, id)?.ok_or_else(|| StoryError::story_not_found(id))?;

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM shots WHERE story_id = ?", params![id])?;
        tx.execute("DELETE FROM scenes WHERE story_id = ?", params![id])?;
        tx.execute("DELETE FROM stories WHERE id = ?", params![id])?;
        tx.commit()?;

        Ok(story)
    }

    fn insert_scenes(
        &self,
        story_id: &str,
        drafts: &[SceneDraft],
    ) -> Result<(Vec<Scene>, Vec<Shot>), StoryError> {
        let mut conn = self.lock()?;

        if Self::query_story(&conn, story_id)?.is_none() {
            return Err(StoryError::story_not_found(story_id));
        }

        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM scenes WHERE story_id = ?",
            params![story_id],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(StoryError::Conflict {
                kind: "story",
                id: story_id.to_string(),
                expected: "no scenes".to_string(),
            });
        }

        let now = Utc::now();
        let now_str = format_ts(&now);
        let mut scenes = Vec::with_capacity(drafts.len());
        let mut shots = Vec::new();

        let tx = conn.transaction()?;
        for (scene_idx, draft) in drafts.iter().enumerate() {
            let scene_order = scene_idx as u32;
            let scene = Scene {
                id: uuid::Uuid::new_v4().to_string(),
                story_id: story_id.to_string(),
                name: draft.name.clone(),
                sort_order: scene_order,
                status: ResourceStatus::Pending,
                video_url: None,
            };
            tx.execute(
                "INSERT INTO scenes (id, story_id, name, sort_order, status, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    scene.id,
                    scene.story_id,
                    scene.name,
                    scene.sort_order,
                    scene.status.as_str(),
                    now_str,
                ],
            )?;

            for (shot_idx, shot_draft) in draft.shots.iter().enumerate() {
                let shot = Shot {
                    id: uuid::Uuid::new_v4().to_string(),
                    story_id: story_id.to_string(),
                    scene_id: scene.id.clone(),
                    name: shot_draft.name.clone(),
                    script: shot_draft.script.clone(),
                    scene_order,
                    sort_order: shot_idx as u32,
                    image_status: ResourceStatus::Pending,
                    audio_status: ResourceStatus::Pending,
                    video_status: ResourceStatus::Pending,
                    final_status: ResourceStatus::Pending,
                    image_url: None,
                    audio_url: None,
                    video_url: None,
                    final_url: None,
                    error_message: None,
                    updated_at: now,
                };
                tx.execute(
                    "INSERT INTO shots (id, story_id, scene_id, name, script, scene_order, sort_order, image_status, audio_status, video_status, final_status, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', 'pending', 'pending', 'pending', ?)",
                    params![
                        shot.id,
                        shot.story_id,
                        shot.scene_id,
                        shot.name,
                        shot.script,
                        shot.scene_order,
                        shot.sort_order,
                        now_str,
                    ],
                )?;
                shots.push(shot);
            }

            scenes.push(scene);
        }

        tx.execute(
            "UPDATE stories SET total_scenes = ?, total_shots = ?, updated_at = ? WHERE id = ?",
            params![scenes.len() as u32, shots.len() as u32, now_str, story_id],
        )?;
        tx.commit()?;

        Ok((scenes, shots))
    }

    fn get_scenes_by_story(&self, story_id: &str) -> Result<Vec<Scene>, StoryError> {
        let conn = self.lock()?;
        Self::query_scenes(&conn, story_id)
    }

    fn update_scene(&self, scene_id: &str, update: SceneUpdate) -> Result<Scene, StoryError> {
        let conn = self.lock()?;

        let mut sets = vec!["updated_at = ?"];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(format_ts(&Utc::now()))];
        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(url) = update.video_url {
            sets.push("video_url = ?");
            values.push(Box::new(url));
        }
        values.push(Box::new(scene_id.to_string()));

        let sql = format!("UPDATE scenes SET {} WHERE id = ?", sets.join(", "));
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();

        if conn.execute(&sql, param_refs.as_slice())? == 0 {
            return Err(StoryError::scene_not_found(scene_id));
        }

        Self::query_scene(&conn, scene_id)?.ok_or_else(|| StoryError::scene_not_found(scene_id))
    }

    fn get_shots_by_story(&self, story_id: &str) -> Result<Vec<Shot>, StoryError> {
        let conn = self.lock()?;
        Self::query_shots(&conn, story_id)
    }

    fn get_shot(&self, id: &str) -> Result<Option<Shot>, StoryError> {
        let conn = self.lock()?;
        Self::query_shot(&conn, id)
    }

    fn update_shot(
        &self,
        id: &str,
        update: ShotUpdate,
        expected: Option<&ShotExpectation>,
    ) -> Result<Shot, StoryError> {
        let conn = self.lock()?;

        let mut sets = vec!["updated_at = ?".to_string()];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(format_ts(&Utc::now()))];

        for (field, status) in &update.statuses {
            sets.push(format!("{} = ?", field.status_column()));
            values.push(Box::new(status.as_str()));
        }
        for (field, url) in &update.urls {
            sets.push(format!("{} = ?", field.url_column()));
            values.push(Box::new(url.clone()));
        }
        if let Some(ref message) = update.error_message {
            sets.push("error_message = ?".to_string());
            values.push(Box::new(message.clone()));
        }

        let mut conditions = vec!["id = ?".to_string()];
        values.push(Box::new(id.to_string()));
        if let Some(expected) = expected {
            for (field, status) in &expected.fields {
                conditions.push(format!("{} = ?", field.status_column()));
                values.push(Box::new(status.as_str()));
            }
        }

        let sql = format!(
            "UPDATE shots SET {} WHERE {}",
            sets.join(", "),
            conditions.join(" AND ")
        );
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, param_refs.as_slice())?;

        if changed == 0 {
            return match Self::query_shot(&conn, id)? {
                Some(_) => Err(StoryError::Conflict {
                    kind: "shot",
                    id: id.to_string(),
                    expected: expected.map(|e| e.describe()).unwrap_or_default(),
                }),
                None => Err(StoryError::shot_not_found(id)),
            };
        }

        Self::query_shot(&conn, id)?.ok_or_else(|| StoryError::shot_not_found(id))
    }

    fn calculate_progress(&self, story_id: &str) -> Result<ProgressSnapshot, StoryError> {
        let conn = self.lock()?;

        let (total, completed): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), SUM(CASE WHEN final_status = 'completed' THEN 1 ELSE 0 END) FROM shots WHERE story_id = ?",
            params![story_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(ProgressSnapshot::from_counts(
            completed.unwrap_or(0) as u32,
            total as u32,
        ))
    }

    fn reset_stale_shots(&self, cutoff: DateTime<Utc>) -> Result<Vec<StaleShotReset>, StoryError> {
        let conn = self.lock()?;
        let cutoff_str = format_ts(&cutoff);

        let sql = format!(
            "SELECT {} FROM shots WHERE updated_at < ? AND (image_status = 'processing' OR audio_status = 'processing' OR video_status = 'processing' OR final_status = 'processing')",
            SHOT_COLUMNS
        );
        let stale: Vec<Shot> = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![cutoff_str], Self::row_to_shot)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let now_str = format_ts(&Utc::now());
        let mut resets = Vec::new();

        // One statement per shot: every processing field goes back to pending
        // together, and a worker that wrote since the scan keeps its result.
        let resets_sql = {
            let cases: Vec<String> = ShotField::ALL
                .iter()
                .map(|field| {
                    format!(
                        "{col} = CASE WHEN {col} = 'processing' THEN 'pending' ELSE {col} END",
                        col = field.status_column()
                    )
                })
                .collect();
            format!(
                "UPDATE shots SET {}, updated_at = ? WHERE id = ? AND updated_at < ?",
                cases.join(", ")
            )
        };

        for shot in stale {
            let fields: Vec<ShotField> = ShotField::ALL
                .into_iter()
                .filter(|field| shot.status(*field) == ResourceStatus::Processing)
                .collect();
            if fields.is_empty() {
                continue;
            }

            if conn.execute(&resets_sql, params![now_str, shot.id, cutoff_str])? > 0 {
                resets.push(StaleShotReset {
                    story_id: shot.story_id,
                    shot_id: shot.id,
                    fields,
                });
            }
        }

        Ok(resets)
    }

    fn list_stale_stories(&self, cutoff: DateTime<Utc>) -> Result<Vec<Story>, StoryError> {
        let conn = self.lock()?;

        let placeholders = vec!["?"; StoryStatus::CLAIMED.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM stories WHERE status IN ({}) AND updated_at < ? ORDER BY updated_at ASC",
            STORY_COLUMNS, placeholders
        );

        let mut values: Vec<Box<dyn rusqlite::ToSql>> = StoryStatus::CLAIMED
            .iter()
            .map(|s| Box::new(s.as_str()) as Box<dyn rusqlite::ToSql>)
            .collect();
        values.push(Box::new(format_ts(&cutoff)));
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_story)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
