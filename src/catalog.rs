//! Catalog persistence layer for CourseCast.
//!
//! Courses, their lessons, and the short-video feed are stored in a local
//! SQLite file under the catalog root. Lesson and feed rows keep the raw
//! `video_url` exactly as the content author supplied it; turning that into
//! an embeddable URL is presentation work done by the backend at read time.

use std::path::Path;

use anyhow::{Context, Result};
use libsql::{Builder, Connection, Row, params};
use serde::{Deserialize, Serialize};

/// A course as listed in the catalog. Lessons are stored separately and
/// joined by `course_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRecord {
    pub course_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_file: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A single lesson inside a course.
///
/// `video_url` is optional because authors sometimes publish lesson shells
/// before the recording exists; the API then serves the thumbnail fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonRecord {
    pub lesson_id: String,
    pub course_id: String,
    #[serde(default)]
    pub position: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_file: Option<String>,
}

/// One entry of the short-video feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItemRecord {
    pub item_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            course_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT DEFAULT '',
            category TEXT,
            instructor TEXT,
            thumbnail_file TEXT,
            tags_json TEXT DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS lessons (
            lesson_id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            title TEXT NOT NULL,
            description TEXT DEFAULT '',
            video_url TEXT,
            duration INTEGER,
            duration_text TEXT,
            thumbnail_file TEXT
        );

        CREATE TABLE IF NOT EXISTS feed_items (
            item_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT,
            video_url TEXT,
            thumbnail_file TEXT,
            published_at TEXT,
            tags_json TEXT DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_lessons_course ON lessons(course_id);
        "#,
    )
    .await?;

    Ok(())
}

/// Write-side wrapper around the catalog DB, used by the importer and by
/// backend tests.
pub struct CatalogStore {
    conn: Connection,
}

impl CatalogStore {
    /// Opens (and if necessary creates) the catalog DB and ensures the
    /// expected schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating catalog directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening catalog DB {}", path.display()))?;

        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    pub async fn upsert_course(&self, record: &CourseRecord) -> Result<()> {
        let tags_json = serde_json::to_string(&record.tags).context("serializing course tags")?;

        self.conn
            .execute(
                r#"
                INSERT INTO courses (
                    course_id, title, description, category, instructor,
                    thumbnail_file, tags_json
                ) VALUES (
                    :course_id, :title, :description, :category, :instructor,
                    :thumbnail_file, :tags_json
                )
                ON CONFLICT(course_id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    category = excluded.category,
                    instructor = excluded.instructor,
                    thumbnail_file = excluded.thumbnail_file,
                    tags_json = excluded.tags_json
                "#,
                params![
                    record.course_id.as_str(),
                    record.title.as_str(),
                    record.description.as_str(),
                    record.category.as_deref(),
                    record.instructor.as_deref(),
                    record.thumbnail_file.as_deref(),
                    tags_json,
                ],
            )
            .await?;

        Ok(())
    }

    pub async fn upsert_lesson(&self, record: &LessonRecord) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO lessons (
                    lesson_id, course_id, position, title, description,
                    video_url, duration, duration_text, thumbnail_file
                ) VALUES (
                    :lesson_id, :course_id, :position, :title, :description,
                    :video_url, :duration, :duration_text, :thumbnail_file
                )
                ON CONFLICT(lesson_id) DO UPDATE SET
                    course_id = excluded.course_id,
                    position = excluded.position,
                    title = excluded.title,
                    description = excluded.description,
                    video_url = excluded.video_url,
                    duration = excluded.duration,
                    duration_text = excluded.duration_text,
                    thumbnail_file = excluded.thumbnail_file
                "#,
                params![
                    record.lesson_id.as_str(),
                    record.course_id.as_str(),
                    record.position,
                    record.title.as_str(),
                    record.description.as_str(),
                    record.video_url.as_deref(),
                    record.duration,
                    record.duration_text.as_deref(),
                    record.thumbnail_file.as_deref(),
                ],
            )
            .await?;

        Ok(())
    }

    /// Replaces every stored lesson for `course_id` in one transaction so a
    /// partially applied import never mixes old and new course outlines.
    pub async fn replace_lessons(&self, course_id: &str, lessons: &[LessonRecord]) -> Result<()> {
        let tx = self.conn.transaction().await?;
        tx.execute(
            "DELETE FROM lessons WHERE course_id = ?1",
            params![course_id],
        )
        .await?;

        for lesson in lessons {
            tx.execute(
                r#"
                INSERT INTO lessons (
                    lesson_id, course_id, position, title, description,
                    video_url, duration, duration_text, thumbnail_file
                ) VALUES (
                    :lesson_id, :course_id, :position, :title, :description,
                    :video_url, :duration, :duration_text, :thumbnail_file
                )
                "#,
                params![
                    lesson.lesson_id.as_str(),
                    lesson.course_id.as_str(),
                    lesson.position,
                    lesson.title.as_str(),
                    lesson.description.as_str(),
                    lesson.video_url.as_deref(),
                    lesson.duration,
                    lesson.duration_text.as_deref(),
                    lesson.thumbnail_file.as_deref(),
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_feed_item(&self, record: &FeedItemRecord) -> Result<()> {
        let tags_json = serde_json::to_string(&record.tags).context("serializing feed tags")?;

        self.conn
            .execute(
                r#"
                INSERT INTO feed_items (
                    item_id, title, author, video_url, thumbnail_file,
                    published_at, tags_json
                ) VALUES (
                    :item_id, :title, :author, :video_url, :thumbnail_file,
                    :published_at, :tags_json
                )
                ON CONFLICT(item_id) DO UPDATE SET
                    title = excluded.title,
                    author = excluded.author,
                    video_url = excluded.video_url,
                    thumbnail_file = excluded.thumbnail_file,
                    published_at = excluded.published_at,
                    tags_json = excluded.tags_json
                "#,
                params![
                    record.item_id.as_str(),
                    record.title.as_str(),
                    record.author.as_deref(),
                    record.video_url.as_deref(),
                    record.thumbnail_file.as_deref(),
                    record.published_at.as_deref(),
                    tags_json,
                ],
            )
            .await?;

        Ok(())
    }
}

/// Read-side handle used by the backend. Cloneable so every Axum handler can
/// share one connection through the app state.
#[derive(Clone)]
pub struct CatalogReader {
    conn: Connection,
}

impl CatalogReader {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new_local(path.as_ref())
            .build()
            .await
            .with_context(|| format!("opening catalog DB {}", path.as_ref().display()))?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    pub async fn list_courses(&self) -> Result<Vec<CourseRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT course_id, title, description, category, instructor,
                       thumbnail_file, tags_json
                FROM courses
                ORDER BY title ASC, rowid ASC
                "#,
            )
            .await?;

        let mut rows = stmt.query(params![]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_course(&row)?);
        }
        Ok(records)
    }

    pub async fn get_course(&self, course_id: &str) -> Result<Option<CourseRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT course_id, title, description, category, instructor,
                       thumbnail_file, tags_json
                FROM courses
                WHERE course_id = ?1
                "#,
            )
            .await?;

        let mut rows = stmt.query([course_id]).await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_course(&row)?))
        } else {
            Ok(None)
        }
    }

    /// Lessons of one course in outline order.
    pub async fn list_lessons(&self, course_id: &str) -> Result<Vec<LessonRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT lesson_id, course_id, position, title, description,
                       video_url, duration, duration_text, thumbnail_file
                FROM lessons
                WHERE course_id = ?1
                ORDER BY position ASC, rowid ASC
                "#,
            )
            .await?;

        let mut rows = stmt.query([course_id]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_lesson(&row)?);
        }
        Ok(records)
    }

    /// Every lesson of every course, used by the bootstrap payload.
    pub async fn list_all_lessons(&self) -> Result<Vec<LessonRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT lesson_id, course_id, position, title, description,
                       video_url, duration, duration_text, thumbnail_file
                FROM lessons
                WHERE course_id IN (SELECT course_id FROM courses)
                ORDER BY course_id ASC, position ASC, rowid ASC
                "#,
            )
            .await?;

        let mut rows = stmt.query(params![]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_lesson(&row)?);
        }
        Ok(records)
    }

    pub async fn get_lesson(&self, lesson_id: &str) -> Result<Option<LessonRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT lesson_id, course_id, position, title, description,
                       video_url, duration, duration_text, thumbnail_file
                FROM lessons
                WHERE lesson_id = ?1
                "#,
            )
            .await?;

        let mut rows = stmt.query([lesson_id]).await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_lesson(&row)?))
        } else {
            Ok(None)
        }
    }

    /// Feed entries, newest first. Items without a publish date sort last so
    /// a missing date never floats to the top of the feed.
    pub async fn list_feed(&self) -> Result<Vec<FeedItemRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT item_id, title, author, video_url, thumbnail_file,
                       published_at, tags_json
                FROM feed_items
                ORDER BY published_at IS NULL, published_at DESC, rowid DESC
                "#,
            )
            .await?;

        let mut rows = stmt.query(params![]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_feed_item(&row)?);
        }
        Ok(records)
    }

    pub async fn get_feed_item(&self, item_id: &str) -> Result<Option<FeedItemRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT item_id, title, author, video_url, thumbnail_file,
                       published_at, tags_json
                FROM feed_items
                WHERE item_id = ?1
                "#,
            )
            .await?;

        let mut rows = stmt.query([item_id]).await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_feed_item(&row)?))
        } else {
            Ok(None)
        }
    }

    /// SQLite bumps `data_version` whenever another connection commits, which
    /// is how the backend notices imports without a restart.
    pub async fn data_version(&self) -> Result<i64> {
        let mut rows = self.conn.query("PRAGMA data_version", params![]).await?;
        let row = rows.next().await?.context("missing data_version row")?;
        Ok(row.get(0)?)
    }
}

fn row_to_course(row: &Row) -> Result<CourseRecord> {
    // Column order must match the SELECT statements above.
    let tags_json: String = row.get(6)?;
    let tags: Vec<String> =
        serde_json::from_str(&tags_json).context("parsing stored course tags JSON")?;

    Ok(CourseRecord {
        course_id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        instructor: row.get(4)?,
        thumbnail_file: row.get(5)?,
        tags,
    })
}

fn row_to_lesson(row: &Row) -> Result<LessonRecord> {
    Ok(LessonRecord {
        lesson_id: row.get(0)?,
        course_id: row.get(1)?,
        position: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        video_url: row.get(5)?,
        duration: row.get(6)?,
        duration_text: row.get(7)?,
        thumbnail_file: row.get(8)?,
    })
}

fn row_to_feed_item(row: &Row) -> Result<FeedItemRecord> {
    let tags_json: String = row.get(6)?;
    let tags: Vec<String> =
        serde_json::from_str(&tags_json).context("parsing stored feed tags JSON")?;

    Ok(FeedItemRecord {
        item_id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        video_url: row.get(3)?,
        thumbnail_file: row.get(4)?,
        published_at: row.get(5)?,
        tags,
    })
}
