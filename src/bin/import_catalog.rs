#![forbid(unsafe_code)]

//! Command-line helper that loads a JSON content seed into the catalog DB
//! the backend serves.
//!
//! Content teams author courses, lessons, and feed clips as a single JSON
//! file; this binary validates it, normalizes publish dates, and upserts
//! everything. Video links are checked against the embed normalizer so
//! non-embeddable links are called out at import time. They are imported
//! anyway; the backend renders the thumbnail fallback for those.

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use coursecast_tools::catalog::{CatalogStore, CourseRecord, FeedItemRecord, LessonRecord};
use coursecast_tools::config::load_runtime_paths;
use coursecast_tools::embed::normalize_embed_url;
use coursecast_tools::security::{ensure_not_root, is_safe_path_segment};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

const CATALOG_DB_FILE: &str = "catalog.db";

#[derive(Debug, Clone)]
struct ImportArgs {
    catalog_root: PathBuf,
    input: PathBuf,
    replace_lessons: bool,
}

impl ImportArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    #[cfg(test)]
    fn from_slice(values: &[&str]) -> Result<Self> {
        Self::from_iter(values.iter().map(|value| value.to_string()))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut catalog_root_override: Option<PathBuf> = None;
        let mut input: Option<PathBuf> = None;
        let mut replace_lessons = false;
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--catalog-root=") {
                catalog_root_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--input=") {
                input = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--catalog-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--catalog-root requires a value"))?;
                    catalog_root_override = Some(PathBuf::from(value));
                }
                "--input" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--input requires a value"))?;
                    input = Some(PathBuf::from(value));
                }
                "--replace-lessons" => replace_lessons = true,
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let catalog_root = match catalog_root_override {
            Some(root) => root,
            None => load_runtime_paths()?.catalog_root,
        };
        let input = input.ok_or_else(|| anyhow!("--input <seed.json> is required"))?;

        Ok(Self {
            catalog_root,
            input,
            replace_lessons,
        })
    }
}

/// On-disk seed format. Lessons live nested under their course and receive
/// their outline position from array order.
#[derive(Debug, Deserialize)]
struct CatalogSeed {
    #[serde(default)]
    courses: Vec<SeedCourse>,
    #[serde(default)]
    feed: Vec<FeedItemRecord>,
}

#[derive(Debug, Deserialize)]
struct SeedCourse {
    course_id: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    instructor: Option<String>,
    #[serde(default)]
    thumbnail_file: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    lessons: Vec<SeedLesson>,
}

#[derive(Debug, Deserialize)]
struct SeedLesson {
    lesson_id: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    duration_text: Option<String>,
    #[serde(default)]
    thumbnail_file: Option<String>,
}

#[derive(Debug, Default)]
struct ImportSummary {
    courses: usize,
    lessons: usize,
    feed_items: usize,
    non_embeddable: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    ensure_not_root("import_catalog")?;

    let args = ImportArgs::parse()?;

    println!("===================================");
    println!("CourseCast Catalog Import");
    println!("===================================");
    println!("Seed file: {}", args.input.display());
    println!("Catalog root: {}", args.catalog_root.display());
    println!();

    let summary = run_import(&args).await?;

    println!();
    println!(
        "Imported {} courses, {} lessons, {} feed items.",
        summary.courses, summary.lessons, summary.feed_items
    );
    if summary.non_embeddable.is_empty() {
        println!("All imported video links are embeddable.");
    } else {
        println!(
            "{} entries have no embeddable video link and will render the thumbnail fallback:",
            summary.non_embeddable.len()
        );
        for id in &summary.non_embeddable {
            println!("  - {id}");
        }
    }

    Ok(())
}

async fn run_import(args: &ImportArgs) -> Result<ImportSummary> {
    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("reading seed file {}", args.input.display()))?;
    let seed: CatalogSeed = serde_json::from_str(&raw)
        .with_context(|| format!("parsing seed file {}", args.input.display()))?;

    // Validate everything before the first write so a bad entry cannot leave
    // the catalog half-imported.
    for course in &seed.courses {
        validate_course(course)?;
    }
    for item in &seed.feed {
        validate_feed_item(item)?;
    }

    let store = CatalogStore::open(&args.catalog_root.join(CATALOG_DB_FILE))
        .await
        .context("initializing catalog database")?;

    let mut summary = ImportSummary::default();

    for course in &seed.courses {
        let (record, lessons) = materialize_course(course);
        store.upsert_course(&record).await?;
        summary.courses += 1;

        for lesson in &lessons {
            if lesson.video_url.is_some()
                && normalize_embed_url(lesson.video_url.as_deref()).is_none()
            {
                summary
                    .non_embeddable
                    .push(format!("lesson {}", lesson.lesson_id));
            }
        }

        if args.replace_lessons {
            store.replace_lessons(&record.course_id, &lessons).await?;
        } else {
            for lesson in &lessons {
                store.upsert_lesson(lesson).await?;
            }
        }
        summary.lessons += lessons.len();
        println!(
            "  {} ({} lessons)",
            record.course_id,
            lessons.len()
        );
    }

    for item in &seed.feed {
        let record = materialize_feed_item(item);
        if record.video_url.is_some()
            && normalize_embed_url(record.video_url.as_deref()).is_none()
        {
            summary
                .non_embeddable
                .push(format!("feed item {}", record.item_id));
        }
        store.upsert_feed_item(&record).await?;
        summary.feed_items += 1;
    }

    Ok(summary)
}

fn validate_course(course: &SeedCourse) -> Result<()> {
    if !is_safe_path_segment(&course.course_id) {
        bail!("course id {:?} is not a valid identifier", course.course_id);
    }
    if course.title.trim().is_empty() {
        bail!("course {} has an empty title", course.course_id);
    }
    if let Some(file) = &course.thumbnail_file
        && !is_safe_path_segment(file)
    {
        bail!("course {} has an unsafe thumbnail file name", course.course_id);
    }

    for lesson in &course.lessons {
        if !is_safe_path_segment(&lesson.lesson_id) {
            bail!("lesson id {:?} is not a valid identifier", lesson.lesson_id);
        }
        if lesson.title.trim().is_empty() {
            bail!("lesson {} has an empty title", lesson.lesson_id);
        }
        if let Some(file) = &lesson.thumbnail_file
            && !is_safe_path_segment(file)
        {
            bail!("lesson {} has an unsafe thumbnail file name", lesson.lesson_id);
        }
    }

    Ok(())
}

fn validate_feed_item(item: &FeedItemRecord) -> Result<()> {
    if !is_safe_path_segment(&item.item_id) {
        bail!("feed item id {:?} is not a valid identifier", item.item_id);
    }
    if item.title.trim().is_empty() {
        bail!("feed item {} has an empty title", item.item_id);
    }
    if let Some(file) = &item.thumbnail_file
        && !is_safe_path_segment(file)
    {
        bail!("feed item {} has an unsafe thumbnail file name", item.item_id);
    }
    Ok(())
}

fn materialize_course(seed: &SeedCourse) -> (CourseRecord, Vec<LessonRecord>) {
    let record = CourseRecord {
        course_id: seed.course_id.clone(),
        title: seed.title.clone(),
        description: seed.description.clone(),
        category: seed.category.clone(),
        instructor: seed.instructor.clone(),
        thumbnail_file: seed.thumbnail_file.clone(),
        tags: seed.tags.clone(),
    };

    let lessons = seed
        .lessons
        .iter()
        .enumerate()
        .map(|(index, lesson)| LessonRecord {
            lesson_id: lesson.lesson_id.clone(),
            course_id: seed.course_id.clone(),
            position: index as i64 + 1,
            title: lesson.title.clone(),
            description: lesson.description.clone(),
            video_url: lesson.video_url.clone(),
            duration: lesson.duration,
            duration_text: lesson
                .duration_text
                .clone()
                .or_else(|| lesson.duration.map(format_duration)),
            thumbnail_file: lesson.thumbnail_file.clone(),
        })
        .collect();

    (record, lessons)
}

fn materialize_feed_item(item: &FeedItemRecord) -> FeedItemRecord {
    let mut record = item.clone();
    record.published_at = item.published_at.as_deref().and_then(|raw| {
        let normalized = normalize_published_at(raw);
        if normalized.is_none() {
            eprintln!(
                "feed item {}: ignoring unparseable publish date {raw:?}",
                item.item_id
            );
        }
        normalized
    });
    record
}

/// Parses known absolute time strings into ISO-8601. Anything else is
/// dropped so the feed never sorts on a malformed date.
fn normalize_published_at(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(datetime) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(datetime.to_rfc3339());
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(format!("{}Z", naive.format("%Y-%m-%dT%H:%M:%S")));
    }

    None
}

/// Renders durations as `H:MM:SS` or `M:SS` for short clips.
fn format_duration(duration: i64) -> String {
    let hours = duration / 3600;
    let minutes = (duration % 3600) / 60;
    let seconds = duration % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursecast_tools::catalog::CatalogReader;
    use tempfile::tempdir;

    fn write_seed(dir: &std::path::Path, contents: &str) -> PathBuf {
        let path = dir.join("seed.json");
        fs::write(&path, contents).unwrap();
        path
    }

    fn args_for(dir: &std::path::Path, input: PathBuf) -> ImportArgs {
        ImportArgs {
            catalog_root: dir.to_path_buf(),
            input,
            replace_lessons: false,
        }
    }

    const SAMPLE_SEED: &str = r#"{
        "courses": [
            {
                "course_id": "rust-basics",
                "title": "Rust Basics",
                "category": "development",
                "lessons": [
                    {
                        "lesson_id": "intro",
                        "title": "Introduction",
                        "video_url": "https://www.youtube.com/watch?v=abc123",
                        "duration": 330
                    },
                    {
                        "lesson_id": "ownership",
                        "title": "Ownership",
                        "video_url": "https://example.com/video/2"
                    }
                ]
            }
        ],
        "feed": [
            {
                "item_id": "clip-1",
                "title": "Borrow checker in 60s",
                "video_url": "https://www.tiktok.com/@rustacean/video/987",
                "published_at": "2026-03-01"
            }
        ]
    }"#;

    #[test]
    fn import_args_require_input() {
        let err = ImportArgs::from_slice(&["--catalog-root", "/tmp/catalog"]).unwrap_err();
        assert!(err.to_string().contains("--input"));
    }

    #[test]
    fn import_args_parse_flags() {
        let args = ImportArgs::from_slice(&[
            "--catalog-root=/tmp/catalog",
            "--input=/tmp/seed.json",
            "--replace-lessons",
        ])
        .unwrap();
        assert_eq!(args.catalog_root, PathBuf::from("/tmp/catalog"));
        assert_eq!(args.input, PathBuf::from("/tmp/seed.json"));
        assert!(args.replace_lessons);
    }

    #[test]
    fn import_args_reject_unknown_flag() {
        let err = ImportArgs::from_slice(&["--frobnicate"]).unwrap_err();
        assert!(err.to_string().contains("unknown argument"));
    }

    #[tokio::test]
    async fn import_populates_catalog() {
        let dir = tempdir().unwrap();
        let seed = write_seed(dir.path(), SAMPLE_SEED);
        let args = args_for(dir.path(), seed);

        let summary = run_import(&args).await.unwrap();
        assert_eq!(summary.courses, 1);
        assert_eq!(summary.lessons, 2);
        assert_eq!(summary.feed_items, 1);
        assert_eq!(summary.non_embeddable, vec!["lesson ownership".to_string()]);

        let reader = CatalogReader::new(dir.path().join(CATALOG_DB_FILE))
            .await
            .unwrap();
        let lessons = reader.list_lessons("rust-basics").await.unwrap();
        assert_eq!(lessons.len(), 2);
        assert_eq!(lessons[0].lesson_id, "intro");
        assert_eq!(lessons[0].position, 1);
        assert_eq!(lessons[0].duration_text.as_deref(), Some("5:30"));
        assert_eq!(lessons[1].position, 2);

        let feed = reader.list_feed().await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(
            feed[0].published_at.as_deref(),
            Some("2026-03-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn replace_lessons_drops_stale_entries() {
        let dir = tempdir().unwrap();
        let seed = write_seed(dir.path(), SAMPLE_SEED);
        let mut args = args_for(dir.path(), seed);
        run_import(&args).await.unwrap();

        let trimmed = r#"{
            "courses": [
                {
                    "course_id": "rust-basics",
                    "title": "Rust Basics",
                    "lessons": [
                        { "lesson_id": "intro", "title": "Introduction" }
                    ]
                }
            ]
        }"#;
        args.input = write_seed(dir.path(), trimmed);
        args.replace_lessons = true;
        run_import(&args).await.unwrap();

        let reader = CatalogReader::new(dir.path().join(CATALOG_DB_FILE))
            .await
            .unwrap();
        let lessons = reader.list_lessons("rust-basics").await.unwrap();
        assert_eq!(lessons.len(), 1);
        assert!(reader.get_lesson("ownership").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn import_rejects_unsafe_ids_before_writing() {
        let dir = tempdir().unwrap();
        let seed = write_seed(
            dir.path(),
            r#"{
                "courses": [
                    { "course_id": "../evil", "title": "Nope" }
                ]
            }"#,
        );
        let args = args_for(dir.path(), seed);

        let err = run_import(&args).await.unwrap_err();
        assert!(err.to_string().contains("not a valid identifier"));
        assert!(!dir.path().join(CATALOG_DB_FILE).exists());
    }

    #[tokio::test]
    async fn import_rejects_empty_titles() {
        let dir = tempdir().unwrap();
        let seed = write_seed(
            dir.path(),
            r#"{
                "feed": [
                    { "item_id": "clip-1", "title": "   " }
                ]
            }"#,
        );
        let args = args_for(dir.path(), seed);

        let err = run_import(&args).await.unwrap_err();
        assert!(err.to_string().contains("empty title"));
    }

    #[test]
    fn normalize_published_at_accepts_known_formats() {
        assert_eq!(
            normalize_published_at("2026-03-01").as_deref(),
            Some("2026-03-01T00:00:00Z")
        );
        assert_eq!(
            normalize_published_at("2026-03-01T10:30:00+00:00").as_deref(),
            Some("2026-03-01T10:30:00+00:00")
        );
        assert_eq!(normalize_published_at("three days ago"), None);
        assert_eq!(normalize_published_at("  "), None);
    }

    #[test]
    fn format_duration_renders_both_shapes() {
        assert_eq!(format_duration(90), "1:30");
        assert_eq!(format_duration(3725), "1:02:05");
        assert_eq!(format_duration(5), "0:05");
    }
}
