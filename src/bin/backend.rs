#![forbid(unsafe_code)]

//! Axum backend serving the CourseCast catalog: courses, lessons, and the
//! short-video feed.
//!
//! Lesson video lives with third-party providers; this process only serves
//! the SQLite catalog, locally stored thumbnails, and the built SPA. At
//! read time every lesson and feed item gets its stored link run through the
//! embed normalizer so the frontend receives either an iframe-ready URL or
//! the static fallback (thumbnail plus external link).

use std::{
    collections::HashMap,
    fs,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, State},
    http::{HeaderMap, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use coursecast_tools::catalog::{CatalogReader, CourseRecord, FeedItemRecord, LessonRecord};
#[cfg(test)]
use coursecast_tools::catalog::CatalogStore;
use coursecast_tools::config::{
    DEFAULT_ENV_PATH, RuntimeOverrides, read_env_file, resolve_runtime_paths,
};
use coursecast_tools::embed::normalize_embed_url;
use coursecast_tools::security::{ensure_not_root, is_safe_path_segment};
use mime_guess::MimeGuess;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;

const THUMBNAILS_SUBDIR: &str = "thumbnails";
const CATALOG_DB_FILE: &str = "catalog.db";
const SETTINGS_FILE: &str = "platform_settings.json";

#[derive(Debug, Clone)]
struct BackendArgs {
    catalog_root: PathBuf,
    www_root: PathBuf,
    port: u16,
    listen_host: IpAddr,
}

impl BackendArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut catalog_root_override: Option<PathBuf> = None;
        let mut www_root_override: Option<PathBuf> = None;
        let mut port_override: Option<u16> = None;
        let mut host_override: Option<IpAddr> = None;
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--catalog-root=") {
                catalog_root_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--www-root=") {
                www_root_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                port_override = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--host=") {
                host_override = Some(parse_host_arg(value)?);
                continue;
            }

            match arg.as_str() {
                "--catalog-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--catalog-root requires a value"))?;
                    catalog_root_override = Some(PathBuf::from(value));
                }
                "--www-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--www-root requires a value"))?;
                    www_root_override = Some(PathBuf::from(value));
                }
                "--port" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    port_override = Some(parse_port_arg(&value)?);
                }
                "--host" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--host requires a value"))?;
                    host_override = Some(parse_host_arg(&value)?);
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let runtime_paths = resolve_runtime_paths(RuntimeOverrides {
            catalog_root: catalog_root_override.clone(),
            www_root: www_root_override.clone(),
            ..RuntimeOverrides::default()
        })?;
        let runtime_host = parse_host_arg(&runtime_paths.host)?;
        let catalog_root = catalog_root_override.unwrap_or(runtime_paths.catalog_root);
        let www_root = www_root_override.unwrap_or(runtime_paths.www_root);
        let port = port_override.unwrap_or(runtime_paths.port);
        let listen_host = host_override.unwrap_or(runtime_host);

        Ok(Self {
            catalog_root,
            www_root,
            port,
            listen_host,
        })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/COURSECAST_HOST")
}

/// What the API does with catalog entries whose stored link yields no embed.
///
/// Lessons always render the fallback card; this switch only governs the
/// short-video feed, where a non-playable tile is worse than no tile.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum NonEmbeddableBehavior {
    Fallback,
    Hide,
}

impl NonEmbeddableBehavior {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fallback" | "thumbnail" | "show" => Some(Self::Fallback),
            "hide" | "skip" => Some(Self::Hide),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformSettings {
    non_embeddable_behavior: NonEmbeddableBehavior,
}

impl PlatformSettings {
    fn from_env(file_vars: &HashMap<String, String>) -> Self {
        let raw = env_or_file_value("COURSECAST_NON_EMBEDDABLE", file_vars);
        let non_embeddable_behavior = raw
            .as_deref()
            .and_then(NonEmbeddableBehavior::parse)
            .unwrap_or(NonEmbeddableBehavior::Fallback);

        Self {
            non_embeddable_behavior,
        }
    }
}

struct SettingsStore {
    path: PathBuf,
    current: RwLock<PlatformSettings>,
}

impl SettingsStore {
    fn load(catalog_root: &Path, defaults: PlatformSettings) -> Self {
        let path = catalog_root.join(SETTINGS_FILE);
        let current = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or(defaults),
            Err(_) => defaults,
        };

        Self {
            path,
            current: RwLock::new(current),
        }
    }

    fn get(&self) -> PlatformSettings {
        self.current.read().clone()
    }

    fn update(&self, settings: PlatformSettings) -> Result<PlatformSettings> {
        write_json_atomic(&self.path, &settings)?;
        *self.current.write() = settings.clone();
        Ok(settings)
    }
}

/// Shared state injected into every Axum handler.
///
/// * `reader` wraps the SQLite catalog.
/// * `cache` memoizes list/detail queries until `data_version` moves.
/// * `files` knows where thumbnail fallbacks live on disk.
#[derive(Clone)]
struct AppState {
    reader: Arc<CatalogReader>,
    cache: Arc<ApiCache>,
    files: Arc<FilePaths>,
    www_root: Arc<PathBuf>,
    settings: Arc<SettingsStore>,
}

/// Small in-memory cache so the hot catalog endpoints do not re-query SQLite
/// on every request. An import bumps SQLite's `data_version`, which clears
/// everything on the next request.
struct ApiCache {
    courses: RwLock<Option<Vec<CourseRecord>>>,
    course_lessons: RwLock<HashMap<String, Vec<LessonRecord>>>,
    lesson_details: RwLock<HashMap<String, LessonRecord>>,
    feed: RwLock<Option<Vec<FeedItemRecord>>>,
    bootstrap: RwLock<Option<Arc<BootstrapPayload>>>,
    last_db_version: RwLock<Option<i64>>,
}

impl ApiCache {
    fn new() -> Self {
        Self {
            courses: RwLock::new(None),
            course_lessons: RwLock::new(HashMap::new()),
            lesson_details: RwLock::new(HashMap::new()),
            feed: RwLock::new(None),
            bootstrap: RwLock::new(None),
            last_db_version: RwLock::new(None),
        }
    }

    fn clear(&self) {
        self.courses.write().take();
        self.course_lessons.write().clear();
        self.lesson_details.write().clear();
        self.feed.write().take();
        self.bootstrap.write().take();
    }
}

/// Materialized file-system locations used at runtime.
struct FilePaths {
    thumbnails: PathBuf,
}

impl FilePaths {
    fn new(catalog_root: &Path) -> Self {
        Self {
            thumbnails: catalog_root.join(THUMBNAILS_SUBDIR),
        }
    }
}

#[cfg(test)]
impl FilePaths {
    fn for_base(path: &Path) -> Self {
        let paths = Self::new(path);
        std::fs::create_dir_all(&paths.thumbnails).unwrap();
        paths
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, headers, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    let BackendArgs {
        catalog_root,
        www_root,
        port,
        listen_host,
    } = BackendArgs::parse()?;

    ensure_not_root("backend")?;

    // Environment variables win over .env values even after arg resolution so
    // a service unit can pin the listen address without touching files.
    let port = std::env::var("COURSECAST_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(port);

    let host = match std::env::var("COURSECAST_HOST") {
        Ok(value) if !value.trim().is_empty() => parse_host_arg(value.trim())?,
        _ => listen_host,
    };

    let catalog_path = catalog_root.join(CATALOG_DB_FILE);
    let reader = CatalogReader::new(&catalog_path)
        .await
        .context("initializing catalog reader")?;

    let env_vars = read_env_file(Path::new(DEFAULT_ENV_PATH)).unwrap_or_default();
    let settings_defaults = PlatformSettings::from_env(&env_vars);
    let settings_store = Arc::new(SettingsStore::load(&catalog_root, settings_defaults));

    let state = AppState {
        reader: Arc::new(reader),
        cache: Arc::new(ApiCache::new()),
        files: Arc::new(FilePaths::new(&catalog_root)),
        www_root: Arc::new(www_root),
        settings: settings_store,
    };

    let app = Router::new()
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/bootstrap", get(bootstrap))
        .route("/api/courses", get(list_courses))
        .route("/api/courses/{id}", get(get_course))
        .route("/api/courses/{id}/lessons", get(list_course_lessons))
        .route("/api/lessons/{id}", get(get_lesson))
        .route("/api/feed", get(list_feed))
        .route("/api/feed/{id}", get(get_feed_item))
        .route(
            "/api/thumbnails/{id}/{file}",
            get(download_thumbnail_route),
        )
        .fallback(static_fallback)
        .with_state(state);

    let addr = SocketAddr::new(host, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    println!("Catalog API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running catalog API")?;

    Ok(())
}

async fn shutdown_signal() {
    // Only graceful shutdown is affected if the handler cannot be installed;
    // the process still terminates when Ctrl+C fires.
    if let Err(err) = signal::ctrl_c().await {
        eprintln!("Failed to install Ctrl+C handler: {}", err);
    }
}

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("endpoint not found").into_response();
    }

    match serve_www_path(&state.www_root, path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<PlatformSettings>> {
    Ok(Json(state.settings.get()))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(payload): Json<PlatformSettings>,
) -> ApiResult<Json<PlatformSettings>> {
    let updated = state
        .settings
        .update(payload)
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(updated))
}

async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;
    let metadata = tokio::fs::metadata(&target).await;

    match metadata {
        Ok(meta) if meta.is_dir() => {
            let index = root.join("index.html");
            stream_file(index).await
        }
        Ok(_) => stream_file(target).await,
        Err(_) => {
            if should_fallback_to_index(request_path) {
                let index = root.join("index.html");
                stream_file(index).await
            } else {
                Err(ApiError::not_found("file not found"))
            }
        }
    }
}

fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

/// SPA routes like `/courses/rust-basics` have no extension and fall back to
/// `index.html`; asset requests with an extension 404 honestly.
fn should_fallback_to_index(request_path: &str) -> bool {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return true;
    }
    Path::new(trimmed).extension().is_none()
}

async fn bootstrap(State(state): State<AppState>) -> ApiResult<Json<BootstrapPayload>> {
    let payload = state.get_bootstrap().await?;
    let behavior = state.settings.get().non_embeddable_behavior;
    let mut response = (*payload).clone();
    response.feed = apply_feed_behavior(response.feed, behavior);
    Ok(Json(response))
}

async fn list_courses(State(state): State<AppState>) -> ApiResult<Json<Vec<CourseRecord>>> {
    let courses = state.get_courses().await?;
    Ok(Json(courses))
}

async fn get_course(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<CourseRecord>> {
    let record = state.get_course(&id).await?;
    Ok(Json(record))
}

async fn list_course_lessons(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<Vec<LessonView>>> {
    // Courses with an empty outline still answer with an empty list, but an
    // unknown course id is a 404.
    state.get_course(&id).await?;
    let lessons = state.get_course_lessons(&id).await?;
    Ok(Json(lessons.iter().map(lesson_view).collect()))
}

async fn get_lesson(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<LessonView>> {
    let record = state.get_lesson(&id).await?;
    Ok(Json(lesson_view(&record)))
}

async fn list_feed(State(state): State<AppState>) -> ApiResult<Json<Vec<FeedItemView>>> {
    let items = state.get_feed().await?;
    let behavior = state.settings.get().non_embeddable_behavior;
    let views = apply_feed_behavior(items.iter().map(feed_item_view).collect(), behavior);
    Ok(Json(views))
}

async fn get_feed_item(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<FeedItemView>> {
    let items = state.get_feed().await?;
    let record = items
        .iter()
        .find(|item| item.item_id == id)
        .ok_or_else(|| ApiError::not_found("feed item not found"))?;

    let view = feed_item_view(record);
    if view.embed_url.is_none()
        && state.settings.get().non_embeddable_behavior == NonEmbeddableBehavior::Hide
    {
        return Err(ApiError::not_found("feed item not found"));
    }
    Ok(Json(view))
}

async fn download_thumbnail_route(
    State(state): State<AppState>,
    AxumPath((id, file)): AxumPath<(String, String)>,
) -> ApiResult<Response> {
    download_thumbnail(state, id, file).await
}

async fn download_thumbnail(state: AppState, id: String, file: String) -> ApiResult<Response> {
    ensure_safe_segment(&id)?;
    ensure_safe_segment(&file)?;
    let path = state.files.thumbnails.join(&id).join(&file);
    stream_file(path).await
}

/// A lesson as the frontend consumes it: stored metadata plus either an
/// iframe-ready `embed_url` or the static fallback presentation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LessonView {
    lesson_id: String,
    course_id: String,
    position: i64,
    title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    embed_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<FallbackView>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedItemView {
    item_id: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    published_at: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    embed_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<FallbackView>,
}

/// Rendered when no embed could be derived: a locally served thumbnail plus
/// the author's original link for direct navigation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FallbackView {
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_url: Option<String>,
}

/// Payload returned by `/api/bootstrap` so the SPA can hydrate in one call.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapPayload {
    courses: Vec<CourseRecord>,
    lessons: Vec<LessonView>,
    feed: Vec<FeedItemView>,
}

fn lesson_view(record: &LessonRecord) -> LessonView {
    let embed_url = normalize_embed_url(record.video_url.as_deref());
    let fallback = embed_url.is_none().then(|| FallbackView {
        thumbnail_url: thumbnail_api_url(&record.lesson_id, record.thumbnail_file.as_deref()),
        external_url: record.video_url.clone(),
    });

    LessonView {
        lesson_id: record.lesson_id.clone(),
        course_id: record.course_id.clone(),
        position: record.position,
        title: record.title.clone(),
        description: record.description.clone(),
        duration: record.duration,
        duration_text: record.duration_text.clone(),
        embed_url,
        fallback,
    }
}

fn feed_item_view(record: &FeedItemRecord) -> FeedItemView {
    let embed_url = normalize_embed_url(record.video_url.as_deref());
    let fallback = embed_url.is_none().then(|| FallbackView {
        thumbnail_url: thumbnail_api_url(&record.item_id, record.thumbnail_file.as_deref()),
        external_url: record.video_url.clone(),
    });

    FeedItemView {
        item_id: record.item_id.clone(),
        title: record.title.clone(),
        author: record.author.clone(),
        published_at: record.published_at.clone(),
        tags: record.tags.clone(),
        embed_url,
        fallback,
    }
}

fn thumbnail_api_url(id: &str, file: Option<&str>) -> Option<String> {
    file.map(|file| format!("/api/thumbnails/{id}/{file}"))
}

fn apply_feed_behavior(
    views: Vec<FeedItemView>,
    behavior: NonEmbeddableBehavior,
) -> Vec<FeedItemView> {
    match behavior {
        NonEmbeddableBehavior::Fallback => views,
        NonEmbeddableBehavior::Hide => views
            .into_iter()
            .filter(|view| view.embed_url.is_some())
            .collect(),
    }
}

impl AppState {
    async fn ensure_fresh_cache(&self) -> ApiResult<()> {
        let version = self
            .reader
            .data_version()
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;

        let mut last = self.cache.last_db_version.write();
        if let Some(previous) = *last
            && version != previous
        {
            self.cache.clear();
        }
        *last = Some(version);
        Ok(())
    }

    /// Returns a cached snapshot with everything the SPA needs to boot. The
    /// feed inside the snapshot is unfiltered; behavior is applied per
    /// request so a settings change never serves a stale shape.
    async fn get_bootstrap(&self) -> ApiResult<Arc<BootstrapPayload>> {
        self.ensure_fresh_cache().await?;
        if let Some(cached) = self.cache.bootstrap.read().clone() {
            return Ok(cached);
        }

        let courses = self
            .reader
            .list_courses()
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;
        let lessons = self
            .reader
            .list_all_lessons()
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;
        let feed = self
            .reader
            .list_feed()
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;

        let payload = BootstrapPayload {
            courses,
            lessons: lessons.iter().map(lesson_view).collect(),
            feed: feed.iter().map(feed_item_view).collect(),
        };

        let payload = Arc::new(payload);
        self.cache.bootstrap.write().replace(payload.clone());
        Ok(payload)
    }

    async fn get_courses(&self) -> ApiResult<Vec<CourseRecord>> {
        self.ensure_fresh_cache().await?;
        if let Some(cached) = self.cache.courses.read().clone() {
            return Ok(cached);
        }

        let records = self
            .reader
            .list_courses()
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;

        self.cache.courses.write().replace(records.clone());
        Ok(records)
    }

    async fn get_course(&self, course_id: &str) -> ApiResult<CourseRecord> {
        let courses = self.get_courses().await?;
        courses
            .into_iter()
            .find(|course| course.course_id == course_id)
            .ok_or_else(|| ApiError::not_found("course not found"))
    }

    /// Lessons of one course, memoized per course id.
    async fn get_course_lessons(&self, course_id: &str) -> ApiResult<Vec<LessonRecord>> {
        self.ensure_fresh_cache().await?;
        if let Some(cached) = self.cache.course_lessons.read().get(course_id).cloned() {
            return Ok(cached);
        }

        let lessons = self
            .reader
            .list_lessons(course_id)
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;

        self.cache
            .course_lessons
            .write()
            .insert(course_id.to_owned(), lessons.clone());

        for lesson in &lessons {
            self.cache
                .lesson_details
                .write()
                .insert(lesson.lesson_id.clone(), lesson.clone());
        }

        Ok(lessons)
    }

    async fn get_lesson(&self, lesson_id: &str) -> ApiResult<LessonRecord> {
        self.ensure_fresh_cache().await?;
        if let Some(record) = self.cache.lesson_details.read().get(lesson_id).cloned() {
            return Ok(record);
        }

        let result = self
            .reader
            .get_lesson(lesson_id)
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;

        let record = result.ok_or_else(|| ApiError::not_found("lesson not found"))?;

        self.cache
            .lesson_details
            .write()
            .insert(lesson_id.to_owned(), record.clone());

        Ok(record)
    }

    async fn get_feed(&self) -> ApiResult<Vec<FeedItemRecord>> {
        self.ensure_fresh_cache().await?;
        if let Some(cached) = self.cache.feed.read().clone() {
            return Ok(cached);
        }

        let items = self
            .reader
            .list_feed()
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;

        self.cache.feed.write().replace(items.clone());
        Ok(items)
    }
}

/// Validates a single dynamic path segment so route parameters never escape
/// their base folder.
fn ensure_safe_segment(value: &str) -> ApiResult<()> {
    if !is_safe_path_segment(value) {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(())
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;

    let guessed = MimeGuess::from_path(&path).first();
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);
    let mut response = body.into_response();
    if let Some(mime) = guessed
        && let Ok(value) = mime.to_string().parse()
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }

    Ok(response)
}

fn env_or_file_value(key: &str, file_vars: &HashMap<String, String>) -> Option<String> {
    std::env::var(key)
        .ok()
        .and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .or_else(|| file_vars.get(key).cloned())
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    let payload = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp_path, payload)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
