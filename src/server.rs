//! HTTP front end: serves the page and the per-session JSON API.

use crate::config::Config;
use crate::encoder::SelectedImage;
use crate::error::PosterError;
use crate::gemini::PosterGenerator;
use crate::session::{self, Attempt, PosterState, Session};
use crate::share::{self, SharePayload, ShareOutcome, ShareTarget, SHARE_FILE_NAME};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Sessions untouched for this long are dropped by the sweeper.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

struct SessionEntry {
    session: Arc<Mutex<Session>>,
    /// Milliseconds since `AppState::started` at the last request.
    last_seen_ms: AtomicU64,
}

/// Shared server state.
pub struct AppState {
    sessions: RwLock<HashMap<u64, SessionEntry>>,
    next_id: AtomicU64,
    started: Instant,
    idle_timeout: Duration,
    generator: Arc<dyn PosterGenerator>,
    share_target: Option<Arc<dyn ShareTarget>>,
}

impl AppState {
    pub fn new(
        generator: Arc<dyn PosterGenerator>,
        share_target: Option<Arc<dyn ShareTarget>>,
    ) -> Arc<Self> {
        Self::with_idle_timeout(generator, share_target, DEFAULT_SESSION_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(
        generator: Arc<dyn PosterGenerator>,
        share_target: Option<Arc<dyn ShareTarget>>,
        idle_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            started: Instant::now(),
            idle_timeout,
            generator,
            share_target,
        })
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    async fn insert_session(&self) -> (u64, Arc<Mutex<Session>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Mutex::new(Session::new()));
        let entry = SessionEntry {
            session: Arc::clone(&session),
            last_seen_ms: AtomicU64::new(self.now_ms()),
        };
        self.sessions.write().await.insert(id, entry);
        (id, session)
    }

    /// Looks up a session and marks it as recently used.
    async fn session(&self, id: u64) -> Result<Arc<Mutex<Session>>, PosterError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&id).ok_or(PosterError::UnknownSession(id))?;
        entry.last_seen_ms.store(self.now_ms(), Ordering::Relaxed);
        Ok(Arc::clone(&entry.session))
    }

    /// Drops sessions idle for longer than the timeout, except ones still generating.
    /// Returns how many were removed.
    pub async fn evict_idle(&self) -> usize {
        let now = self.now_ms();
        let timeout = self.idle_timeout.as_millis() as u64;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, entry| {
            let idle = now.saturating_sub(entry.last_seen_ms.load(Ordering::Relaxed));
            let generating = entry
                .session
                .try_lock()
                .map(|session| session.is_loading())
                .unwrap_or(true);
            idle <= timeout || generating
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        evicted
    }
}

/// Periodically evicts idle sessions until the state is dropped elsewhere.
pub fn spawn_session_sweeper(state: Arc<AppState>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            state.evict_idle().await;
        }
    })
}

/// JSON view of a session.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: u64,
    pub prompt: String,
    pub file_name: Option<String>,
    pub preview: Option<String>,
    #[serde(flatten)]
    pub state: PosterState,
}

impl SessionView {
    fn new(id: u64, session: &Session) -> Self {
        Self {
            id,
            prompt: session.prompt().to_string(),
            file_name: session.image().and_then(|image| image.file_name.clone()),
            preview: session.preview().map(str::to_string),
            state: session.state().clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PromptUpdate {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub status: &'static str,
    pub message: Option<&'static str>,
}

impl IntoResponse for PosterError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::UnknownSession(_) => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: Arc<AppState>, config: &Config) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/image", post(upload_image))
        .route("/api/sessions/:id/prompt", put(update_prompt))
        .route("/api/sessions/:id/generate", post(generate))
        .route("/api/sessions/:id/poster", get(poster))
        .route("/api/sessions/:id/share", post(share))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SessionView>) {
    let (id, session) = state.insert_session().await;
    let view = SessionView::new(id, &*session.lock().await);

    tracing::info!(session = id, "session created");
    (StatusCode::CREATED, Json(view))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionView>, PosterError> {
    let session = state.session(id).await?;
    let session = session.lock().await;
    Ok(Json(SessionView::new(id, &session)))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, PosterError> {
    state
        .sessions
        .write()
        .await
        .remove(&id)
        .ok_or(PosterError::UnknownSession(id))?;
    tracing::info!(session = id, "session discarded");
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    mut multipart: Multipart,
) -> Result<Json<SessionView>, PosterError> {
    let session = state.session(id).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PosterError::ImageRead(e.body_text()))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PosterError::ImageRead(e.body_text()))?;

        let image = SelectedImage::new(file_name, content_type.as_deref(), bytes.to_vec());
        tracing::info!(
            session = id,
            mime_type = %image.mime_type,
            size = image.bytes.len(),
            "image selected"
        );

        let mut session = session.lock().await;
        session.select_image(image);
        return Ok(Json(SessionView::new(id, &session)));
    }

    Err(PosterError::InvalidUpload("missing `image` field".into()))
}

async fn update_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(update): Json<PromptUpdate>,
) -> Result<Json<SessionView>, PosterError> {
    let session = state.session(id).await?;
    let mut session = session.lock().await;
    session.set_prompt(update.prompt);
    Ok(Json(SessionView::new(id, &session)))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<(StatusCode, Json<SessionView>), PosterError> {
    let session = state.session(id).await?;

    // The attempt runs on its own task so a dropped request still commits its outcome.
    let attempt = tokio::spawn({
        let session = Arc::clone(&session);
        let generator = Arc::clone(&state.generator);
        async move { session::generate(&session, generator.as_ref()).await }
    })
    .await
    .map_err(|e| {
        tracing::error!(session = id, error = %e, "generation task failed");
        PosterError::Generation
    })?;
    tracing::info!(session = id, ?attempt, "generation attempt finished");

    let status = match attempt {
        Attempt::Busy => StatusCode::CONFLICT,
        _ => StatusCode::OK,
    };
    let session = session.lock().await;
    Ok((status, Json(SessionView::new(id, &session))))
}

async fn poster(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Response, PosterError> {
    let session = state.session(id).await?;
    let session = session.lock().await;

    let Some(result) = session.result() else {
        return Ok((StatusCode::NOT_FOUND, "no poster available").into_response());
    };

    let payload = SharePayload::from_data_url(result)
        .map_err(|e| PosterError::DataUrl(e.to_string()))?;
    let Some(file) = payload.files.into_iter().next() else {
        return Ok((StatusCode::NOT_FOUND, "no poster available").into_response());
    };

    Ok((
        [
            (header::CONTENT_TYPE, file.mime_type),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{SHARE_FILE_NAME}\""),
            ),
        ],
        file.bytes,
    )
        .into_response())
}

async fn share(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<ShareResponse>, PosterError> {
    let session = state.session(id).await?;
    let poster = session.lock().await.result().map(str::to_string);

    let outcome = share::share_poster(poster.as_deref(), state.share_target.as_deref()).await;
    let response = match outcome {
        Ok(ShareOutcome::Shared) => ShareResponse {
            status: "shared",
            message: None,
        },
        Ok(ShareOutcome::Cancelled) => ShareResponse {
            status: "cancelled",
            message: None,
        },
        Ok(ShareOutcome::Unsupported(reason)) => ShareResponse {
            status: "unsupported",
            message: Some(reason),
        },
        Err(e) => ShareResponse {
            status: "failed",
            message: Some(e.user_message()),
        },
    };
    Ok(Json(response))
}
