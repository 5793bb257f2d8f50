use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Error;
use crate::review::{self, CategorySummary, HskProgress, ReviewSummary};
use crate::scheduler::Difficulty;
use crate::streak::{self, Achievement, Progress};
use crate::vocab::{Library, Vocabulary, WordEdit};

// -- App state --

struct AppState {
    library: Library,
    progress: Progress,
    progress_path: PathBuf,
    catalogue: Vec<Achievement>,
}

// One lock over the whole library: a review's read, schedule and write-back
// never interleave with another request touching the same item.
type SharedState = Arc<Mutex<AppState>>;

impl AppState {
    // Progress is secondary to the word files; a failed write is only logged.
    fn save_progress(&self) {
        if let Err(e) = self.progress.save(&self.progress_path) {
            tracing::warn!("failed to save progress: {e}");
        }
    }
}

// -- Errors --

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::UnknownItem(_) => StatusCode::NOT_FOUND,
            Error::InvalidDifficulty(_) | Error::MissingField(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => {
                tracing::error!("{}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// -- Request/response bodies --

#[derive(Deserialize)]
struct ReviewRequest {
    difficulty: String,
    #[serde(default)]
    mastered: Option<bool>,
}

#[derive(Serialize)]
struct ReviewResponse {
    item: Vocabulary,
    interval: u32,
    unlocked: Vec<Achievement>,
}

#[derive(Deserialize)]
struct MasteredRequest {
    mastered: bool,
}

#[derive(Deserialize)]
struct NewWordRequest {
    hanzi: String,
    pinyin: String,
    meaning: String,
    #[serde(default)]
    hsk_level: Option<u8>,
    #[serde(default)]
    category: String,
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    summary: ReviewSummary,
    total_words: usize,
    mastery_percent: u32,
    current_streak: u32,
    longest_streak: u32,
    hsk: Vec<HskProgress>,
    categories: Vec<CategorySummary>,
}

// -- Route handlers --

async fn list_vocabulary(State(state): State<SharedState>) -> Json<Vec<Vocabulary>> {
    let st = state.lock().await;
    Json(st.library.items.clone())
}

async fn due_vocabulary(State(state): State<SharedState>) -> Json<Vec<Vocabulary>> {
    let st = state.lock().await;
    let now = Local::now();
    let items = &st.library.items;
    let due = review::filter_due(items, &now)
        .into_iter()
        .map(|i| items[i].clone())
        .collect();
    Json(due)
}

async fn stats(State(state): State<SharedState>) -> Json<StatsResponse> {
    let st = state.lock().await;
    let now = Local::now();
    let items = &st.library.items;
    Json(StatsResponse {
        summary: review::summarize_reviews(items, &now),
        total_words: items.len(),
        mastery_percent: review::mastery_percent(items),
        current_streak: st.progress.streak.current_on(now.date_naive()),
        longest_streak: st.progress.streak.longest,
        hsk: review::hsk_progress(items),
        categories: review::category_summaries(items, &now),
    })
}

async fn review_item(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> ApiResult<ReviewResponse> {
    let difficulty: Difficulty = req.difficulty.parse()?;
    let mut st = state.lock().await;
    let index = st
        .library
        .position(&id)
        .ok_or_else(|| Error::UnknownItem(id.clone()))?;

    let now = Local::now();
    let mut item = st.library.items[index].clone();
    let event = review::record_review(&mut item, difficulty, req.mastered, &now);
    st.library.commit(index, item)?;

    let st = &mut *st;
    let unlocked = st
        .progress
        .on_review(&event, &Local, &st.library.items, &st.catalogue);
    st.save_progress();

    Ok(Json(ReviewResponse {
        item: st.library.items[index].clone(),
        interval: event.interval,
        unlocked,
    }))
}

async fn set_mastered(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<MasteredRequest>,
) -> ApiResult<Vocabulary> {
    let mut st = state.lock().await;
    let index = st
        .library
        .position(&id)
        .ok_or_else(|| Error::UnknownItem(id.clone()))?;

    let mut item = st.library.items[index].clone();
    review::set_mastered(&mut item, req.mastered);
    st.library.commit(index, item)?;

    let st = &mut *st;
    st.progress.check_achievements(&st.library.items, &st.catalogue);
    st.save_progress();
    Ok(Json(st.library.items[index].clone()))
}

async fn create_word(
    State(state): State<SharedState>,
    Json(req): Json<NewWordRequest>,
) -> Result<(StatusCode, Json<Vocabulary>), ApiError> {
    let item = Vocabulary::new(
        &req.hanzi,
        &req.pinyin,
        &req.meaning,
        req.hsk_level.unwrap_or(1),
        &req.category,
    );
    item.check_required()?;

    let mut st = state.lock().await;
    let target = st.library.target_for(&item.category).ok_or(Error::NoFiles)?;
    let index = st.library.insert(item, target)?;
    Ok((StatusCode::CREATED, Json(st.library.items[index].clone())))
}

async fn update_word(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(edit): Json<WordEdit>,
) -> ApiResult<Vocabulary> {
    let mut st = state.lock().await;
    let index = st
        .library
        .position(&id)
        .ok_or_else(|| Error::UnknownItem(id.clone()))?;

    let updated = st.library.items[index].edited(edit)?;
    st.library.commit(index, updated)?;

    let st = &mut *st;
    st.progress.check_achievements(&st.library.items, &st.catalogue);
    st.save_progress();
    Ok(Json(st.library.items[index].clone()))
}

async fn delete_word(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut st = state.lock().await;
    let index = st
        .library
        .position(&id)
        .ok_or_else(|| Error::UnknownItem(id.clone()))?;
    st.library.remove(index)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export(State(state): State<SharedState>) -> Response {
    let st = state.lock().await;
    let filename = format!("mandarin-vocabulary-{}.json", Local::now().format("%Y-%m-%d"));
    (
        [(
            axum::http::header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )],
        Json(st.library.items.clone()),
    )
        .into_response()
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/vocabulary", get(list_vocabulary).post(create_word))
        .route("/api/vocabulary/{id}", put(update_word).delete(delete_word))
        .route("/api/due", get(due_vocabulary))
        .route("/api/stats", get(stats))
        .route("/api/vocabulary/{id}/review", post(review_item))
        .route("/api/vocabulary/{id}/mastered", post(set_mastered))
        .route("/api/export", get(export))
        .with_state(state)
}

// -- Public entry point --

pub async fn serve(paths: Vec<String>, port: u16, progress_path: PathBuf) -> crate::Result<()> {
    let library = Library::load(&paths)?;
    let progress = Progress::load(&progress_path)?;

    let state = Arc::new(Mutex::new(AppState {
        library,
        progress,
        progress_path,
        catalogue: streak::default_achievements(),
    }));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(Error::Server)?;
    tracing::info!("serving at http://localhost:{port}");

    axum::serve(listener, router(state))
        .await
        .map_err(Error::Server)
}
