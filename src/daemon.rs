use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, MethodRouter},
    Router,
};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::auth::SessionFile;
use crate::config::Config;
use crate::domains::HabitStatus;
use crate::error::{Result, RoutineOsError};
use crate::interfaces::providers::LlmProvider;
use crate::prefs::PreferencesFile;
use crate::providers::OpenAiProvider;
use crate::services::coach::{CoachRequest, CoachService};
use crate::services::likelihood::{LikelihoodRequest, LikelihoodService};
use crate::services::routine::{local_today, HabitInput, RoutineService, SystemInput};

const CHAT_FAILED: &str = "AI request failed";
const LIKELIHOOD_FAILED: &str = "Failed to generate habit likelihoods";

#[derive(Clone)]
pub struct AppState {
    pub routine: Arc<RwLock<RoutineService>>,
    pub coach: Arc<CoachService>,
    pub likelihood: Arc<LikelihoodService>,
    pub token: String,
}

impl AppState {
    pub fn new(
        routine: RoutineService,
        provider: Option<Arc<dyn LlmProvider>>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            routine: Arc::new(RwLock::new(routine)),
            coach: Arc::new(CoachService::new(provider.clone())),
            likelihood: Arc::new(LikelihoodService::new(provider)),
            token: token.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Deserialize, Default)]
struct StatusUpdate {
    status: String,
    #[serde(default)]
    date: Option<NaiveDate>,
}

#[derive(Deserialize, Default)]
struct OrderUpdate {
    ids: Vec<String>,
}

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn error_response(err: RoutineOsError) -> Response {
    let status = match &err {
        RoutineOsError::NotFound(_) => StatusCode::NOT_FOUND,
        RoutineOsError::Validation(_) => StatusCode::BAD_REQUEST,
        RoutineOsError::Auth(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "Request failed");
    }
    error_json(status, err.to_string())
}

/// Empty bodies read as the request's defaults.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> std::result::Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| error_json(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {err}")))
}

fn authorize(headers: &HeaderMap, token: &str) -> std::result::Result<(), Response> {
    let expected_token = token.trim();
    if expected_token.is_empty() {
        return Err(error_json(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }

    let header = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let bearer = header.strip_prefix("Bearer ").unwrap_or("").trim();
    let api_key = api_key.trim();

    if bearer == expected_token || api_key == expected_token {
        Ok(())
    } else {
        Err(error_json(StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

async fn method_not_allowed() -> Response {
    error_json(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

fn post_only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(method_not_allowed)
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/routineos-chat", post_only(post(routineos_chat)))
        .route("/api/habit-likelihood", post_only(post(habit_likelihood)))
        .route("/api/systems", get(list_systems).post(save_system))
        .route("/api/systems/order", post(reorder_systems))
        .route("/api/systems/{id}", delete(delete_system))
        .route("/api/habits", get(list_habits).post(save_habit))
        .route("/api/habits/{id}", delete(delete_habit))
        .route("/api/habits/{id}/status", post(set_habit_status))
        .route("/api/sub-habits/{id}/status", post(set_sub_habit_status))
        .route("/api/today", get(today))
        .route("/api/today/order", post(reorder_today))
        .route("/api/analytics", get(analytics))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}

async fn routineos_chat(State(state): State<AppState>, body: Bytes) -> Response {
    let request: CoachRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match state.coach.reply(&request).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Coach chat failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, CHAT_FAILED)
        }
    }
}

async fn habit_likelihood(State(state): State<AppState>, body: Bytes) -> Response {
    let request: LikelihoodRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match state.likelihood.predict(&request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(RoutineOsError::Validation(message)) => error_json(StatusCode::BAD_REQUEST, message),
        Err(err) => {
            tracing::error!(error = %err, "Habit likelihood failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, LIKELIHOOD_FAILED)
        }
    }
}

async fn list_systems(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let routine = state.routine.read().await;
    let systems: Vec<_> = routine.state().ordered_systems().into_iter().cloned().collect();
    Json(systems).into_response()
}

async fn save_system(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let input: SystemInput = match parse_body(&body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let mut routine = state.routine.write().await;
    match routine.save_system(input).await {
        Ok(system) => Json(system).into_response(),
        Err(err) => error_response(err),
    }
}

async fn delete_system(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let mut routine = state.routine.write().await;
    match routine.delete_system(&id).await {
        Ok(()) => Json(json!({"deleted": id})).into_response(),
        Err(err) => error_response(err),
    }
}

async fn reorder_systems(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let order: OrderUpdate = match parse_body(&body) {
        Ok(order) => order,
        Err(response) => return response,
    };
    let mut routine = state.routine.write().await;
    match routine.reorder_systems(order.ids).await {
        Ok(()) => {
            let systems: Vec<_> = routine.state().ordered_systems().into_iter().cloned().collect();
            Json(systems).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn list_habits(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let routine = state.routine.read().await;
    Json(routine.state().habits.clone()).into_response()
}

async fn save_habit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let input: HabitInput = match parse_body(&body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let mut routine = state.routine.write().await;
    match routine.save_habit(input, local_today()).await {
        Ok(habit) => Json(habit).into_response(),
        Err(err) => error_response(err),
    }
}

async fn delete_habit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let mut routine = state.routine.write().await;
    match routine.delete_habit(&id).await {
        Ok(()) => Json(json!({"deleted": id})).into_response(),
        Err(err) => error_response(err),
    }
}

async fn set_habit_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let update: StatusUpdate = match parse_body(&body) {
        Ok(update) => update,
        Err(response) => return response,
    };
    let status: HabitStatus = match update.status.parse() {
        Ok(status) => status,
        Err(err) => return error_response(err),
    };
    let on = update.date.unwrap_or_else(local_today);
    let mut routine = state.routine.write().await;
    match routine.set_habit_status(&id, status, on).await {
        Ok(habit) => Json(habit).into_response(),
        Err(err) => error_response(err),
    }
}

async fn set_sub_habit_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let update: StatusUpdate = match parse_body(&body) {
        Ok(update) => update,
        Err(response) => return response,
    };
    let status: HabitStatus = match update.status.parse() {
        Ok(status) => status,
        Err(err) => return error_response(err),
    };
    let today = update.date.unwrap_or_else(local_today);
    let mut routine = state.routine.write().await;
    match routine.set_sub_habit_status(&id, status, today) {
        Ok(habit_status) => Json(json!({
            "subHabitId": id,
            "status": status,
            "habitStatus": habit_status,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

async fn today(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let date = local_today();
    let routine = state.routine.read().await;
    Json(json!({
        "date": date,
        "theme": routine.state().theme,
        "entries": routine.today(date),
    }))
    .into_response()
}

async fn reorder_today(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let order: OrderUpdate = match parse_body(&body) {
        Ok(order) => order,
        Err(response) => return response,
    };
    let mut routine = state.routine.write().await;
    match routine.reorder_today(order.ids) {
        Ok(()) => Json(json!({"todayOrder": routine.state().today_order})).into_response(),
        Err(err) => error_response(err),
    }
}

async fn analytics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&headers, &state.token) {
        return response;
    }
    let routine = state.routine.read().await;
    Json(routine.analytics(local_today())).into_response()
}

/// Opens the configured store, loads the routine, and builds the provider.
pub async fn build_state(config: &Config, token: &str) -> Result<AppState> {
    let session = SessionFile::at_default_location().load();
    let store = crate::store::open_store(config, session.as_ref()).await?;
    let mut routine = RoutineService::new(
        store,
        PreferencesFile::new(config.preferences_path()),
        config.trend_days(),
    );
    routine.load().await?;

    let provider = OpenAiProvider::from_config(&config.openai())
        .map(|provider| Arc::new(provider) as Arc<dyn LlmProvider>);
    if provider.is_none() {
        tracing::warn!("No OpenAI API key configured; chat is disabled and predictions use heuristics");
    }
    Ok(AppState::new(routine, provider, token))
}

pub async fn run(config: &Config, host: &str, port: u16, token: &str) -> Result<()> {
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown requested");
    };
    run_with_shutdown(config, host, port, token, shutdown).await
}

pub async fn run_with_shutdown<F>(
    config: &Config,
    host: &str,
    port: u16,
    token: &str,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = build_state(config, token).await?;
    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RoutineOsError::Runtime(e.to_string()))?;
    tracing::info!(%addr, version = crate::VERSION, git_sha = crate::GIT_SHA, "Daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RoutineOsError::Runtime(e.to_string()))?;

    Ok(())
}
