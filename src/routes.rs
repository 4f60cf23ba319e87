use std::{any::Any, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serde_with::skip_serializing_none;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::{
    auth::{AuthUser, MaybeUser, PreferencesUpdate, UserStore},
    error::{ApiError, ApiResult},
    history::{insights, HistoryStore, NewEntry, StyleInsights},
    models::{Feedback, HistoryEntry, RecommendationRequest, StructuredRecommendation, User, UserPreferences, WeatherSnapshot},
    normalize::NormalizedOutcome,
    prompt::NOT_SPECIFIED,
    service::RecommendationService,
};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub service: Arc<RecommendationService>,
    pub history: Arc<dyn HistoryStore>,
    pub users: Arc<UserStore>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/api/users/register", post(register))
        .route("/api/users/login", post(login))
        .route("/api/users/profile", get(profile))
        .route("/api/users/preferences", put(update_preferences))
        .route("/api/recommend", post(recommend))
        .route("/api/recommend/chat", post(chat))
        .route("/api/recommend/history", get(history))
        .route("/api/recommend/history/:id/feedback", post(feedback))
        .route("/api/recommend/insights", get(style_insights))
        .with_state(state);
    with_layers(api)
}

fn with_layers(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin)
        )
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

/// Unwraps a JSON body, turning axum's plain-text rejection into our envelope.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|rejection| ApiError::validation(format!("Invalid request body: {}", rejection.body_text())))
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { success: true, data })
}

pub async fn health(State(service): State<Arc<RecommendationService>>) -> Json<Value> {
    Json(json!({
        "status": "operational",
        "model": service.model(),
        "lastChecked": Utc::now().to_rfc3339(),
    }))
}

// --- Accounts ---

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub token: String,
}

impl SessionResponse {
    fn new(user: User, token: String) -> Self {
        Self { id: user.id, name: user.name, email: user.email, token }
    }
}

pub async fn register(
    State(users): State<Arc<UserStore>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<SessionResponse>>)> {
    let req = body(payload)?;
    let (user, token) = users.register(&req.name, &req.email, &req.password)?;
    tracing::info!("👤 Registered user {}", user.id);
    Ok((StatusCode::CREATED, ok(SessionResponse::new(user, token))))
}

pub async fn login(
    State(users): State<Arc<UserStore>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<SessionResponse>>> {
    let req = body(payload)?;
    let (user, token) = users.login(&req.email, &req.password)?;
    Ok(ok(SessionResponse::new(user, token)))
}

pub async fn profile(AuthUser(user): AuthUser) -> Json<Envelope<User>> {
    ok(user)
}

pub async fn update_preferences(
    State(users): State<Arc<UserStore>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<PreferencesUpdate>, JsonRejection>,
) -> ApiResult<Json<Envelope<UserPreferences>>> {
    let update = body(payload)?;
    Ok(ok(users.update_preferences(user.id, update)?))
}

// --- Recommendations ---

#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationMetadata {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub parameters: Value,
    pub weather: Option<WeatherSnapshot>,
    pub history_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub success: bool,
    pub data: StructuredRecommendation,
    pub metadata: RecommendationMetadata,
}

pub async fn recommend(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    payload: Result<Json<RecommendationRequest>, JsonRejection>,
) -> ApiResult<Json<RecommendationResponse>> {
    let request = body(payload)?;
    if !request.missing_required().is_empty() {
        return Err(ApiError::missing_weather_or_occasion());
    }

    let result = state.service
        .get_recommendation(&request, user.as_ref().map(|u| &u.preferences))
        .await?;
    let data = match result.outcome {
        NormalizedOutcome::Recommendation(rec) => rec,
        NormalizedOutcome::Malformed(_) => return Err(ApiError::MalformedModelOutput),
    };

    let history_id = match &user {
        Some(user) => save_history(state.history.as_ref(), user.id, &request, &data).await,
        None => None,
    };

    let metadata = RecommendationMetadata {
        timestamp: Utc::now(),
        model: state.service.model().to_string(),
        parameters: parameters(&request),
        weather: result.weather,
        history_id,
    };
    Ok(Json(RecommendationResponse { success: true, data, metadata }))
}

/// Failures are logged and swallowed; the recommendation is already computed.
async fn save_history(
    store: &dyn HistoryStore,
    user_id: Uuid,
    request: &RecommendationRequest,
    recommendation: &StructuredRecommendation,
) -> Option<Uuid> {
    let entry = NewEntry {
        weather: request.weather.clone(),
        occasion: request.occasion.clone(),
        location: request.location.clone(),
        recommendation: recommendation.clone(),
    };
    match store.append(user_id, entry).await {
        Ok(saved) => Some(saved.id),
        Err(e) => {
            tracing::error!("❌ Failed to save recommendation for user {}: {}", user_id, e);
            None
        }
    }
}

fn parameters(request: &RecommendationRequest) -> Value {
    let mut params = serde_json::to_value(request).unwrap_or_else(|_| json!({}));
    let outfit = request
        .current_outfit
        .as_ref()
        .map(|o| o.summary())
        .unwrap_or_else(|| NOT_SPECIFIED.to_string());
    if let Some(map) = params.as_object_mut() {
        map.insert("currentOutfit".into(), Value::String(outfit));
    }
    params
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

pub async fn chat(
    State(service): State<Arc<RecommendationService>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<StructuredRecommendation>>> {
    let req = body(payload)?;
    if req.message.trim().is_empty() {
        return Err(ApiError::validation("Message is required"));
    }
    service
        .chat(&req.message)
        .await?
        .into_recommendation()
        .map(ok)
        .ok_or(ApiError::MalformedModelOutput)
}

pub async fn history(
    State(store): State<Arc<dyn HistoryStore>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Envelope<Vec<HistoryEntry>>>> {
    Ok(ok(store.list(user.id).await?))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub rating: u8,
    pub comment: Option<String>,
}

pub async fn feedback(
    State(store): State<Arc<dyn HistoryStore>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<HistoryEntry>>> {
    let req = body(payload)?;
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::validation("Rating must be between 1 and 5"));
    }
    let feedback = Feedback {
        rating: req.rating,
        comment: req.comment.filter(|c| !c.trim().is_empty()),
        submitted_at: Utc::now(),
    };
    Ok(ok(store.set_feedback(user.id, id, feedback).await?))
}

pub async fn style_insights(
    State(store): State<Arc<dyn HistoryStore>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Envelope<StyleInsights>>> {
    let entries = store.list(user.id).await?;
    Ok(ok(insights(&entries)))
}
