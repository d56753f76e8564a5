//! HTTP daemon exposing the card, statistics and notification services.
//!
//! Identity is established upstream: requests carry the verified user id in
//! the `x-user-id` header.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{header, request::Parts, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ServiceError;
use crate::flashcards::service::MAX_PAGE_SIZE;
use crate::flashcards::{Card, CardService, CardUpdate, NewCard, Review, Statistics, StatisticsService};
use crate::notifications::{
    Notification, NotificationKind, NotificationService, NotificationSettings,
    NotificationSettingsUpdate, Notifier,
};
use crate::storage::Stores;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Services shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub cards: CardService,
    pub statistics: StatisticsService,
    pub notifications: NotificationService,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(stores: &Stores, timeout: std::time::Duration, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            cards: CardService::new(stores.cards.clone(), timeout),
            statistics: StatisticsService::new(stores.cards.clone(), timeout),
            notifications: NotificationService::new(stores.settings.clone(), timeout),
            notifier,
        }
    }
}

/// Error returned by handlers
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                format!("Missing or invalid {} header", USER_ID_HEADER),
            ),
            ApiError::Service(err) => {
                let status = match &err {
                    ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                    ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
                    ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                    ServiceError::Conflict(_) => StatusCode::CONFLICT,
                    ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                if status == StatusCode::SERVICE_UNAVAILABLE {
                    log::error!("Request failed: {}", err);
                }
                (status, err.to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// The verified identity of the caller
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        Uuid::parse_str(value.trim())
            .map(UserId)
            .map_err(|_| ApiError::Unauthorized)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Service(ServiceError::InvalidArgument(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Service(ServiceError::InvalidArgument(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Service(ServiceError::InvalidArgument(rejection.body_text()))
    }
}

/// `Json` body whose rejection is reported as a 400 `ApiError`
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Query` string whose rejection is reported as a 400 `ApiError`
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// `Path` parameters whose rejection is reported as a 400 `ApiError`
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    MAX_PAGE_SIZE
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsOfQuery {
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i64,
}

async fn create_card(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ApiJson(body): ApiJson<NewCard>,
) -> ApiResult<(StatusCode, Json<Card>)> {
    let card = state.cards.create_card(user_id, body).await?;
    notify_new_card(&state, user_id, &card).await;
    Ok((StatusCode::CREATED, Json(card)))
}

/// Send a new-card notification if the user wants one.
/// Failures are logged; they never fail the request.
async fn notify_new_card(state: &AppState, user_id: Uuid, card: &Card) {
    let settings = match state.notifications.get_settings(user_id).await {
        Ok(settings) => settings,
        Err(err) => {
            log::warn!("Skipping new-card notification for {}: {}", user_id, err);
            return;
        }
    };
    if !settings.allows(NotificationKind::NewCards) {
        return;
    }

    let notification = Notification::NewCard {
        card_id: card.id,
        word: card.word.clone(),
    };
    if let Err(err) = state.notifier.notify(user_id, &notification).await {
        log::warn!("New-card notification for {} failed: {}", user_id, err);
    }
}

async fn list_cards(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<Vec<Card>>> {
    let cards = state.cards.list_cards(user_id, query.skip, query.limit).await?;
    Ok(Json(cards))
}

async fn due_cards(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ApiQuery(query): ApiQuery<AsOfQuery>,
) -> ApiResult<Json<Vec<Card>>> {
    let as_of = query.as_of.unwrap_or_else(Utc::now);
    Ok(Json(state.cards.due_cards(user_id, as_of).await?))
}

async fn get_card(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ApiPath(card_id): ApiPath<Uuid>,
) -> ApiResult<Json<Card>> {
    Ok(Json(state.cards.get_card(user_id, card_id).await?))
}

async fn update_card(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ApiPath(card_id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<CardUpdate>,
) -> ApiResult<Json<Card>> {
    Ok(Json(state.cards.update_card(user_id, card_id, update).await?))
}

async fn delete_card(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ApiPath(card_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.cards.delete_card(user_id, card_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn card_reviews(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ApiPath(card_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<Review>>> {
    Ok(Json(state.cards.card_reviews(user_id, card_id).await?))
}

async fn review_card(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ApiPath(card_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ReviewRequest>,
) -> ApiResult<Json<Card>> {
    Ok(Json(state.cards.review(user_id, card_id, body.rating).await?))
}

async fn statistics(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ApiQuery(query): ApiQuery<AsOfQuery>,
) -> ApiResult<Json<Statistics>> {
    let as_of = query.as_of.unwrap_or_else(Utc::now);
    Ok(Json(state.statistics.get_statistics(user_id, as_of).await?))
}

async fn get_notification_settings(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> ApiResult<Json<NotificationSettings>> {
    Ok(Json(state.notifications.get_settings(user_id).await?))
}

async fn update_notification_settings(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    ApiJson(update): ApiJson<NotificationSettingsUpdate>,
) -> ApiResult<Json<NotificationSettings>> {
    Ok(Json(state.notifications.update_settings(user_id, update).await?))
}

async fn health_check() -> Json<&'static str> {
    Json("OK")
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(USER_ID_HEADER)])
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/cards", post(create_card).get(list_cards))
        .route("/cards/due", get(due_cards))
        .route(
            "/cards/{card_id}",
            get(get_card).patch(update_card).delete(delete_card),
        )
        .route("/cards/{card_id}/reviews", get(card_reviews))
        .route("/cards/{card_id}/review", post(review_card))
        .route("/statistics", get(statistics))
        .route(
            "/notification-settings",
            get(get_notification_settings).patch(update_notification_settings),
        )
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl+C
pub async fn serve(config: &Config, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(&config.server.bind).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    let app = router(state, &config.server.cors_origins);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await
}
