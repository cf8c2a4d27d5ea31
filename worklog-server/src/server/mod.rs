pub mod auth;
mod config;

use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{Method, StatusCode, header},
    routing::{get, post},
};
use bcrypt::verify;
use chrono::{DateTime, Duration, Utc};
pub use config::{AppConfig, ConfigError, UserConfig};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;
use worklog_shared::api;
use worklog_shared::api::endpoints;
use worklog_shared::domain::PaymentStatus;
use worklog_shared::invoice::{self, DateOrder};
use worklog_shared::token::{self, TokenError};
use worklog_shared::tz::{TzError, UtcOffset};

use crate::server::auth::AuthCtx;
use crate::storage::{EntryPatch, StorageError};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: crate::storage::Store,
}

impl AppState {
    pub fn new(config: AppConfig, store: crate::storage::Store) -> Self {
        Self { config, store }
    }

    /// The owner's stored settings as a parsed offset + default rate. Both
    /// are validated on every write path, so failures here are server bugs.
    async fn owner_settings(&self, owner: &str) -> Result<(UtcOffset, f64), AppError> {
        let settings = self
            .store
            .get_settings(owner)
            .await?
            .ok_or_else(|| AppError::internal(format!("no settings for owner {owner}")))?;
        let offset = settings
            .timezone_offset
            .parse::<UtcOffset>()
            .map_err(AppError::internal)?;
        Ok((offset, settings.default_hourly_rate))
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        .route("/api/v1/session", get(api_active_session))
        .route("/api/v1/session/start", post(api_start_session))
        .route("/api/v1/session/stop", post(api_stop_session))
        .route("/api/v1/entries", get(api_list_entries).post(api_create_entry))
        .route(
            "/api/v1/entries/{id}",
            axum::routing::patch(api_update_entry).delete(api_delete_entry),
        )
        .route("/api/v1/entries/payment-status", post(api_bulk_payment_status))
        .route("/api/v1/invoice", get(api_invoice))
        .route("/api/v1/share", post(api_create_share))
        .route("/api/v1/settings", get(api_get_settings).put(api_put_settings))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .layer(middleware::from_fn(set_auth_span_fields));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            username = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/auth/login", post(api_auth_login))
        // Token-validated public invoice view, no bearer auth
        .route("/api/v1/share/{token}", get(api_resolve_share))
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_no_store_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::PUT,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    // Put into request extensions for trace layer & handlers
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_no_store_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    // API responses carry live financial data; never let intermediaries
    // cache them
    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
    }
    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        Span::current().record("username", tracing::field::display(auth.owner()));
    }
    Ok(next.run(req).await)
}

async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    // Find user in config
    let user = state
        .config
        .users
        .iter()
        .find(|u| u.username == body.username)
        .ok_or_else(|| {
            tracing::warn!(username=%body.username, "login: unknown username");
            AppError::unauthorized()
        })?;
    if !verify(&body.password, &user.password_hash).map_err(|e| {
        tracing::error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        tracing::warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    let token = auth::issue_jwt_for_user(&state, &user.username)?;
    Ok(Json(api::AuthResp { token }))
}

async fn api_start_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::StartSessionReq>,
) -> Result<Json<api::TimeEntryDto>, AppError> {
    let owner = auth.owner();
    let (offset, default_rate) = state.owner_settings(owner).await?;
    let rate = body.hourly_rate.unwrap_or(default_rate);
    let entry = state
        .store
        .start_session(owner, rate, Utc::now(), offset)
        .await?;
    Ok(Json(entry.into()))
}

async fn api_stop_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::StopSessionReq>,
) -> Result<Json<api::TimeEntryDto>, AppError> {
    let entry = state
        .store
        .stop_session(auth.owner(), body.entry_id, Utc::now())
        .await?;
    Ok(Json(entry.into()))
}

async fn api_active_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Option<api::TimeEntryDto>>, AppError> {
    let entry = state.store.active_session(auth.owner()).await?;
    Ok(Json(entry.map(Into::into)))
}

async fn api_create_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::CreateEntryReq>,
) -> Result<Json<api::TimeEntryDto>, AppError> {
    let owner = auth.owner();
    let (offset, default_rate) = state.owner_settings(owner).await?;
    let start = parse_instant(&body.start_time)?;
    let end = parse_instant(&body.end_time)?;
    let entry = state
        .store
        .create_entry(
            owner,
            start,
            end,
            body.hourly_rate.unwrap_or(default_rate),
            body.payment_status.unwrap_or(PaymentStatus::NotPaid),
            body.notes,
            offset,
        )
        .await?;
    Ok(Json(entry.into()))
}

async fn api_list_entries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Query(query): Query<api::InvoiceQuery>,
) -> Result<Json<Vec<api::TimeEntryDto>>, AppError> {
    let entries = state
        .store
        .list_entries(auth.owner(), query.from, query.to, query.status)
        .await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

async fn api_update_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Json(body): Json<api::UpdateEntryReq>,
) -> Result<Json<api::TimeEntryDto>, AppError> {
    let owner = auth.owner();
    let (offset, _) = state.owner_settings(owner).await?;
    let patch = EntryPatch {
        start_time: body.start_time.as_deref().map(parse_instant).transpose()?,
        end_time: body.end_time.as_deref().map(parse_instant).transpose()?,
        hourly_rate: body.hourly_rate,
        payment_status: body.payment_status,
        notes: body.notes,
    };
    let entry = state.store.update_entry(owner, id, patch, offset).await?;
    Ok(Json(entry.into()))
}

async fn api_delete_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    state.store.delete_entry(auth.owner(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_bulk_payment_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::BulkStatusReq>,
) -> Result<Json<api::BulkStatusResp>, AppError> {
    let (succeeded, failed) = state
        .store
        .bulk_update_payment_status(auth.owner(), body.entry_ids, body.payment_status)
        .await?;
    Ok(Json(api::BulkStatusResp {
        succeeded,
        failed: failed
            .into_iter()
            .map(|(entry_id, reason)| api::BulkItemError { entry_id, reason })
            .collect(),
    }))
}

async fn api_invoice(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Query(query): Query<api::InvoiceQuery>,
) -> Result<Json<api::InvoicePeriodDto>, AppError> {
    let owner = auth.owner();
    let (offset, _) = state.owner_settings(owner).await?;
    let entries = state
        .store
        .list_entries(owner, query.from, query.to, query.status)
        .await?;
    // Listing views default to most recent day first
    let order = query.order.unwrap_or(DateOrder::Desc);
    let period = invoice::aggregate(entries, offset, order);
    Ok(Json(period.into()))
}

async fn api_create_share(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::ShareReq>,
) -> Result<Json<api::ShareResp>, AppError> {
    if body.to < body.from {
        return Err(AppError::bad_request("date range is inverted"));
    }
    if body.ttl_days < 0 {
        return Err(AppError::bad_request("ttl_days must not be negative"));
    }
    let now = Utc::now();
    let expires_at = Duration::try_days(body.ttl_days)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AppError::bad_request("ttl_days out of range"))?;
    let token = token::issue(
        auth.owner(),
        body.from,
        body.to,
        body.status,
        expires_at - now,
        now,
        state.config.jwt_secret.as_bytes(),
    )?;
    let public_url = endpoints::share_view(&state.config.public_base_url, &token);
    Ok(Json(api::ShareResp {
        token,
        public_url,
        expires_at: expires_at.to_rfc3339(),
    }))
}

async fn api_resolve_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<api::InvoicePeriodDto>, AppError> {
    let claims = token::validate(&token, state.config.jwt_secret.as_bytes(), Utc::now())?;
    let (offset, _) = state.owner_settings(&claims.sub).await?;
    // Live re-query scoped exactly to the embedded filters; corrections the
    // owner makes before expiry are reflected
    let entries = state
        .store
        .list_entries(&claims.sub, Some(claims.from), Some(claims.to), claims.status)
        .await?;
    // Invoice documents read earliest-day-first
    let period = invoice::aggregate(entries, offset, DateOrder::Asc);
    Ok(Json(period.into()))
}

async fn api_get_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::SettingsDto>, AppError> {
    let settings = state
        .store
        .get_settings(auth.owner())
        .await?
        .ok_or_else(|| AppError::not_found("settings not found"))?;
    Ok(Json(api::SettingsDto {
        timezone_offset: settings.timezone_offset,
        default_hourly_rate: settings.default_hourly_rate,
    }))
}

async fn api_put_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::SettingsDto>,
) -> Result<Json<api::SettingsDto>, AppError> {
    // Reject a bad offset before anything is written
    let offset = body.timezone_offset.parse::<UtcOffset>()?;
    if body.default_hourly_rate <= 0.0 {
        return Err(AppError::bad_request("default_hourly_rate must be positive"));
    }
    let settings = state
        .store
        .upsert_settings(
            auth.owner(),
            &offset.to_string(),
            body.default_hourly_rate,
        )
        .await?;
    Ok(Json(api::SettingsDto {
        timezone_offset: settings.timezone_offset,
        default_hourly_rate: settings.default_hourly_rate,
    }))
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::bad_request(format!("invalid timestamp {s:?}: {e}")))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Conflict(String),
    Gone(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::SessionAlreadyActive | StorageError::NoActiveSession => {
                AppError::Conflict(e.to_string())
            }
            StorageError::InvalidInterval => AppError::BadRequest(e.to_string()),
            StorageError::InvalidInput(msg) => AppError::BadRequest(msg),
            StorageError::EntryNotFound(_) => AppError::NotFound(e.to_string()),
            StorageError::NotOwner(_) => AppError::Forbidden,
            other => AppError::internal(other),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            // Expired asks the owner for a fresh link; anything else is
            // malformed or tampered. Neither reveals whether the queried
            // owner or date range exists.
            TokenError::Expired => AppError::Gone("share link expired".to_string()),
            TokenError::Invalid => AppError::Unauthorized,
            TokenError::Encode(msg) => AppError::Internal(msg),
        }
    }
}

impl From<TzError> for AppError {
    fn from(e: TzError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            AppError::Gone(m) => (StatusCode::GONE, m, "gone", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        // Log any error responses at ERROR level for troubleshooting
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::error!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = axum::Json(ErrorBody { error: msg });
        (status, body).into_response()
    }
}
