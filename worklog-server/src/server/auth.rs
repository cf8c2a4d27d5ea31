use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use tracing::error;
use worklog_shared::auth::{self, AuthClaims};

use super::{AppError, AppState};

/// How many days before mandatory re-login.
const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub claims: AuthClaims,
}

impl AuthCtx {
    /// The authenticated owner id.
    pub fn owner(&self) -> &str {
        &self.claims.sub
    }
}

pub async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || Err(AppError::unauthorized());
    let header_val = match req.headers().get(header::AUTHORIZATION) {
        Some(v) => v,
        None => return unauthorized(),
    };
    let header_str = header_val.to_str().map_err(|_| AppError::unauthorized())?;
    let prefix = "Bearer ";
    if !header_str.starts_with(prefix) {
        return unauthorized();
    }
    let token = &header_str[prefix.len()..];

    let claims = match auth::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error=%e, "auth: jwt decode failed");
            return unauthorized();
        }
    };

    // Tokens are only issued for configured users, but the config may have
    // changed since
    if !state.config.users.iter().any(|u| u.username == claims.sub) {
        tracing::warn!(username=%claims.sub, "auth: token for unknown user");
        return unauthorized();
    }

    req.extensions_mut().insert(AuthCtx { claims });
    Ok(next.run(req).await)
}

pub fn issue_jwt_for_user(state: &AppState, username: &str) -> Result<String, AppError> {
    let claims = AuthClaims {
        sub: username.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        exp: (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
    };
    auth::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(username, error=%e, "login: jwt encode failed");
        AppError::internal(e)
    })
}
