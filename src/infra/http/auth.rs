//! Admin session cookie handling and the auth gate.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use portfolio_api_types::{LoginRequest, SessionStatus, SuccessResponse};
use tracing::info;

use crate::application::auth::{AdminAuthService, AuthError, SESSION_COOKIE, SessionToken};

use super::error::ApiError;
use super::handlers::ApiJson;
use super::state::AppState;

/// Attributes of the session cookie beyond the fixed name, path and flags.
#[derive(Debug, Clone, Copy)]
pub struct SessionCookie {
    pub secure: bool,
}

impl SessionCookie {
    fn issue(&self, session: SessionToken, max_age: time::Duration) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, session.token))
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.secure)
            .path("/")
            .max_age(max_age)
            .build()
    }

    fn removal(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.secure)
            .path("/")
            .build()
    }
}

fn session_token(jar: &CookieJar) -> Option<&str> {
    jar.get(SESSION_COOKIE).map(|cookie| cookie.value())
}

/// Reject the request with 401 unless it carries a valid admin session.
pub async fn require_admin(
    State(auth): State<Arc<AdminAuthService>>,
    jar: CookieJar,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth.verify(session_token(&jar)) {
        let detail = match session_token(&jar) {
            Some(_) => "invalid or expired admin session",
            None => "missing admin session cookie",
        };
        return ApiError::unauthorized(detail).into_response();
    }
    next.run(request).await
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<SuccessResponse>), ApiError> {
    let session = state.auth.issue(&body.password).map_err(|err| match err {
        AuthError::InvalidCredentials => ApiError::unauthorized("invalid admin password"),
        AuthError::Signing(err) => {
            ApiError::internal("infra::http::auth::login", err.to_string())
        }
    })?;

    info!(
        target = "portfolio::http::auth",
        expires_at = %session.expires_at,
        "admin session issued"
    );
    let cookie = state
        .session_cookie
        .issue(session, state.auth.session_ttl());
    Ok((jar.add(cookie), Json(SuccessResponse { success: true })))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<SuccessResponse>) {
    (
        jar.remove(state.session_cookie.removal()),
        Json(SuccessResponse { success: true }),
    )
}

pub async fn session(State(state): State<AppState>, jar: CookieJar) -> Json<SessionStatus> {
    Json(SessionStatus {
        authenticated: state.auth.verify(session_token(&jar)),
    })
}
