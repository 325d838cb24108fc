//! JSON API: routes, gates and response shaping.
//!
//! Layering, outermost first: request id, response logging, panic capture,
//! request gate (rate limiting), then per-route auth gate and handler.

mod auth;
mod error;
mod handlers;
mod middleware;
mod rate_limit;
mod state;

pub use auth::SessionCookie;
pub use error::ApiError;
pub use middleware::REQUEST_ID_HEADER;
pub use rate_limit::{
    HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, RateDecision, RateLimitError, RateLimiter,
    RatePolicy, RequestGate, RouteRateLimits, client_identity, rate_limit, spawn_sweeper,
};
pub use state::{AppState, Collaborators};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{MethodRouter, delete, get, post, put},
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::application::error::ErrorReport;
use crate::domain::documents::{AdditionalCompetency, Project, Skill};

use handlers::*;

/// Put `route` behind the admin session check.
fn admin(state: &AppState, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(axum_middleware::from_fn_with_state(
        state.auth.clone(),
        auth::require_admin,
    ))
}

/// Public list/read plus admin create/replace/delete for a plain collection.
fn collection_routes<T>(router: Router<AppState>, state: &AppState, path: &str) -> Router<AppState>
where
    T: crate::domain::Document,
    crate::application::content::ContentService<T>: axum::extract::FromRef<AppState>,
{
    router
        .route(
            path,
            get(list_documents::<T>).merge(admin(state, post(create_document::<T>))),
        )
        .route(
            &format!("{path}/{{id}}"),
            get(get_document::<T>).merge(admin(
                state,
                put(update_document::<T>).delete(delete_document::<T>),
            )),
        )
}

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/personal-info",
            get(get_personal_info).merge(admin(&state, put(put_personal_info))),
        );
    let router = collection_routes::<Project>(router, &state, "/api/projects");
    let router = collection_routes::<Skill>(router, &state, "/api/skills");
    let router =
        collection_routes::<AdditionalCompetency>(router, &state, "/api/competencies");

    router
        .route(
            "/api/blog",
            get(list_published_posts).merge(admin(&state, post(create_post))),
        )
        .route(
            "/api/blog/{slug}",
            get(get_published_post).merge(admin(&state, put(update_post).delete(delete_post))),
        )
        .route("/api/admin/blog", admin(&state, get(list_all_posts)))
        .route("/api/admin/blog/{id}", admin(&state, get(get_post)))
        .route(
            "/api/contact",
            post(submit_contact).merge(admin(&state, get(list_contact_messages))),
        )
        .route(
            "/api/contact/{id}",
            admin(&state, delete(delete_contact_message)),
        )
        .route("/api/contact/{id}/read", admin(&state, put(mark_contact_read)))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/session", get(auth::session))
        .fallback(not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.request_gate.clone(),
            rate_limit::rate_limit,
        ))
        .with_state(state)
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn health(State(state): State<AppState>) -> Response {
    match state.health.ping().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

async fn not_found() -> ApiError {
    ApiError::new(
        "infra::http::fallback",
        StatusCode::NOT_FOUND,
        "Not found",
        "no route matched",
    )
}
