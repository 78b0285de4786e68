// src/routes.rs

use axum::{
    Router,
    http::{Method, header},
    middleware,
    routing::post,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{attempt, submission},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// Every route needs a valid session; `auth_middleware` injects the
/// `Claims` the handlers read the student id from.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let exam_routes = Router::new().route("/{exam_id}/start", post(attempt::start_exam));

    let attempt_routes = Router::new()
        .route("/{attempt_id}/heartbeat", post(attempt::heartbeat))
        .route("/{attempt_id}/submit", post(attempt::submit_exam))
        .route(
            "/{attempt_id}/submissions",
            post(submission::submit_exam_code),
        );

    let practice_routes =
        Router::new().route("/submissions", post(submission::submit_practice_code));

    let api = Router::new()
        .nest("/exams", exam_routes)
        .nest("/attempts", attempt_routes)
        .nest("/practice", practice_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api", api)
        // Global middleware, outermost first
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
