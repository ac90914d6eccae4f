// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{badges, progress},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Progress routes and `my-badges` require a bearer token.
/// * Awarding badges additionally requires the admin role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let progress_routes = Router::new()
        .route("/scenarios/{scenario_id}/start", post(progress::start_scenario))
        .route(
            "/scenarios/{scenario_id}/complete",
            post(progress::complete_scenario),
        )
        .route("/scenarios/{scenario_id}/time", post(progress::add_time_spent))
        .route("/scenarios/{scenario_id}", get(progress::get_scenario_progress))
        .route("/answers", post(progress::submit_answer))
        .route("/my-progress", get(progress::get_my_progress))
        .layer(auth.clone());

    let badge_routes = Router::new()
        .route("/", get(badges::list_badges))
        .route("/{id}", get(badges::get_badge))
        .merge(
            Router::new()
                .route("/my-badges", get(badges::list_my_badges))
                .layer(auth.clone()),
        )
        .merge(
            Router::new()
                .route("/{id}/award", post(badges::award_badge))
                // Auth first, then Admin check
                .layer(middleware::from_fn(admin_middleware))
                .layer(auth),
        );

    Router::new()
        .nest("/api/progress", progress_routes)
        .nest("/api/badges", badge_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
