//! steeltrack-server library - piece-mark lifecycle service
//!
//! Hosts the status/location state machine, the delivery reconciliation
//! engine, the crew assignment ledger and the activity log query surface
//! behind an HTTP API. Identity arrives pre-verified from the session
//! collaborator as actor headers; completed transitions are broadcast to
//! subscribed viewers over SSE.

use axum::Router;
use sqlx::SqlitePool;
use steeltrack_common::events::EventBus;

pub mod api;
pub mod engine;

/// Application state shared across HTTP handlers
///
/// The pool is an explicitly passed, request-scoped resource handle - it is
/// cloned into each handler through the router state, never held in a
/// process-global.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Broadcast bus for committed transitions
    pub events: EventBus,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, events: EventBus) -> Self {
        Self { db, events }
    }
}

/// Build application router
///
/// Mutation and query endpoints require a resolved actor; health,
/// build-info and the event stream are public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    // Protected routes (require actor identity headers)
    let protected = Router::new()
        .route(
            "/api/piece-marks",
            post(api::piece_marks::create_piece_mark).get(api::piece_marks::list_piece_marks),
        )
        .route(
            "/api/piece-marks/:id",
            get(api::piece_marks::get_piece_mark).patch(api::piece_marks::update_piece_mark),
        )
        .route(
            "/api/piece-marks/:id/advance",
            post(api::piece_marks::advance_status),
        )
        .route(
            "/api/piece-marks/:id/rollback",
            post(api::piece_marks::rollback_status),
        )
        .route(
            "/api/piece-marks/:id/location",
            post(api::piece_marks::update_location),
        )
        .route(
            "/api/piece-marks/:id/archive",
            post(api::piece_marks::archive_piece_mark),
        )
        .route(
            "/api/deliveries",
            post(api::deliveries::create_delivery).get(api::deliveries::list_deliveries),
        )
        .route("/api/deliveries/:id", get(api::deliveries::get_delivery))
        .route(
            "/api/deliveries/:id/items",
            post(api::deliveries::add_delivery_item).get(api::deliveries::list_delivery_items),
        )
        .route(
            "/api/deliveries/:id/dispatch",
            post(api::deliveries::dispatch_delivery),
        )
        .route(
            "/api/deliveries/:id/arrive",
            post(api::deliveries::arrive_delivery),
        )
        .route(
            "/api/deliveries/:id/reject",
            post(api::deliveries::reject_delivery),
        )
        .route(
            "/api/deliveries/:id/reconcile",
            post(api::deliveries::reconcile_delivery),
        )
        .route(
            "/api/crews",
            post(api::crews::assign_crew).get(api::crews::list_crews),
        )
        .route("/api/crews/:id/status", post(api::crews::set_crew_status))
        .route("/api/activity", get(api::activity::query_activity))
        .layer(middleware::from_fn(api::actor::actor_middleware));

    // Public routes (no actor resolution)
    let public = Router::new()
        .route("/health", get(api::health::health))
        .route("/api/build-info", get(api::buildinfo::get_build_info))
        .route("/api/events", get(api::sse::event_stream));

    // Combine routers
    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
