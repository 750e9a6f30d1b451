pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::tickets::TicketService;

/// Room for the text parts and multipart framing around the photo.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppContext {
    pub tickets: Arc<TicketService>,
}

pub type SharedContext = Arc<AppContext>;

pub fn router(context: SharedContext) -> Router {
    let body_limit = context
        .tickets
        .settings()
        .max_photo_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route("/healthz", get(handlers::health::healthz))
        .route(
            "/api/tickets",
            get(handlers::tickets::list).post(handlers::tickets::create),
        )
        .route(
            "/api/tickets/{item_id}",
            axum::routing::delete(handlers::tickets::delete),
        )
        .route(
            "/api/tickets/{item_id}/resolve",
            post(handlers::tickets::resolve),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(context)
}
