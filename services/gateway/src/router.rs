use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, order, trade, ws};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/orders", post(order::create_order))
        .route(
            "/orders/{id}",
            get(order::get_order).delete(order::cancel_order),
        )
        .route("/trades", get(trade::list_trades))
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
