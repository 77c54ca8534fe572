use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;
use types::ids::OrderId;
use types::order::OrderRecord;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::{CreateOrderRequest, OrderResponse};
use crate::rate_limit::Action;
use crate::state::AppState;

/// Validate and publish a Place command. Accepted means handed to the bus;
/// the order row appears once the engine reports it.
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    state.rate_limiter.check(user.user_id, Action::PlaceOrder)?;

    let intent = payload.into_intent(user.user_id)?;
    let order_id = state.publisher.place(intent).await?;

    info!(order_id = %order_id, user_id = %user.user_id, "Order submitted");
    Ok((StatusCode::ACCEPTED, Json(OrderResponse::submitted(order_id))))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<u64>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    state.rate_limiter.check(user.user_id, Action::CancelOrder)?;

    let order_id = OrderId::new(order_id);
    // Orders not yet known locally are still forwarded; the engine decides.
    if let Some(order) = state.store.get_order(order_id).await? {
        if order.user_id != user.user_id {
            return Err(AppError::Forbidden("Cannot cancel order for another user".into()));
        }
    }

    state.publisher.cancel(order_id).await?;
    Ok((StatusCode::ACCEPTED, Json(OrderResponse::submitted(order_id))))
}

pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<u64>,
) -> Result<Json<OrderRecord>, AppError> {
    let order_id = OrderId::new(order_id);
    let order = state
        .store
        .get_order(order_id)
        .await?
        .filter(|order| order.user_id == user.user_id)
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;
    Ok(Json(order))
}
