use axum::{
    Json,
    extract::{Query, State},
};
use types::trade::TradeRecord;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::TradesQuery;
use crate::state::AppState;

pub const DEFAULT_TRADE_LIMIT: usize = 50;
pub const MAX_TRADE_LIMIT: usize = 500;

/// Trades on either side of the caller's own orders, newest first.
pub async fn list_trades(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<TradesQuery>,
) -> Result<Json<Vec<TradeRecord>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRADE_LIMIT)
        .clamp(1, MAX_TRADE_LIMIT);
    let trades = state.store.list_user_trades(user.user_id, limit).await?;
    Ok(Json(trades))
}
