//! Order cancellation.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use domain::TransactionView;

use super::{ClientInfo, parse_path};
use crate::AppState;
use crate::error::ApiError;
use crate::principal::Actor;

/// PATCH /orders/{order_id}/cancel: cancels the order's transaction.
#[tracing::instrument(skip(state, client), fields(user_id = %actor.user_id()))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    client: ClientInfo,
    Path(order_id): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    let order_id: OrderId = parse_path(&order_id, "order id")?;
    let view = state
        .storefront
        .lifecycle
        .cancel_order(actor.user_id(), &order_id)
        .await?;

    state.activity.record(client.activity(
        actor.user_id(),
        "cancel",
        "orders",
        format!("{order_id} in {} -> {}", view.tx_id, view.status),
    ));

    Ok(Json(view))
}
