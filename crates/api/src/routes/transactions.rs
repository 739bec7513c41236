//! Checkout, transaction reads, admin status updates and cancellation.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{TransactionStatus, TxId};
use domain::{Basket, TransactionView};
use serde::Deserialize;

use super::{ApiJson, ClientInfo, parse_path};
use crate::AppState;
use crate::error::ApiError;
use crate::principal::Actor;

const RESOURCE: &str = "transactions";

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TransactionStatus,
}

/// POST /transactions: check out a basket.
#[tracing::instrument(skip(state, client, basket), fields(user_id = %actor.user_id()))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    client: ClientInfo,
    ApiJson(basket): ApiJson<Basket>,
) -> Result<(StatusCode, Json<TransactionView>), ApiError> {
    let view = state
        .storefront
        .checkout
        .checkout(actor.user_id(), basket)
        .await?;

    state.activity.record(client.activity(
        actor.user_id(),
        "checkout",
        RESOURCE,
        format!("created {} total {}", view.tx_id, view.total_price),
    ));

    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /transactions/{tx_id}: owner or admin.
#[tracing::instrument(skip(state), fields(user_id = %actor.user_id()))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(tx_id): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    let tx_id: TxId = parse_path(&tx_id, "transaction id")?;
    let view = state
        .storefront
        .queries
        .get_transaction(actor.user_id(), &tx_id)
        .await?;
    Ok(Json(view))
}

/// PUT /transactions/{tx_id}: admin status update.
#[tracing::instrument(skip(state, client, req), fields(user_id = %actor.user_id()))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    client: ClientInfo,
    Path(tx_id): Path<String>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<Json<TransactionView>, ApiError> {
    let tx_id: TxId = parse_path(&tx_id, "transaction id")?;
    let view = state
        .storefront
        .lifecycle
        .advance_transaction(actor.user_id(), &tx_id, req.status)
        .await?;

    state.activity.record(client.activity(
        actor.user_id(),
        "update_status",
        RESOURCE,
        format!("{} -> {}", view.tx_id, view.status),
    ));

    Ok(Json(view))
}

/// PATCH /transactions/{tx_id}/cancel: owner or admin.
#[tracing::instrument(skip(state, client), fields(user_id = %actor.user_id()))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    client: ClientInfo,
    Path(tx_id): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    let tx_id: TxId = parse_path(&tx_id, "transaction id")?;
    let view = state
        .storefront
        .lifecycle
        .cancel_transaction(actor.user_id(), &tx_id)
        .await?;

    state.activity.record(client.activity(
        actor.user_id(),
        "cancel",
        RESOURCE,
        format!("{} -> {}", view.tx_id, view.status),
    ));

    Ok(Json(view))
}
