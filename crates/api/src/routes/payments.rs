//! Payment submission and review.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{PaymentId, PaymentStatus};
use domain::SubmitPayment;
use serde::Deserialize;
use store::PaymentRecord;

use super::{ApiJson, ClientInfo, parse_path};
use crate::AppState;
use crate::error::ApiError;
use crate::principal::Actor;

const RESOURCE: &str = "payments";

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentRequest {
    pub status: PaymentStatus,
}

/// POST /payments: submit a payment for a waiting transaction.
#[tracing::instrument(skip(state, client, req), fields(user_id = %actor.user_id()))]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    client: ClientInfo,
    ApiJson(req): ApiJson<SubmitPayment>,
) -> Result<(StatusCode, Json<PaymentRecord>), ApiError> {
    let payment = state.storefront.payments.submit(actor.user_id(), req).await?;

    state.activity.record(client.activity(
        actor.user_id(),
        "pay",
        RESOURCE,
        format!("{} for {} amount {}", payment.id, payment.tx_id, payment.total_payment),
    ));

    Ok((StatusCode::CREATED, Json(payment)))
}

/// PUT /payments/{payment_id}: admin review.
#[tracing::instrument(skip(state, client, req), fields(user_id = %actor.user_id()))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    client: ClientInfo,
    Path(payment_id): Path<String>,
    ApiJson(req): ApiJson<UpdatePaymentRequest>,
) -> Result<Json<PaymentRecord>, ApiError> {
    let payment_id: PaymentId = parse_path(&payment_id, "payment id")?;
    let payment = state
        .storefront
        .payments
        .update_status(actor.user_id(), payment_id, req.status)
        .await?;

    state.activity.record(client.activity(
        actor.user_id(),
        "update_status",
        RESOURCE,
        format!("{} -> {}", payment.id, payment.status),
    ));

    Ok(Json(payment))
}

/// GET /payments/{payment_id}: owner or admin.
#[tracing::instrument(skip(state), fields(user_id = %actor.user_id()))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentRecord>, ApiError> {
    let payment_id: PaymentId = parse_path(&payment_id, "payment id")?;
    let payment = state
        .storefront
        .payments
        .get(actor.user_id(), payment_id)
        .await?;
    Ok(Json(payment))
}
