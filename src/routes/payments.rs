use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::billing::{self, Settlement};
use crate::db::models::Payment;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Json, Path};
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Deserialize)]
pub struct SubscribeRequest {
    pub plan: String,
}

#[derive(Deserialize)]
pub struct WebhookEvent {
    pub reference: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub payment: Payment,
    pub applied: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", get(list))
        .route("/payments/subscribe", post(subscribe))
        .route("/payments/webhook", post(webhook))
        .route("/payments/{id}", get(show))
}

async fn subscribe(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<SubscribeRequest>,
) -> AppResult<(StatusCode, Json<Payment>)> {
    let plan = billing::plan(&req.plan).ok_or_else(|| {
        AppError::BadRequest("Plan must be basic or premium".into())
    })?;
    let conn = state.db.get()?;
    let payment = billing::create_payment(&conn, &user.id, plan, &state.config.payments.currency)?;
    tracing::info!(user_id = %user.id, reference = %payment.reference, plan = plan.name, "Payment created");
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn list(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Vec<Payment>>> {
    let conn = state.db.get()?;
    Ok(Json(billing::for_user(&conn, &user.id)?))
}

async fn show(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Payment>> {
    let conn = state.db.get()?;
    let payment = billing::find(&conn, &id)?
        .filter(|p| p.user_id == user.id)
        .ok_or(AppError::NotFound)?;
    Ok(Json(payment))
}

/// Constant-time comparison for the shared secret.
fn secrets_match(expected: &str, presented: &str) -> bool {
    let (a, b) = (expected.as_bytes(), presented.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<WebhookEvent>,
) -> AppResult<Json<WebhookAck>> {
    let expected = state
        .config
        .payments
        .webhook_secret
        .as_deref()
        .ok_or(AppError::NotFound)?;
    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !secrets_match(expected, presented) {
        tracing::warn!("Payment webhook rejected: bad secret");
        return Err(AppError::Unauthorized);
    }

    let outcome = Settlement::parse(&event.status).ok_or_else(|| {
        AppError::BadRequest("Status must be confirmed or failed".into())
    })?;

    let mut conn = state.db.get()?;
    let applied = billing::settle(&mut conn, &event.reference, outcome)?.ok_or(AppError::NotFound)?;
    if applied.changed {
        tracing::info!(
            reference = %applied.payment.reference,
            user_id = %applied.payment.user_id,
            status = %applied.payment.status,
            "Payment settled"
        );
    } else {
        tracing::debug!(reference = %applied.payment.reference, "Payment already settled");
    }

    Ok(Json(WebhookAck {
        payment: applied.payment,
        applied: applied.changed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_comparison() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3cre"));
        assert!(!secrets_match("s3cret", "S3cret"));
        assert!(!secrets_match("s3cret", ""));
    }
}
