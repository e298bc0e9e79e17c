//! HTTP endpoints exposed by the facilitator server.
//!
//! - `GET /health` answers liveness probes.
//! - `POST /verify` checks a payment against requirements without committing.
//! - `POST /settle` commits a verified payment and returns the receipt.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::facilitator_local::FacilitatorLocal;
use pay402_types::ledger::LedgerClient;
use pay402_types::{ErrorResponse, SettleRequest, VerifyRequest, VerifyResponse};

pub fn routes<L>() -> Router<Arc<FacilitatorLocal<L>>>
where
    L: LedgerClient + 'static,
{
    Router::new()
        .route("/health", get(get_health))
        .route("/verify", post(post_verify::<L>))
        .route("/settle", post(post_settle::<L>))
}

#[instrument(skip_all)]
async fn get_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
    }))
}

/// `POST /verify`: verification of a proposed payment.
///
/// Responds 200 with `{"valid": true}` when the payment satisfies the
/// requirements, 400 with `{"valid": false, "error": ...}` when it does not.
/// Verification never mutates ledger state.
#[instrument(skip_all)]
async fn post_verify<L>(
    State(facilitator): State<Arc<FacilitatorLocal<L>>>,
    Json(body): Json<VerifyRequest>,
) -> impl IntoResponse
where
    L: LedgerClient,
{
    let response = facilitator.verify_payment(&body).await;
    let status = match &response {
        VerifyResponse::Valid => StatusCode::OK,
        VerifyResponse::Invalid { .. } => StatusCode::BAD_REQUEST,
    };
    (status, Json(response))
}

/// `POST /settle`: commits a payment's transfer and returns the receipt.
///
/// Typically called after a successful `/verify`. Settlement of the same
/// transfer artifact twice is refused.
#[instrument(skip_all)]
async fn post_settle<L>(
    State(facilitator): State<Arc<FacilitatorLocal<L>>>,
    Json(body): Json<SettleRequest>,
) -> impl IntoResponse
where
    L: LedgerClient,
{
    match facilitator.settle_payment(&body).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(error) => {
            tracing::warn!(error = %error, "settlement failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: error.to_string(),
                }),
            )
                .into_response()
        }
    }
}
