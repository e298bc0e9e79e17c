//! The per-request payment state machine.
//!
//! One [`PaymentGate`] lives for exactly one protected request. It walks the
//! request through challenge, verification, handler execution, and
//! settlement, failing closed at every step: any decode error, verification
//! mismatch, facilitator fault, or ledger connectivity problem ends in a
//! `402 Payment Required` challenge, never in a 5xx or a panic.

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::Response;
use http::{HeaderValue, StatusCode, header};
use std::convert::Infallible;
use tower::Service;

use pay402_types::facilitator::Facilitator;
use pay402_types::util::Base64Bytes;
use pay402_types::{
    PaymentPayload, PaymentRequiredResponse, PaymentRequirements, SettleRequest, VerifyRequest,
    VerifyResponse, X402Version1, X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER,
};

/// Gate state for a single protected request.
pub struct PaymentGate<F> {
    pub facilitator: F,
    /// The requirement reconstructed server-side for this route. Never taken
    /// from anything the client sent, so a stale or forged challenge cannot
    /// be honored.
    pub requirement: PaymentRequirements,
    /// When true, settlement runs as a detached task after the response is
    /// returned and the receipt header is never attached.
    pub settle_detached: bool,
}

impl<F> PaymentGate<F>
where
    F: Facilitator + Clone + Send + Sync + 'static,
{
    /// Runs the full state machine: challenge, verify, invoke the handler
    /// exactly once, then settle.
    pub async fn handle_request<S>(self, mut inner: S, mut req: Request) -> Response
    where
        S: Service<Request, Response = Response, Error = Infallible>,
    {
        let payload = match self.extract_payload(&req) {
            Ok(payload) => payload,
            Err(challenge) => return challenge,
        };

        let verify_request = VerifyRequest {
            payment_payload: payload.clone(),
            payment_requirements: self.requirement.clone(),
        };
        match self.facilitator.verify(&verify_request).await {
            Ok(VerifyResponse::Valid) => {}
            Ok(VerifyResponse::Invalid { error }) => {
                tracing::warn!(reason = %error, resource = %self.requirement.resource, "payment verification failed");
                return self.challenge("payment verification failed");
            }
            Err(error) => {
                // Facilitator unreachable or erroring: fail closed.
                tracing::warn!(error = %error, resource = %self.requirement.resource, "payment verification errored");
                return self.challenge("payment verification failed");
            }
        }

        req.extensions_mut().insert(payload.clone());
        let response = match inner.call(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        // The resource was not delivered; nothing to settle.
        if response.status().is_client_error() || response.status().is_server_error() {
            return response;
        }

        let settle_request = SettleRequest {
            payment_payload: payload,
        };
        if self.settle_detached {
            let facilitator = self.facilitator.clone();
            tokio::spawn(async move {
                match facilitator.settle(&settle_request).await {
                    Ok(receipt) => {
                        tracing::info!(settlement_id = %receipt.settlement_id, "payment settled");
                    }
                    Err(error) => {
                        // The resource is already delivered and is not revoked.
                        tracing::warn!(error = %error, "settlement failed");
                    }
                }
            });
            return response;
        }

        match self.facilitator.settle(&settle_request).await {
            Ok(receipt) => attach_receipt(response, &receipt),
            Err(error) => {
                tracing::warn!(error = %error, resource = %self.requirement.resource, "settlement failed");
                response
            }
        }
    }

    /// Decodes the payment header, or produces the 402 that ends the request.
    fn extract_payload(&self, req: &Request) -> Result<PaymentPayload, Response> {
        let header = req
            .headers()
            .get(X_PAYMENT_HEADER)
            .ok_or_else(|| self.challenge("X-Payment header is required"))?;
        PaymentPayload::try_from(Base64Bytes::from(header.as_bytes())).map_err(|error| {
            tracing::warn!(error = %error, "malformed payment header");
            self.challenge("invalid payment format")
        })
    }

    /// Builds the 402 challenge carrying this route's acceptable terms as a
    /// JSON body.
    fn challenge(&self, error: &str) -> Response {
        let envelope = PaymentRequiredResponse {
            x402_version: X402Version1,
            error: error.to_string(),
            accepts: vec![self.requirement.clone()],
        };
        let body = serde_json::to_vec(&envelope).expect("challenge envelope serialization failed");
        Response::builder()
            .status(StatusCode::PAYMENT_REQUIRED)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("failed to construct 402 response")
    }
}

/// Attaches the settlement receipt as a response header.
///
/// An unencodable receipt only costs the header, never the response.
fn attach_receipt(mut response: Response, receipt: &pay402_types::SettleResponse) -> Response {
    let encoded = match Base64Bytes::try_from(receipt) {
        Ok(encoded) => encoded,
        Err(error) => {
            tracing::warn!(error = %error, "failed to encode settlement receipt");
            return response;
        }
    };
    match HeaderValue::from_bytes(encoded.as_ref()) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(X_PAYMENT_RESPONSE_HEADER, value);
        }
        Err(error) => {
            tracing::warn!(error = %error, "settlement receipt not representable as header");
        }
    }
    response
}
