//! Middleware turning `402 Payment Required` responses into paid retries.
//!
//! [`X402Payments`] implements [`reqwest_middleware::Middleware`]. When a
//! request comes back 402, it reads the challenge envelope from the body,
//! selects one of the offered terms, builds and signs a transfer through the
//! configured ledger, and retries the request once with an `X-Payment`
//! header.

use http::{Extensions, HeaderMap, HeaderValue, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use pay402_types::ledger::{LedgerClient, TransferRequest, TransferSigner};
use pay402_types::util::Base64Bytes;
use pay402_types::{
    AssetId, PaymentPayload, PaymentRequiredResponse, PaymentRequirements, Scheme, SettleResponse,
    TokenAmount, X402Version1, X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER,
};

use crate::selector::{FirstAccepted, RequirementSelector};

/// Errors that can occur while constructing or applying a payment.
#[derive(Debug, thiserror::Error)]
pub enum X402PaymentsError {
    /// The 402 challenge offered no terms at all.
    #[error("Challenge offered no acceptable payment terms")]
    EmptyAccepts,
    /// The selector rejected every offered term.
    #[error("No suitable payment method among {count} offered term(s)")]
    NoSuitablePaymentMethod { count: usize },
    /// The selected term costs more than the configured cap for its asset.
    /// This is checked before any transfer is built or signed.
    #[error("Payment amount {requested} exceeds maximum allowed {allowed} for asset {asset}")]
    PaymentAmountTooLarge {
        requested: TokenAmount,
        allowed: TokenAmount,
        asset: AssetId,
    },
    /// The original request could not be cloned for the paid retry, usually
    /// because the body is a stream.
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,
    /// The ledger failed to construct the transfer artifact.
    #[error("Failed to build transfer: {0}")]
    Ledger(String),
    /// The signer failed to sign the transfer artifact.
    #[error("Failed to sign transfer: {0}")]
    Signing(String),
    #[error("Failed to encode payment payload to json")]
    JsonEncode(#[source] serde_json::Error),
    #[error("Failed to encode payment payload to HTTP header")]
    HeaderValueEncode(#[source] http::header::InvalidHeaderValue),
}

impl From<X402PaymentsError> for rqm::Error {
    fn from(error: X402PaymentsError) -> Self {
        rqm::Error::Middleware(error.into())
    }
}

/// Middleware that answers 402 challenges by paying them.
///
/// Holds the payer's ledger connection and signing credential, plus
/// per-asset spend caps checked before any transfer is constructed.
#[derive(Clone)]
pub struct X402Payments<L, S> {
    ledger: Arc<L>,
    signer: Arc<S>,
    max_token_amount: HashMap<AssetId, TokenAmount>,
    selector: Arc<dyn RequirementSelector>,
}

impl<L, S> X402Payments<L, S>
where
    L: LedgerClient,
    S: TransferSigner,
{
    /// Creates the middleware from a ledger connection and a signer. Terms
    /// are selected with [`FirstAccepted`] unless overridden.
    pub fn new(ledger: L, signer: S) -> Self {
        X402Payments {
            ledger: Arc::new(ledger),
            signer: Arc::new(signer),
            max_token_amount: HashMap::new(),
            selector: Arc::new(FirstAccepted),
        }
    }

    /// Caps spending per request for the given asset. Challenges demanding
    /// more fail without touching the ledger.
    pub fn max(mut self, asset: AssetId, amount: TokenAmount) -> Self {
        self.max_token_amount.insert(asset, amount);
        self
    }

    /// Replaces the term-selection strategy.
    pub fn with_selector(mut self, selector: impl RequirementSelector + 'static) -> Self {
        self.selector = Arc::new(selector);
        self
    }

    /// Picks one of the offered terms, or fails if none is acceptable.
    pub fn select_payment_requirements<'a>(
        &self,
        accepts: &'a [PaymentRequirements],
    ) -> Result<&'a PaymentRequirements, X402PaymentsError> {
        if accepts.is_empty() {
            return Err(X402PaymentsError::EmptyAccepts);
        }
        self.selector
            .select(accepts)
            .ok_or(X402PaymentsError::NoSuitablePaymentMethod {
                count: accepts.len(),
            })
    }

    /// Ensures the selected term does not exceed the configured cap.
    pub fn assert_max_amount(
        &self,
        selected: &PaymentRequirements,
    ) -> Result<(), X402PaymentsError> {
        if let Some(max) = self.max_token_amount.get(&selected.asset) {
            if selected.max_amount_required > *max {
                return Err(X402PaymentsError::PaymentAmountTooLarge {
                    requested: selected.max_amount_required,
                    allowed: *max,
                    asset: selected.asset.clone(),
                });
            }
        }
        Ok(())
    }

    /// Constructs a [`PaymentPayload`] for a selected term: builds the
    /// transfer through the ledger, signs it, and wraps both with the terms
    /// being satisfied.
    #[instrument(name = "x402.make_payment_payload", skip_all, fields(
        network = %selected.network,
        asset = %selected.asset,
        amount = %selected.max_amount_required,
    ))]
    pub async fn make_payment_payload(
        &self,
        selected: &PaymentRequirements,
    ) -> Result<PaymentPayload, X402PaymentsError> {
        let transfer = TransferRequest {
            sender: self.signer.address(),
            recipient: selected.pay_to.clone(),
            amount: selected.max_amount_required,
            asset: selected.asset.clone(),
        };
        let transaction = self
            .ledger
            .build_transfer(&transfer)
            .await
            .map_err(|e| X402PaymentsError::Ledger(e.to_string()))?;
        let signature = self
            .signer
            .sign_transfer(&transaction)
            .await
            .map_err(|e| X402PaymentsError::Signing(e.to_string()))?;
        Ok(PaymentPayload {
            x402_version: X402Version1,
            scheme: Scheme::Exact,
            network: selected.network.clone(),
            transaction,
            signature,
            amount: selected.max_amount_required,
            pay_to: selected.pay_to.clone(),
            asset: selected.asset.clone(),
        })
    }

    /// Encodes a payload into an `X-Payment` header value.
    pub fn encode_payment_header(
        payload: &PaymentPayload,
    ) -> Result<HeaderValue, X402PaymentsError> {
        let b64 = Base64Bytes::try_from(payload).map_err(X402PaymentsError::JsonEncode)?;
        HeaderValue::from_bytes(b64.as_ref()).map_err(X402PaymentsError::HeaderValueEncode)
    }

    /// Selects a term, enforces the spend cap, then builds, signs, and
    /// encodes the payment.
    #[instrument(name = "x402.build_payment_header", skip_all)]
    pub async fn build_payment_header(
        &self,
        accepts: &[PaymentRequirements],
    ) -> Result<HeaderValue, X402PaymentsError> {
        let selected = self.select_payment_requirements(accepts)?;
        self.assert_max_amount(selected)?;
        let payload = self.make_payment_payload(selected).await?;
        Self::encode_payment_header(&payload)
    }
}

/// Decodes the settlement receipt from a response's `X-Payment-Response`
/// header, if one is present and parseable. A header that fails to decode
/// is logged and ignored; the response itself is unaffected.
pub fn settlement_from_headers(headers: &HeaderMap) -> Option<SettleResponse> {
    let header = headers.get(X_PAYMENT_RESPONSE_HEADER)?;
    match SettleResponse::try_from(Base64Bytes::from(header.as_bytes())) {
        Ok(receipt) => Some(receipt),
        Err(error) => {
            tracing::warn!(error = %error, "undecodable settlement receipt header");
            None
        }
    }
}

#[async_trait::async_trait]
impl<L, S> rqm::Middleware for X402Payments<L, S>
where
    L: LedgerClient + 'static,
    S: TransferSigner + 'static,
{
    /// Runs the request; on a 402, pays the challenge and retries once.
    #[instrument(name = "x402.handle", skip(self, req, extensions, next), fields(method = %req.method(), url = %req.url()))]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();

        let res = next.clone().run(req, extensions).await?;
        if res.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(res);
        }

        let challenge = res.json::<PaymentRequiredResponse>().await?;
        tracing::debug!(error = %challenge.error, offers = challenge.accepts.len(), "received payment challenge");

        let retry_req = async {
            let payment_header = self.build_payment_header(&challenge.accepts).await?;
            let mut req = retry_req.ok_or(X402PaymentsError::RequestNotCloneable)?;
            let headers = req.headers_mut();
            headers.insert(X_PAYMENT_HEADER, payment_header);
            headers.insert(
                "Access-Control-Expose-Headers",
                HeaderValue::from_static(X_PAYMENT_RESPONSE_HEADER),
            );
            Ok::<Request, X402PaymentsError>(req)
        }
        .await
        .map_err(Into::<rqm::Error>::into)?;

        let res = next.run(retry_req, extensions).await?;
        if let Some(receipt) = settlement_from_headers(res.headers()) {
            tracing::debug!(settlement_id = %receipt.settlement_id, amount = %receipt.amount, "payment settled");
        }
        Ok(res)
    }
}
