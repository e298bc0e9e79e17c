//! In-process facilitator backed by a ledger connection.
//!
//! [`FacilitatorLocal`] performs the two protocol operations itself instead
//! of delegating to a remote service: verification dry-runs the transfer
//! against current ledger state, settlement commits it. A settlement replay
//! guard keyed by the transfer artifact rejects a second settle attempt for
//! the same signed transfer before the ledger ever sees it.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::instrument;

use pay402_types::facilitator::Facilitator;
use pay402_types::ledger::LedgerClient;
use pay402_types::{
    Address, AssetId, Network, Scheme, SettleRequest, SettleResponse, SettlementId, TokenAmount,
    UnixTimestamp, VerifyRequest, VerifyResponse,
};

/// Errors produced while verifying or settling a payment.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("incompatible scheme: expected {expected}, got {actual}")]
    IncompatibleScheme { expected: Scheme, actual: Scheme },
    #[error("incompatible network: expected {expected}, got {actual}")]
    IncompatibleNetwork { expected: Network, actual: Network },
    #[error("incompatible receiver: expected {expected}, got {actual}")]
    IncompatibleReceiver { expected: Address, actual: Address },
    #[error("incompatible asset: expected {expected}, got {actual}")]
    IncompatibleAsset { expected: AssetId, actual: AssetId },
    #[error("insufficient amount: required {required}, offered {offered}")]
    InsufficientAmount {
        required: TokenAmount,
        offered: TokenAmount,
    },
    #[error("transfer simulation failed: {0}")]
    Simulation(String),
    #[error("transfer has already been settled or is settling")]
    DuplicateSettlement,
    #[error("settlement failed: {0}")]
    SettlementFailed(String),
    #[error("system clock is before the unix epoch")]
    Clock,
}

enum SettlementState {
    InFlight,
    Completed(SettlementId),
}

/// A facilitator that verifies and settles against one ledger.
pub struct FacilitatorLocal<L> {
    ledger: L,
    /// Replay guard: transfer artifact (base64) to settlement state. An entry
    /// is inserted before the ledger call and removed again only if the call
    /// fails, so a concurrent duplicate is refused while the first attempt
    /// is still in flight.
    settlements: DashMap<String, SettlementState>,
}

impl<L> FacilitatorLocal<L>
where
    L: LedgerClient,
{
    pub fn new(ledger: L) -> Self {
        FacilitatorLocal {
            ledger,
            settlements: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Checks a payment against its requirement.
    ///
    /// All term checks run before the ledger is consulted, in a fixed order:
    /// scheme, network, receiver, asset, amount, then the simulation. Never
    /// fails with an error: any mismatch, and any ledger fault, yields
    /// [`VerifyResponse::Invalid`].
    #[instrument(skip_all, fields(network = %request.payment_payload.network, asset = %request.payment_payload.asset))]
    pub async fn verify_payment(&self, request: &VerifyRequest) -> VerifyResponse {
        match self.check_terms(request).await {
            Ok(()) => VerifyResponse::valid(),
            Err(error) => {
                tracing::warn!(error = %error, "payment verification rejected");
                VerifyResponse::invalid(error.to_string())
            }
        }
    }

    async fn check_terms(&self, request: &VerifyRequest) -> Result<(), PaymentError> {
        let payload = &request.payment_payload;
        let requirements = &request.payment_requirements;
        if payload.scheme != requirements.scheme {
            return Err(PaymentError::IncompatibleScheme {
                expected: requirements.scheme,
                actual: payload.scheme,
            });
        }
        if payload.network != requirements.network {
            return Err(PaymentError::IncompatibleNetwork {
                expected: requirements.network.clone(),
                actual: payload.network.clone(),
            });
        }
        if payload.pay_to != requirements.pay_to {
            return Err(PaymentError::IncompatibleReceiver {
                expected: requirements.pay_to.clone(),
                actual: payload.pay_to.clone(),
            });
        }
        if payload.asset != requirements.asset {
            return Err(PaymentError::IncompatibleAsset {
                expected: requirements.asset.clone(),
                actual: payload.asset.clone(),
            });
        }
        // Overpaying is the client's prerogative.
        if payload.amount < requirements.max_amount_required {
            return Err(PaymentError::InsufficientAmount {
                required: requirements.max_amount_required,
                offered: payload.amount,
            });
        }
        self.ledger
            .simulate_transfer(&payload.transaction, &payload.signature)
            .await
            .map_err(|e| PaymentError::Simulation(e.to_string()))
    }

    /// Commits a payment's transfer to the ledger and produces the receipt.
    ///
    /// A transfer artifact settles at most once through this facilitator;
    /// repeats fail with [`PaymentError::DuplicateSettlement`] without
    /// reaching the ledger. A failed ledger call releases the guard so the
    /// client may retry.
    #[instrument(skip_all, fields(network = %request.payment_payload.network, amount = %request.payment_payload.amount))]
    pub async fn settle_payment(
        &self,
        request: &SettleRequest,
    ) -> Result<SettleResponse, PaymentError> {
        let payload = &request.payment_payload;
        let key = payload.transaction.encoded();
        match self.settlements.entry(key.clone()) {
            Entry::Occupied(_) => return Err(PaymentError::DuplicateSettlement),
            Entry::Vacant(vacant) => {
                vacant.insert(SettlementState::InFlight);
            }
        }

        let settled = self
            .ledger
            .execute_transfer(&payload.transaction, &payload.signature)
            .await;
        let settlement_id = match settled {
            Ok(id) => id,
            Err(error) => {
                self.settlements.remove(&key);
                return Err(PaymentError::SettlementFailed(error.to_string()));
            }
        };
        self.settlements
            .insert(key, SettlementState::Completed(settlement_id.clone()));

        let timestamp = UnixTimestamp::now().map_err(|_| PaymentError::Clock)?;
        tracing::info!(settlement_id = %settlement_id, "payment settled");
        Ok(SettleResponse {
            settlement_id,
            amount: payload.amount,
            timestamp,
            effects: None,
        })
    }
}

impl<L> Facilitator for FacilitatorLocal<L>
where
    L: LedgerClient,
{
    type Error = PaymentError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        Ok(self.verify_payment(request).await)
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        self.settle_payment(request).await
    }
}
