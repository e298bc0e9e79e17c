//! The contract the protocol layer expects from a ledger.
//!
//! X402 treats the ledger as an opaque verifier and executor of opaque signed
//! artifacts: [`LedgerClient::build_transfer`] produces transfer bytes for a
//! requirement, [`TransferSigner::sign_transfer`] signs them, and the
//! facilitator side dry-runs or commits the result. Consensus, transaction
//! construction internals, and cryptography all live behind these traits.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::Arc;

use crate::proto::{
    Address, AssetId, SettlementId, TokenAmount, TransferBytes, TransferSignature,
};

/// Everything a ledger needs to construct a transfer artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub sender: Address,
    pub recipient: Address,
    pub amount: TokenAmount,
    pub asset: AssetId,
}

/// Asynchronous interface to a ledger.
///
/// `simulate_transfer` must never mutate ledger state; `execute_transfer`
/// commits and reports the ledger-assigned settlement identifier. Double-spend
/// protection for repeated execution of the same artifact is the ledger's
/// responsibility.
pub trait LedgerClient: Send + Sync {
    type Error: Debug + Display + Send;

    /// Builds unsigned transfer bytes for the given amount, recipient, and asset.
    fn build_transfer(
        &self,
        request: &TransferRequest,
    ) -> impl Future<Output = Result<TransferBytes, Self::Error>> + Send;

    /// Dry-runs a signed transfer against current ledger state without
    /// committing it.
    fn simulate_transfer(
        &self,
        transaction: &TransferBytes,
        signature: &TransferSignature,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Commits a signed transfer and returns the settlement identifier.
    fn execute_transfer(
        &self,
        transaction: &TransferBytes,
        signature: &TransferSignature,
    ) -> impl Future<Output = Result<SettlementId, Self::Error>> + Send;

    /// Reports an account's spendable balance for the given asset.
    fn balance(
        &self,
        account: &Address,
        asset: &AssetId,
    ) -> impl Future<Output = Result<TokenAmount, Self::Error>> + Send;
}

impl<T: LedgerClient> LedgerClient for Arc<T> {
    type Error = T::Error;

    fn build_transfer(
        &self,
        request: &TransferRequest,
    ) -> impl Future<Output = Result<TransferBytes, Self::Error>> + Send {
        self.as_ref().build_transfer(request)
    }

    fn simulate_transfer(
        &self,
        transaction: &TransferBytes,
        signature: &TransferSignature,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().simulate_transfer(transaction, signature)
    }

    fn execute_transfer(
        &self,
        transaction: &TransferBytes,
        signature: &TransferSignature,
    ) -> impl Future<Output = Result<SettlementId, Self::Error>> + Send {
        self.as_ref().execute_transfer(transaction, signature)
    }

    fn balance(
        &self,
        account: &Address,
        asset: &AssetId,
    ) -> impl Future<Output = Result<TokenAmount, Self::Error>> + Send {
        self.as_ref().balance(account, asset)
    }
}

/// A signing credential: turns transfer bytes into a signature and exposes a
/// stable account address.
pub trait TransferSigner: Send + Sync {
    type Error: Debug + Display + Send;

    /// The account that signs, and therefore pays.
    fn address(&self) -> Address;

    fn sign_transfer(
        &self,
        transaction: &TransferBytes,
    ) -> impl Future<Output = Result<TransferSignature, Self::Error>> + Send;
}

impl<T: TransferSigner> TransferSigner for Arc<T> {
    type Error = T::Error;

    fn address(&self) -> Address {
        self.as_ref().address()
    }

    fn sign_transfer(
        &self,
        transaction: &TransferBytes,
    ) -> impl Future<Output = Result<TransferSignature, Self::Error>> + Send {
        self.as_ref().sign_transfer(transaction)
    }
}

pub mod memory {
    //! In-memory ledger used by tests, examples, and local development.
    //!
    //! Transfer artifacts are the JSON encoding of [`TransferRequest`];
    //! signatures are the signer address prefixed to the artifact length, which
    //! is enough for a ledger that trusts its process boundary.

    use std::collections::HashMap;
    use std::convert::Infallible;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    pub enum MemoryLedgerError {
        #[error("malformed transfer artifact")]
        MalformedTransfer,
        #[error("missing signature")]
        MissingSignature,
        #[error("insufficient balance: have {available}, need {required}")]
        InsufficientBalance {
            available: TokenAmount,
            required: TokenAmount,
        },
        #[error("transfer amount must be positive")]
        ZeroAmount,
    }

    /// A process-local ledger holding balances per `(account, asset)` pair.
    #[derive(Debug, Default)]
    pub struct InMemoryLedger {
        accounts: Mutex<HashMap<(Address, AssetId), TokenAmount>>,
        sequence: AtomicU64,
    }

    impl InMemoryLedger {
        pub fn new() -> Self {
            Self::default()
        }

        /// Funds an account, creating it if needed.
        pub fn credit(&self, account: &Address, asset: &AssetId, amount: TokenAmount) {
            let mut accounts = self.accounts.lock().expect("ledger lock poisoned");
            let entry = accounts
                .entry((account.clone(), asset.clone()))
                .or_insert(TokenAmount::ZERO);
            *entry = TokenAmount(entry.0 + amount.0);
        }

        fn decode(transaction: &TransferBytes) -> Result<TransferRequest, MemoryLedgerError> {
            serde_json::from_slice(transaction.as_bytes())
                .map_err(|_| MemoryLedgerError::MalformedTransfer)
        }

        fn validate(
            transfer: &TransferRequest,
            signature: &TransferSignature,
        ) -> Result<(), MemoryLedgerError> {
            if signature.as_bytes().is_empty() {
                return Err(MemoryLedgerError::MissingSignature);
            }
            if transfer.amount == TokenAmount::ZERO {
                return Err(MemoryLedgerError::ZeroAmount);
            }
            Ok(())
        }

        fn available(
            accounts: &HashMap<(Address, AssetId), TokenAmount>,
            transfer: &TransferRequest,
        ) -> Result<TokenAmount, MemoryLedgerError> {
            let available = accounts
                .get(&(transfer.sender.clone(), transfer.asset.clone()))
                .copied()
                .unwrap_or(TokenAmount::ZERO);
            if available < transfer.amount {
                return Err(MemoryLedgerError::InsufficientBalance {
                    available,
                    required: transfer.amount,
                });
            }
            Ok(available)
        }
    }

    impl LedgerClient for InMemoryLedger {
        type Error = MemoryLedgerError;

        async fn build_transfer(
            &self,
            request: &TransferRequest,
        ) -> Result<TransferBytes, Self::Error> {
            let bytes =
                serde_json::to_vec(request).map_err(|_| MemoryLedgerError::MalformedTransfer)?;
            Ok(TransferBytes::new(bytes))
        }

        async fn simulate_transfer(
            &self,
            transaction: &TransferBytes,
            signature: &TransferSignature,
        ) -> Result<(), Self::Error> {
            let transfer = Self::decode(transaction)?;
            Self::validate(&transfer, signature)?;
            let accounts = self.accounts.lock().expect("ledger lock poisoned");
            Self::available(&accounts, &transfer)?;
            Ok(())
        }

        async fn execute_transfer(
            &self,
            transaction: &TransferBytes,
            signature: &TransferSignature,
        ) -> Result<SettlementId, Self::Error> {
            let transfer = Self::decode(transaction)?;
            Self::validate(&transfer, signature)?;
            // Balance check and debit happen under one guard, so concurrent
            // transfers from the same sender cannot both pass the check.
            let mut accounts = self.accounts.lock().expect("ledger lock poisoned");
            let available = Self::available(&accounts, &transfer)?;
            let sender_key = (transfer.sender.clone(), transfer.asset.clone());
            accounts.insert(sender_key, TokenAmount(available.0 - transfer.amount.0));
            let recipient_key = (transfer.recipient.clone(), transfer.asset.clone());
            let recipient_balance = accounts
                .get(&recipient_key)
                .copied()
                .unwrap_or(TokenAmount::ZERO);
            accounts.insert(
                recipient_key,
                TokenAmount(recipient_balance.0 + transfer.amount.0),
            );
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            Ok(SettlementId(format!("mem-{seq}")))
        }

        async fn balance(
            &self,
            account: &Address,
            asset: &AssetId,
        ) -> Result<TokenAmount, Self::Error> {
            let accounts = self.accounts.lock().expect("ledger lock poisoned");
            Ok(accounts
                .get(&(account.clone(), asset.clone()))
                .copied()
                .unwrap_or(TokenAmount::ZERO))
        }
    }

    /// A signer backed by nothing but an address, for use with
    /// [`InMemoryLedger`].
    #[derive(Debug, Clone)]
    pub struct StaticSigner {
        address: Address,
    }

    impl StaticSigner {
        pub fn new(address: Address) -> Self {
            StaticSigner { address }
        }
    }

    impl TransferSigner for StaticSigner {
        type Error = Infallible;

        fn address(&self) -> Address {
            self.address.clone()
        }

        async fn sign_transfer(
            &self,
            transaction: &TransferBytes,
        ) -> Result<TransferSignature, Self::Error> {
            let mut bytes = self.address.as_str().as_bytes().to_vec();
            bytes.push(b':');
            bytes.extend_from_slice(&(transaction.as_bytes().len() as u64).to_be_bytes());
            Ok(TransferSignature::new(bytes))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn addr(s: &str) -> Address {
            s.parse().unwrap()
        }

        fn amount(s: &str) -> TokenAmount {
            s.parse().unwrap()
        }

        async fn signed_transfer(
            ledger: &InMemoryLedger,
            from: &str,
            to: &str,
            value: &str,
        ) -> (TransferBytes, TransferSignature) {
            let request = TransferRequest {
                sender: addr(from),
                recipient: addr(to),
                amount: amount(value),
                asset: AssetId::native(),
            };
            let transaction = ledger.build_transfer(&request).await.unwrap();
            let signer = StaticSigner::new(addr(from));
            let signature = signer.sign_transfer(&transaction).await.unwrap();
            (transaction, signature)
        }

        #[tokio::test]
        async fn simulate_does_not_move_funds() {
            let ledger = InMemoryLedger::new();
            ledger.credit(&addr("alice"), &AssetId::native(), amount("2000000000"));
            let (tx, sig) = signed_transfer(&ledger, "alice", "bob", "1000000000").await;

            ledger.simulate_transfer(&tx, &sig).await.unwrap();
            ledger.simulate_transfer(&tx, &sig).await.unwrap();

            let balance = ledger.balance(&addr("alice"), &AssetId::native()).await.unwrap();
            assert_eq!(balance, amount("2000000000"));
            let bob = ledger.balance(&addr("bob"), &AssetId::native()).await.unwrap();
            assert_eq!(bob, TokenAmount::ZERO);
        }

        #[tokio::test]
        async fn execute_moves_funds_and_assigns_unique_ids() {
            let ledger = InMemoryLedger::new();
            ledger.credit(&addr("alice"), &AssetId::native(), amount("3000000000"));
            let (tx1, sig1) = signed_transfer(&ledger, "alice", "bob", "1000000000").await;
            let (tx2, sig2) = signed_transfer(&ledger, "alice", "bob", "2000000000").await;

            let id1 = ledger.execute_transfer(&tx1, &sig1).await.unwrap();
            let id2 = ledger.execute_transfer(&tx2, &sig2).await.unwrap();
            assert_ne!(id1, id2);

            let alice = ledger.balance(&addr("alice"), &AssetId::native()).await.unwrap();
            assert_eq!(alice, TokenAmount::ZERO);
            let bob = ledger.balance(&addr("bob"), &AssetId::native()).await.unwrap();
            assert_eq!(bob, amount("3000000000"));
        }

        #[tokio::test(flavor = "multi_thread")]
        async fn concurrent_transfers_never_overdraw() {
            let ledger = Arc::new(InMemoryLedger::new());
            ledger.credit(&addr("alice"), &AssetId::native(), amount("3"));

            let mut handles = Vec::new();
            for _ in 0..10 {
                let ledger = ledger.clone();
                handles.push(tokio::spawn(async move {
                    let (tx, sig) = signed_transfer(&ledger, "alice", "bob", "1").await;
                    ledger.execute_transfer(&tx, &sig).await.is_ok()
                }));
            }
            let mut succeeded = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    succeeded += 1;
                }
            }

            assert_eq!(succeeded, 3);
            let alice = ledger.balance(&addr("alice"), &AssetId::native()).await.unwrap();
            assert_eq!(alice, TokenAmount::ZERO);
            let bob = ledger.balance(&addr("bob"), &AssetId::native()).await.unwrap();
            assert_eq!(bob, amount("3"));
        }

        #[tokio::test]
        async fn insufficient_balance_fails_simulation() {
            let ledger = InMemoryLedger::new();
            ledger.credit(&addr("alice"), &AssetId::native(), amount("100"));
            let (tx, sig) = signed_transfer(&ledger, "alice", "bob", "1000000000").await;

            let err = ledger.simulate_transfer(&tx, &sig).await.unwrap_err();
            assert!(matches!(err, MemoryLedgerError::InsufficientBalance { .. }));
        }
    }
}
