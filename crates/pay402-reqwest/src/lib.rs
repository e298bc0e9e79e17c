//! Reqwest middleware that pays X402 challenges automatically.
//!
//! Attach [`X402Payments`] to a client and any request answered with
//! `402 Payment Required` is retried once with a signed payment: the
//! middleware parses the challenge body, picks one of the offered terms,
//! builds and signs a transfer through the configured ledger, and resends
//! the request with an `X-Payment` header. The settlement receipt, when the
//! server attaches one, is available via [`settlement_from_headers`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use pay402_reqwest::{ReqwestWithPayments, ReqwestWithPaymentsBuild, X402Payments};
//! use pay402_types::ledger::memory::{InMemoryLedger, StaticSigner};
//! use pay402_types::AssetId;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = InMemoryLedger::new();
//! let signer = StaticSigner::new("alice".parse()?);
//! let client = reqwest::Client::new()
//!     .with_payments(
//!         X402Payments::new(ledger, signer)
//!             .max(AssetId::native(), "1000000000".parse()?),
//!     )
//!     .build();
//!
//! let response = client.get("https://api.example.com/premium").send().await?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod middleware;
mod selector;

pub use builder::{ReqwestWithPayments, ReqwestWithPaymentsBuild, ReqwestWithPaymentsBuilder};
pub use middleware::{X402Payments, X402PaymentsError, settlement_from_headers};
pub use selector::{CheapestAccepted, FirstAccepted, RequirementSelector};
