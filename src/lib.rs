//! X402 facilitator: verification and settlement of HTTP 402 payments.
//!
//! The facilitator sits between resource servers and a ledger. Servers
//! forward client payments here; `/verify` dry-runs the embedded transfer
//! against ledger state, `/settle` commits it and returns a receipt. The
//! ledger is reached over JSON-RPC and treated as opaque: this crate never
//! interprets transfer artifacts or signatures.
//!
//! The building blocks are also usable in-process: [`FacilitatorLocal`]
//! implements the same verify/settle contract without HTTP, which lets a
//! resource server embed the facilitator directly.

pub mod config;
pub mod facilitator_local;
pub mod handlers;
pub mod ledger_rpc;
pub mod telemetry;

pub use config::Config;
pub use facilitator_local::{FacilitatorLocal, PaymentError};
pub use ledger_rpc::{JsonRpcLedger, LedgerRpcError};
