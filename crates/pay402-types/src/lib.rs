//! Core structures for the X402 payment protocol.
//!
//! X402 is a three-party, HTTP-native payment flow: a resource server
//! challenges unauthenticated requests with `402 Payment Required` and a set
//! of acceptable payment terms, a client signs and attaches a payment
//! artifact, and a facilitator (or the resource server itself) verifies the
//! artifact against a ledger and settles it.
//!
//! This crate holds everything the parties agree on:
//!
//! - the wire types ([`PaymentRequirements`], [`PaymentPayload`],
//!   [`SettleResponse`], [`PaymentRequiredResponse`]) and their base64
//!   transport encoding ([`util::Base64Bytes`]),
//! - the [`facilitator::Facilitator`] trait shared by the local engine and
//!   the remote facilitator client,
//! - the [`ledger::LedgerClient`] and [`ledger::TransferSigner`] contracts
//!   the protocol layer expects from the underlying ledger,
//! - static configuration ([`config::RoutesConfig`], [`config::TokenConfig`],
//!   [`config::FacilitatorConfig`]).

pub mod config;
pub mod facilitator;
pub mod ledger;
pub mod proto;
pub mod util;

pub use proto::*;
