//! The verification and settlement interface shared by all facilitators.
//!
//! Implemented both by the in-process engine (`pay402::FacilitatorLocal`) and
//! by the HTTP client for a remote facilitator (`pay402_axum::FacilitatorClient`),
//! so the resource-server interceptor does not care where verification
//! actually happens.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::Arc;

use crate::proto::{SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};

/// Asynchronous interface for X402 payment facilitators.
pub trait Facilitator {
    /// Error for faults of the facilitator itself (transport failures,
    /// rejected settlements). A payment that merely fails verification is not
    /// an error; it surfaces as [`VerifyResponse::Invalid`].
    type Error: Debug + Display + Send;

    /// Checks a payment payload against the requirements: structural field
    /// matching plus a ledger dry-run that must not commit anything.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send;

    /// Commits a payload that already passed verification, producing the
    /// settlement receipt.
    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;
}

impl<T: Facilitator + Sync> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send {
        self.as_ref().settle(request)
    }
}
