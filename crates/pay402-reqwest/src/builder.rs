//! Fluent extension for attaching [`X402Payments`] to a reqwest client.

use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;

use crate::middleware::X402Payments;

/// Entry point: `Client::new().with_payments(payments).build()`.
pub trait ReqwestWithPayments<A, L, S> {
    fn with_payments(self, payments: X402Payments<L, S>) -> ReqwestWithPaymentsBuilder<A, L, S>;
}

impl<L, S> ReqwestWithPayments<Client, L, S> for Client {
    fn with_payments(
        self,
        payments: X402Payments<L, S>,
    ) -> ReqwestWithPaymentsBuilder<Client, L, S> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            payments,
        }
    }
}

impl<L, S> ReqwestWithPayments<ClientBuilder, L, S> for ClientBuilder {
    fn with_payments(
        self,
        payments: X402Payments<L, S>,
    ) -> ReqwestWithPaymentsBuilder<ClientBuilder, L, S> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            payments,
        }
    }
}

pub struct ReqwestWithPaymentsBuilder<A, L, S> {
    inner: A,
    payments: X402Payments<L, S>,
}

pub trait ReqwestWithPaymentsBuild {
    type BuildResult;
    type BuilderResult;

    fn build(self) -> Self::BuildResult;
    fn builder(self) -> Self::BuilderResult;
}

impl<L, S> ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<Client, L, S>
where
    X402Payments<L, S>: rqm::Middleware,
{
    type BuildResult = rqm::ClientWithMiddleware;
    type BuilderResult = rqm::ClientBuilder;

    fn build(self) -> Self::BuildResult {
        self.builder().build()
    }

    fn builder(self) -> Self::BuilderResult {
        rqm::ClientBuilder::new(self.inner).with(self.payments)
    }
}

impl<L, S> ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<ClientBuilder, L, S>
where
    X402Payments<L, S>: rqm::Middleware,
{
    type BuildResult = Result<rqm::ClientWithMiddleware, reqwest::Error>;
    type BuilderResult = Result<rqm::ClientBuilder, reqwest::Error>;

    fn build(self) -> Self::BuildResult {
        let builder = self.builder()?;
        Ok(builder.build())
    }

    fn builder(self) -> Self::BuilderResult {
        let client = self.inner.build()?;
        Ok(rqm::ClientBuilder::new(client).with(self.payments))
    }
}
