//! The [`X402Middleware`] tower layer and its service.

use axum_core::extract::Request;
use axum_core::response::Response;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;

use pay402_types::config::{FacilitatorConfig, RoutesConfig, TokenConfig};
use pay402_types::facilitator::Facilitator;
use pay402_types::{Address, Network};

use crate::facilitator_client::{FacilitatorClient, FacilitatorClientError};
use crate::gate::PaymentGate;
use crate::requirement;

/// Payment enforcement middleware for a whole router.
///
/// Holds the static, read-only request policy: the protected-routes map, the
/// payee address, token and network metadata, and the facilitator that
/// performs verification and settlement (remote over HTTP, or any local
/// [`Facilitator`] implementation).
#[derive(Clone, Debug)]
pub struct X402Middleware<F> {
    facilitator: F,
    routes: Arc<RoutesConfig>,
    pay_to: Address,
    token: TokenConfig,
    network: Network,
    base_url: Option<Arc<Url>>,
    settle_detached: bool,
    facilitator_present: bool,
}

impl X402Middleware<Arc<FacilitatorClient>> {
    /// Creates a middleware delegating verification and settlement to a
    /// remote facilitator at `url`.
    pub fn try_remote(url: &str, pay_to: Address) -> Result<Self, FacilitatorClientError> {
        let client = FacilitatorClient::try_new(url)?;
        Ok(Self::remote(client, pay_to))
    }

    /// Creates a middleware from an explicit [`FacilitatorConfig`].
    pub fn from_config(
        config: &FacilitatorConfig,
        pay_to: Address,
    ) -> Result<Self, FacilitatorClientError> {
        let client = FacilitatorClient::from_config(config)?;
        Ok(Self::remote(client, pay_to))
    }

    fn remote(client: FacilitatorClient, pay_to: Address) -> Self {
        let mut this = Self::with_facilitator(Arc::new(client), pay_to);
        this.facilitator_present = true;
        this
    }
}

impl<F> X402Middleware<F> {
    /// Creates a middleware with an in-process facilitator. Requirements it
    /// issues carry no `feePayer` sentinel.
    pub fn with_facilitator(facilitator: F, pay_to: Address) -> Self {
        X402Middleware {
            facilitator,
            routes: Arc::new(RoutesConfig::new()),
            pay_to,
            token: TokenConfig::default(),
            network: Network::from("localnet"),
            base_url: None,
            settle_detached: false,
            facilitator_present: false,
        }
    }

    /// Sets the protected-routes policy. Routes not listed pass through.
    pub fn with_routes(mut self, routes: RoutesConfig) -> Self {
        self.routes = Arc::new(routes);
        self
    }

    /// Sets the asset payments are denominated in. Defaults to the native
    /// asset at 9 decimals.
    pub fn with_token(mut self, token: TokenConfig) -> Self {
        self.token = token;
        self
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Sets the base URL used to compute each requirement's `resource` field.
    /// Defaults to `http://localhost/`; configure it in production.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(Arc::new(base_url));
        self
    }

    /// Switches settlement to fire-and-forget: the response returns without
    /// waiting for the settle call and without a receipt header.
    pub fn settle_detached(mut self) -> Self {
        self.settle_detached = true;
        self
    }

    pub fn facilitator(&self) -> &F {
        &self.facilitator
    }
}

impl<S, F> Layer<S> for X402Middleware<F>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    F: Facilitator + Clone + Send + Sync + 'static,
{
    type Service = X402GateService<F>;

    fn layer(&self, inner: S) -> Self::Service {
        X402GateService {
            middleware: self.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// The service produced by [`X402Middleware`]: decides per request whether to
/// pass through, challenge, or verify-then-forward.
#[derive(Clone)]
pub struct X402GateService<F> {
    middleware: X402Middleware<F>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<F> Service<Request> for X402GateService<F>
where
    F: Facilitator + Clone + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let mw = &self.middleware;
        let route = mw.routes.lookup(req.uri().path(), req.method().as_str());
        let inner = self.inner.clone();
        match route {
            None => {
                // Route or method not covered by the policy: pass through.
                let mut inner = inner;
                Box::pin(async move { inner.call(req).await })
            }
            Some(route) => {
                let resource = requirement::resource_url(mw.base_url.as_deref(), req.uri());
                let gate = PaymentGate {
                    facilitator: mw.facilitator.clone(),
                    requirement: requirement::build(
                        route,
                        resource,
                        &mw.pay_to,
                        &mw.token,
                        &mw.network,
                        mw.facilitator_present,
                    ),
                    settle_detached: mw.settle_detached,
                };
                Box::pin(async move { Ok(gate.handle_request(inner, req).await) })
            }
        }
    }
}
