//! Axum middleware for enforcing X402 payments on protected routes.
//!
//! The middleware intercepts requests before the handler runs. Requests whose
//! path or method is not covered by the route policy pass through untouched;
//! protected requests without an `X-Payment` header receive a
//! `402 Payment Required` challenge listing the acceptable terms; requests
//! carrying a payment are verified against the configured facilitator before
//! the handler executes, and settled once the handler has produced a
//! successful response.
//!
//! ## Example
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use pay402_axum::X402Middleware;
//! use pay402_types::config::{RouteConfig, RoutesConfig};
//!
//! let routes = RoutesConfig::new().with_route(
//!     "/premium",
//!     RouteConfig {
//!         methods: vec!["GET".to_string()],
//!         price: "1000000000".parse().unwrap(),
//!         description: "Premium content".to_string(),
//!     },
//! );
//!
//! let x402 = X402Middleware::try_remote("https://facilitator.example", "merchant-1".parse().unwrap())
//!     .unwrap()
//!     .with_routes(routes);
//!
//! let app: Router = Router::new()
//!     .route("/premium", get(|| async { "VIP content" }))
//!     .layer(x402);
//! ```
//!
//! ## Settlement timing
//!
//! By default settlement runs after the handler completes, while the response
//! is still held, so the settlement receipt can be attached as an
//! `X-Payment-Response` header. [`X402Middleware::settle_detached`] switches
//! to fire-and-forget settlement: the response returns immediately and the
//! settle call finishes in the background, with failures only logged.

mod facilitator_client;
mod gate;
mod layer;
pub mod requirement;

pub use facilitator_client::{FacilitatorClient, FacilitatorClientError};
pub use gate::PaymentGate;
pub use layer::{X402GateService, X402Middleware};
