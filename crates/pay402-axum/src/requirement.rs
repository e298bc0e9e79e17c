//! Builds the canonical [`PaymentRequirements`] for a protected route.

use http::Uri;
use url::Url;

use pay402_types::config::{RouteConfig, TokenConfig};
use pay402_types::{Address, Network, PaymentRequirements, Scheme};

/// Fixed validity window offered to clients, in seconds.
pub const MAX_TIMEOUT_SECONDS: u64 = 60;

/// Sentinel placed in `extra.feePayer` when a facilitator fronts the ledger
/// fees for the transfer.
pub const FACILITATOR_FEE_PAYER: &str = "facilitator";

/// Computes the exact resource URL the client requested.
///
/// Combines the configured base URL (scheme + host) with the request's path
/// and query. Without a base URL this falls back to `http://localhost/`,
/// which is fine for tests but should be configured in production.
pub fn resource_url(base_url: Option<&Url>, request_uri: &Uri) -> Url {
    let mut url = base_url
        .cloned()
        .unwrap_or_else(|| Url::parse("http://localhost/").expect("valid fallback url"));
    url.set_path(request_uri.path());
    url.set_query(request_uri.query());
    url
}

/// Produces the requirement a client must satisfy for one request.
///
/// Pure construction from already-validated inputs: the price is copied
/// verbatim from the route policy (it is already in the asset's smallest
/// unit), and `extra.feePayer` is set iff a facilitator is configured.
pub fn build(
    route: &RouteConfig,
    resource: Url,
    pay_to: &Address,
    token: &TokenConfig,
    network: &Network,
    facilitator_present: bool,
) -> PaymentRequirements {
    let extra = facilitator_present
        .then(|| serde_json::json!({ "feePayer": FACILITATOR_FEE_PAYER }));
    PaymentRequirements {
        scheme: Scheme::Exact,
        network: network.clone(),
        max_amount_required: route.price,
        resource,
        description: route.description.clone(),
        pay_to: pay_to.clone(),
        max_timeout_seconds: MAX_TIMEOUT_SECONDS,
        asset: token.asset.clone(),
        output_schema: None,
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> RouteConfig {
        RouteConfig {
            methods: vec!["GET".to_string()],
            price: "1000000000".parse().unwrap(),
            description: "Premium content".to_string(),
        }
    }

    #[test]
    fn resource_is_the_exact_requested_url() {
        let base: Url = "https://api.example.com".parse().unwrap();
        let uri: Uri = "/premium?tier=gold".parse().unwrap();
        let url = resource_url(Some(&base), &uri);
        assert_eq!(url.as_str(), "https://api.example.com/premium?tier=gold");
    }

    #[test]
    fn price_is_copied_verbatim() {
        let requirement = build(
            &route(),
            "http://localhost/premium".parse().unwrap(),
            &"merchant-1".parse().unwrap(),
            &TokenConfig::default(),
            &Network::from("localnet"),
            false,
        );
        assert_eq!(requirement.max_amount_required, "1000000000".parse().unwrap());
        assert_eq!(requirement.max_timeout_seconds, MAX_TIMEOUT_SECONDS);
        assert!(requirement.extra.is_none());
    }

    #[test]
    fn fee_payer_sentinel_appears_with_a_facilitator() {
        let requirement = build(
            &route(),
            "http://localhost/premium".parse().unwrap(),
            &"merchant-1".parse().unwrap(),
            &TokenConfig::default(),
            &Network::from("localnet"),
            true,
        );
        let extra = requirement.extra.unwrap();
        assert_eq!(extra["feePayer"], FACILITATOR_FEE_PAYER);
    }
}
