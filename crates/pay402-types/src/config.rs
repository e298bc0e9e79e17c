//! Static configuration shared by the protocol parties.
//!
//! All of these are loaded at startup and read-only during request handling.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::proto::{AssetId, TokenAmount};

/// Payment policy for a single protected route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    /// HTTP methods covered by the policy. `"*"` covers every method.
    pub methods: Vec<String>,
    /// Price in the asset's smallest unit, copied verbatim into the
    /// requirement. No scaling happens anywhere downstream.
    pub price: TokenAmount,
    #[serde(default)]
    pub description: String,
}

impl RouteConfig {
    pub fn covers_method(&self, method: &str) -> bool {
        self.methods
            .iter()
            .any(|m| m == "*" || m.eq_ignore_ascii_case(method))
    }
}

/// Mapping from resource path to its payment policy.
///
/// Paths match exactly; a request whose path or method is not covered passes
/// through the interceptor untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutesConfig(HashMap<String, RouteConfig>);

impl RoutesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, path: impl Into<String>, route: RouteConfig) -> Self {
        self.0.insert(path.into(), route);
        self
    }

    /// Returns the policy protecting `path` for `method`, if any.
    pub fn lookup(&self, path: &str, method: &str) -> Option<&RouteConfig> {
        self.0.get(path).filter(|route| route.covers_method(method))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, RouteConfig)> for RoutesConfig {
    fn from_iter<T: IntoIterator<Item = (String, RouteConfig)>>(iter: T) -> Self {
        RoutesConfig(iter.into_iter().collect())
    }
}

/// Display metadata for the asset payments are denominated in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    pub asset: AssetId,
    pub decimals: u8,
    pub name: String,
    pub symbol: String,
}

impl Default for TokenConfig {
    /// The ledger's native asset at 9 decimals.
    fn default() -> Self {
        TokenConfig {
            asset: AssetId::native(),
            decimals: 9,
            name: "Native Token".to_string(),
            symbol: "NATIVE".to_string(),
        }
    }
}

/// Where to reach a remote facilitator. When absent, verification and
/// settlement happen in-process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorConfig {
    pub url: Url,
    /// Request timeout in seconds for verify/settle calls.
    #[serde(default = "FacilitatorConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FacilitatorConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    fn default_timeout_secs() -> u64 {
        Self::DEFAULT_TIMEOUT.as_secs()
    }

    pub fn new(url: Url) -> Self {
        FacilitatorConfig {
            url,
            timeout_secs: Self::default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_lookup_honors_methods() {
        let routes = RoutesConfig::new().with_route(
            "/premium",
            RouteConfig {
                methods: vec!["GET".to_string(), "post".to_string()],
                price: "1000000000".parse().unwrap(),
                description: "Premium".to_string(),
            },
        );
        assert!(routes.lookup("/premium", "GET").is_some());
        assert!(routes.lookup("/premium", "POST").is_some());
        assert!(routes.lookup("/premium", "DELETE").is_none());
        assert!(routes.lookup("/other", "GET").is_none());
    }

    #[test]
    fn wildcard_method_covers_everything() {
        let routes = RoutesConfig::new().with_route(
            "/api",
            RouteConfig {
                methods: vec!["*".to_string()],
                price: "42".parse().unwrap(),
                description: String::new(),
            },
        );
        assert!(routes.lookup("/api", "PATCH").is_some());
    }

    #[test]
    fn routes_config_loads_from_json() {
        let json = r#"{
            "/premium": {"methods": ["GET"], "price": "1000000000", "description": "gold"}
        }"#;
        let routes: RoutesConfig = serde_json::from_str(json).unwrap();
        let route = routes.lookup("/premium", "GET").unwrap();
        assert_eq!(route.price, "1000000000".parse().unwrap());
    }

    #[test]
    fn token_config_defaults_to_native_nine_decimals() {
        let token = TokenConfig::default();
        assert_eq!(token.asset, AssetId::native());
        assert_eq!(token.decimals, 9);
    }
}
