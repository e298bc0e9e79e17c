//! HTTP client for a remote facilitator service.

use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

use pay402_types::config::FacilitatorConfig;
use pay402_types::facilitator::Facilitator;
use pay402_types::{
    ErrorResponse, SettleRequest, SettleResponse, VerifyRequest, VerifyResponse,
};

/// Talks to a facilitator over its `/verify` and `/settle` endpoints.
///
/// Endpoint URLs are resolved once at construction so a malformed base URL
/// fails fast instead of on the first payment.
#[derive(Debug, Clone)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    health_url: Url,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("failed to parse URL: {context}: {source}")]
    UrlParse {
        context: String,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP request failed: {context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to deserialize response: {context}: {source}")]
    JsonDeserialization {
        context: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected HTTP status {status} from facilitator: {context}: {body}")]
    HttpStatus {
        context: String,
        status: StatusCode,
        body: String,
    },
}

impl FacilitatorClient {
    /// Creates a client for the facilitator at `base_url` with the default
    /// request timeout.
    pub fn try_new(base_url: &str) -> Result<Self, FacilitatorClientError> {
        let url = Url::parse(base_url).map_err(|source| FacilitatorClientError::UrlParse {
            context: format!("base URL {base_url}"),
            source,
        })?;
        Self::with_timeout(url, FacilitatorConfig::DEFAULT_TIMEOUT)
    }

    pub fn from_config(config: &FacilitatorConfig) -> Result<Self, FacilitatorClientError> {
        Self::with_timeout(config.url.clone(), config.timeout())
    }

    fn with_timeout(base_url: Url, timeout: Duration) -> Result<Self, FacilitatorClientError> {
        let join = |segment: &str| {
            base_url
                .join(segment)
                .map_err(|source| FacilitatorClientError::UrlParse {
                    context: format!("endpoint {segment} on {base_url}"),
                    source,
                })
        };
        let verify_url = join("verify")?;
        let settle_url = join("settle")?;
        let health_url = join("health")?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FacilitatorClientError::Http {
                context: "building HTTP client".to_string(),
                source,
            })?;
        Ok(FacilitatorClient {
            base_url,
            verify_url,
            settle_url,
            health_url,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Submits a payment for verification.
    ///
    /// Both outcomes of a completed check arrive as [`VerifyResponse`]: the
    /// facilitator answers 200 for an accepted payment and 400 for a rejected
    /// one, each with a parseable body. Everything else is a transport-level
    /// error.
    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        let response = self
            .client
            .post(self.verify_url.clone())
            .json(request)
            .send()
            .await
            .map_err(|source| FacilitatorClientError::Http {
                context: format!("POST {}", self.verify_url),
                source,
            })?;
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::BAD_REQUEST {
            return response.json().await.map_err(|source| {
                FacilitatorClientError::JsonDeserialization {
                    context: format!("verification response with status {status}"),
                    source,
                }
            });
        }
        let body = response.text().await.unwrap_or_default();
        Err(FacilitatorClientError::HttpStatus {
            context: format!("POST {}", self.verify_url),
            status,
            body,
        })
    }

    /// Submits a verified payment for settlement and returns the receipt.
    pub async fn settle(
        &self,
        request: &SettleRequest,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        let response = self
            .client
            .post(self.settle_url.clone())
            .json(request)
            .send()
            .await
            .map_err(|source| FacilitatorClientError::Http {
                context: format!("POST {}", self.settle_url),
                source,
            })?;
        let status = response.status();
        if status == StatusCode::OK {
            return response.json().await.map_err(|source| {
                FacilitatorClientError::JsonDeserialization {
                    context: "settlement receipt".to_string(),
                    source,
                }
            });
        }
        let body = match response.json::<ErrorResponse>().await {
            Ok(err) => err.error,
            Err(_) => String::new(),
        };
        Err(FacilitatorClientError::HttpStatus {
            context: format!("POST {}", self.settle_url),
            status,
            body,
        })
    }

    /// Probes the facilitator's health endpoint.
    pub async fn health(&self) -> Result<(), FacilitatorClientError> {
        let response = self
            .client
            .get(self.health_url.clone())
            .send()
            .await
            .map_err(|source| FacilitatorClientError::Http {
                context: format!("GET {}", self.health_url),
                source,
            })?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(FacilitatorClientError::HttpStatus {
                context: format!("GET {}", self.health_url),
                status,
                body,
            })
        }
    }
}

impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl Facilitator for FacilitatorClient {
    type Error = FacilitatorClientError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        FacilitatorClient::verify(self, request).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        FacilitatorClient::settle(self, request).await
    }
}
