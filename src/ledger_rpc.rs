//! JSON-RPC adapter for a remote ledger node.
//!
//! The facilitator never interprets transfer artifacts itself; it forwards
//! them to a ledger node speaking JSON-RPC 2.0. Artifacts and signatures
//! travel base64-encoded inside the RPC params.

use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

use pay402_types::ledger::{LedgerClient, TransferRequest};
use pay402_types::{Address, AssetId, SettlementId, TokenAmount, TransferBytes, TransferSignature};

#[derive(Debug, thiserror::Error)]
pub enum LedgerRpcError {
    #[error("ledger RPC transport failed: {context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("ledger RPC returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("ledger rejected the call: {code}: {message}")]
    Rpc { code: i64, message: String },
}

/// A ledger reachable over JSON-RPC 2.0.
#[derive(Debug, Clone)]
pub struct JsonRpcLedger {
    url: Url,
    client: reqwest::Client,
    request_id: std::sync::Arc<AtomicU64>,
}

impl JsonRpcLedger {
    pub fn try_new(url: Url, timeout: Duration) -> Result<Self, LedgerRpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| LedgerRpcError::Http {
                context: "building RPC client".to_string(),
                source,
            })?;
        Ok(JsonRpcLedger {
            url,
            client,
            request_id: std::sync::Arc::new(AtomicU64::new(1)),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, LedgerRpcError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|source| LedgerRpcError::Http {
                context: format!("calling {method}"),
                source,
            })?;
        let envelope: serde_json::Value =
            response
                .json()
                .await
                .map_err(|source| LedgerRpcError::Http {
                    context: format!("reading {method} response"),
                    source,
                })?;
        if let Some(error) = envelope.get("error") {
            let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string();
            return Err(LedgerRpcError::Rpc { code, message });
        }
        let result = envelope
            .get("result")
            .ok_or_else(|| LedgerRpcError::MalformedResponse("missing result".to_string()))?;
        serde_json::from_value(result.clone())
            .map_err(|e| LedgerRpcError::MalformedResponse(e.to_string()))
    }
}

impl LedgerClient for JsonRpcLedger {
    type Error = LedgerRpcError;

    async fn build_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferBytes, Self::Error> {
        let encoded: String = self
            .call("ledger_buildTransfer", json!([request]))
            .await?;
        decode_b64(&encoded).map(TransferBytes::new)
    }

    async fn simulate_transfer(
        &self,
        transaction: &TransferBytes,
        signature: &TransferSignature,
    ) -> Result<(), Self::Error> {
        self.call::<serde_json::Value>(
            "ledger_simulateTransfer",
            json!([transaction.encoded(), encode_b64(signature.as_bytes())]),
        )
        .await?;
        Ok(())
    }

    async fn execute_transfer(
        &self,
        transaction: &TransferBytes,
        signature: &TransferSignature,
    ) -> Result<SettlementId, Self::Error> {
        let id: String = self
            .call(
                "ledger_executeTransfer",
                json!([transaction.encoded(), encode_b64(signature.as_bytes())]),
            )
            .await?;
        Ok(SettlementId(id))
    }

    async fn balance(
        &self,
        account: &Address,
        asset: &AssetId,
    ) -> Result<TokenAmount, Self::Error> {
        let amount: String = self
            .call("ledger_getBalance", json!([account, asset]))
            .await?;
        amount
            .parse()
            .map_err(|_| LedgerRpcError::MalformedResponse(format!("bad balance: {amount}")))
    }
}

fn encode_b64(bytes: &[u8]) -> String {
    pay402_types::util::Base64Bytes::encode(bytes).to_string()
}

fn decode_b64(s: &str) -> Result<Vec<u8>, LedgerRpcError> {
    pay402_types::util::Base64Bytes::from(s.as_bytes())
        .decode()
        .map_err(|e| LedgerRpcError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transfer() -> TransferRequest {
        TransferRequest {
            sender: "alice".parse().unwrap(),
            recipient: "merchant-1".parse().unwrap(),
            amount: "1000000000".parse().unwrap(),
            asset: AssetId::native(),
        }
    }

    async fn ledger_for(server: &MockServer) -> JsonRpcLedger {
        JsonRpcLedger::try_new(server.uri().parse().unwrap(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn build_transfer_decodes_the_artifact() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "ledger_buildTransfer"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": encode_b64(b"artifact"),
            })))
            .mount(&server)
            .await;
        let ledger = ledger_for(&server).await;
        let bytes = ledger.build_transfer(&transfer()).await.unwrap();
        assert_eq!(bytes.as_bytes(), b"artifact");
    }

    #[tokio::test]
    async fn rpc_errors_carry_code_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32000, "message": "insufficient balance"},
            })))
            .mount(&server)
            .await;
        let ledger = ledger_for(&server).await;
        let error = ledger
            .simulate_transfer(
                &TransferBytes::new(b"artifact".to_vec()),
                &TransferSignature::new(b"sig".to_vec()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            LedgerRpcError::Rpc { code: -32000, ref message } if message == "insufficient balance"
        ));
    }

    #[tokio::test]
    async fn execute_transfer_returns_the_settlement_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                json!({"method": "ledger_executeTransfer"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "txn-42",
            })))
            .mount(&server)
            .await;
        let ledger = ledger_for(&server).await;
        let id = ledger
            .execute_transfer(
                &TransferBytes::new(b"artifact".to_vec()),
                &TransferSignature::new(b"sig".to_vec()),
            )
            .await
            .unwrap();
        assert_eq!(id, SettlementId("txn-42".to_string()));
    }
}
