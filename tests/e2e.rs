//! End-to-end flows over real sockets: a resource server with the payment
//! middleware, an in-process facilitator over an in-memory ledger, and a
//! client that pays challenges automatically.

use axum::Router;
use axum::routing::get;
use http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;

use pay402::facilitator_local::FacilitatorLocal;
use pay402_axum::X402Middleware;
use pay402_reqwest::{
    ReqwestWithPayments, ReqwestWithPaymentsBuild, X402Payments, settlement_from_headers,
};
use pay402_types::config::{RouteConfig, RoutesConfig};
use pay402_types::ledger::LedgerClient;
use pay402_types::ledger::memory::{InMemoryLedger, StaticSigner};
use pay402_types::util::Base64Bytes;
use pay402_types::{
    Address, AssetId, PaymentPayload, PaymentRequiredResponse, Scheme, TokenAmount, X402Version1,
    X_PAYMENT_HEADER,
};

fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

fn amount(s: &str) -> TokenAmount {
    s.parse().unwrap()
}

fn premium_routes(price: &str) -> RoutesConfig {
    RoutesConfig::new().with_route(
        "/premium",
        RouteConfig {
            methods: vec!["GET".to_string()],
            price: price.parse().unwrap(),
            description: "Premium content".to_string(),
        },
    )
}

/// Serves `router` on an ephemeral port and returns its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn paid_server(ledger: Arc<InMemoryLedger>, price: &str) -> String {
    let facilitator = Arc::new(FacilitatorLocal::new(ledger));
    let x402 = X402Middleware::with_facilitator(facilitator, addr("merchant-1"))
        .with_routes(premium_routes(price));
    let router = Router::new()
        .route("/premium", get(|| async { "VIP content" }))
        .route("/free", get(|| async { "public" }))
        .layer(x402);
    serve(router).await
}

#[tokio::test]
async fn client_pays_a_challenge_and_funds_move() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(&addr("alice"), &AssetId::native(), amount("2000000000"));
    let base = paid_server(ledger.clone(), "1000000000").await;

    // Without the paying middleware the server answers with a challenge.
    let plain = reqwest::Client::new();
    let challenge = plain.get(format!("{base}/premium")).send().await.unwrap();
    assert_eq!(challenge.status(), StatusCode::PAYMENT_REQUIRED);
    let envelope: PaymentRequiredResponse = challenge.json().await.unwrap();
    assert_eq!(envelope.error, "X-Payment header is required");
    assert_eq!(envelope.accepts.len(), 1);
    assert_eq!(envelope.accepts[0].max_amount_required, amount("1000000000"));

    // With it the same request is paid and retried transparently.
    let client = reqwest::Client::new()
        .with_payments(X402Payments::new(
            ledger.clone(),
            StaticSigner::new(addr("alice")),
        ))
        .build();
    let response = client.get(format!("{base}/premium")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let receipt = settlement_from_headers(response.headers()).expect("settlement receipt");
    assert_eq!(receipt.amount, amount("1000000000"));
    assert_eq!(response.text().await.unwrap(), "VIP content");

    let alice = ledger
        .balance(&addr("alice"), &AssetId::native())
        .await
        .unwrap();
    let merchant = ledger
        .balance(&addr("merchant-1"), &AssetId::native())
        .await
        .unwrap();
    assert_eq!(alice, amount("1000000000"));
    assert_eq!(merchant, amount("1000000000"));
}

#[tokio::test]
async fn unprotected_routes_cost_nothing() {
    let ledger = Arc::new(InMemoryLedger::new());
    let base = paid_server(ledger, "1000000000").await;
    let response = reqwest::Client::new()
        .get(format!("{base}/free"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "public");
}

/// Crafts a payment header by hand, bypassing the client middleware.
async fn forged_header(
    ledger: &InMemoryLedger,
    from: &str,
    value: &str,
    asset: AssetId,
) -> String {
    use pay402_types::ledger::{TransferRequest, TransferSigner};
    let signer = StaticSigner::new(addr(from));
    let transfer = TransferRequest {
        sender: signer.address(),
        recipient: addr("merchant-1"),
        amount: amount(value),
        asset: asset.clone(),
    };
    let transaction = ledger.build_transfer(&transfer).await.unwrap();
    let signature = signer.sign_transfer(&transaction).await.unwrap();
    let payload = PaymentPayload {
        x402_version: X402Version1,
        scheme: Scheme::Exact,
        network: "localnet".into(),
        transaction,
        signature,
        amount: amount(value),
        pay_to: addr("merchant-1"),
        asset,
    };
    Base64Bytes::try_from(&payload).unwrap().to_string()
}

#[tokio::test]
async fn underpayment_is_rechallenged() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(&addr("alice"), &AssetId::native(), amount("2000000000"));
    let base = paid_server(ledger.clone(), "1000000000").await;

    let header = forged_header(&ledger, "alice", "500000000", AssetId::native()).await;
    let response = reqwest::Client::new()
        .get(format!("{base}/premium"))
        .header(X_PAYMENT_HEADER, header)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let envelope: PaymentRequiredResponse = response.json().await.unwrap();
    assert_eq!(envelope.error, "payment verification failed");

    // Nothing moved.
    let merchant = ledger
        .balance(&addr("merchant-1"), &AssetId::native())
        .await
        .unwrap();
    assert_eq!(merchant, TokenAmount::ZERO);
}

#[tokio::test]
async fn wrong_asset_is_rechallenged() {
    let ledger = Arc::new(InMemoryLedger::new());
    let wrong_asset: AssetId = "wrapped-gold".parse().unwrap();
    ledger.credit(&addr("alice"), &wrong_asset, amount("2000000000"));
    let base = paid_server(ledger.clone(), "1000000000").await;

    let header = forged_header(&ledger, "alice", "1000000000", wrong_asset).await;
    let response = reqwest::Client::new()
        .get(format!("{base}/premium"))
        .header(X_PAYMENT_HEADER, header)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn garbage_payment_header_is_rechallenged() {
    let ledger = Arc::new(InMemoryLedger::new());
    let base = paid_server(ledger, "1000000000").await;
    let response = reqwest::Client::new()
        .get(format!("{base}/premium"))
        .header(X_PAYMENT_HEADER, "!!!definitely-not-base64!!!")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let envelope: PaymentRequiredResponse = response.json().await.unwrap();
    assert_eq!(envelope.error, "invalid payment format");
}

#[tokio::test]
async fn spend_cap_stops_the_client_before_paying() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(&addr("alice"), &AssetId::native(), amount("2000000000"));
    let base = paid_server(ledger.clone(), "1000000000").await;

    let client = reqwest::Client::new()
        .with_payments(
            X402Payments::new(ledger.clone(), StaticSigner::new(addr("alice")))
                .max(AssetId::native(), amount("100")),
        )
        .build();
    let error = client
        .get(format!("{base}/premium"))
        .send()
        .await
        .unwrap_err();
    assert!(error.to_string().contains("exceeds maximum allowed"));

    let alice = ledger
        .balance(&addr("alice"), &AssetId::native())
        .await
        .unwrap();
    assert_eq!(alice, amount("2000000000"));
}

#[tokio::test]
async fn unreachable_facilitator_fails_closed() {
    // Nothing listens on port 1; every verify call fails, so every payment
    // is refused rather than waved through.
    let x402 = X402Middleware::try_remote("http://127.0.0.1:1", addr("merchant-1"))
        .unwrap()
        .with_routes(premium_routes("1000000000"));
    let router = Router::new()
        .route("/premium", get(|| async { "VIP content" }))
        .layer(x402);
    let base = serve(router).await;

    let ledger = InMemoryLedger::new();
    let header = forged_header(&ledger, "alice", "1000000000", AssetId::native()).await;
    let response = reqwest::Client::new()
        .get(format!("{base}/premium"))
        .header(X_PAYMENT_HEADER, header)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let envelope: PaymentRequiredResponse = response.json().await.unwrap();
    assert_eq!(envelope.error, "payment verification failed");
}

#[tokio::test]
async fn replayed_transfer_settles_only_once() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(&addr("alice"), &AssetId::native(), amount("9000000000"));
    let facilitator = Arc::new(FacilitatorLocal::new(ledger.clone()));

    let header = forged_header(&ledger, "alice", "1000000000", AssetId::native()).await;
    let payload =
        PaymentPayload::try_from(Base64Bytes::from(header.as_bytes())).unwrap();

    let request = pay402_types::SettleRequest {
        payment_payload: payload,
    };
    facilitator.settle_payment(&request).await.unwrap();
    facilitator.settle_payment(&request).await.unwrap_err();

    let merchant = ledger
        .balance(&addr("merchant-1"), &AssetId::native())
        .await
        .unwrap();
    assert_eq!(merchant, amount("1000000000"));
}
