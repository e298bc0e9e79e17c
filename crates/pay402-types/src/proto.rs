//! Wire types for the X402 protocol.
//!
//! The key objects are [`PaymentRequirements`] (terms a client must satisfy),
//! [`PaymentPayload`] (a client's signed attempt to satisfy them), and
//! [`SettleResponse`] (the settlement receipt). Amounts travel as decimal
//! integer strings to avoid precision loss; ledger artifacts (transfer bytes,
//! signatures) are opaque and base64-encoded.

use alloy_primitives::U256;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::time::{SystemTime, SystemTimeError};
use url::Url;

use crate::util::Base64Bytes;

/// Header carrying a client's payment attempt: base64 of a UTF-8 JSON
/// [`PaymentPayload`].
pub const X_PAYMENT_HEADER: &str = "X-Payment";

/// Header carrying a settlement receipt: base64 of a UTF-8 JSON
/// [`SettleResponse`].
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-Payment-Response";

/// Version 1 of the X402 protocol, the only version in existence.
///
/// Serialized as the JSON number `1`; deserialization rejects anything else.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version1;

impl X402Version1 {
    pub const VALUE: u8 = 1;
}

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version1)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected x402Version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl Display for X402Version1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// Payment scheme tag. Only `exact` exists: the client transfers exactly the
/// amount its payload declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Exact,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Exact => write!(f, "exact"),
        }
    }
}

/// An on-ledger amount in the asset's smallest unit.
///
/// Backed by a `U256` and serialized as a decimal integer string
/// (`"1000000000"`) so JSON consumers never round it through a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(U256::ZERO);
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid token amount: expected a decimal integer string")]
pub struct TokenAmountParseError;

impl FromStr for TokenAmount {
    type Err = TokenAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static AMOUNT_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^[0-9]{1,78}$").expect("valid amount regex"));
        if !AMOUNT_REGEX.is_match(s) {
            return Err(TokenAmountParseError);
        }
        let value = U256::from_str_radix(s, 10).map_err(|_| TokenAmountParseError)?;
        Ok(TokenAmount(value))
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        TokenAmount(U256::from(value))
    }
}

impl From<u128> for TokenAmount {
    fn from(value: u128) -> Self {
        TokenAmount(U256::from(value))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An opaque ledger account address.
///
/// The protocol layer never interprets addresses; it only compares them for
/// equality and passes them to the ledger client. The format check is a loose
/// guard against obviously broken input, not a ledger-specific validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

static ADDRESS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9:_\-]{1,127}$").expect("valid address regex"));

#[derive(Debug, thiserror::Error)]
#[error("invalid account address format")]
pub struct AddressParseError;

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if ADDRESS_REGEX.is_match(s) {
            Ok(Address(s.to_string()))
        } else {
            Err(AddressParseError)
        }
    }
}

impl TryFrom<&str> for Address {
    type Error = AddressParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A ledger asset identifier: the native currency or a custom token type tag
/// (e.g. a fully qualified coin type). Opaque to the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId(String);

static ASSET_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9:._\-]{0,255}$").expect("valid asset regex"));

#[derive(Debug, thiserror::Error)]
#[error("invalid asset identifier format")]
pub struct AssetIdParseError;

impl AssetId {
    /// The ledger's native currency.
    pub fn native() -> Self {
        AssetId("native".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AssetId {
    type Err = AssetIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if ASSET_REGEX.is_match(s) {
            Ok(AssetId(s.to_string()))
        } else {
            Err(AssetIdParseError)
        }
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A ledger network identifier, such as `mainnet`, `testnet`, or `localnet`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Network(String);

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Network(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Network {
    fn from(value: &str) -> Self {
        Network(value.to_string())
    }
}

impl FromStr for Network {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Network(s.to_string()))
    }
}

/// Opaque signed-transfer bytes produced by the ledger client.
///
/// Serialized as base64; the protocol never looks inside.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TransferBytes(Vec<u8>);

impl TransferBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        TransferBytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The base64 form of the bytes. Stable for a given artifact, so it
    /// doubles as a settlement deduplication key.
    pub fn encoded(&self) -> String {
        Base64Bytes::encode(&self.0).to_string()
    }
}

impl Debug for TransferBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferBytes({} bytes)", self.0.len())
    }
}

impl Serialize for TransferBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encoded())
    }
}

impl<'de> Deserialize<'de> for TransferBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = Base64Bytes::from(s.as_bytes())
            .decode()
            .map_err(serde::de::Error::custom)?;
        Ok(TransferBytes(bytes))
    }
}

/// An opaque signature over transfer bytes, base64-encoded on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferSignature(Vec<u8>);

impl TransferSignature {
    pub fn new(bytes: Vec<u8>) -> Self {
        TransferSignature(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for TransferSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferSignature({} bytes)", self.0.len())
    }
}

impl Serialize for TransferSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64Bytes::encode(&self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for TransferSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = Base64Bytes::from(s.as_bytes())
            .decode()
            .map_err(serde::de::Error::custom)?;
        Ok(TransferSignature(bytes))
    }
}

/// Unique settlement identifier assigned by the ledger on commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettlementId(pub String);

impl Display for SettlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seconds since the Unix epoch, stringified in JSON to match the amount
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    pub fn now() -> Result<Self, SystemTimeError> {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs();
        Ok(UnixTimestamp(secs))
    }
}

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

/// Terms a client must satisfy to access a resource. Immutable once issued;
/// one instance describes one acceptable way to pay for one request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    pub network: Network,
    pub max_amount_required: TokenAmount,
    pub resource: Url,
    pub description: String,
    pub pay_to: Address,
    pub max_timeout_seconds: u64,
    pub asset: AssetId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// A client's signed attempt to satisfy a [`PaymentRequirements`].
///
/// Created once per challenge, never mutated, and consumed exactly once by
/// the verifier and then the settler. Verification requires `scheme`,
/// `network`, `pay_to`, and `asset` to match the requirement exactly and
/// `amount` to be at least the required amount.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version1,
    pub scheme: Scheme,
    pub network: Network,
    pub transaction: TransferBytes,
    pub signature: TransferSignature,
    pub amount: TokenAmount,
    pub pay_to: Address,
    pub asset: AssetId,
}

/// Error returned when decoding a base64-encoded protocol structure fails.
#[derive(Debug, thiserror::Error)]
pub enum B64DecodingError {
    /// The input bytes were not valid base64.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The JSON structure was invalid or did not conform to the target type.
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TryFrom<Base64Bytes<'_>> for PaymentPayload {
    type Error = B64DecodingError;

    fn try_from(value: Base64Bytes) -> Result<Self, Self::Error> {
        let decoded = value.decode()?;
        serde_json::from_slice(&decoded).map_err(B64DecodingError::from)
    }
}

impl TryFrom<&PaymentPayload> for Base64Bytes<'static> {
    type Error = serde_json::Error;

    fn try_from(value: &PaymentPayload) -> Result<Self, Self::Error> {
        let json = serde_json::to_vec(value)?;
        Ok(Base64Bytes::encode(json))
    }
}

/// Settlement receipt produced by the settler after a committed transfer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub settlement_id: SettlementId,
    pub amount: TokenAmount,
    pub timestamp: UnixTimestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effects: Option<serde_json::Value>,
}

impl TryFrom<Base64Bytes<'_>> for SettleResponse {
    type Error = B64DecodingError;

    fn try_from(value: Base64Bytes) -> Result<Self, Self::Error> {
        let decoded = value.decode()?;
        serde_json::from_slice(&decoded).map_err(B64DecodingError::from)
    }
}

impl TryFrom<&SettleResponse> for Base64Bytes<'static> {
    type Error = serde_json::Error;

    fn try_from(value: &SettleResponse) -> Result<Self, Self::Error> {
        let json = serde_json::to_vec(value)?;
        Ok(Base64Bytes::encode(json))
    }
}

/// Body of a `402 Payment Required` response: the challenge envelope.
///
/// The envelope travels as the JSON response body (not a header), and the
/// client-side transport reads it from there.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    pub x402_version: X402Version1,
    pub error: String,
    pub accepts: Vec<PaymentRequirements>,
}

impl Display for PaymentRequiredResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PaymentRequiredResponse: error='{}', accepts={} requirement(s)",
            self.error,
            self.accepts.len()
        )
    }
}

/// Body of a facilitator `POST /verify` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Body of a facilitator `POST /settle` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub payment_payload: PaymentPayload,
}

/// Result of verifying a [`PaymentPayload`] against [`PaymentRequirements`].
///
/// Serialized as `{"valid": true}` or `{"valid": false, "error": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyResponse {
    Valid,
    Invalid { error: String },
}

impl VerifyResponse {
    pub fn valid() -> Self {
        VerifyResponse::Valid
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        VerifyResponse::Invalid {
            error: error.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResponse::Valid)
    }
}

impl Serialize for VerifyResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        match self {
            VerifyResponse::Valid => {
                let mut s = serializer.serialize_struct("VerifyResponse", 1)?;
                s.serialize_field("valid", &true)?;
                s.end()
            }
            VerifyResponse::Invalid { error } => {
                let mut s = serializer.serialize_struct("VerifyResponse", 2)?;
                s.serialize_field("valid", &false)?;
                s.serialize_field("error", error)?;
                s.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            valid: bool,
            #[serde(default)]
            error: Option<String>,
        }
        let raw = Raw::deserialize(deserializer)?;
        if raw.valid {
            Ok(VerifyResponse::Valid)
        } else {
            Ok(VerifyResponse::Invalid {
                error: raw.error.unwrap_or_else(|| "verification failed".to_string()),
            })
        }
    }
}

/// A plain error body for unexpected or fatal server errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}
