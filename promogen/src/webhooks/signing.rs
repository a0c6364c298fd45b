//! HMAC-SHA256 verification for Standard Webhooks (Svix) deliveries.
//!
//! Standard Webhooks uses the following signature scheme:
//! - Signature is computed over: `{msg_id}.{timestamp}.{payload}`
//! - The signature is base64-encoded HMAC-SHA256, keyed with the base64 secret after `whsec_`
//! - The signature header is a space-separated list of `v1,{signature}` entries, any of which
//!   may match (senders list several while rotating secrets)
//!
//! See: <https://www.standardwebhooks.com/>

use axum::http::HeaderMap;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Prefix for webhook secrets
pub const SECRET_PREFIX: &str = "whsec_";

/// Header names, in the order they are looked up. Svix sends the `svix-` variants; the
/// unbranded `webhook-` names are the ones defined by Standard Webhooks.
const ID_HEADERS: [&str; 2] = ["svix-id", "webhook-id"];
const TIMESTAMP_HEADERS: [&str; 2] = ["svix-timestamp", "webhook-timestamp"];
const SIGNATURE_HEADERS: [&str; 2] = ["svix-signature", "webhook-signature"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("malformed timestamp header")]
    InvalidTimestamp,

    #[error("timestamp is outside the accepted window")]
    StaleTimestamp,

    #[error("no signature matched")]
    SignatureMismatch,

    #[error("signing secret is not a whsec_ prefixed base64 value")]
    InvalidSecret,
}

/// Extract the raw secret bytes from a `whsec_` prefixed secret.
///
/// Returns `None` if the secret doesn't have the correct prefix or invalid base64.
pub fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let encoded = secret.strip_prefix(SECRET_PREFIX)?;
    BASE64_STANDARD.decode(encoded).ok()
}

/// Sign a payload the Standard Webhooks way.
///
/// Returns the signature in format `v1,{base64-hmac-sha256}`, or `None` for an invalid secret.
pub fn sign_payload(msg_id: &str, timestamp: i64, payload: &str, secret: &str) -> Option<String> {
    let secret_bytes = decode_secret(secret)?;

    let mut mac = HmacSha256::new_from_slice(&secret_bytes).ok()?;
    mac.update(format!("{msg_id}.{timestamp}.{payload}").as_bytes());
    let signature = mac.finalize().into_bytes();

    Some(format!("v1,{}", BASE64_STANDARD.encode(signature)))
}

/// Verify one delivery: the signature header may carry several space-separated signatures and
/// passes when any `v1` entry matches.
pub fn verify_signature(msg_id: &str, timestamp: i64, payload: &str, signatures: &str, secret: &str) -> Result<(), VerifyError> {
    let expected = sign_payload(msg_id, timestamp, payload, secret).ok_or(VerifyError::InvalidSecret)?;
    let expected = expected.strip_prefix("v1,").ok_or(VerifyError::InvalidSecret)?;

    let matched = signatures
        .split_whitespace()
        .filter_map(|candidate| candidate.strip_prefix("v1,"))
        .any(|candidate| constant_time_eq(candidate.as_bytes(), expected.as_bytes()));

    if matched { Ok(()) } else { Err(VerifyError::SignatureMismatch) }
}

/// Verify a delivery from its request headers and raw body.
///
/// Rejects timestamps more than `tolerance` away from `now` in either direction, so a captured
/// delivery cannot be replayed later.
pub fn verify_request(
    headers: &HeaderMap,
    payload: &str,
    secret: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<(), VerifyError> {
    let msg_id = header(headers, &ID_HEADERS)?;
    let timestamp: i64 = header(headers, &TIMESTAMP_HEADERS)?
        .trim()
        .parse()
        .map_err(|_| VerifyError::InvalidTimestamp)?;
    let signatures = header(headers, &SIGNATURE_HEADERS)?;

    let skew = now.timestamp().abs_diff(timestamp);
    if skew > tolerance.as_secs() {
        return Err(VerifyError::StaleTimestamp);
    }

    verify_signature(msg_id, timestamp, payload, signatures, secret)
}

fn header<'h>(headers: &'h HeaderMap, names: &[&'static str; 2]) -> Result<&'h str, VerifyError> {
    names
        .iter()
        .find_map(|name| headers.get(*name).and_then(|value| value.to_str().ok()))
        .ok_or(VerifyError::MissingHeader(names[0]))
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
