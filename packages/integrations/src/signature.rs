//! Webhook signature verification.
//!
//! Both verifiers compare in constant time; a missing or malformed header is
//! simply a failed verification, never a panic.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a Slack request timestamp, in seconds.
const SLACK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

fn hmac_hex(secret: &str, message: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Verify GitHub's `x-hub-signature-256` header over the raw body.
pub fn verify_github_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(digest) = hmac_hex(secret, body) else {
        return false;
    };
    constant_time_eq(header, &format!("sha256={}", digest))
}

/// Verify Slack's signed request: `v0=` HMAC over `v0:{timestamp}:{body}`,
/// with the timestamp no older than five minutes (replay protection).
pub fn verify_slack_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
) -> bool {
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    let age = (chrono::Utc::now().timestamp() - ts).abs();
    if age > SLACK_TIMESTAMP_TOLERANCE_SECS {
        return false;
    }

    let mut base = format!("v0:{}:", timestamp).into_bytes();
    base.extend_from_slice(body);
    let Some(digest) = hmac_hex(secret, &base) else {
        return false;
    };
    constant_time_eq(signature, &format!("v0={}", digest))
}
