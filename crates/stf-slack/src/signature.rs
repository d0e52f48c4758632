//! Slack request signing (`X-Slack-Signature: v0=<hex>`).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use stf_core::{errors::Error, Result};

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Requests older (or newer) than this are rejected as possible replays.
pub const MAX_SKEW_SECONDS: i64 = 60 * 5;

/// Verify a signed Slack request body against `secret`.
pub fn verify(
    secret: &str,
    timestamp: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
    now_unix: i64,
) -> Result<()> {
    let timestamp = timestamp
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Signature("missing request timestamp".to_string()))?;
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Signature("missing signature header".to_string()))?;

    let ts = timestamp
        .parse::<i64>()
        .map_err(|_| Error::Signature(format!("invalid request timestamp `{timestamp}`")))?;
    let skew = now_unix.abs_diff(ts);
    if skew > MAX_SKEW_SECONDS.unsigned_abs() {
        return Err(Error::Signature(format!(
            "request timestamp skew {skew}s exceeds {MAX_SKEW_SECONDS}s"
        )));
    }

    let digest_hex = signature
        .strip_prefix("v0=")
        .ok_or_else(|| Error::Signature("signature must use v0=<hex> format".to_string()))?;
    let expected = hex::decode(digest_hex)
        .map_err(|_| Error::Signature("signature digest is not hex".to_string()))?;

    new_mac(secret, timestamp, body)?
        .verify_slice(&expected)
        .map_err(|_| Error::Signature("signature mismatch".to_string()))
}

/// Compute the `v0=<hex>` signature Slack would send for `body`.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String> {
    let mac = new_mac(secret, timestamp, body)?;
    Ok(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

fn new_mac(secret: &str, timestamp: &str, body: &[u8]) -> Result<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Signature(format!("failed to initialize verifier: {e}")))?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const NOW: i64 = 1_531_420_618;

    #[test]
    fn valid_signature_is_accepted() {
        let body = b"payload=%7B%22type%22%3A%22message_action%22%7D";
        let ts = NOW.to_string();
        let sig = sign(SECRET, &ts, body).unwrap();
        assert!(verify(SECRET, Some(&ts), Some(&sig), body, NOW).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let ts = NOW.to_string();
        let sig = sign(SECRET, &ts, b"payload=a").unwrap();
        let err = verify(SECRET, Some(&ts), Some(&sig), b"payload=b", NOW).unwrap_err();
        assert!(matches!(err, Error::Signature(m) if m.contains("mismatch")));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let ts = NOW.to_string();
        let sig = sign("other", &ts, b"x").unwrap();
        assert!(verify(SECRET, Some(&ts), Some(&sig), b"x", NOW).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let old = (NOW - MAX_SKEW_SECONDS - 1).to_string();
        let sig = sign(SECRET, &old, b"x").unwrap();
        let err = verify(SECRET, Some(&old), Some(&sig), b"x", NOW).unwrap_err();
        assert!(matches!(err, Error::Signature(m) if m.contains("skew")));
    }

    #[test]
    fn missing_or_malformed_headers_are_rejected() {
        let ts = NOW.to_string();
        assert!(verify(SECRET, None, Some("v0=00"), b"x", NOW).is_err());
        assert!(verify(SECRET, Some(&ts), None, b"x", NOW).is_err());
        assert!(verify(SECRET, Some(&ts), Some("sha256=00"), b"x", NOW).is_err());
        assert!(verify(SECRET, Some(&ts), Some("v0=zz"), b"x", NOW).is_err());
        assert!(verify(SECRET, Some("yesterday"), Some("v0=00"), b"x", NOW).is_err());
        let err = verify(SECRET, Some(&i64::MIN.to_string()), Some("v0=00"), b"x", NOW).unwrap_err();
        assert!(matches!(err, Error::Signature(m) if m.contains("skew")));
        assert!(verify(SECRET, Some(&i64::MAX.to_string()), Some("v0=00"), b"x", i64::MIN).is_err());
    }
}
