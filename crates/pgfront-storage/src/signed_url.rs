//! HMAC-based signed URLs for the local storage backend.
//!
//! Token shape: `base64url(bucket|key|method|expires_at|nonce) || "." ||
//! base64url(hmac_sha256(secret, that_payload))`. S3-backed buckets instead
//! delegate to the backend's own presigning (see [`crate::backend::s3`]).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::StorageError;
use crate::model::{NONCE_LEN, SignedToken};

type HmacSha256 = Hmac<Sha256>;

const FIELD_SEP: u8 = b'|';

fn payload(bucket: &str, key: &str, method: &str, expires_at: DateTime<Utc>, nonce: &[u8; NONCE_LEN]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(bucket.len() + key.len() + method.len() + 32 + NONCE_LEN + 4);
    buf.extend_from_slice(bucket.as_bytes());
    buf.push(FIELD_SEP);
    buf.extend_from_slice(key.as_bytes());
    buf.push(FIELD_SEP);
    buf.extend_from_slice(method.as_bytes());
    buf.push(FIELD_SEP);
    buf.extend_from_slice(expires_at.timestamp().to_string().as_bytes());
    buf.push(FIELD_SEP);
    buf.extend_from_slice(nonce);
    buf
}

/// Generate a signed URL token authorizing `method` on `bucket`/`key` until
/// `expires_at`.
#[must_use]
pub fn generate(secret: &[u8], bucket: &str, key: &str, method: &str, expires_at: DateTime<Utc>) -> String {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);
    let body = payload(bucket, key, method, expires_at, &nonce);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(&body);
    let tag = mac.finalize().into_bytes();

    format!("{}.{}", BASE64URL.encode(&body), BASE64URL.encode(tag))
}

/// Verify a token's MAC and decode its fields.
///
/// # Errors
///
/// Returns [`StorageError::SignedUrlMalformed`] if the token cannot be
/// decoded, [`StorageError::SignedUrlBadMac`] if the MAC does not verify
/// (constant-time comparison), or [`StorageError::SignedUrlExpired`] if
/// `expires_at` has already passed.
pub fn validate(secret: &[u8], token: &str) -> Result<SignedToken, StorageError> {
    let (encoded_body, encoded_tag) = token.split_once('.').ok_or(StorageError::SignedUrlMalformed)?;
    let body = BASE64URL
        .decode(encoded_body)
        .map_err(|_| StorageError::SignedUrlMalformed)?;
    let tag = BASE64URL.decode(encoded_tag).map_err(|_| StorageError::SignedUrlMalformed)?;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(&body);
    mac.verify_slice(&tag).map_err(|_| StorageError::SignedUrlBadMac)?;

    let signed = parse_fields(&body).ok_or(StorageError::SignedUrlMalformed)?;
    if Utc::now() >= signed.expires_at {
        return Err(StorageError::SignedUrlExpired);
    }
    Ok(signed)
}

fn parse_fields(body: &[u8]) -> Option<SignedToken> {
    let mut fields = body.splitn(4, |&byte| byte == FIELD_SEP);
    let bucket = std::str::from_utf8(fields.next()?).ok()?.to_string();
    let key = std::str::from_utf8(fields.next()?).ok()?.to_string();
    let method = std::str::from_utf8(fields.next()?).ok()?.to_string();
    let rest = fields.next()?;

    let sep = rest.iter().position(|&byte| byte == FIELD_SEP)?;
    let (expires_raw, nonce_with_sep) = rest.split_at(sep);
    let nonce_raw = &nonce_with_sep[1..];
    if nonce_raw.len() != NONCE_LEN {
        return None;
    }
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(nonce_raw);

    let expires_secs: i64 = std::str::from_utf8(expires_raw).ok()?.parse().ok()?;
    let expires_at = Utc.timestamp_opt(expires_secs, 0).single()?;

    Some(SignedToken {
        bucket,
        key,
        method,
        expires_at,
        nonce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &[u8] = b"test-signing-secret";

    #[test]
    fn round_trips_a_valid_token() {
        let expires_at = Utc::now() + Duration::minutes(5);
        let token = generate(SECRET, "pics", "a/b.png", "GET", expires_at);
        let parsed = validate(SECRET, &token).unwrap();
        assert_eq!(parsed.bucket, "pics");
        assert_eq!(parsed.key, "a/b.png");
        assert_eq!(parsed.method, "GET");
    }

    #[test]
    fn rejects_expired_token() {
        let expires_at = Utc::now() - Duration::minutes(1);
        let token = generate(SECRET, "pics", "a/b.png", "GET", expires_at);
        assert!(matches!(validate(SECRET, &token), Err(StorageError::SignedUrlExpired)));
    }

    #[test]
    fn rejects_tampered_mac() {
        let expires_at = Utc::now() + Duration::minutes(5);
        let mut token = generate(SECRET, "pics", "a/b.png", "GET", expires_at);
        let last = token.pop().unwrap();
        token.push(if last == '0' { '1' } else { '0' });
        assert!(matches!(validate(SECRET, &token), Err(StorageError::SignedUrlBadMac)));
    }

    #[test]
    fn rejects_wrong_secret() {
        let expires_at = Utc::now() + Duration::minutes(5);
        let token = generate(SECRET, "pics", "a/b.png", "GET", expires_at);
        assert!(matches!(validate(b"other-secret", &token), Err(StorageError::SignedUrlBadMac)));
    }

    #[test]
    fn rejects_malformed_token() {
        assert!(matches!(validate(SECRET, "not-a-token"), Err(StorageError::SignedUrlMalformed)));
    }
}
