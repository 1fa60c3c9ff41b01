//! Delivery signing and verification.
//!
//! The upstream signs every delivery by putting `sha1=<hexdigest>` in the
//! signature header, where the digest is HMAC-SHA1 over the raw request
//! body using the shared secret. Verification recomputes the digest over
//! the bytes as received and compares in constant time; re-serializing the
//! JSON would break the comparison.

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Scheme prefix on the signature header value.
const SIGNATURE_PREFIX: &str = "sha1=";

/// Compute the signature header value for a body.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Check a claimed signature header value against the body.
///
/// Fails closed on anything malformed: a missing or different scheme
/// prefix, or a digest that is not valid hex.
pub fn verify(secret: &str, body: &[u8], claimed: &str) -> bool {
    let claimed_hex = match claimed.strip_prefix(SIGNATURE_PREFIX) {
        Some(rest) => rest,
        None => return false,
    };
    let claimed_digest = match hex::decode(claimed_hex) {
        Ok(digest) => digest,
        Err(_) => return false,
    };

    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    mac.verify_slice(&claimed_digest).is_ok()
}

/// Check a claimed signature against each candidate secret in order.
///
/// Used to keep registrations made under an older secret derivation
/// working: the current secret is tried first, then the legacy one.
pub fn verify_any<'a, I>(secrets: I, body: &[u8], claimed: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    secrets.into_iter().any(|secret| verify(secret, body, claimed))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "correct horse battery staple";
    const BODY: &[u8] = br#"{"action":"opened","number":1}"#;

    #[test]
    fn test_sign_then_verify() {
        let signature = sign(SECRET, BODY);
        assert!(signature.starts_with("sha1="));
        assert!(verify(SECRET, BODY, &signature));
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let signature = sign(SECRET, BODY);
        assert!(!verify(SECRET, br#"{"action":"opened","number":2}"#, &signature));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let signature = sign(SECRET, BODY);
        assert!(!verify("some other secret", BODY, &signature));
    }

    #[test]
    fn test_verify_rejects_flipped_digest() {
        let mut signature = sign(SECRET, BODY);
        let last = signature.pop().unwrap();
        let flipped = if last == '0' { '1' } else { '0' };
        signature.push(flipped);
        assert!(!verify(SECRET, BODY, &signature));
    }

    #[test]
    fn test_verify_rejects_missing_prefix() {
        let signature = sign(SECRET, BODY);
        let bare = signature.strip_prefix("sha1=").unwrap();
        assert!(!verify(SECRET, BODY, bare));
    }

    #[test]
    fn test_verify_rejects_other_scheme() {
        let signature = sign(SECRET, BODY);
        let renamed = signature.replace("sha1=", "sha256=");
        assert!(!verify(SECRET, BODY, &renamed));
    }

    #[test]
    fn test_verify_rejects_non_hex_digest() {
        assert!(!verify(SECRET, BODY, "sha1=not-hex-at-all"));
        assert!(!verify(SECRET, BODY, "sha1="));
    }

    #[test]
    fn test_verify_any_falls_back_to_legacy_secret() {
        let legacy = "legacy secret";
        let signature = sign(legacy, BODY);
        assert!(verify_any([SECRET, legacy], BODY, &signature));
        assert!(!verify_any([SECRET, "neither"], BODY, &signature));
    }
}
