//! Authenticity verification for inbound callback parameters.
//!
//! The provider signs every callback with an HMAC over the `checkout-*`
//! parameters: fields sorted by name, serialized as `key:value` lines, with
//! the request body (empty for browser redirects) appended as the final
//! line. The digest algorithm is carried in `checkout-algorithm`.

use crate::payments::types::{CallbackParams, SIGNATURE_FIELD};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

/// Verify a redirect-style callback (empty body).
///
/// Returns false on any mismatch or malformed payload. Never fails:
/// a payload without a `signature` field simply does not verify.
pub fn verify(params: &CallbackParams, secret: &str) -> bool {
    verify_with_body(params, "", secret)
}

/// Verify a callback against the HMAC covering its parameters and body.
fn verify_with_body(params: &CallbackParams, body: &str, secret: &str) -> bool {
    let provided = match params.signature() {
        Some(sig) if !sig.trim().is_empty() => sig.trim(),
        _ => return false,
    };
    let computed = match compute(params, body, secret) {
        Some(hex) => hex,
        None => return false,
    };
    secure_eq(computed.as_bytes(), provided.as_bytes())
}

/// Compute the hex HMAC over the canonicalized parameters, or None when the
/// payload names an algorithm the protocol does not define.
pub fn compute(params: &CallbackParams, body: &str, secret: &str) -> Option<String> {
    let payload = canonical_payload(params, body);
    match params.algorithm().unwrap_or("sha256") {
        "sha256" => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
            mac.update(payload.as_bytes());
            Some(hex::encode(mac.finalize().into_bytes()))
        }
        "sha512" => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).ok()?;
            mac.update(payload.as_bytes());
            Some(hex::encode(mac.finalize().into_bytes()))
        }
        // Unknown algorithms fail verification instead of falling back.
        _ => None,
    }
}

/// `checkout-*` fields except the signature itself, in key order, one
/// `key:value` line each, body last.
fn canonical_payload(params: &CallbackParams, body: &str) -> String {
    let mut lines: Vec<String> = params
        .iter()
        .filter(|(key, _)| key.starts_with("checkout-") && *key != SIGNATURE_FIELD)
        .map(|(key, value)| format!("{}:{}", key, value))
        .collect();
    lines.push(body.to_string());
    lines.join("\n")
}

/// Constant-time byte comparison.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_params(secret: &str) -> CallbackParams {
        let mut params = CallbackParams::new();
        params.insert("checkout-account", "375917");
        params.insert("checkout-algorithm", "sha256");
        params.insert("checkout-status", "ok");
        params.insert("checkout-transaction-id", "tx-1");
        params.insert("checkout-reference", "100000001");
        let signature = compute(&params, "", secret).expect("known algorithm");
        params.insert(SIGNATURE_FIELD, signature);
        params
    }

    #[test]
    fn valid_signature_verifies() {
        let params = signed_params("merchant-secret");
        assert!(verify(&params, "merchant-secret"));
    }

    #[test]
    fn wrong_secret_fails() {
        let params = signed_params("merchant-secret");
        assert!(!verify(&params, "other-secret"));
    }

    #[test]
    fn tampered_field_fails() {
        let mut params = signed_params("merchant-secret");
        params.insert("checkout-status", "pending");
        assert!(!verify(&params, "merchant-secret"));
    }

    #[test]
    fn missing_signature_fails_without_error() {
        let mut params = CallbackParams::new();
        params.insert("checkout-status", "ok");
        assert!(!verify(&params, "merchant-secret"));
    }

    #[test]
    fn unknown_algorithm_fails() {
        let mut params = signed_params("merchant-secret");
        params.insert("checkout-algorithm", "md5");
        assert!(!verify(&params, "merchant-secret"));
    }

    #[test]
    fn sha512_is_supported() {
        let mut params = CallbackParams::new();
        params.insert("checkout-algorithm", "sha512");
        params.insert("checkout-status", "ok");
        let signature = compute(&params, "", "secret").expect("sha512 supported");
        params.insert("signature", signature);
        assert!(verify(&params, "secret"));
    }

    #[test]
    fn non_checkout_fields_are_ignored_in_canonicalization() {
        let mut params = signed_params("merchant-secret");
        params.insert("utm_source", "newsletter");
        assert!(verify(&params, "merchant-secret"));
    }

    #[test]
    fn body_participates_in_signature() {
        let mut params = CallbackParams::new();
        params.insert("checkout-algorithm", "sha256");
        params.insert("checkout-status", "ok");
        let signature = compute(&params, r#"{"event":"refund"}"#, "secret").expect("sha256");
        params.insert("signature", signature);
        assert!(verify_with_body(&params, r#"{"event":"refund"}"#, "secret"));
        assert!(!verify(&params, "secret"));
    }

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }
}
