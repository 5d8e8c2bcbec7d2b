//! HMAC-SHA256 verification of webhook payloads.
//!
//! The sender signs each delivery with a shared secret and puts the result
//! in the `X-Hub-Signature-256` header as `sha256=<hex>`. Verification
//! runs before any parsing: an invalid or malformed signature yields
//! `false` (never an error, never a panic) and the endpoint answers 401
//! without forwarding the payload.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The header prefix identifying the digest algorithm.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Signs a payload with the shared secret, returning a header-ready value.
///
/// Produces `sha256=<hex>`, the exact format the verifier expects. Used by
/// tests and by tooling that needs to fabricate valid deliveries.
///
/// # Examples
///
/// ```
/// use gh_pr_review::webhooks::{sign_payload, verify_signature};
///
/// let header = sign_payload(b"payload", b"secret");
/// assert!(header.starts_with("sha256="));
/// assert!(verify_signature(b"payload", &header, b"secret"));
/// ```
pub fn sign_payload(payload: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    let digest = mac.finalize().into_bytes();
    format!("{SIGNATURE_PREFIX}{}", hex::encode(digest))
}

/// Verifies a signature header against the raw payload and shared secret.
///
/// Returns `true` only when the header is well-formed (`sha256=` followed
/// by valid hex) and the digest matches. Comparison is constant-time via
/// the HMAC library, so verification does not leak how much of a forged
/// signature was correct.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let claimed = match decode_signature_header(signature_header) {
        Some(bytes) => bytes,
        None => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(&claimed).is_ok()
}

/// Decodes a `sha256=<hex>` header into raw digest bytes.
///
/// Returns `None` for a missing prefix, a different algorithm, or invalid
/// hex. Exposed so callers can distinguish a malformed header from a wrong
/// signature in logs; the endpoint treats both as verification failure.
pub fn decode_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_digest = header.strip_prefix(SIGNATURE_PREFIX)?;
    hex::decode(hex_digest).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sign_then_verify_succeeds() {
        let header = sign_payload(b"Hello, World!", b"It's a Secret to Everybody");
        assert!(verify_signature(
            b"Hello, World!",
            &header,
            b"It's a Secret to Everybody"
        ));
    }

    #[test]
    fn wrong_secret_fails() {
        let header = sign_payload(b"body", b"right");
        assert!(!verify_signature(b"body", &header, b"wrong"));
    }

    #[test]
    fn modified_payload_fails() {
        let header = sign_payload(b"original", b"secret");
        assert!(!verify_signature(b"tampered", &header, b"secret"));
    }

    #[test]
    fn malformed_headers_fail_without_panicking() {
        for header in ["", "sha256=", "sha256=zz", "sha256=abc", "sha1=abcd", "abcd1234"] {
            assert!(
                !verify_signature(b"body", header, b"secret"),
                "header {header:?} must not verify"
            );
        }
    }

    #[test]
    fn empty_payload_and_secret_are_valid_inputs() {
        let header = sign_payload(b"", b"");
        assert!(verify_signature(b"", &header, b""));
    }

    #[test]
    fn decode_handles_uppercase_and_rejects_odd_length() {
        assert_eq!(
            decode_signature_header("sha256=ABcd12"),
            Some(vec![0xab, 0xcd, 0x12])
        );
        assert_eq!(decode_signature_header("sha256=abc"), None);
    }

    #[test]
    fn binary_payload_verifies() {
        let payload = [0x00, 0x01, 0xff, 0xfe, 0x7f];
        let header = sign_payload(&payload, b"secret");
        assert!(verify_signature(&payload, &header, b"secret"));
    }

    proptest! {
        /// verify(body, sign(body, secret), secret) holds for all inputs.
        #[test]
        fn prop_roundtrip(payload: Vec<u8>, secret: Vec<u8>) {
            let header = sign_payload(&payload, &secret);
            prop_assert!(verify_signature(&payload, &header, &secret));
        }

        /// Flipping any single bit of the payload breaks verification.
        #[test]
        fn prop_payload_bit_flip_fails(
            payload in proptest::collection::vec(any::<u8>(), 1..64),
            byte_idx in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let header = sign_payload(&payload, b"secret");
            let mut mutated = payload.clone();
            let idx = byte_idx.index(mutated.len());
            mutated[idx] ^= 1 << bit;
            prop_assert!(!verify_signature(&mutated, &header, b"secret"));
        }

        /// Flipping any single bit of the signature breaks verification.
        #[test]
        fn prop_signature_bit_flip_fails(
            payload: Vec<u8>,
            byte_idx in 0usize..32,
            bit in 0u8..8,
        ) {
            let header = sign_payload(&payload, b"secret");
            let mut digest = decode_signature_header(&header).unwrap();
            digest[byte_idx] ^= 1 << bit;
            let mutated = format!("sha256={}", hex::encode(digest));
            prop_assert!(!verify_signature(&payload, &mutated, b"secret"));
        }

        /// Arbitrary header strings never panic the verifier.
        #[test]
        fn prop_verify_is_total(header in ".*", payload: Vec<u8>, secret: Vec<u8>) {
            let _ = verify_signature(&payload, &header, &secret);
        }

        /// A signature from one secret never verifies under another.
        #[test]
        fn prop_wrong_secret_fails(payload: Vec<u8>, s1: Vec<u8>, s2: Vec<u8>) {
            prop_assume!(s1 != s2);
            let header = sign_payload(&payload, &s1);
            prop_assert!(!verify_signature(&payload, &header, &s2));
        }
    }
}
