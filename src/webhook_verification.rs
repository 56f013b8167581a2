//! # Webhook Signature Verification
//!
//! This module verifies that webhook deliveries genuinely originated from
//! the messaging platform, using HMAC-SHA256 over the raw request bytes with
//! constant-time comparison to prevent timing attacks. It also implements the
//! platform's subscription handshake token check.

use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Length of a hex-decoded SHA-256 digest.
const DIGEST_LEN: usize = 32;

/// How many hex characters of a digest may appear in logs.
const LOG_PREFIX_LEN: usize = 8;

/// Errors that can occur during webhook verification.
///
/// The variants exist for internal logging; callers map every one of them to
/// the same generic 403 so nothing about the failure mode leaks to the
/// caller.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: String },

    #[error("Invalid signature format: {header}")]
    InvalidSignatureFormat { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Handshake verification failed")]
    HandshakeFailed,

    #[error("Webhook verification not configured")]
    NotConfigured,
}

impl VerificationError {
    /// Returns the appropriate HTTP status code for this error.
    ///
    /// All verification failures fail closed as 403; the distinction between
    /// variants is for logs only.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::FORBIDDEN
    }
}

/// Result type for webhook verification
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Verifies a delivery signature using HMAC-SHA256 over the exact raw body
/// bytes.
///
/// The header value is accepted either as `sha256=<hex>` or as bare hex,
/// with surrounding whitespace trimmed. Both digests are decoded to
/// fixed-length byte buffers and compared in constant time: length first,
/// then a comparison whose running time does not depend on where the first
/// mismatching byte occurs.
pub fn verify_delivery_signature(
    body: &[u8],
    signature_header: &str,
    secret: &str,
) -> VerificationResult<()> {
    debug!(body_size = body.len(), "Starting signature verification");

    let header = signature_header.trim();
    if header.is_empty() {
        return Err(VerificationError::MissingSignature {
            header: "X-Hub-Signature-256".to_string(),
        });
    }

    let received_hex = header.strip_prefix("sha256=").unwrap_or(header).trim();

    let received_bytes =
        hex::decode(received_hex).map_err(|_| VerificationError::InvalidSignatureFormat {
            header: "X-Hub-Signature-256 contains invalid hex".to_string(),
        })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(body);
    let expected_bytes = mac.finalize().into_bytes();

    if received_bytes.len() != DIGEST_LEN {
        warn!(
            received_prefix = %hex_prefix(received_hex),
            received_len = received_bytes.len(),
            "Signature digest has wrong length"
        );
        return Err(VerificationError::VerificationFailed);
    }

    let expected_slice: &[u8] = expected_bytes.as_ref();
    if subtle::ConstantTimeEq::ct_eq(expected_slice, &received_bytes[..]).into() {
        Ok(())
    } else {
        warn!(
            received_prefix = %hex_prefix(received_hex),
            expected_prefix = %hex_prefix(&hex::encode(expected_slice)),
            "Signature mismatch"
        );
        Err(VerificationError::VerificationFailed)
    }
}

/// Verifies the subscription handshake.
///
/// Accepts only `mode == "subscribe"` with a token equal to the configured
/// verification token, compared in constant time.
pub fn verify_handshake(
    mode: Option<&str>,
    token: Option<&str>,
    configured_token: &str,
) -> VerificationResult<()> {
    if mode != Some("subscribe") {
        return Err(VerificationError::HandshakeFailed);
    }

    let token_matches = token.is_some_and(|t| {
        t.len() == configured_token.len()
            && bool::from(subtle::ConstantTimeEq::ct_eq(
                t.as_bytes(),
                configured_token.as_bytes(),
            ))
    });

    if token_matches {
        Ok(())
    } else {
        warn!(
            token_prefix = %token.map(|t| hex_prefix(t)).unwrap_or_default(),
            "Handshake token mismatch"
        );
        Err(VerificationError::HandshakeFailed)
    }
}

fn hex_prefix(value: &str) -> String {
    value.chars().take(LOG_PREFIX_LEN).collect()
}

/// Generate a signature header value for a body (test fixtures and local
/// tooling).
pub fn sign_body(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_verification_success() {
        let secret = "test_secret";
        let body = b"test payload";

        let signature_header = sign_body(body, secret);

        assert!(verify_delivery_signature(body, &signature_header, secret).is_ok());
    }

    #[test]
    fn test_signature_verification_bare_hex_accepted() {
        let secret = "test_secret";
        let body = b"test payload";

        let signature_header = sign_body(body, secret);
        let bare = signature_header.strip_prefix("sha256=").unwrap();

        assert!(verify_delivery_signature(body, bare, secret).is_ok());
    }

    #[test]
    fn test_signature_verification_trims_whitespace() {
        let secret = "test_secret";
        let body = b"test payload";

        let signature_header = format!("  {}  ", sign_body(body, secret));

        assert!(verify_delivery_signature(body, &signature_header, secret).is_ok());
    }

    #[test]
    fn test_signature_verification_flipped_signature_byte() {
        let secret = "test_secret";
        let body = b"test payload";

        let signature_header = sign_body(body, secret);
        // Flip one hex digit of the digest.
        let mut chars: Vec<char> = signature_header.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();

        assert!(verify_delivery_signature(body, &tampered, secret).is_err());
    }

    #[test]
    fn test_signature_verification_flipped_body_byte() {
        let secret = "test_secret";
        let body = b"test payload";

        let signature_header = sign_body(body, secret);
        let mut tampered_body = body.to_vec();
        tampered_body[0] ^= 0x01;

        assert!(verify_delivery_signature(&tampered_body, &signature_header, secret).is_err());
    }

    #[test]
    fn test_signature_verification_missing_header() {
        assert!(matches!(
            verify_delivery_signature(b"test payload", "", "test_secret"),
            Err(VerificationError::MissingSignature { .. })
        ));
    }

    #[test]
    fn test_signature_verification_invalid_hex() {
        assert!(matches!(
            verify_delivery_signature(b"test payload", "sha256=not-hex!", "test_secret"),
            Err(VerificationError::InvalidSignatureFormat { .. })
        ));
    }

    #[test]
    fn test_signature_verification_wrong_length_digest() {
        // Valid hex but not a SHA-256-sized digest.
        assert!(matches!(
            verify_delivery_signature(b"test payload", "sha256=deadbeef", "test_secret"),
            Err(VerificationError::VerificationFailed)
        ));
    }

    #[test]
    fn test_all_failures_map_to_forbidden() {
        let errors = [
            VerificationError::MissingSignature {
                header: "X-Hub-Signature-256".to_string(),
            },
            VerificationError::InvalidSignatureFormat {
                header: "bad hex".to_string(),
            },
            VerificationError::VerificationFailed,
            VerificationError::HandshakeFailed,
            VerificationError::NotConfigured,
        ];
        for err in errors {
            assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn test_handshake_success() {
        assert!(verify_handshake(Some("subscribe"), Some("hub-token"), "hub-token").is_ok());
    }

    #[test]
    fn test_handshake_wrong_mode() {
        assert!(verify_handshake(Some("unsubscribe"), Some("hub-token"), "hub-token").is_err());
        assert!(verify_handshake(None, Some("hub-token"), "hub-token").is_err());
    }

    #[test]
    fn test_handshake_wrong_token() {
        assert!(verify_handshake(Some("subscribe"), Some("wrong"), "hub-token").is_err());
        assert!(verify_handshake(Some("subscribe"), None, "hub-token").is_err());
    }
}
