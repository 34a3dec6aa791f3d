//! Compact HMAC-SHA256 signed tokens.
//!
//! ```text
//! base64url(json claims) "." base64url(hmac_sha256(key, first segment))
//! ```
//!
//! Used for ticket QR codes and password reset links. The claims are
//! readable by anyone; only the signature is secret.

use crate::error::{Result, WorkflowError};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Hex SHA-256 of a string.
#[must_use]
pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Signs and verifies compact tokens with one secret key.
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner").field("key", &"<redacted>").finish()
    }
}

impl TokenSigner {
    /// Creates a signer with the given secret.
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, body: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| WorkflowError::DependencyFailure(format!("signing key rejected: {e}")))?;
        mac.update(body.as_bytes());
        Ok(mac)
    }

    /// Encodes and signs `claims`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::DependencyFailure`] if the claims cannot be
    /// serialized.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        let json = serde_json::to_vec(claims)
            .map_err(|e| WorkflowError::DependencyFailure(format!("token claims: {e}")))?;
        let body = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&body)?.finalize().into_bytes());
        Ok(format!("{body}.{signature}"))
    }

    /// Checks a token's signature in constant time and decodes its claims.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] for malformed or forged tokens.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let invalid = || WorkflowError::validation("invalid or tampered token");

        let (body, signature) = token.trim().split_once('.').ok_or_else(invalid)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;
        let expected = self.mac(body)?.finalize().into_bytes();
        if !constant_time_eq::constant_time_eq(&expected, &signature) {
            return Err(invalid());
        }

        let json = URL_SAFE_NO_PAD.decode(body).map_err(|_| invalid())?;
        serde_json::from_slice(&json).map_err(|_| invalid())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Claims {
        sub: String,
        n: u32,
    }

    fn claims() -> Claims {
        Claims {
            sub: "ticket".into(),
            n: 7,
        }
    }

    #[test]
    fn signed_token_decodes_to_same_claims() {
        let signer = TokenSigner::new("secret");
        let token = signer.sign(&claims()).unwrap();
        assert_eq!(signer.verify::<Claims>(&token).unwrap(), claims());
    }

    #[test]
    fn forged_tokens_are_rejected() {
        let signer = TokenSigner::new("secret");
        let token = signer.sign(&claims()).unwrap();

        let other = TokenSigner::new("not-the-secret").sign(&claims()).unwrap();
        assert!(matches!(
            signer.verify::<Claims>(&other),
            Err(WorkflowError::Validation(_))
        ));

        // claims swapped under an existing signature
        let (_, signature) = token.split_once('.').unwrap();
        let body = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Claims {
                sub: "ticket".into(),
                n: 8,
            })
            .unwrap(),
        );
        assert!(signer.verify::<Claims>(&format!("{body}.{signature}")).is_err());

        assert!(signer.verify::<Claims>("garbage").is_err());
        assert!(signer.verify::<Claims>("a.b.c").is_err());
    }

    #[test]
    fn sha256_is_hex() {
        let hash = sha256_hex("payload");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debug_output_hides_the_key() {
        assert!(!format!("{:?}", TokenSigner::new("super-secret")).contains("super-secret"));
    }
}
