//! Signed, expiring reader tokens.
//!
//! A reader token carries everything the streaming proxy needs to fetch a
//! resolved file (including the upstream URL) so the browser never sees that
//! URL. Tokens are `<payload_b64>.<sig_b64>`: the payload is base64url JSON,
//! the signature is HMAC-SHA256 over the encoded payload.
//!
//! There is no revocation list and nothing is persisted; tokens simply expire.
//!
//! # Example
//!
//! ```
//! use bookloft_core::record::{BookFormat, Provider};
//! use bookloft_core::token::{ReaderToken, TokenSigner};
//!
//! let signer = TokenSigner::new(b"server-secret".to_vec());
//! let payload = ReaderToken::new(
//!     Provider::Gutenberg,
//!     "84",
//!     BookFormat::Epub,
//!     "https://www.gutenberg.org/cache/epub/84/pg84-images-3.epub",
//! );
//! let token = signer.build(payload).unwrap();
//! assert!(signer.verify(&token).is_some());
//! ```

mod error;
mod issuer;

pub use error::{IssueError, TokenError};
pub use issuer::{ArchiveTokenRequest, ExternalTokenRequest, TokenIssuer, TokenOutcome};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::identity::is_valid_archive_id;
use crate::record::{BookFormat, Provider};

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime (30 days).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const TOKEN_SEPARATOR: char = '.';

/// Compact descriptor of a resolved file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderToken {
    pub provider: Provider,
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<String>,
    pub format: BookFormat,
    pub direct_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Expiry as Unix seconds. Filled with the default lifetime on build when absent.
    #[serde(default)]
    pub exp: Option<u64>,
}

impl ReaderToken {
    /// Creates a payload with the required fields; the rest default to empty.
    #[must_use]
    pub fn new(
        provider: Provider,
        provider_id: impl Into<String>,
        format: BookFormat,
        direct_url: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            provider_id: provider_id.into(),
            archive_id: None,
            format,
            direct_url: direct_url.into(),
            title: String::new(),
            author: None,
            cover_url: None,
            exp: None,
        }
    }
}

/// Builds and verifies reader tokens with a server secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Creates a signer with the default 30-day lifetime.
    #[must_use]
    pub fn new(secret: Vec<u8>) -> Self {
        Self::with_ttl(secret, DEFAULT_TOKEN_TTL)
    }

    /// Creates a signer with a custom default lifetime.
    #[must_use]
    pub fn with_ttl(secret: Vec<u8>, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    /// Returns the default lifetime applied to payloads without `exp`.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signs a payload, filling in the default expiry when absent.
    ///
    /// A numeric-only `archive_id` is dropped rather than signed.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Encode`] if the payload cannot be serialized or
    /// the secret cannot key the MAC.
    pub fn build(&self, payload: ReaderToken) -> Result<String, TokenError> {
        self.build_at(payload, unix_now())
    }

    /// Signs a payload relative to an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_at(&self, mut payload: ReaderToken, now: u64) -> Result<String, TokenError> {
        if payload.exp.is_none() {
            payload.exp = Some(now.saturating_add(self.ttl.as_secs()));
        }
        if payload
            .archive_id
            .as_deref()
            .is_some_and(|id| !is_valid_archive_id(id))
        {
            debug!(archive_id = ?payload.archive_id, "dropping invalid archive id from token");
            payload.archive_id = None;
        }

        let json = serde_json::to_vec(&payload).map_err(TokenError::encode)?;
        let encoded = URL_SAFE_NO_PAD.encode(json);
        let mac = self.mac(encoded.as_bytes()).map_err(|_| TokenError::Encode {
            message: "signing key rejected".to_string(),
        })?;
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{encoded}{TOKEN_SEPARATOR}{signature}"))
    }

    /// Verifies a token and returns its payload, or `None` when it is not
    /// authorized (malformed, tampered, or expired).
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<ReaderToken> {
        self.decode(token).ok()
    }

    /// Verifies a token and explains why it was rejected.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Invalid`] for malformed or tampered tokens and
    /// [`TokenError::Expired`] once `exp` has passed.
    pub fn decode(&self, token: &str) -> Result<ReaderToken, TokenError> {
        self.decode_at(token, unix_now())
    }

    /// Verifies a token relative to an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Same as [`decode`](Self::decode).
    pub fn decode_at(&self, token: &str, now: u64) -> Result<ReaderToken, TokenError> {
        let (encoded, signature) = token
            .trim()
            .split_once(TOKEN_SEPARATOR)
            .ok_or_else(|| TokenError::invalid("missing separator"))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::invalid("signature is not base64url"))?;
        // verify_slice compares in constant time
        self.mac(encoded.as_bytes())
            .map_err(|_| TokenError::invalid("signing key rejected"))?
            .verify_slice(&signature)
            .map_err(|_| TokenError::invalid("signature mismatch"))?;

        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::invalid("payload is not base64url"))?;
        let payload: ReaderToken = serde_json::from_slice(&json)
            .map_err(|_| TokenError::invalid("payload is not a reader token"))?;

        match payload.exp {
            Some(exp) if exp > now => Ok(payload),
            Some(exp) => Err(TokenError::Expired { exp }),
            None => Err(TokenError::invalid("payload has no expiry")),
        }
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, InvalidLength> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)?;
        mac.update(data);
        Ok(mac)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"test-secret".to_vec())
    }

    fn payload() -> ReaderToken {
        let mut token = ReaderToken::new(
            Provider::InternetArchive,
            "economicsinafric0000unse",
            BookFormat::Epub,
            "https://archive.org/download/economicsinafric0000unse/book.epub",
        );
        token.archive_id = Some("economicsinafric0000unse".to_string());
        token.title = "Economics in Africa".to_string();
        token.author = Some("A. Author".to_string());
        token
    }

    #[test]
    fn test_build_then_verify_round_trips_payload() {
        let mut input = payload();
        input.exp = Some(NOW + 60);
        let token = signer().build_at(input.clone(), NOW).unwrap();
        assert_eq!(signer().decode_at(&token, NOW).unwrap(), input);
    }

    #[test]
    fn test_build_sets_default_thirty_day_expiry() {
        let token = signer().build_at(payload(), NOW).unwrap();
        let decoded = signer().decode_at(&token, NOW).unwrap();
        assert_eq!(decoded.exp, Some(NOW + 30 * 24 * 60 * 60));
    }

    #[test]
    fn test_verify_rejects_after_expiry() {
        let mut input = payload();
        input.exp = Some(NOW + 10);
        let token = signer().build_at(input, NOW).unwrap();
        assert!(signer().decode_at(&token, NOW + 9).is_ok());
        assert!(matches!(
            signer().decode_at(&token, NOW + 10),
            Err(TokenError::Expired { .. })
        ));
    }

    #[test]
    fn test_verify_returns_none_for_expired_token() {
        let mut input = payload();
        input.exp = Some(1);
        let token = signer().build(input).unwrap();
        assert!(signer().verify(&token).is_none());
    }

    #[test]
    fn test_verify_rejects_missing_separator() {
        let err = signer().decode("no-separator-here").unwrap_err();
        assert!(err.to_string().contains("missing separator"), "{err}");
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let token = signer().build_at(payload(), NOW).unwrap();
        let (_, sig) = token.split_once('.').unwrap();
        let mut forged = payload();
        forged.direct_url = "https://evil.example/file.epub".to_string();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let forged_token = format!("{forged_payload}.{sig}");
        assert!(matches!(
            signer().decode_at(&forged_token, NOW),
            Err(TokenError::Invalid { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_other_secret() {
        let token = signer().build_at(payload(), NOW).unwrap();
        let other = TokenSigner::new(b"other-secret".to_vec());
        assert!(other.decode_at(&token, NOW).is_err());
    }

    #[test]
    fn test_numeric_archive_id_is_never_signed() {
        let mut input = payload();
        input.archive_id = Some("9780262033848".to_string());
        let token = signer().build_at(input, NOW).unwrap();
        assert_eq!(signer().decode_at(&token, NOW).unwrap().archive_id, None);
    }

    #[test]
    fn test_custom_ttl_applies() {
        let signer = TokenSigner::with_ttl(b"k".to_vec(), Duration::from_secs(5));
        let token = signer.build_at(payload(), NOW).unwrap();
        assert!(signer.decode_at(&token, NOW + 4).is_ok());
        assert!(signer.decode_at(&token, NOW + 5).is_err());
    }

    #[test]
    fn test_any_secret_length_signs_without_panicking() {
        for secret in [Vec::new(), vec![7_u8; 1], vec![0xAB_u8; 512]] {
            let signer = TokenSigner::new(secret);
            let token = signer.build_at(payload(), NOW).unwrap();
            assert!(signer.decode_at(&token, NOW).is_ok());
        }
    }

    #[test]
    fn test_debug_does_not_expose_secret() {
        let rendered = format!("{:?}", TokenSigner::new(b"hunter2".to_vec()));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("104"));
    }
}
