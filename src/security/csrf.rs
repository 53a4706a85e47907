//! CSRF protection with the double-submit cookie pattern.
//!
//! Token format: `hex(secret).hex(signature)`
//! - secret: 32 random bytes from the OS
//! - signature: HMAC-SHA256 over the hex secret, keyed by the server key
//!
//! Two verification surfaces share one interface:
//! - [`DoubleSubmitVerifier`]: cookie and header must be identical. Weaker;
//!   used only where no signing key is available (development).
//! - [`SignedTokenVerifier`]: the double-submit check plus HMAC verification.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::{CsrfConfig, Environment};
use crate::http::request;

type HmacSha256 = Hmac<Sha256>;

const SECRET_BYTES: usize = 32;
const DELIMITER: char = '.';

#[derive(Debug, thiserror::Error)]
pub enum CsrfError {
    #[error("CSRF secret is required in production")]
    MissingSecret,
    #[error("invalid CSRF header name '{0}'")]
    InvalidHeaderName(String),
    #[error("CSRF signing key rejected: {0}")]
    InvalidKey(#[from] hmac::digest::InvalidLength),
}

/// Methods that never change state and skip CSRF verification.
pub fn requires_protection(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Which verification a deployment is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfSurface {
    /// Double-submit comparison only.
    Restricted,
    /// Double-submit comparison and HMAC signature.
    Full,
}

pub trait CsrfVerifier: Send + Sync + 'static {
    fn surface(&self) -> CsrfSurface;

    /// True only if both tokens are present, non-empty and accepted.
    fn verify(&self, cookie_token: Option<&str>, header_token: Option<&str>) -> bool;
}

/// An issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken {
    value: String,
}

impl CsrfToken {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl std::fmt::Display for CsrfToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleSubmitVerifier;

impl CsrfVerifier for DoubleSubmitVerifier {
    fn surface(&self) -> CsrfSurface {
        CsrfSurface::Restricted
    }

    fn verify(&self, cookie_token: Option<&str>, header_token: Option<&str>) -> bool {
        match (cookie_token, header_token) {
            (Some(cookie), Some(header)) if !cookie.is_empty() && !header.is_empty() => {
                bool::from(cookie.as_bytes().ct_eq(header.as_bytes()))
            }
            _ => false,
        }
    }
}

/// Issues and verifies HMAC-signed tokens.
#[derive(Clone)]
pub struct SignedTokenVerifier {
    mac: HmacSha256,
}

impl std::fmt::Debug for SignedTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokenVerifier").finish_non_exhaustive()
    }
}

impl SignedTokenVerifier {
    pub fn new(key: &[u8]) -> Result<Self, CsrfError> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(key)?,
        })
    }

    pub fn issue(&self) -> CsrfToken {
        let mut secret = [0u8; SECRET_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        let secret = hex::encode(secret);
        let signature = self.sign(&secret);
        CsrfToken {
            value: format!("{}{}{}", secret, DELIMITER, signature),
        }
    }

    /// Check a single token's signature.
    pub fn verify_token(&self, token: &str) -> bool {
        let mut parts = token.split(DELIMITER);
        let (Some(secret), Some(signature), None) = (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        if secret.is_empty() || signature.is_empty() {
            return false;
        }

        let expected = self.sign(secret);
        bool::from(signature.as_bytes().ct_eq(expected.as_bytes()))
    }

    fn sign(&self, secret: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(secret.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl CsrfVerifier for SignedTokenVerifier {
    fn surface(&self) -> CsrfSurface {
        CsrfSurface::Full
    }

    fn verify(&self, cookie_token: Option<&str>, header_token: Option<&str>) -> bool {
        if !DoubleSubmitVerifier.verify(cookie_token, header_token) {
            return false;
        }
        header_token.is_some_and(|token| self.verify_token(token))
    }
}

/// Request-level CSRF checks and token issuance.
#[derive(Clone)]
pub struct CsrfGuard {
    verifier: Arc<dyn CsrfVerifier>,
    signer: Option<SignedTokenVerifier>,
    cookie_name: String,
    header_name: HeaderName,
    secure_cookie: bool,
    max_age_secs: u64,
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("surface", &self.surface())
            .field("cookie_name", &self.cookie_name)
            .field("header_name", &self.header_name)
            .finish()
    }
}

impl CsrfGuard {
    /// Build the guard for a deployment.
    ///
    /// Without a secret, production refuses to start and development falls
    /// back to the restricted surface.
    pub fn from_config(config: &CsrfConfig, environment: Environment) -> Result<Self, CsrfError> {
        let header_name = HeaderName::from_bytes(config.header_name.as_bytes())
            .map_err(|_| CsrfError::InvalidHeaderName(config.header_name.clone()))?;

        let signer = match config.secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => Some(SignedTokenVerifier::new(secret.as_bytes())?),
            None if environment == Environment::Production => {
                return Err(CsrfError::MissingSecret)
            }
            None => {
                tracing::warn!("No CSRF secret configured, using double-submit check only");
                None
            }
        };
        let verifier: Arc<dyn CsrfVerifier> = match &signer {
            Some(signer) => Arc::new(signer.clone()),
            None => Arc::new(DoubleSubmitVerifier),
        };

        Ok(Self {
            verifier,
            signer,
            cookie_name: config.cookie_name.clone(),
            header_name,
            secure_cookie: environment == Environment::Production,
            max_age_secs: config.cookie_max_age_secs,
        })
    }

    pub fn surface(&self) -> CsrfSurface {
        self.verifier.surface()
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    /// Verify the cookie and header tokens carried by a request.
    pub fn check(&self, headers: &HeaderMap) -> bool {
        let cookie_token = request::cookie(headers, &self.cookie_name);
        let header_token = headers
            .get(&self.header_name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        self.verifier.verify(cookie_token.as_deref(), header_token)
    }

    /// Mint a token; `None` on the restricted surface.
    pub fn issue(&self) -> Option<CsrfToken> {
        self.signer.as_ref().map(SignedTokenVerifier::issue)
    }

    /// `Set-Cookie` value carrying `token`.
    pub fn cookie_header(&self, token: &CsrfToken) -> Option<HeaderValue> {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
            self.cookie_name,
            token.as_str(),
            self.max_age_secs
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn signer() -> SignedTokenVerifier {
        SignedTokenVerifier::new(KEY).unwrap()
    }

    fn config(secret: Option<&str>) -> CsrfConfig {
        CsrfConfig {
            secret: secret.map(str::to_string),
            ..CsrfConfig::default()
        }
    }

    fn request_headers(cookie: Option<&str>, header: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            headers.insert(
                COOKIE,
                HeaderValue::from_str(&format!("theme=dark; __Host-csrf-token={}", cookie))
                    .unwrap(),
            );
        }
        if let Some(header) = header {
            headers.insert("x-csrf-token", HeaderValue::from_str(header).unwrap());
        }
        headers
    }

    #[test]
    fn safe_methods_skip_protection() {
        assert!(!requires_protection(&Method::GET));
        assert!(!requires_protection(&Method::HEAD));
        assert!(!requires_protection(&Method::OPTIONS));
        assert!(requires_protection(&Method::POST));
        assert!(requires_protection(&Method::PUT));
        assert!(requires_protection(&Method::PATCH));
        assert!(requires_protection(&Method::DELETE));
    }

    #[test]
    fn issued_token_round_trips() {
        let signer = signer();
        let token = signer.issue();
        let (secret, signature) = token.as_str().split_once('.').unwrap();
        assert_eq!(secret.len(), 64);
        assert_eq!(signature.len(), 64);
        assert!(signer.verify(Some(token.as_str()), Some(token.as_str())));
    }

    #[test]
    fn any_signature_mutation_fails() {
        let signer = signer();
        let token = signer.issue().into_string();
        let split = token.find('.').unwrap() + 1;

        for i in split..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
            let mutated = String::from_utf8(bytes).unwrap();
            assert!(!signer.verify(Some(&mutated), Some(&mutated)), "position {}", i);
        }
    }

    #[test]
    fn distinct_valid_tokens_do_not_match() {
        let signer = signer();
        let a = signer.issue();
        let b = signer.issue();
        assert!(signer.verify_token(a.as_str()));
        assert!(signer.verify_token(b.as_str()));
        assert!(!signer.verify(Some(a.as_str()), Some(b.as_str())));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let signer = signer();
        let token = signer.issue().into_string();
        let extra_segment = format!("{}.extra", token);
        let no_delimiter = token.replace('.', "");
        for bad in [
            "",
            ".",
            "abc",
            "a.b.c",
            extra_segment.as_str(),
            no_delimiter.as_str(),
        ] {
            assert!(!signer.verify(Some(bad), Some(bad)), "{:?}", bad);
        }
        assert!(!signer.verify(None, Some(&token)));
        assert!(!signer.verify(Some(&token), None));
    }

    #[test]
    fn other_key_rejects() {
        let token = signer().issue();
        let other = SignedTokenVerifier::new(b"another-key-another-key-another!").unwrap();
        assert!(!other.verify(Some(token.as_str()), Some(token.as_str())));
    }

    #[test]
    fn restricted_surface_compares_only() {
        let verifier = DoubleSubmitVerifier;
        assert_eq!(verifier.surface(), CsrfSurface::Restricted);
        assert!(verifier.verify(Some("anything"), Some("anything")));
        assert!(!verifier.verify(Some("anything"), Some("anythinG")));
        assert!(!verifier.verify(Some(""), Some("")));
        assert!(!verifier.verify(None, None));
    }

    #[test]
    fn guard_reads_cookie_and_header() {
        let secret = std::str::from_utf8(KEY).unwrap();
        let guard =
            CsrfGuard::from_config(&config(Some(secret)), Environment::Development).unwrap();
        assert_eq!(guard.surface(), CsrfSurface::Full);

        let token = guard.issue().unwrap();
        assert!(guard.check(&request_headers(Some(token.as_str()), Some(token.as_str()))));
        assert!(!guard.check(&request_headers(Some(token.as_str()), None)));
        assert!(!guard.check(&request_headers(None, Some(token.as_str()))));
        assert!(!guard.check(&HeaderMap::new()));
    }

    #[test]
    fn production_requires_secret() {
        assert!(matches!(
            CsrfGuard::from_config(&config(None), Environment::Production),
            Err(CsrfError::MissingSecret)
        ));

        let guard = CsrfGuard::from_config(&config(None), Environment::Development).unwrap();
        assert_eq!(guard.surface(), CsrfSurface::Restricted);
        assert!(guard.issue().is_none());
    }

    #[test]
    fn cookie_is_secure_only_in_production() {
        let secret = std::str::from_utf8(KEY).unwrap();
        let dev = CsrfGuard::from_config(&config(Some(secret)), Environment::Development).unwrap();
        let prod = CsrfGuard::from_config(&config(Some(secret)), Environment::Production).unwrap();
        let token = prod.issue().unwrap();

        let dev_cookie = dev.cookie_header(&token).unwrap();
        let prod_cookie = prod.cookie_header(&token).unwrap();
        let dev_cookie = dev_cookie.to_str().unwrap();
        let prod_cookie = prod_cookie.to_str().unwrap();

        assert!(prod_cookie.starts_with("__Host-csrf-token="));
        assert!(prod_cookie.contains("HttpOnly"));
        assert!(prod_cookie.contains("SameSite=Strict"));
        assert!(prod_cookie.contains("Path=/"));
        assert!(prod_cookie.ends_with("; Secure"));
        assert!(!dev_cookie.contains("Secure"));
    }
}
