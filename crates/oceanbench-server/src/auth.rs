//! Cron-trigger authentication.
//!
//! The remote cron service signs each tick request with an HMAC-SHA-256
//! JWT. The claims must name the cron service account as issuer and carry
//! the numeric site key to tick. Signature or issuer mismatch is a 401;
//! a valid token with no site key is a 400.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use oceanbench_types::SiteKey;
use serde::Deserialize;

/// Claims expected on a cron tick token.
#[derive(Debug, Deserialize)]
pub struct CronClaims {
    /// The signing service account; must match the configured one.
    pub iss: String,
    /// The site to tick.
    pub skey: Option<i64>,
}

/// Errors from cron token verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token is absent, malformed, or its signature does not verify.
    #[error("invalid token: {0}")]
    Token(String),

    /// The token verifies but was not issued by the cron service.
    #[error("unexpected issuer {0:?}")]
    Issuer(String),

    /// The token verifies but carries no site key.
    #[error("missing skey claim")]
    MissingSiteKey,
}

/// Verifier for cron tick tokens.
#[derive(Clone)]
pub struct CronAuth {
    key: DecodingKey,
    issuer: String,
}

impl CronAuth {
    /// Build a verifier over the shared HMAC secret and the expected
    /// cron service account.
    pub fn new(secret: &str, issuer: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_owned(),
        }
    }

    /// Verify a token and extract the site key it authorises.
    ///
    /// # Errors
    ///
    /// [`AuthError::Token`] or [`AuthError::Issuer`] (both surfaced as
    /// 401), or [`AuthError::MissingSiteKey`] (400).
    pub fn verify(&self, token: &str) -> Result<SiteKey, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // The cron service issues short-lived tokens without an exp
        // claim; the signature and issuer carry the trust.
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        let data = jsonwebtoken::decode::<CronClaims>(token, &self.key, &validation)
            .map_err(|e| AuthError::Token(e.to_string()))?;

        if data.claims.iss != self.issuer {
            return Err(AuthError::Issuer(data.claims.iss));
        }
        data.claims
            .skey
            .map(SiteKey)
            .ok_or(AuthError::MissingSiteKey)
    }
}
