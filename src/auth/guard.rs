//! Bearer token and HMAC signature verification.
//!
//! Every request must carry `Authorization: Bearer <secret>`. Rate limit
//! checks additionally carry `X-Timestamp` (unix milliseconds) and
//! `X-Signature` (lowercase hex HMAC-SHA256 of the timestamp string).
//! The health route is admitted on the bearer check alone.
//!
//! There is no nonce tracking: a captured valid `(timestamp, signature)`
//! pair is replayable until the skew window closes. Known limitation.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Verification failures, in the order they are detected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Bearer token missing or wrong
    #[error("Unauthorized")]
    Unauthorized,
    /// Timestamp or signature header absent or unparseable
    #[error("Missing signature")]
    MissingSignature,
    /// Timestamp outside the tolerated clock skew
    #[error("Expired request")]
    ExpiredRequest,
    /// Signature digest does not match
    #[error("Invalid signature")]
    InvalidSignature,
}

/// Immutable authentication parameters, fixed for the process lifetime.
#[derive(Clone)]
pub struct AuthContext {
    /// Shared secret for bearer and signature checks
    pub secret: String,
    /// Maximum tolerated clock skew in milliseconds
    pub max_skew_ms: i64,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("secret", &"[REDACTED]")
            .field("max_skew_ms", &self.max_skew_ms)
            .finish()
    }
}

/// Validates request authenticity before any counting happens.
#[derive(Debug, Clone)]
pub struct AuthGuard {
    context: AuthContext,
}

impl AuthGuard {
    /// Create a new guard from the given context.
    pub fn new(context: AuthContext) -> Self {
        Self { context }
    }

    /// Verify the `Authorization` header.
    ///
    /// The header must equal `"Bearer " + secret` exactly. This check alone
    /// admits the health route.
    pub fn verify_bearer(&self, authorization: Option<&str>) -> Result<(), AuthError> {
        let expected = format!("Bearer {}", self.context.secret);
        match authorization {
            Some(header) if constant_time_eq(header.as_bytes(), expected.as_bytes()) => Ok(()),
            _ => Err(AuthError::Unauthorized),
        }
    }

    /// Verify the full signed-request header set.
    ///
    /// Checks run in order: bearer token, header presence, clock skew,
    /// signature digest. The first failure terminates the request with no
    /// backend call made.
    pub fn verify_signed(
        &self,
        authorization: Option<&str>,
        timestamp: Option<&str>,
        signature: Option<&str>,
    ) -> Result<(), AuthError> {
        self.verify_bearer(authorization)?;

        let ts_raw = timestamp.ok_or(AuthError::MissingSignature)?;
        let ts_ms: i64 = ts_raw
            .parse()
            .map_err(|_| AuthError::MissingSignature)?;
        let signature = signature.ok_or(AuthError::MissingSignature)?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        if (now_ms - ts_ms).abs() > self.context.max_skew_ms {
            return Err(AuthError::ExpiredRequest);
        }

        let expected = self.sign(ts_raw);
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(AuthError::InvalidSignature);
        }

        Ok(())
    }

    /// Compute the expected signature for a timestamp string.
    ///
    /// Exposed so operators and tests can generate client credentials.
    pub fn sign(&self, timestamp: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.context.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
