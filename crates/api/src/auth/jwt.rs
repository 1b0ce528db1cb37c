//! Signed credential issuing and verification.
//!
//! Credentials are HS256-signed JWTs carrying a [`Claims`] payload. The
//! verified `tenant_id` claim is the only source of tenant identity for a
//! request.

use chrono::Utc;
use inmo_core::error::CoreError;
use inmo_core::tenant::TenantIdentity;
use inmo_core::types::{DbId, Timestamp};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims embedded in every credential.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject -- the user's internal id.
    pub sub: DbId,
    /// Tenant the user acts for.
    pub tenant_id: DbId,
    /// Role name (e.g. `"ADMINISTRADOR"`).
    pub role: String,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Unique token identifier (UUID v4).
    pub jti: String,
}

impl Claims {
    /// The request identity these claims establish.
    pub fn identity(&self) -> TenantIdentity {
        TenantIdentity {
            tenant_id: self.tenant_id,
            user_id: self.sub,
            role: self.role.clone(),
        }
    }
}

/// Configuration for credential signing.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Credential lifetime in minutes (default: 1440).
    pub expiry_mins: i64,
}

/// Default credential lifetime in minutes (one day).
const DEFAULT_EXPIRY_MINS: i64 = 1440;

impl JwtConfig {
    /// Load JWT configuration from environment variables.
    ///
    /// | Env Var           | Required | Default |
    /// |-------------------|----------|---------|
    /// | `JWT_SECRET`      | **yes**  | --      |
    /// | `JWT_EXPIRY_MINS` | no       | `1440`  |
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is not set or is empty, or if
    /// `JWT_EXPIRY_MINS` is not a positive integer.
    pub fn from_env() -> Self {
        let secret =
            std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "JWT_SECRET must not be empty");

        let expiry_mins: i64 = std::env::var("JWT_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_EXPIRY_MINS.to_string())
            .parse()
            .expect("JWT_EXPIRY_MINS must be a valid i64");
        assert!(expiry_mins > 0, "JWT_EXPIRY_MINS must be positive");

        Self {
            secret,
            expiry_mins,
        }
    }
}

// ---------------------------------------------------------------------------
// TokenCodec
// ---------------------------------------------------------------------------

/// Issues and verifies credentials with one signing key and lifetime.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime_secs: i64,
}

impl TokenCodec {
    pub fn new(config: &JwtConfig) -> Self {
        // Expiry is checked against an explicit clock in `verify_at`, with no
        // leeway, so a token is rejected exactly at `exp`. The remaining
        // claims are enforced by deserializing into `Claims`; `sub` is
        // numeric, which the library's string-only presence check rejects.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            lifetime_secs: config.expiry_mins * 60,
        }
    }

    /// Credential lifetime in seconds.
    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    /// Issue a credential valid from now for the configured lifetime.
    pub fn issue(&self, subject: DbId, tenant_id: DbId, role: &str) -> Result<String, CoreError> {
        self.issue_at(subject, tenant_id, role, Utc::now())
    }

    /// Issue a credential as if the clock read `now`.
    pub fn issue_at(
        &self,
        subject: DbId,
        tenant_id: DbId,
        role: &str,
        now: Timestamp,
    ) -> Result<String, CoreError> {
        let iat = now.timestamp();
        let claims = Claims {
            sub: subject,
            tenant_id,
            role: role.to_string(),
            iat,
            exp: iat + self.lifetime_secs,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CoreError::Internal(format!("Failed to sign credential: {e}")))
    }

    /// Verify `token` against the current time.
    pub fn verify(&self, token: &str) -> Result<Claims, CoreError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify signature and structure, then reject if `now` is at or past
    /// the embedded expiry.
    pub fn verify_at(&self, token: &str, now: Timestamp) -> Result<Claims, CoreError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => {
                    CoreError::InvalidCredential("Signature mismatch".into())
                }
                _ => CoreError::InvalidCredential("Malformed credential".into()),
            })?
            .claims;

        if now.timestamp() >= claims.exp {
            return Err(CoreError::InvalidCredential("Credential expired".into()));
        }
        Ok(claims)
    }
}
