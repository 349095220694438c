//! Password sign-in for the local store.
//!
//! Admin passwords are kept as salted SHA-256 digests, compared in constant
//! time. That is enough for a single-owner dev store, not for a hosted user
//! table. A successful sign-in issues an HS256 token; signing out revokes its
//! `jti` until it would have expired anyway.

use async_trait::async_trait;
use backend::{AuthProvider, BackendError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::{
    domain::{Session, UserId},
    validation::normalize_email,
};
use sqlx::Row;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    store_error,
    tables::timestamp,
    Storage,
};

const INVALID_CREDENTIALS: &str = "Invalid login credentials";

#[derive(Debug, Clone)]
pub struct LocalAuthConfig {
    pub secret: String,
    pub token_ttl: Duration,
}

impl Default for LocalAuthConfig {
    /// A per-process secret: tokens do not survive a restart.
    fn default() -> Self {
        Self {
            secret: format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
            token_ttl: Duration::hours(1),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    iat: i64,
    exp: i64,
    jti: String,
}

pub(crate) fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

fn new_salt() -> String {
    STANDARD.encode(Uuid::new_v4().as_bytes())
}

impl Storage {
    /// Creates the admin account, or resets its password if it exists.
    pub async fn create_admin(&self, email: &str, password: &str) -> anyhow::Result<UserId> {
        let email = normalize_email(email);
        let salt = new_salt();
        let hash = hash_password(&salt, password);
        let row = sqlx::query(
            "INSERT INTO admin_users (id, email, password_salt, password_hash, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET
                password_salt = excluded.password_salt,
                password_hash = excluded.password_hash
             RETURNING id",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&email)
        .bind(&salt)
        .bind(&hash)
        .bind(timestamp(Utc::now()))
        .fetch_one(&self.pool)
        .await?;
        let id = UserId(row.get::<String, _>(0));
        info!(%email, user_id = %id, "admin account saved");
        Ok(id)
    }

    fn issue_token(&self, user_id: &UserId, email: &str) -> Result<Session, BackendError> {
        let now = Utc::now();
        let expires_at = now + self.auth.token_ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.auth.secret.as_bytes()),
        )
        .map_err(|err| BackendError::Decode(format!("failed to sign token: {err}")))?;

        Ok(Session {
            user_id: user_id.clone(),
            email: email.to_string(),
            access_token: token,
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or(expires_at),
        })
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, BackendError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.auth.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| BackendError::Unauthorized(format!("invalid access token: {err}")))
    }

    /// Resolves a token issued by this store back into its session. Revoked
    /// and expired tokens are `Unauthorized`.
    pub(crate) async fn verify_token(&self, token: &str) -> Result<Session, BackendError> {
        let claims = self.decode_claims(token)?;
        let revoked = sqlx::query("SELECT 1 FROM revoked_tokens WHERE jti = ?")
            .bind(&claims.jti)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        if revoked.is_some() {
            return Err(BackendError::Unauthorized(
                "access token has been revoked".to_string(),
            ));
        }

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| BackendError::Decode("token expiry out of range".to_string()))?;
        Ok(Session {
            user_id: UserId(claims.sub),
            email: claims.email,
            access_token: token.to_string(),
            expires_at,
        })
    }
}

#[async_trait]
impl AuthProvider for Storage {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let email = normalize_email(email);
        let row = sqlx::query(
            "SELECT id, password_salt, password_hash FROM admin_users WHERE email = ?",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        let Some(row) = row else {
            warn!(%email, "sign-in for unknown account");
            return Err(BackendError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };
        let salt: String = row.try_get("password_salt").map_err(store_error)?;
        let expected: String = row.try_get("password_hash").map_err(store_error)?;
        let matches: bool = hash_password(&salt, password)
            .as_bytes()
            .ct_eq(expected.as_bytes())
            .into();
        if !matches {
            warn!(%email, "sign-in with wrong password");
            return Err(BackendError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        let user_id = UserId(row.try_get("id").map_err(store_error)?);
        self.issue_token(&user_id, &email)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let claims = self.decode_claims(access_token)?;
        let now = timestamp(Utc::now());
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .map(timestamp)
            .unwrap_or_else(|| now.clone());

        sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        sqlx::query("INSERT INTO revoked_tokens (jti, expires_at) VALUES (?, ?) ON CONFLICT(jti) DO NOTHING")
            .bind(&claims.jti)
            .bind(&expires_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        info!(email = %claims.email, "access token revoked");
        Ok(())
    }
}

