//! Token issuance and password hashing.
//!
//! Tokens have the form `<user>.<expires-unix>.<signature>` where the
//! signature is a hex HMAC-SHA256 over the two claims, keyed with the
//! server secret. Passwords are stored as PBKDF2-SHA256 PHC strings.

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use pbkdf2::Pbkdf2;
use pbkdf2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use sha2::Sha256;

use crate::error::AuthError;
use crate::model::UserId;

type HmacSha256 = Hmac<Sha256>;

const PASSWORD_ROUNDS: u32 = 10_000;
const PASSWORD_HASH_LENGTH: usize = 32;

pub struct TokenAuthenticator {
    mac: HmacSha256,
    ttl: Duration,
}

impl TokenAuthenticator {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Result<Self, AuthError> {
        let mac = HmacSha256::new_from_slice(secret.as_ref()).map_err(|_| AuthError::InvalidSecret)?;
        Ok(Self { mac, ttl })
    }

    pub fn issue_token(&self, user: UserId) -> String {
        let expires = (Utc::now() + self.ttl).timestamp();
        let signature = self.claims_mac(user.0, expires).finalize().into_bytes();
        format!("{}.{}.{}", user, expires, hex::encode(signature))
    }

    pub fn user_id_by_token(&self, token: &str) -> Result<UserId, AuthError> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let mut parts = token.splitn(3, '.');
        let (Some(user), Some(expires), Some(signature)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AuthError::MalformedToken);
        };
        let user: u64 = user.parse().map_err(|_| AuthError::MalformedToken)?;
        let expires: i64 = expires.parse().map_err(|_| AuthError::MalformedToken)?;
        let signature = hex::decode(signature).map_err(|_| AuthError::InvalidSignature)?;

        self.claims_mac(user, expires)
            .verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;
        if expires < Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(UserId(user))
    }

    fn claims_mac(&self, user: u64, expires: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(format!("{user}:{expires}").as_bytes());
        mac
    }
}

pub fn hash_password(plain: &str) -> Result<String, AuthError> {
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes()).map_err(AuthError::Hashing)?;
    let params = pbkdf2::Params {
        rounds: PASSWORD_ROUNDS,
        output_length: PASSWORD_HASH_LENGTH,
    };
    let hash = Pbkdf2
        .hash_password_customized(plain.as_bytes(), None, None, params, &salt)
        .map_err(AuthError::Hashing)?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, plain: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::MalformedHash)?;
    match Pbkdf2.verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(_) => Err(AuthError::MalformedHash),
    }
}
