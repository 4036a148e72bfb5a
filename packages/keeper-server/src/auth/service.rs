//! # Authentication Service
//!
//! Password hashing (argon2) over the user registry, and the access/refresh
//! JWT lifecycle. Access and refresh tokens are HS256-signed with distinct
//! keys and distinguished by a `typ` claim, so one can never stand in for
//! the other. Refresh is stateless: presenting a valid refresh token mints a
//! fresh pair, and the old refresh token stays valid until its own expiry.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use keeper_core::error::{Error, Result};

use crate::storage::MetadataStore;

const TOKEN_TYPE_ACCESS: &str = "access";
const TOKEN_TYPE_REFRESH: &str = "refresh";

/// Default access-token lifetime: 1 hour.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 3600;

/// Default refresh-token lifetime: 24 hours.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 24 * 3600;

/// Access + refresh token pair handed to a client session.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    typ: String,
    iat: i64,
    nbf: i64,
    exp: i64,
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// User registration/authentication and token mint/validate/rotate.
pub struct AuthService {
    users: Arc<MetadataStore>,
    access: SigningKey,
    refresh: SigningKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(users: Arc<MetadataStore>, access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self::with_ttls(
            users,
            access_secret,
            refresh_secret,
            Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
        )
    }

    pub fn with_ttls(
        users: Arc<MetadataStore>,
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            users,
            access: SigningKey::new(access_secret),
            refresh: SigningKey::new(refresh_secret),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Register a new user and hand back their first token pair.
    pub fn register(&self, login: &str, password: &str) -> Result<TokenPair> {
        if self.users.user_exists(login)? {
            return Err(Error::UserExists(login.to_string()));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Internal(format!("cannot hash password: {e}")))?
            .to_string();

        self.users.create_user(login, &hash)?;
        self.token_pair(login)
    }

    /// Verify credentials and mint a token pair.
    pub fn authenticate(&self, login: &str, password: &str) -> Result<TokenPair> {
        let hash = self
            .users
            .password_hash(login)?
            .ok_or_else(|| Error::UserNotFound(login.to_string()))?;

        let parsed =
            PasswordHash::new(&hash).map_err(|e| Error::Internal(format!("bad stored hash: {e}")))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| Error::InvalidCredentials)?;

        self.token_pair(login)
    }

    /// Mint a fresh access + refresh pair for `username`.
    pub fn token_pair(&self, username: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.mint(username, TOKEN_TYPE_ACCESS, self.access_ttl, &self.access)?,
            refresh_token: self.mint(
                username,
                TOKEN_TYPE_REFRESH,
                self.refresh_ttl,
                &self.refresh,
            )?,
        })
    }

    /// Validate an access token and return its subject.
    pub fn validate_access_token(&self, token: &str) -> Result<String> {
        let claims = self.parse(token, &self.access)?;
        if claims.typ != TOKEN_TYPE_ACCESS {
            return Err(Error::InvalidToken("not an access token".into()));
        }
        Ok(claims.sub)
    }

    /// Exchange a valid refresh token for a fresh pair.
    pub fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.parse(refresh_token, &self.refresh)?;
        if claims.typ != TOKEN_TYPE_REFRESH {
            return Err(Error::InvalidToken("not a refresh token".into()));
        }
        self.token_pair(&claims.sub)
    }

    fn mint(&self, username: &str, typ: &str, ttl: Duration, key: &SigningKey) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            typ: typ.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &key.encoding)
            .map_err(|e| Error::Internal(format!("cannot sign token: {e}")))
    }

    fn parse(&self, token: &str, key: &SigningKey) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;

        decode::<Claims>(token, &key.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Error::TokenExpired,
                _ => Error::InvalidToken(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        let store = Arc::new(MetadataStore::open(":memory:").unwrap());
        AuthService::new(store, b"access-secret-key", b"refresh-secret-key")
    }

    #[test]
    fn test_register_then_authenticate() {
        let auth = service();

        let pair = auth.register("mark", "secret").unwrap();
        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());
        assert_eq!(auth.validate_access_token(&pair.access_token).unwrap(), "mark");

        let pair = auth.authenticate("mark", "secret").unwrap();
        assert_eq!(auth.validate_access_token(&pair.access_token).unwrap(), "mark");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let auth = service();
        auth.register("mark", "secret").unwrap();
        assert!(matches!(
            auth.register("mark", "other"),
            Err(Error::UserExists(_))
        ));
    }

    #[test]
    fn test_wrong_password_and_unknown_user() {
        let auth = service();
        auth.register("mark", "secret").unwrap();

        assert!(matches!(
            auth.authenticate("mark", "wrong"),
            Err(Error::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate("nobody", "x"),
            Err(Error::UserNotFound(_))
        ));
    }

    #[test]
    fn test_refresh_rotates_pair() {
        let auth = service();
        let pair = auth.register("mark", "secret").unwrap();

        let rotated = auth.refresh_tokens(&pair.refresh_token).unwrap();
        assert_eq!(
            auth.validate_access_token(&rotated.access_token).unwrap(),
            "mark"
        );

        // Stateless refresh: the old refresh token still works until expiry.
        assert!(auth.refresh_tokens(&pair.refresh_token).is_ok());
    }

    #[test]
    fn test_access_token_is_not_a_refresh_token() {
        let auth = service();
        let pair = auth.register("mark", "secret").unwrap();

        assert!(matches!(
            auth.refresh_tokens(&pair.access_token),
            Err(Error::InvalidToken(_))
        ));
        assert!(matches!(
            auth.validate_access_token(&pair.refresh_token),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_access_token() {
        let store = Arc::new(MetadataStore::open(":memory:").unwrap());
        let auth = AuthService::with_ttls(
            store,
            b"access-secret-key",
            b"refresh-secret-key",
            Duration::seconds(-1),
            Duration::seconds(60),
        );

        let pair = auth.register("mark", "secret").unwrap();
        assert!(matches!(
            auth.validate_access_token(&pair.access_token),
            Err(Error::TokenExpired)
        ));
        // The refresh token has its own, longer TTL and still validates.
        assert!(auth.refresh_tokens(&pair.refresh_token).is_ok());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let auth = service();
        assert!(matches!(
            auth.validate_access_token("not-a-jwt"),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn test_tokens_signed_with_distinct_keys() {
        let auth = service();
        let pair = auth.register("mark", "secret").unwrap();

        // The refresh token fails under the access key before the typ claim
        // is even consulted: the signatures differ.
        let err = auth.validate_access_token(&pair.refresh_token).unwrap_err();
        assert!(matches!(err, Error::InvalidToken(_)));
    }
}
