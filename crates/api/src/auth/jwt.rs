//! JWT token generation and validation

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use tubeline_shared::UserId;

/// JWT claims shared by access and refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: UserId,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// JWT ID, unique per minted token
    pub jti: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Signing material and lifetime for one token class
#[derive(Clone)]
struct KeySet {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl KeySet {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// JWT manager for token operations.
///
/// Access and refresh tokens are signed with independent secrets, so a token
/// of one class never validates as the other.
#[derive(Clone)]
pub struct JwtManager {
    access: KeySet,
    refresh: KeySet,
}

impl JwtManager {
    /// Create a new JWT manager
    pub fn new(
        access_secret: &str,
        access_ttl: Duration,
        refresh_secret: &str,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access: KeySet::new(access_secret, access_ttl),
            refresh: KeySet::new(refresh_secret, refresh_ttl),
        }
    }

    fn keys(&self, token_type: TokenType) -> &KeySet {
        match token_type {
            TokenType::Access => &self.access,
            TokenType::Refresh => &self.refresh,
        }
    }

    fn generate(&self, user_id: UserId, token_type: TokenType) -> Result<String, JwtError> {
        let keys = self.keys(token_type);
        let now = OffsetDateTime::now_utc();
        let exp = now + keys.ttl;

        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            token_type,
            jti: Uuid::new_v4().to_string(),
        };

        // Explicit algorithm prevents algorithm confusion attacks
        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Generate an access token
    pub fn generate_access_token(&self, user_id: UserId) -> Result<String, JwtError> {
        self.generate(user_id, TokenType::Access)
    }

    /// Generate a refresh token
    pub fn generate_refresh_token(&self, user_id: UserId) -> Result<String, JwtError> {
        self.generate(user_id, TokenType::Refresh)
    }

    /// Generate both access and refresh tokens
    /// Returns: (access_token, refresh_token)
    pub fn generate_token_pair(&self, user_id: UserId) -> Result<(String, String), JwtError> {
        let access_token = self.generate_access_token(user_id)?;
        let refresh_token = self.generate_refresh_token(user_id)?;
        Ok((access_token, refresh_token))
    }

    fn validate(&self, token: &str, token_type: TokenType) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance

        let claims = decode::<Claims>(token, &self.keys(token_type).decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })?;

        if claims.token_type != token_type {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Validate an access token specifically
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate(token, TokenType::Access)
    }

    /// Validate a refresh token specifically
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate(token, TokenType::Refresh)
    }

    /// Access token lifetime in seconds
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access.ttl.whole_seconds()
    }

    /// Refresh token lifetime in seconds
    pub fn refresh_token_expiry_seconds(&self) -> i64 {
        self.refresh.ttl.whole_seconds()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Wrong token type")]
    WrongTokenType,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}
