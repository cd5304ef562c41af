//! Session token lifecycle
//!
//! Issues access/refresh pairs and enforces single-active-session semantics:
//! the user record holds the only refresh token that may be rotated, so a
//! logout or an earlier rotation makes every older refresh token useless even
//! while its signature is still valid.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use tubeline_shared::{CoreError, CoreResult, TokenPair, UserId};

use super::jwt::JwtManager;
use crate::store::UserStore;

/// Mints, verifies, rotates and revokes session tokens
#[derive(Clone)]
pub struct TokenService {
    jwt: JwtManager,
    users: Arc<dyn UserStore>,
}

impl TokenService {
    pub fn new(jwt: JwtManager, users: Arc<dyn UserStore>) -> Self {
        Self { jwt, users }
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    /// Sign a fresh pair and make its refresh token the user's only valid one.
    ///
    /// Tokens are returned only after the refresh token is persisted.
    pub async fn issue_pair(&self, user_id: UserId) -> CoreResult<TokenPair> {
        let (access_token, refresh_token) = self.mint(user_id)?;

        let stored = self
            .users
            .set_refresh_token(user_id, &refresh_token)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user_id, error = %e, "Failed to persist refresh token");
                CoreError::internal("Something went wrong while generating tokens")
            })?;
        if !stored {
            tracing::error!(user_id = %user_id, "Token issuance for missing user");
            return Err(CoreError::internal(
                "Something went wrong while generating tokens",
            ));
        }

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Stateless check of an access token: signature, expiry and class only
    pub fn verify_access(&self, token: &str) -> CoreResult<UserId> {
        self.jwt
            .validate_access_token(token)
            .map(|claims| claims.sub)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                CoreError::unauthorized("Invalid access token")
            })
    }

    /// Exchange a refresh token for a new pair, invalidating the presented one
    pub async fn rotate(&self, presented: &str) -> CoreResult<TokenPair> {
        let claims = self.jwt.validate_refresh_token(presented).map_err(|e| {
            tracing::debug!(error = %e, "Refresh token rejected");
            CoreError::unauthorized("Invalid refresh token")
        })?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| CoreError::unauthorized("Invalid refresh token"))?;

        let matches_stored = user
            .refresh_token
            .as_deref()
            .is_some_and(|stored| bool::from(stored.as_bytes().ct_eq(presented.as_bytes())));
        if !matches_stored {
            tracing::warn!(
                user_id = %user.id,
                reason = "stale_refresh_token",
                "Refresh token is expired or used"
            );
            return Err(CoreError::unauthorized("Refresh token is expired or used"));
        }

        let (access_token, refresh_token) = self.mint(user.id)?;

        // The stored value may have moved since it was read; the swap only
        // succeeds for the request that still holds the current token.
        let swapped = self
            .users
            .swap_refresh_token(user.id, presented, &refresh_token)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user.id, error = %e, "Failed to rotate refresh token");
                CoreError::internal("Something went wrong while generating tokens")
            })?;
        if !swapped {
            tracing::warn!(
                user_id = %user.id,
                reason = "concurrent_rotation",
                "Refresh token is expired or used"
            );
            return Err(CoreError::unauthorized("Refresh token is expired or used"));
        }

        tracing::info!(user_id = %user.id, "Refresh token rotated");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Forget the user's refresh token (logout). Idempotent.
    pub async fn revoke(&self, user_id: UserId) -> CoreResult<()> {
        self.users.clear_refresh_token(user_id).await?;
        tracing::info!(user_id = %user_id, "Refresh token revoked");
        Ok(())
    }

    fn mint(&self, user_id: UserId) -> CoreResult<(String, String)> {
        self.jwt.generate_token_pair(user_id).map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "Token signing failed");
            CoreError::internal("Something went wrong while generating tokens")
        })
    }
}
