//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;
use time::Duration;

use crate::{
    accounts::AccountService,
    auth::{JwtManager, TokenService},
    channels::RelationshipAggregator,
    config::Config,
    media::BlobStorage,
    store::{GraphStore, UserStore},
};

/// State handed to every handler. Cheap to clone; nothing request-scoped lives here.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserStore>,
    pub tokens: TokenService,
    pub accounts: AccountService,
    pub channels: RelationshipAggregator,
    /// Present when backed by PostgreSQL; used by health checks
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Wire the services over the given stores and blob storage
    pub fn new(
        config: Config,
        users: Arc<dyn UserStore>,
        graph: Arc<dyn GraphStore>,
        blobs: Arc<dyn BlobStorage>,
        pool: Option<PgPool>,
    ) -> Self {
        let jwt = JwtManager::new(
            &config.access_token_secret,
            Duration::minutes(config.access_token_expiry_minutes),
            &config.refresh_token_secret,
            Duration::days(config.refresh_token_expiry_days),
        );
        let tokens = TokenService::new(jwt, users.clone());
        let accounts = AccountService::new(users.clone(), graph.clone(), blobs, tokens.clone());
        let channels = RelationshipAggregator::new(graph);

        Self {
            config: Arc::new(config),
            users,
            tokens,
            accounts,
            channels,
            pool,
        }
    }
}
