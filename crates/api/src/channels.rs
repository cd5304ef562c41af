//! Relationship aggregation: channel profiles and watch history
//!
//! Read-only views over the social graph. Each view is answered by a single
//! store read so its derived fields come from one consistent snapshot.

use std::sync::Arc;

use tubeline_shared::{ChannelProfile, CoreError, CoreResult, UserId, WatchedVideo};

use crate::store::GraphStore;

#[derive(Clone)]
pub struct RelationshipAggregator {
    graph: Arc<dyn GraphStore>,
}

impl RelationshipAggregator {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Channel identity with subscriber/subscription counts and whether the
    /// viewer follows it. A missing channel is `NotFound`; a channel with no
    /// edges is a profile with zero counts.
    pub async fn channel_profile(
        &self,
        viewer: UserId,
        target_username: &str,
    ) -> CoreResult<ChannelProfile> {
        let username = target_username.trim().to_lowercase();
        if username.is_empty() {
            return Err(CoreError::validation("Username is missing"));
        }

        self.graph
            .channel_profile(viewer, &username)
            .await?
            .ok_or_else(|| CoreError::not_found("Channel does not exist"))
    }

    /// The viewer's watch history, oldest entry first, each video joined with
    /// its owner. Videos deleted since they were watched are skipped.
    pub async fn watch_history(&self, viewer: UserId) -> CoreResult<Vec<WatchedVideo>> {
        self.graph.watch_history(viewer).await
    }
}
