use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::news::{Article, ArticleUpdate};
use crate::session::SessionStore;
use crate::storage::ArticleRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementAction {
    Viewed,
    Liked,
}

impl fmt::Display for EngagementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngagementAction::Viewed => f.write_str("viewed"),
            EngagementAction::Liked => f.write_str("liked"),
        }
    }
}

/// Session marker key, e.g. `liked_<articleId>`.
pub fn marker_key(action: EngagementAction, article_id: &str) -> String {
    format!("{}_{}", action, article_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeResult {
    pub new_count: u64,
    pub accepted: bool,
}

/// At-most-once-per-session view and like counting.
///
/// The marker is set before the increment is written, so a repeated action
/// issued while the write is still in flight is already rejected.
#[derive(Clone)]
pub struct EngagementCounter {
    repository: ArticleRepository,
    markers: Arc<dyn SessionStore>,
}

impl EngagementCounter {
    pub fn new(repository: ArticleRepository, markers: Arc<dyn SessionStore>) -> Self {
        Self { repository, markers }
    }

    pub fn has_viewed(&self, article_id: &str) -> bool {
        self.markers.has(&marker_key(EngagementAction::Viewed, article_id))
    }

    pub fn has_liked(&self, article_id: &str) -> bool {
        self.markers.has(&marker_key(EngagementAction::Liked, article_id))
    }

    /// Counts a view unless this session already did. Safe to call on every render.
    pub async fn record_view(&self, article_id: &str) -> Result<()> {
        let key = marker_key(EngagementAction::Viewed, article_id);
        if !self.markers.mark(&key)? {
            debug!("View of {} already counted this session", article_id);
            return Ok(());
        }

        let current = self.current_article(article_id).await?;
        self.repository
            .update(article_id, ArticleUpdate::views(current.views + 1))
            .await?;
        debug!("Recorded view of {}", article_id);
        Ok(())
    }

    /// Adds one like per session. A repeated like is refused without touching storage.
    pub async fn record_like(&self, article_id: &str) -> Result<LikeResult> {
        let key = marker_key(EngagementAction::Liked, article_id);
        if !self.markers.mark(&key)? {
            let count = match self.repository.articles().into_iter().find(|a| a.id == article_id) {
                Some(article) => article.likes,
                None => self.current_article(article_id).await?.likes,
            };
            return Ok(LikeResult { new_count: count, accepted: false });
        }

        match self.increment_likes(article_id).await {
            Ok(new_count) => Ok(LikeResult { new_count, accepted: true }),
            Err(e) => {
                warn!("Like of {} failed, rolling back marker: {}", article_id, e);
                if let Err(rollback) = self.markers.remove(&key) {
                    warn!("Failed to clear like marker for {}: {}", article_id, rollback);
                }
                Err(e)
            }
        }
    }

    async fn increment_likes(&self, article_id: &str) -> Result<u64> {
        let current = self.current_article(article_id).await?;
        let new_count = current.likes + 1;
        self.repository
            .update(article_id, ArticleUpdate::likes(new_count))
            .await?;
        Ok(new_count)
    }

    async fn current_article(&self, article_id: &str) -> Result<Article> {
        self.repository
            .get(article_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("article {}", article_id)))
    }
}
