//! Feed, likes and matches for the signed-in user.
//!
//! Every operation runs as the session the authority currently publishes,
//! so a signed-out user gets `FeedError::NotAuthenticated` instead of an
//! anonymous request.
//!
//! # Likes
//!
//! A user has at most one like per post. [`Feed::set_liked`] looks up the
//! existing like first and only writes when the stored state differs, so
//! repeating a like (or an unlike) is a no-op.
//!
//! # Matches
//!
//! The people who liked any of the user's posts, each listed once and
//! never including the user.

use crate::authority::{AuthState, SessionAuthorityHandle};
use crate::errors::{FeedError, PostStoreError};
use crate::observability::metrics;
use crate::posts::{LikeStore, PostStore};
use common::post::{Like, MatchCandidate, NewPost, Post, PostId};
use common::types::{Session, SubjectId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Post and like operations on behalf of the signed-in user.
#[derive(Clone)]
pub struct Feed {
    authority: SessionAuthorityHandle,
    posts: Arc<dyn PostStore>,
    likes: Arc<dyn LikeStore>,
}

impl Feed {
    #[must_use]
    pub fn new(
        authority: SessionAuthorityHandle,
        posts: Arc<dyn PostStore>,
        likes: Arc<dyn LikeStore>,
    ) -> Self {
        Self {
            authority,
            posts,
            likes,
        }
    }

    fn session(&self) -> Result<Session, FeedError> {
        match self.authority.state() {
            AuthState::Initializing => Err(FeedError::NotReady),
            AuthState::Unauthenticated => Err(FeedError::NotAuthenticated),
            AuthState::Authenticated { session, .. } => Ok(session),
        }
    }

    /// All posts, with author profiles.
    #[instrument(skip_all, name = "sa.feed.posts")]
    pub async fn posts(&self) -> Result<Vec<Post>, FeedError> {
        let session = self.session()?;
        let posts = self.posts.list_feed(&session).await?;
        debug!(target: "sa.feed", count = posts.len(), "Feed loaded");
        Ok(posts)
    }

    /// Publish a new post as the signed-in user.
    ///
    /// The post is validated before any store call.
    #[instrument(skip_all, name = "sa.feed.create_post")]
    pub async fn create_post(&self, post: NewPost) -> Result<Post, FeedError> {
        post.validate()
            .map_err(|e| FeedError::InvalidPost(e.to_string()))?;
        let session = self.session()?;

        let created = self.posts.create_post(&session, &post).await?;
        info!(
            target: "sa.feed",
            post_id = %created.id,
            category = %post.category,
            "Post created"
        );
        metrics::record_post_created();
        Ok(created)
    }

    /// The signed-in user's like on `post`, if any.
    pub async fn like_of(&self, post: PostId) -> Result<Option<Like>, FeedError> {
        let session = self.session()?;
        Ok(self.likes.find_like(&session, post).await?)
    }

    /// Make the user's like on `post` match `liked`.
    ///
    /// Returns the like record when the post ends up liked.
    #[instrument(skip_all, name = "sa.feed.set_liked", fields(post_id = %post, liked = liked))]
    pub async fn set_liked(&self, post: PostId, liked: bool) -> Result<Option<Like>, FeedError> {
        let session = self.session()?;

        match (self.likes.find_like(&session, post).await?, liked) {
            (Some(like), true) => Ok(Some(like)),
            (None, false) => Ok(None),
            (None, true) => self.like(&session, post).await.map(Some),
            (Some(like), false) => {
                self.unlike(&session, like).await?;
                Ok(None)
            }
        }
    }

    /// Flip the user's like on `post`. Returns whether it is now liked.
    #[instrument(skip_all, name = "sa.feed.toggle_like", fields(post_id = %post))]
    pub async fn toggle_like(&self, post: PostId) -> Result<bool, FeedError> {
        let session = self.session()?;

        match self.likes.find_like(&session, post).await? {
            Some(like) => {
                self.unlike(&session, like).await?;
                Ok(false)
            }
            None => {
                self.like(&session, post).await?;
                Ok(true)
            }
        }
    }

    /// People who liked any of the signed-in user's posts.
    #[instrument(skip_all, name = "sa.feed.matches")]
    pub async fn matches(&self) -> Result<Vec<MatchCandidate>, FeedError> {
        let session = self.session()?;
        let me = session.subject();

        let post_ids = self.posts.post_ids_by(&session, me).await?;
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let likers: BTreeSet<SubjectId> = self
            .likes
            .likes_on(&session, &post_ids)
            .await?
            .into_iter()
            .map(|like| like.user_id)
            .filter(|user| user != me)
            .collect();
        if likers.is_empty() {
            return Ok(Vec::new());
        }

        let likers: Vec<SubjectId> = likers.into_iter().collect();
        let candidates = self.likes.profile_cards(&session, &likers).await?;
        debug!(
            target: "sa.feed",
            posts = post_ids.len(),
            candidates = candidates.len(),
            "Matches loaded"
        );
        Ok(candidates)
    }

    async fn like(&self, session: &Session, post: PostId) -> Result<Like, FeedError> {
        let like = match self.likes.insert_like(session, post).await {
            Ok(like) => like,
            // Liked from another device between lookup and insert.
            Err(PostStoreError::Conflict(_)) => self
                .likes
                .find_like(session, post)
                .await?
                .ok_or_else(|| PostStoreError::NotFound(format!("like on post {post}")))?,
            Err(e) => return Err(e.into()),
        };

        debug!(target: "sa.feed", post_id = %post, like_id = %like.id, "Post liked");
        metrics::record_like_change("liked");
        Ok(like)
    }

    async fn unlike(&self, session: &Session, like: Like) -> Result<(), FeedError> {
        self.likes.delete_like(session, like.id).await?;

        debug!(target: "sa.feed", post_id = %like.post_id, like_id = %like.id, "Post unliked");
        metrics::record_like_change("unliked");
        Ok(())
    }
}
