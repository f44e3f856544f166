//! Post and like store adapter contracts.
//!
//! Both traits are thin row operations. Decisions such as "already liked,
//! don't insert again" and "never match with yourself" live in
//! [`crate::feed::Feed`], so every adapter gets them for free.

use crate::errors::PostStoreError;
use common::post::{Like, LikeId, MatchCandidate, NewPost, Post, PostId};
use common::types::{Session, SubjectId};

/// Contract for reading and writing move posts.
#[async_trait::async_trait]
pub trait PostStore: Send + Sync {
    /// All posts with their author profiles joined.
    async fn list_feed(&self, session: &Session) -> Result<Vec<Post>, PostStoreError>;

    /// Insert `post` authored by `session.subject()` and return the stored row.
    async fn create_post(&self, session: &Session, post: &NewPost)
        -> Result<Post, PostStoreError>;

    /// Ids of every post authored by `author`.
    async fn post_ids_by(
        &self,
        session: &Session,
        author: &SubjectId,
    ) -> Result<Vec<PostId>, PostStoreError>;
}

/// Contract for likes and the profiles of the people behind them.
#[async_trait::async_trait]
pub trait LikeStore: Send + Sync {
    /// Like by `session.subject()` on `post`, if one exists.
    async fn find_like(
        &self,
        session: &Session,
        post: PostId,
    ) -> Result<Option<Like>, PostStoreError>;

    /// Record a like by `session.subject()` on `post`.
    async fn insert_like(&self, session: &Session, post: PostId) -> Result<Like, PostStoreError>;

    /// Remove a like by its record id.
    async fn delete_like(&self, session: &Session, like: LikeId) -> Result<(), PostStoreError>;

    /// Every like on any of `posts`.
    async fn likes_on(
        &self,
        session: &Session,
        posts: &[PostId],
    ) -> Result<Vec<Like>, PostStoreError>;

    /// Public profile cards for `users`.
    async fn profile_cards(
        &self,
        session: &Session,
        users: &[SubjectId],
    ) -> Result<Vec<MatchCandidate>, PostStoreError>;
}
