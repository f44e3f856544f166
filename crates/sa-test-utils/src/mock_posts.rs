//! In-memory post and like store.
//!
//! One value implements both [`PostStore`] and [`LikeStore`] over shared
//! tables, so a test can seed posts and likes, drive the feed, and then
//! count the writes that reached the store.
//!
//! # Example
//!
//! ```rust,ignore
//! use sa_test_utils::{subject, MockPostStore};
//!
//! let store = MockPostStore::new();
//! let post = store.insert_post(&subject("u1"), "Coffee");
//! store.insert_like(&subject("u2"), post);
//! ```

use common::post::{Like, LikeId, MatchCandidate, NewPost, Post, PostId};
use common::profile::Profile;
use common::types::{Session, SubjectId};
use session_authority::errors::PostStoreError;
use session_authority::posts::{LikeStore, PostStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    posts: Vec<Post>,
    likes: Vec<Like>,
    profiles: HashMap<SubjectId, Profile>,
    next_post_id: i64,
    next_like_id: i64,
    conflict_next_insert: bool,
    failure: Option<PostStoreError>,
    post_inserts: usize,
    like_inserts: usize,
    like_deletes: usize,
}

/// Mock post and like store for feed tests.
#[derive(Clone, Default)]
pub struct MockPostStore {
    inner: Arc<Mutex<Inner>>,
}

impl MockPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profile joined onto posts and returned as a match card.
    #[must_use]
    pub fn with_profile(self, profile: Profile) -> Self {
        self.inner
            .lock()
            .unwrap()
            .profiles
            .insert(profile.id.clone(), profile);
        self
    }

    /// Seed a post by `author`. Not counted as an insert.
    pub fn insert_post(&self, author: &SubjectId, category: &str) -> PostId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_post_id += 1;
        let id = PostId(inner.next_post_id);
        inner.posts.push(Post {
            id,
            author_id: author.clone(),
            caption: None,
            category: Some(category.to_string()),
            image: None,
            author: None,
        });
        id
    }

    /// Seed a like by `user` on `post`. Not counted as an insert.
    pub fn insert_like(&self, user: &SubjectId, post: PostId) -> LikeId {
        let mut inner = self.inner.lock().unwrap();
        Self::push_like(&mut inner, user, post).id
    }

    /// The next like insert fails with `Conflict` after storing the row,
    /// as if another device liked the post first.
    pub fn conflict_next_like_insert(&self) {
        self.inner.lock().unwrap().conflict_next_insert = true;
    }

    /// Every call fails with `error` until cleared.
    pub fn fail_all(&self, error: PostStoreError) {
        self.inner.lock().unwrap().failure = Some(error);
    }

    pub fn clear_failure(&self) {
        self.inner.lock().unwrap().failure = None;
    }

    pub fn post_insert_count(&self) -> usize {
        self.inner.lock().unwrap().post_inserts
    }

    pub fn like_insert_count(&self) -> usize {
        self.inner.lock().unwrap().like_inserts
    }

    pub fn like_delete_count(&self) -> usize {
        self.inner.lock().unwrap().like_deletes
    }

    /// Stored likes by `user` on `post`.
    pub fn likes_by(&self, user: &SubjectId, post: PostId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .likes
            .iter()
            .filter(|like| &like.user_id == user && like.post_id == post)
            .count()
    }

    fn push_like(inner: &mut Inner, user: &SubjectId, post: PostId) -> Like {
        inner.next_like_id += 1;
        let like = Like {
            id: LikeId(inner.next_like_id),
            user_id: user.clone(),
            post_id: post,
        };
        inner.likes.push(like.clone());
        like
    }

    fn check(&self) -> Result<std::sync::MutexGuard<'_, Inner>, PostStoreError> {
        let inner = self.inner.lock().unwrap();
        match &inner.failure {
            Some(error) => Err(error.clone()),
            None => Ok(inner),
        }
    }
}

#[async_trait::async_trait]
impl PostStore for MockPostStore {
    async fn list_feed(&self, _session: &Session) -> Result<Vec<Post>, PostStoreError> {
        let inner = self.check()?;
        Ok(inner
            .posts
            .iter()
            .cloned()
            .map(|mut post| {
                post.author = inner.profiles.get(&post.author_id).cloned();
                post
            })
            .collect())
    }

    async fn create_post(
        &self,
        session: &Session,
        post: &NewPost,
    ) -> Result<Post, PostStoreError> {
        let mut inner = self.check()?;
        inner.post_inserts += 1;
        inner.next_post_id += 1;
        let created = Post {
            id: PostId(inner.next_post_id),
            author_id: session.subject().clone(),
            caption: Some(post.caption.clone()),
            category: Some(post.category.clone()),
            image: Some(post.image.clone()),
            author: None,
        };
        inner.posts.push(created.clone());
        Ok(created)
    }

    async fn post_ids_by(
        &self,
        _session: &Session,
        author: &SubjectId,
    ) -> Result<Vec<PostId>, PostStoreError> {
        let inner = self.check()?;
        Ok(inner
            .posts
            .iter()
            .filter(|post| &post.author_id == author)
            .map(|post| post.id)
            .collect())
    }
}

#[async_trait::async_trait]
impl LikeStore for MockPostStore {
    async fn find_like(
        &self,
        session: &Session,
        post: PostId,
    ) -> Result<Option<Like>, PostStoreError> {
        let inner = self.check()?;
        Ok(inner
            .likes
            .iter()
            .find(|like| &like.user_id == session.subject() && like.post_id == post)
            .cloned())
    }

    async fn insert_like(&self, session: &Session, post: PostId) -> Result<Like, PostStoreError> {
        let mut inner = self.check()?;
        inner.like_inserts += 1;
        if std::mem::take(&mut inner.conflict_next_insert) {
            Self::push_like(&mut inner, session.subject(), post);
            return Err(PostStoreError::Conflict(format!("like on post {post}")));
        }
        Ok(Self::push_like(&mut inner, session.subject(), post))
    }

    async fn delete_like(&self, _session: &Session, like: LikeId) -> Result<(), PostStoreError> {
        let mut inner = self.check()?;
        inner.like_deletes += 1;
        inner.likes.retain(|stored| stored.id != like);
        Ok(())
    }

    async fn likes_on(
        &self,
        _session: &Session,
        posts: &[PostId],
    ) -> Result<Vec<Like>, PostStoreError> {
        let inner = self.check()?;
        Ok(inner
            .likes
            .iter()
            .filter(|like| posts.contains(&like.post_id))
            .cloned()
            .collect())
    }

    async fn profile_cards(
        &self,
        _session: &Session,
        users: &[SubjectId],
    ) -> Result<Vec<MatchCandidate>, PostStoreError> {
        let inner = self.check()?;
        Ok(users
            .iter()
            .map(|id| {
                let profile = inner.profiles.get(id);
                MatchCandidate {
                    id: id.clone(),
                    username: profile.and_then(|p| p.username.clone()),
                    avatar_url: profile.and_then(|p| p.avatar_url.clone()),
                }
            })
            .collect())
    }
}
