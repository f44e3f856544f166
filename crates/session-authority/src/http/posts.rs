//! Post and like stores backed by the hosted row REST API.
//!
//! Posts and likes are plain rows. The feed query embeds the author's
//! profile row through the `user_id` foreign key, and both inserts ask for
//! the stored row back with `Prefer: return=representation`.

use super::profiles::ProfileRow;
use super::{build_client, normalize_base_url, API_KEY_HEADER};
use crate::config::{DEFAULT_LIKES_TABLE, DEFAULT_POSTS_TABLE, DEFAULT_PROFILES_TABLE};
use crate::errors::PostStoreError;
use crate::posts::{LikeStore, PostStore};
use common::post::{Like, LikeId, MatchCandidate, NewPost, Post, PostId};
use common::secret::{ExposeSecret, SecretString};
use common::types::{Session, SubjectId};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Columns shown for a match candidate.
const CARD_SELECT: &str = "id,username,avatar_url";

/// Table names used by [`HttpPostStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostTables {
    pub posts: String,
    pub likes: String,
    pub profiles: String,
}

impl Default for PostTables {
    fn default() -> Self {
        Self {
            posts: DEFAULT_POSTS_TABLE.to_string(),
            likes: DEFAULT_LIKES_TABLE.to_string(),
            profiles: DEFAULT_PROFILES_TABLE.to_string(),
        }
    }
}

/// One row of the posts table, optionally with the author joined.
#[derive(Debug, Deserialize)]
struct PostRow {
    id: i64,
    user_id: String,
    caption: Option<String>,
    category: Option<String>,
    image: Option<String>,
    #[serde(default)]
    user: Option<ProfileRow>,
}

impl PostRow {
    fn into_post(self) -> Result<Post, PostStoreError> {
        let author_id = SubjectId::new(self.user_id)
            .map_err(|e| PostStoreError::InvalidResponse(e.to_string()))?;
        let author = self
            .user
            .map(ProfileRow::into_profile)
            .transpose()
            .map_err(|e| PostStoreError::InvalidResponse(e.to_string()))?;

        Ok(Post {
            id: PostId(self.id),
            author_id,
            caption: self.caption,
            category: self.category,
            image: self.image,
            author,
        })
    }
}

#[derive(Debug, Serialize)]
struct PostInsert<'a> {
    caption: &'a str,
    category: &'a str,
    image: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct LikeInsert<'a> {
    user_id: &'a str,
    post_id: PostId,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: i64,
}

/// HTTP client for the posts and likes tables.
pub struct HttpPostStore {
    client: Client,
    base_url: String,
    anon_key: SecretString,
    tables: PostTables,
}

impl std::fmt::Debug for HttpPostStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPostStore")
            .field("base_url", &self.base_url)
            .field("tables", &self.tables)
            .field("anon_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpPostStore {
    /// Create a new store client.
    ///
    /// # Errors
    ///
    /// Returns `PostStoreError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        anon_key: SecretString,
        tables: PostTables,
        timeout: Duration,
    ) -> Result<Self, PostStoreError> {
        let client = build_client(timeout).map_err(|e| {
            warn!(target: "sa.store.http", error = %e, "Failed to build HTTP client");
            PostStoreError::Configuration(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            anon_key,
            tables,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        request
            .header(API_KEY_HEADER, self.anon_key.expose_secret())
            .bearer_auth(session.access_token().expose_secret())
    }

    async fn send(request: RequestBuilder) -> Result<Response, PostStoreError> {
        let response = request.send().await.map_err(transport_error)?;
        check_status(response.status())?;
        Ok(response)
    }

    async fn rows<T: DeserializeOwned>(request: RequestBuilder) -> Result<Vec<T>, PostStoreError> {
        let response = Self::send(request).await?;
        response.json::<Vec<T>>().await.map_err(|e| {
            warn!(target: "sa.store.http", error = %e, "Failed to parse rows");
            PostStoreError::InvalidResponse(format!("rows: {e}"))
        })
    }

    /// First row of an insert answered with `return=representation`.
    async fn inserted<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, PostStoreError> {
        Self::rows::<T>(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PostStoreError::InvalidResponse("insert returned no row".to_string()))
    }
}

#[async_trait::async_trait]
impl PostStore for HttpPostStore {
    #[instrument(skip_all, fields(subject = %session.subject()))]
    async fn list_feed(&self, session: &Session) -> Result<Vec<Post>, PostStoreError> {
        // Embeds the author profile row as `user`.
        let select = format!("*,user:{}(*)", self.tables.profiles);
        let request = self
            .authorized(self.client.get(self.table_url(&self.tables.posts)), session)
            .query(&[("select", select)]);

        let posts = Self::rows::<PostRow>(request)
            .await?
            .into_iter()
            .map(PostRow::into_post)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(target: "sa.store.http", count = posts.len(), "Fetched feed rows");
        Ok(posts)
    }

    #[instrument(skip_all, fields(subject = %session.subject()))]
    async fn create_post(
        &self,
        session: &Session,
        post: &NewPost,
    ) -> Result<Post, PostStoreError> {
        let body = [PostInsert {
            caption: &post.caption,
            category: &post.category,
            image: &post.image,
            user_id: session.subject().as_str(),
        }];
        let request = self
            .authorized(self.client.post(self.table_url(&self.tables.posts)), session)
            .header("Prefer", "return=representation")
            .json(&body);

        let created = Self::inserted::<PostRow>(request).await?.into_post()?;
        debug!(target: "sa.store.http", post_id = %created.id, "Inserted post row");
        Ok(created)
    }

    async fn post_ids_by(
        &self,
        session: &Session,
        author: &SubjectId,
    ) -> Result<Vec<PostId>, PostStoreError> {
        let request = self
            .authorized(self.client.get(self.table_url(&self.tables.posts)), session)
            .query(&[
                ("user_id", format!("eq.{author}")),
                ("select", "id".to_string()),
            ]);

        let ids = Self::rows::<IdRow>(request).await?;
        Ok(ids.into_iter().map(|row| PostId(row.id)).collect())
    }
}

#[async_trait::async_trait]
impl LikeStore for HttpPostStore {
    async fn find_like(
        &self,
        session: &Session,
        post: PostId,
    ) -> Result<Option<Like>, PostStoreError> {
        let request = self
            .authorized(self.client.get(self.table_url(&self.tables.likes)), session)
            .query(&[
                ("user_id", format!("eq.{}", session.subject())),
                ("post_id", format!("eq.{post}")),
                ("select", "*".to_string()),
            ]);

        Ok(Self::rows::<Like>(request).await?.into_iter().next())
    }

    #[instrument(skip_all, fields(subject = %session.subject(), post_id = %post))]
    async fn insert_like(&self, session: &Session, post: PostId) -> Result<Like, PostStoreError> {
        let body = [LikeInsert {
            user_id: session.subject().as_str(),
            post_id: post,
        }];
        let request = self
            .authorized(self.client.post(self.table_url(&self.tables.likes)), session)
            .header("Prefer", "return=representation")
            .json(&body);

        Self::inserted::<Like>(request).await
    }

    #[instrument(skip_all, fields(subject = %session.subject(), like_id = %like))]
    async fn delete_like(&self, session: &Session, like: LikeId) -> Result<(), PostStoreError> {
        let request = self
            .authorized(self.client.delete(self.table_url(&self.tables.likes)), session)
            .query(&[("id", format!("eq.{like}"))]);

        Self::send(request).await?;
        Ok(())
    }

    async fn likes_on(
        &self,
        session: &Session,
        posts: &[PostId],
    ) -> Result<Vec<Like>, PostStoreError> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let request = self
            .authorized(self.client.get(self.table_url(&self.tables.likes)), session)
            .query(&[
                ("post_id", in_filter(posts)),
                ("select", "id,user_id,post_id".to_string()),
            ]);

        Self::rows::<Like>(request).await
    }

    async fn profile_cards(
        &self,
        session: &Session,
        users: &[SubjectId],
    ) -> Result<Vec<MatchCandidate>, PostStoreError> {
        if users.is_empty() {
            return Ok(Vec::new());
        }

        let request = self
            .authorized(
                self.client.get(self.table_url(&self.tables.profiles)),
                session,
            )
            .query(&[
                ("id", in_filter(users)),
                ("id", format!("neq.{}", session.subject())),
                ("select", CARD_SELECT.to_string()),
            ]);

        Self::rows::<MatchCandidate>(request).await
    }
}

/// Row API `in.(a,b,c)` filter value.
fn in_filter<T: Display>(values: &[T]) -> String {
    let joined = values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({joined})")
}

fn check_status(status: StatusCode) -> Result<(), PostStoreError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(PostStoreError::Unauthorized(format!(
            "row API returned {status}"
        )));
    }
    if status == StatusCode::NOT_FOUND {
        return Err(PostStoreError::NotFound(format!("row API returned {status}")));
    }
    if status == StatusCode::CONFLICT {
        return Err(PostStoreError::Conflict(format!("row API returned {status}")));
    }
    if status.is_server_error() {
        warn!(target: "sa.store.http", status = %status, "Row API returned server error");
        return Err(PostStoreError::Unavailable(format!(
            "row API returned {status}"
        )));
    }

    warn!(target: "sa.store.http", status = %status, "Unexpected row API response");
    Err(PostStoreError::InvalidResponse(format!(
        "row API returned {status}"
    )))
}

fn transport_error(e: reqwest::Error) -> PostStoreError {
    warn!(target: "sa.store.http", error = %e, "Row API request failed");
    PostStoreError::Unavailable(format!("row API request failed: {e}"))
}
