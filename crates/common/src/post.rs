//! Move posts, likes and the people who liked them.

use crate::error::CommonError;
use crate::profile::Profile;
use crate::types::SubjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest caption accepted for a new post, in characters.
pub const MAX_CAPTION_CHARS: usize = 39;

/// Name shown for a post whose author has no username yet.
pub const DEFAULT_AUTHOR_NAME: &str = "New User";

/// Identity column of the posts table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity column of the likes table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LikeId(pub i64);

impl fmt::Display for LikeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A "move" in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    pub author_id: SubjectId,
    pub caption: Option<String>,
    pub category: Option<String>,
    /// Media reference for the category artwork.
    pub image: Option<String>,
    /// Author profile, when the query joined it.
    pub author: Option<Profile>,
}

impl Post {
    /// Author username, or [`DEFAULT_AUTHOR_NAME`].
    #[must_use]
    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .and_then(|author| author.username.as_deref())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_AUTHOR_NAME)
    }
}

/// Post about to be created. The author is the session subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub category: String,
    pub image: String,
    pub caption: String,
}

impl NewPost {
    #[must_use]
    pub fn new(category: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            image: image.into(),
            caption: String::new(),
        }
    }

    #[must_use]
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    /// Check the post before it is written.
    ///
    /// # Errors
    ///
    /// Returns `CommonError::InvalidPost` if no category is chosen or the
    /// caption is longer than [`MAX_CAPTION_CHARS`].
    pub fn validate(&self) -> Result<(), CommonError> {
        if self.category.trim().is_empty() {
            return Err(CommonError::InvalidPost("a category is required".to_string()));
        }
        let caption_chars = self.caption.chars().count();
        if caption_chars > MAX_CAPTION_CHARS {
            return Err(CommonError::InvalidPost(format!(
                "caption is {caption_chars} characters, limit is {MAX_CAPTION_CHARS}"
            )));
        }
        Ok(())
    }
}

/// One user's like on one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub id: LikeId,
    pub user_id: SubjectId,
    pub post_id: PostId,
}

/// Someone who liked one of the signed-in user's posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub id: SubjectId,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}
