//! Profile store backed by the hosted row REST API.
//!
//! Profiles live in one table keyed by the subject id. The six gallery
//! photos are flat `photo1_url`..`photo6_url` columns and map onto
//! [`PhotoGallery`] slots in order.

use super::{build_client, normalize_base_url, API_KEY_HEADER};
use crate::errors::ProfileStoreError;
use crate::store::ProfileStore;
use common::profile::{PhotoGallery, Profile, ProfileUpdate, PHOTO_SLOTS};
use common::secret::{ExposeSecret, SecretString};
use common::types::{Session, SubjectId};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Media type asking the row API for a single object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// One row of the profiles table.
#[derive(Debug, Deserialize)]
pub(super) struct ProfileRow {
    id: String,
    username: Option<String>,
    full_name: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
    photo1_url: Option<String>,
    photo2_url: Option<String>,
    photo3_url: Option<String>,
    photo4_url: Option<String>,
    photo5_url: Option<String>,
    photo6_url: Option<String>,
}

impl ProfileRow {
    pub(super) fn into_profile(self) -> Result<Profile, ProfileStoreError> {
        let id = SubjectId::new(self.id)
            .map_err(|e| ProfileStoreError::InvalidResponse(e.to_string()))?;

        Ok(Profile {
            id,
            username: self.username,
            full_name: self.full_name,
            bio: self.bio,
            avatar_url: self.avatar_url,
            gallery: PhotoGallery::from_slots([
                self.photo1_url,
                self.photo2_url,
                self.photo3_url,
                self.photo4_url,
                self.photo5_url,
                self.photo6_url,
            ]),
        })
    }
}

/// PATCH body. Absent fields are omitted; a present gallery writes all
/// six columns, with `null` for empty slots.
#[derive(Debug, Default, Serialize)]
struct ProfilePatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bio: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo1_url: Option<Option<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo2_url: Option<Option<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo3_url: Option<Option<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo4_url: Option<Option<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo5_url: Option<Option<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo6_url: Option<Option<&'a str>>,
}

impl<'a> ProfilePatch<'a> {
    fn from_update(update: &'a ProfileUpdate) -> Self {
        let mut patch = Self {
            username: update.username.as_deref(),
            bio: update.bio.as_deref(),
            avatar_url: update.avatar_url.as_deref(),
            ..Self::default()
        };

        if let Some(gallery) = &update.gallery {
            let mut photos: [Option<&str>; PHOTO_SLOTS] = [None; PHOTO_SLOTS];
            for (slot, reference) in gallery.iter() {
                if let Some(entry) = photos.get_mut(slot.index()) {
                    *entry = reference;
                }
            }
            let [p1, p2, p3, p4, p5, p6] = photos;
            patch.photo1_url = Some(p1);
            patch.photo2_url = Some(p2);
            patch.photo3_url = Some(p3);
            patch.photo4_url = Some(p4);
            patch.photo5_url = Some(p5);
            patch.photo6_url = Some(p6);
        }

        patch
    }
}

/// HTTP client for the profiles table.
pub struct HttpProfileStore {
    client: Client,
    base_url: String,
    anon_key: SecretString,
    table: String,
}

impl std::fmt::Debug for HttpProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProfileStore")
            .field("base_url", &self.base_url)
            .field("table", &self.table)
            .field("anon_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpProfileStore {
    /// Create a new store client for `table`.
    ///
    /// # Errors
    ///
    /// Returns `ProfileStoreError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        anon_key: SecretString,
        table: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProfileStoreError> {
        let client = build_client(timeout).map_err(|e| {
            warn!(target: "sa.store.http", error = %e, "Failed to build HTTP client");
            ProfileStoreError::Configuration(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            anon_key,
            table: table.into(),
        })
    }

    fn row_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    /// Attach key, bearer token and the single-row filter.
    fn scoped(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        request
            .query(&[
                ("id", format!("eq.{}", session.subject())),
                ("select", "*".to_string()),
            ])
            .header(API_KEY_HEADER, self.anon_key.expose_secret())
            .bearer_auth(session.access_token().expose_secret())
            .header("Accept", SINGLE_OBJECT)
    }

    async fn parse_row(
        subject: &SubjectId,
        response: reqwest::Response,
    ) -> Result<Profile, ProfileStoreError> {
        let status = response.status();

        if status == StatusCode::NOT_ACCEPTABLE || status == StatusCode::NOT_FOUND {
            // No row (or more than one) matched the filter.
            return Err(ProfileStoreError::NotFound(subject.to_string()));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProfileStoreError::Unauthorized(format!(
                "row API returned {status}"
            )));
        }
        if status.is_server_error() {
            warn!(target: "sa.store.http", status = %status, "Row API returned server error");
            return Err(ProfileStoreError::Unavailable(format!(
                "row API returned {status}"
            )));
        }
        if !status.is_success() {
            warn!(target: "sa.store.http", status = %status, "Unexpected row API response");
            return Err(ProfileStoreError::InvalidResponse(format!(
                "row API returned {status}"
            )));
        }

        let body = response.text().await.map_err(|e| {
            ProfileStoreError::Unavailable(format!("failed to read row API response: {e}"))
        })?;
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Err(ProfileStoreError::NotFound(subject.to_string()));
        }

        let row: ProfileRow = serde_json::from_str(trimmed).map_err(|e| {
            warn!(target: "sa.store.http", error = %e, "Failed to parse profile row");
            ProfileStoreError::InvalidResponse(format!("profile row: {e}"))
        })?;
        row.into_profile()
    }
}

#[async_trait::async_trait]
impl ProfileStore for HttpProfileStore {
    #[instrument(skip_all, fields(subject = %session.subject()))]
    async fn fetch_profile(&self, session: &Session) -> Result<Profile, ProfileStoreError> {
        let request = self.scoped(self.client.get(self.row_url()), session);
        let response = request.send().await.map_err(transport_error)?;

        let profile = Self::parse_row(session.subject(), response).await?;
        debug!(target: "sa.store.http", subject = %profile.id, "Fetched profile row");
        Ok(profile)
    }

    #[instrument(skip_all, fields(subject = %session.subject()))]
    async fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> Result<Profile, ProfileStoreError> {
        if update.is_empty() {
            return Err(ProfileStoreError::EmptyUpdate);
        }

        let patch = ProfilePatch::from_update(update);
        let request = self
            .scoped(self.client.patch(self.row_url()), session)
            .header("Prefer", "return=representation")
            .json(&patch);
        let response = request.send().await.map_err(transport_error)?;

        let profile = Self::parse_row(session.subject(), response).await?;
        debug!(target: "sa.store.http", subject = %profile.id, "Updated profile row");
        Ok(profile)
    }
}

fn transport_error(e: reqwest::Error) -> ProfileStoreError {
    warn!(target: "sa.store.http", error = %e, "Row API request failed");
    ProfileStoreError::Unavailable(format!("row API request failed: {e}"))
}
