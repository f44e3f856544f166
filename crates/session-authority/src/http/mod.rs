//! HTTP adapters for the hosted backend.
//!
//! The backend exposes an auth REST API under `/auth/v1`, a row REST API
//! under `/rest/v1` and public storage under `/storage/v1`. Every request
//! carries the project's anonymous key in the `apikey` header; user calls
//! add the session's access token as a bearer token.

pub mod identity;
pub mod posts;
pub mod profiles;

pub use identity::HttpIdentityProvider;
pub use posts::HttpPostStore;
pub use profiles::HttpProfileStore;

use reqwest::Client;
use std::time::Duration;

/// Connect timeout applied to every backend client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Header carrying the project's anonymous key.
pub(crate) const API_KEY_HEADER: &str = "apikey";

/// Build the shared HTTP client with the configured request timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
}

/// Strip trailing slashes so paths can be appended with `format!`.
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Public URL of an object in a storage bucket.
///
/// `path` values that are already absolute URLs are returned unchanged,
/// since older rows store full links instead of bucket paths.
#[must_use]
pub fn public_object_url(base_url: &str, bucket: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }

    format!(
        "{}/storage/v1/object/public/{}/{}",
        normalize_base_url(base_url),
        bucket.trim_matches('/'),
        path.trim_start_matches('/')
    )
}
