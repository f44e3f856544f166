//! Pre-configured test data.

use common::profile::Profile;
use common::secret::SecretString;
use common::types::{Session, SubjectId};

/// Subject id from a literal. Panics on blank input.
pub fn subject(id: &str) -> SubjectId {
    SubjectId::new(id).expect("fixture subject must not be blank")
}

/// Session for `id` with a token derived from the id.
pub fn session(id: &str) -> Session {
    session_with_token(id, &format!("access-{id}"))
}

/// Session for `id` with an explicit access token.
pub fn session_with_token(id: &str, token: &str) -> Session {
    Session::new(subject(id), SecretString::from(token.to_string()))
        .with_refresh_token(SecretString::from(format!("refresh-{id}")))
}

/// Profile for `id` with username and full name filled in.
pub fn profile(id: &str) -> Profile {
    let mut profile = Profile::new(subject(id));
    profile.username = Some(format!("{id}-name"));
    profile.full_name = Some(format!("User {id}"));
    profile
}
