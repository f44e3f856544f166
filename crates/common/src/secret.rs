//! Secret types for protecting credentials from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for every access token, refresh
//! token, API key and password handled by the session core.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` over a secret (such as `Session`) is safe to log with
//! `{:?}` or as a tracing field. The value is zeroized on drop.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct SignIn {
//!     email: String,
//!     password: SecretString,
//! }
//!
//! let req = SignIn {
//!     email: "sam@example.com".to_string(),
//!     password: SecretString::from("hunter2"),
//! };
//! assert!(!format!("{req:?}").contains("hunter2"));
//! assert_eq!(req.password.expose_secret(), "hunter2");
//! ```
//!
//! With the `serde` feature, secrets deserialize directly from JSON token
//! responses:
//!
//! ```rust
//! use serde::Deserialize;
//! use common::secret::SecretString;
//!
//! #[derive(Debug, Deserialize)]
//! struct TokenGrant {
//!     access_token: SecretString,
//!     expires_in: u64,
//! }
//!
//! let json = r#"{"access_token": "eyJhbGci", "expires_in": 3600}"#;
//! let grant: TokenGrant = serde_json::from_str(json).unwrap();
//! assert!(!format!("{grant:?}").contains("eyJhbGci"));
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("anon-key-123");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("anon-key-123"));
    }

    #[test]
    fn test_deserialize_token_grant() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct Grant {
            access_token: SecretString,
            refresh_token: SecretString,
        }

        let json = r#"{"access_token": "at-value", "refresh_token": "rt-value"}"#;
        let grant: Grant = serde_json::from_str(json).expect("deserialize");

        assert_eq!(grant.access_token.expose_secret(), "at-value");
        let debug = format!("{grant:?}");
        assert!(!debug.contains("at-value"));
        assert!(!debug.contains("rt-value"));
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
