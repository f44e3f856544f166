//! Session authority configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::config::ObservabilityConfig;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default profiles table name.
pub const DEFAULT_PROFILES_TABLE: &str = "profiles";

/// Default posts table name.
pub const DEFAULT_POSTS_TABLE: &str = "posts";

/// Default likes table name.
pub const DEFAULT_LIKES_TABLE: &str = "likes";

/// Default storage bucket for avatar images.
pub const DEFAULT_AVATAR_BUCKET: &str = "avatars";

/// Default per-request HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Default time the probe waits for restoration, in seconds.
pub const DEFAULT_READY_TIMEOUT_SECONDS: u64 = 30;

/// Email and password used to sign in when no session is restored.
#[derive(Clone)]
pub struct SignInCredentials {
    pub email: String,
    pub password: SecretString,
}

impl fmt::Debug for SignInCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInCredentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Session authority configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// Hosted backend base URL (http or https).
    pub backend_url: String,

    /// Project anonymous key sent as `apikey` on every request.
    /// Protected by `SecretString` to prevent accidental logging.
    pub anon_key: SecretString,

    /// Profiles table name (default: "profiles").
    pub profiles_table: String,

    /// Posts table name (default: "posts").
    pub posts_table: String,

    /// Likes table name (default: "likes").
    pub likes_table: String,

    /// Avatar storage bucket (default: "avatars").
    pub avatar_bucket: String,

    /// Per-request HTTP timeout (default: 10s).
    pub http_timeout: Duration,

    /// How long the probe waits for restoration (default: 30s).
    pub ready_timeout: Duration,

    /// Access token persisted from an earlier run.
    pub access_token: Option<SecretString>,

    /// Refresh token persisted from an earlier run.
    pub refresh_token: Option<SecretString>,

    /// Sign-in credentials, when both email and password are set.
    pub sign_in: Option<SignInCredentials>,

    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("backend_url", &self.backend_url)
            .field("anon_key", &"[REDACTED]")
            .field("profiles_table", &self.profiles_table)
            .field("posts_table", &self.posts_table)
            .field("likes_table", &self.likes_table)
            .field("avatar_bucket", &self.avatar_bucket)
            .field("http_timeout", &self.http_timeout)
            .field("ready_timeout", &self.ready_timeout)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sign_in", &self.sign_in)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingEnvVar` if a required variable is absent
    /// - `ConfigError::InvalidValue` if the URL or a timeout does not parse
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let backend_url = required(vars, "MOVES_BACKEND_URL")?;
        if !(backend_url.starts_with("http://") || backend_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(format!(
                "MOVES_BACKEND_URL must start with http:// or https://, got {backend_url}"
            )));
        }

        let anon_key = SecretString::from(required(vars, "MOVES_BACKEND_ANON_KEY")?);

        let profiles_table = vars
            .get("MOVES_PROFILES_TABLE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PROFILES_TABLE.to_string());

        let posts_table = vars
            .get("MOVES_POSTS_TABLE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_POSTS_TABLE.to_string());

        let likes_table = vars
            .get("MOVES_LIKES_TABLE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LIKES_TABLE.to_string());

        let avatar_bucket = vars
            .get("MOVES_AVATAR_BUCKET")
            .cloned()
            .unwrap_or_else(|| DEFAULT_AVATAR_BUCKET.to_string());

        let http_timeout = seconds(
            vars,
            "MOVES_HTTP_TIMEOUT_SECONDS",
            DEFAULT_HTTP_TIMEOUT_SECONDS,
        )?;
        let ready_timeout = seconds(
            vars,
            "MOVES_READY_TIMEOUT_SECONDS",
            DEFAULT_READY_TIMEOUT_SECONDS,
        )?;

        let access_token = optional(vars, "MOVES_ACCESS_TOKEN").map(SecretString::from);
        let refresh_token = optional(vars, "MOVES_REFRESH_TOKEN").map(SecretString::from);

        let sign_in = match (
            optional(vars, "MOVES_SIGN_IN_EMAIL"),
            optional(vars, "MOVES_SIGN_IN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(SignInCredentials {
                email,
                password: SecretString::from(password),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvVar(
                    "MOVES_SIGN_IN_PASSWORD".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnvVar(
                    "MOVES_SIGN_IN_EMAIL".to_string(),
                ))
            }
        };

        Ok(Config {
            backend_url,
            anon_key,
            profiles_table,
            posts_table,
            likes_table,
            avatar_bucket,
            http_timeout,
            ready_timeout,
            access_token,
            refresh_token,
            sign_in,
            observability: ObservabilityConfig::from_vars(vars),
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    optional(vars, name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Non-blank value of `name`.
fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name).filter(|v| !v.trim().is_empty()).cloned()
}

fn seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = vars.get(name) else {
        return Ok(Duration::from_secs(default));
    };

    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue(format!(
            "{name} must be a positive number of seconds, got {raw}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "MOVES_BACKEND_URL".to_string(),
                "https://project.example.co".to_string(),
            ),
            (
                "MOVES_BACKEND_ANON_KEY".to_string(),
                "anon-key-123456".to_string(),
            ),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.backend_url, "https://project.example.co");
        assert_eq!(config.anon_key.expose_secret(), "anon-key-123456");
        assert_eq!(config.profiles_table, DEFAULT_PROFILES_TABLE);
        assert_eq!(config.posts_table, DEFAULT_POSTS_TABLE);
        assert_eq!(config.likes_table, DEFAULT_LIKES_TABLE);
        assert_eq!(config.avatar_bucket, DEFAULT_AVATAR_BUCKET);
        assert_eq!(
            config.http_timeout,
            Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS)
        );
        assert_eq!(
            config.ready_timeout,
            Duration::from_secs(DEFAULT_READY_TIMEOUT_SECONDS)
        );
        assert!(config.access_token.is_none());
        assert!(config.refresh_token.is_none());
        assert!(config.sign_in.is_none());
        assert_eq!(config.observability, ObservabilityConfig::default());
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("MOVES_PROFILES_TABLE".to_string(), "members".to_string());
        vars.insert("MOVES_POSTS_TABLE".to_string(), "moves".to_string());
        vars.insert("MOVES_LIKES_TABLE".to_string(), "hearts".to_string());
        vars.insert("MOVES_AVATAR_BUCKET".to_string(), "faces".to_string());
        vars.insert("MOVES_HTTP_TIMEOUT_SECONDS".to_string(), "3".to_string());
        vars.insert("MOVES_READY_TIMEOUT_SECONDS".to_string(), "60".to_string());
        vars.insert("MOVES_ACCESS_TOKEN".to_string(), "access".to_string());
        vars.insert("MOVES_REFRESH_TOKEN".to_string(), "refresh".to_string());
        vars.insert(
            "MOVES_SIGN_IN_EMAIL".to_string(),
            "a@example.com".to_string(),
        );
        vars.insert("MOVES_SIGN_IN_PASSWORD".to_string(), "pw".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.profiles_table, "members");
        assert_eq!(config.posts_table, "moves");
        assert_eq!(config.likes_table, "hearts");
        assert_eq!(config.avatar_bucket, "faces");
        assert_eq!(config.http_timeout, Duration::from_secs(3));
        assert_eq!(config.ready_timeout, Duration::from_secs(60));
        assert_eq!(config.access_token.unwrap().expose_secret(), "access");
        assert_eq!(config.refresh_token.unwrap().expose_secret(), "refresh");
        let sign_in = config.sign_in.unwrap();
        assert_eq!(sign_in.email, "a@example.com");
        assert_eq!(sign_in.password.expose_secret(), "pw");
    }

    #[test]
    fn test_from_vars_missing_backend_url() {
        let mut vars = base_vars();
        vars.remove("MOVES_BACKEND_URL");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "MOVES_BACKEND_URL"));
    }

    #[test]
    fn test_from_vars_blank_anon_key_is_missing() {
        let mut vars = base_vars();
        vars.insert("MOVES_BACKEND_ANON_KEY".to_string(), "  ".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "MOVES_BACKEND_ANON_KEY")
        );
    }

    #[test]
    fn test_from_vars_rejects_non_http_url() {
        let mut vars = base_vars();
        vars.insert(
            "MOVES_BACKEND_URL".to_string(),
            "ftp://project.example.co".to_string(),
        );

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_bad_timeouts() {
        for bad in ["0", "-1", "ten"] {
            let mut vars = base_vars();
            vars.insert("MOVES_HTTP_TIMEOUT_SECONDS".to_string(), bad.to_string());

            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::InvalidValue(_))),
                "timeout {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_vars_partial_credentials() {
        let mut vars = base_vars();
        vars.insert(
            "MOVES_SIGN_IN_EMAIL".to_string(),
            "a@example.com".to_string(),
        );

        let result = Config::from_vars(&vars);
        assert_eq!(
            result.unwrap_err(),
            ConfigError::MissingEnvVar("MOVES_SIGN_IN_PASSWORD".to_string())
        );
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let mut vars = base_vars();
        vars.insert("MOVES_ACCESS_TOKEN".to_string(), "access-secret".to_string());
        vars.insert(
            "MOVES_SIGN_IN_EMAIL".to_string(),
            "a@example.com".to_string(),
        );
        vars.insert("MOVES_SIGN_IN_PASSWORD".to_string(), "hunter2".to_string());
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("anon-key-123456"));
        assert!(!debug_output.contains("access-secret"));
        assert!(!debug_output.contains("hunter2"));
        assert!(debug_output.contains("a@example.com"));
    }
}
