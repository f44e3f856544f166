//! Session probe
//!
//! Runs the session authority against the hosted backend once and reports
//! what it sees. Useful for checking credentials and profile rows without
//! the mobile client.
//!
//! # Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Build the HTTP identity provider and profile store
//! 4. Spawn the `SessionAuthority` and wait for restoration
//! 5. Sign in with configured credentials if no session was restored
//! 6. Wait for the profile to settle and log the outcome
//! 7. Load the feed and matches as the signed-in user
//!
//! Exits non-zero if restoration, sign-in or the profile fetch does not
//! finish within `MOVES_READY_TIMEOUT_SECONDS`.

#![warn(clippy::pedantic)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use common::config::ObservabilityConfig;
use session_authority::config::Config;
use session_authority::http::posts::PostTables;
use session_authority::http::{HttpIdentityProvider, HttpPostStore, HttpProfileStore};
use session_authority::observability::AuthorityMetrics;
use session_authority::{
    AuthState, AuthorityError, Feed, ProfileState, SessionAuthority, SessionAuthorityHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    init_tracing(&config.observability);

    info!(
        backend_url = %config.backend_url,
        profiles_table = %config.profiles_table,
        avatar_bucket = %config.avatar_bucket,
        restored_tokens = config.access_token.is_some(),
        sign_in_configured = config.sign_in.is_some(),
        "Configuration loaded successfully"
    );

    let mut identity = HttpIdentityProvider::new(
        &config.backend_url,
        config.anon_key.clone(),
        config.http_timeout,
    )?;
    if let Some(access_token) = &config.access_token {
        identity =
            identity.with_persisted_tokens(access_token.clone(), config.refresh_token.clone());
    }
    let identity = Arc::new(identity);

    let store = Arc::new(HttpProfileStore::new(
        &config.backend_url,
        config.anon_key.clone(),
        config.profiles_table.clone(),
        config.http_timeout,
    )?);

    let posts = Arc::new(HttpPostStore::new(
        &config.backend_url,
        config.anon_key.clone(),
        PostTables {
            posts: config.posts_table.clone(),
            likes: config.likes_table.clone(),
            profiles: config.profiles_table.clone(),
        },
        config.http_timeout,
    )?);

    let metrics = AuthorityMetrics::new();
    let cancel_token = CancellationToken::new();
    let (authority, authority_task) = SessionAuthority::spawn(
        identity.clone(),
        store,
        Arc::clone(&metrics),
        cancel_token.clone(),
    );

    let outcome = probe(&config, &authority, &identity).await;
    if outcome.as_ref().is_ok_and(AuthState::is_authenticated) {
        let feed = Feed::new(authority.clone(), posts.clone(), posts);
        summarize_feed(&feed).await;
    }

    cancel_token.cancel();
    if let Err(e) = authority_task.await {
        warn!(error = %e, "Session authority task ended abnormally");
    }

    let state = outcome.inspect_err(|e| error!(error = %e, "Session probe failed"))?;
    report(&state);

    info!(snapshot = ?metrics.snapshot(), "Session probe complete");
    Ok(())
}

async fn probe(
    config: &Config,
    authority: &SessionAuthorityHandle,
    identity: &HttpIdentityProvider,
) -> anyhow::Result<AuthState> {
    let ready = within(
        config.ready_timeout,
        "session restoration",
        authority.wait_until_ready(),
    )
    .await?;

    if !ready.is_authenticated() {
        let Some(credentials) = &config.sign_in else {
            info!("No session restored and no sign-in credentials configured");
            return Ok(ready);
        };

        identity
            .sign_in_with_password(&credentials.email, &credentials.password)
            .await
            .context("sign-in failed")?;

        within(
            config.ready_timeout,
            "sign-in",
            authority.wait_for(AuthState::is_authenticated),
        )
        .await?;
    }

    within(
        config.ready_timeout,
        "profile fetch",
        authority.wait_for_profile_settled(),
    )
    .await
}

/// Log feed and match counts. Failures are reported, not fatal.
async fn summarize_feed(feed: &Feed) {
    match feed.posts().await {
        Ok(posts) => info!(posts = posts.len(), "Feed loaded"),
        Err(e) => warn!(error = %e, "Feed could not be loaded"),
    }
    match feed.matches().await {
        Ok(matches) => info!(matches = matches.len(), "Matches loaded"),
        Err(e) => warn!(error = %e, "Matches could not be loaded"),
    }
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if observability.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Await `wait` for at most `timeout`.
async fn within(
    timeout: Duration,
    stage: &str,
    wait: impl Future<Output = Result<AuthState, AuthorityError>>,
) -> anyhow::Result<AuthState> {
    match tokio::time::timeout(timeout, wait).await {
        Ok(state) => Ok(state?),
        Err(_) => bail!("timed out after {}s waiting for {stage}", timeout.as_secs()),
    }
}

fn report(state: &AuthState) {
    let Some(session) = state.session() else {
        info!("Signed out");
        return;
    };
    if session.is_expired_at(chrono::Utc::now()) {
        warn!(subject = %session.subject(), "Access token already expired");
    }

    match state.profile_state() {
        ProfileState::Loaded(profile) => info!(
            subject = %session.subject(),
            display_name = %profile.display_name(),
            photos = profile.gallery.filled(),
            "Profile loaded"
        ),
        ProfileState::FetchFailed(e) => warn!(
            subject = %session.subject(),
            error = %e,
            "Signed in but the profile could not be loaded"
        ),
        other => warn!(
            subject = %session.subject(),
            profile = other.as_str(),
            "Profile not settled"
        ),
    }
}
