// Forbid unwrap() in production code to prevent panics on bad input.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::net::SocketAddr;
use std::sync::Arc;

use identity::assertion::{AssertionVerifier, UpstreamProvider};
use identity::config::ServerConfig;
use identity::invite::InviteService;
use identity::keys::open_key_store;
use identity::login::LoginService;
use identity::notify::LoggingNotifier;
use identity::registration::RegistrationService;
use identity::routes::{AppState, create_router};
use identity::session::SessionService;
use identity::storage::InMemoryStore;
use identity::time::{SystemTimeSource, TimeSource};
use identity::token::TokenCodec;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identity=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: issuer={}, audience={}, listen_port={}",
        config.issuer,
        config.audience,
        config.listen_port
    );

    let keys = match open_key_store(&config.key_source).await {
        Ok(keys) => keys,
        Err(e) => {
            tracing::error!("Failed to open key store: {e}");
            std::process::exit(1);
        }
    };
    if keys.signing_key().is_none() {
        tracing::warn!("key store has no private key; sessions cannot be issued");
    }

    let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(LoggingNotifier);

    let mut providers = Vec::new();
    if let Some(upstream) = &config.upstream {
        match open_key_store(&upstream.keys).await {
            Ok(upstream_keys) => {
                let provider = UpstreamProvider::new(upstream, upstream_keys);
                tracing::info!(
                    "Trusting ID tokens from {} (provider={})",
                    upstream.issuer,
                    provider.name()
                );
                providers.push(provider);
            }
            Err(e) => {
                tracing::error!("Failed to open upstream key store: {e}");
                std::process::exit(1);
            }
        }
    }
    let assertions = Arc::new(AssertionVerifier::new(
        providers,
        clock.clone(),
        config.session.clock_skew,
    ));
    if assertions.is_empty() {
        tracing::warn!("no upstream provider configured; login and registration are disabled");
    }

    let codec = Arc::new(
        TokenCodec::new(
            keys.clone(),
            clock.clone(),
            config.issuer.clone(),
            config.audience.clone(),
        )
        .with_clock_skew(config.session.clock_skew),
    );
    let sessions = Arc::new(SessionService::new(
        codec,
        store.clone(),
        config.session.clone(),
    ));
    let invites = Arc::new(InviteService::new(
        store.clone(),
        notifier,
        clock.clone(),
        config.invite.clone(),
    ));
    let logins = Arc::new(LoginService::new(
        assertions,
        store.clone(),
        store.clone(),
        sessions.clone(),
        clock.clone(),
    ));
    let registrations = Arc::new(RegistrationService::new(
        invites.clone(),
        store,
        logins.clone(),
        sessions.clone(),
        clock,
    ));

    if let Some(email) = &config.bootstrap_email {
        let tenant_id = config.bootstrap_tenant.unwrap_or_default();
        match invites.send_bootstrap_invite(tenant_id, email).await {
            Ok(sent) => tracing::info!(
                invite_id = %sent.invite.invite_id,
                %tenant_id,
                "bootstrap invite sent"
            ),
            Err(e) => {
                tracing::error!("Failed to send bootstrap invite: {e}");
                std::process::exit(1);
            }
        }
    }

    let app = create_router(AppState {
        keys,
        sessions,
        invites,
        logins,
        registrations,
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind: {e}");
            std::process::exit(1);
        });

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    });
}

