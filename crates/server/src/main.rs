//! Voice gateway entry point
//!
//! Startup order: settings, tracing, credential validation, prompt cache,
//! interaction store, call-control connection, then the event dispatch loop
//! until an interrupt arrives.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_gateway_ari::AriClient;
use voice_gateway_config::{load_settings, Settings};
use voice_gateway_media::{PromptCache, RecordingWriter};
use voice_gateway_persistence::{
    InMemoryInteractionStore, InteractionStore, ScyllaConfig,
};
use voice_gateway_session::{dispatch_event, SessionContext, SessionRegistry};
use voice_gateway_speech::{AzureRecognizer, AzureSynthesizer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("VOICE_GATEWAY_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized; use stderr for early failures.
            eprintln!("warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);

    tracing::info!("starting voice gateway v{}", env!("CARGO_PKG_VERSION"));

    // Missing credentials are fatal before anything connects.
    if let Err(e) = settings.validate() {
        tracing::error!(error = %e, "configuration invalid");
        return Err(e.into());
    }

    let prompt_cache = PromptCache::init().await?;

    let store: Arc<dyn InteractionStore> = if settings.persistence.enabled {
        let scylla_config = ScyllaConfig {
            hosts: settings.persistence.scylla_hosts.clone(),
            keyspace: settings.persistence.keyspace.clone(),
            replication_factor: settings.persistence.replication_factor,
        };
        match voice_gateway_persistence::init(scylla_config).await {
            Ok(store) => {
                tracing::info!(
                    hosts = ?settings.persistence.scylla_hosts,
                    keyspace = %settings.persistence.keyspace,
                    "interaction store ready"
                );
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!(error = %e, "persistence unavailable; falling back to in-memory");
                Arc::new(InMemoryInteractionStore::new())
            }
        }
    } else {
        tracing::info!("persistence disabled; interaction records stay in memory");
        Arc::new(InMemoryInteractionStore::new())
    };

    let ari = Arc::new(AriClient::new(settings.ari.clone()));
    ari.check_connection().await?;

    let ctx = SessionContext {
        control: ari.clone(),
        recognizer: Arc::new(AzureRecognizer::new(settings.azure.clone())),
        synthesizer: Arc::new(AzureSynthesizer::new(settings.azure.clone())),
        store,
        prompt_cache,
        recordings: RecordingWriter::default(),
        defaults: settings.clone(),
    };

    let mut events = voice_gateway_ari::connect_events(&settings.ari).await?;
    let registry = Arc::new(SessionRegistry::new());

    tracing::info!(app = %settings.ari.app_name, "ready for calls");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => dispatch_event(&registry, &ctx, event).await,
                None => {
                    tracing::error!("call-control event stream closed");
                    return Err("event stream closed".into());
                }
            },
            _ = shutdown_signal() => {
                tracing::info!(active_sessions = registry.count(), "shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM");
        }
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("voice_gateway={level},voice_gateway_session={level}").into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
