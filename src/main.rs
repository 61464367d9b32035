use anyhow::Context;
use motion_relay::notify::{ChatNotifier, DiscordNotifier};
use motion_relay::startup::{send_restart_notification, RETRY_PAUSE};
use motion_relay::{router, serve, AppState, Config};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal outside development.
    let _ = dotenvy::dotenv();
    init_tracing()?;

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        camera = %config.motion.camera_name,
        cooldown_secs = config.motion.cooldown.as_secs(),
        trigger_method = ?config.motion.trigger.method,
        api_key_required = config.access.api_key.is_some(),
        expected_host = ?config.access.expected_host,
        "motion relay configured"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    let startup = config.startup.clone();
    let restart_channel = config.notify.discord_webhook.clone();
    tokio::spawn(async move {
        let notifier = restart_channel.map(DiscordNotifier::new);
        let outcome = send_restart_notification(
            &startup,
            notifier.as_ref().map(|n| n as &dyn ChatNotifier),
            RETRY_PAUSE,
        )
        .await;
        if outcome.sent {
            info!(reason = %outcome.reason, "startup notification sent");
        } else {
            warn!(reason = %outcome.reason, "startup notification not sent");
        }
    });

    let app = router(AppState::from_config(&config));
    serve(listener, app).await.context("HTTP server error")?;
    Ok(())
}

/// `LOG_LEVEL` takes an `EnvFilter` directive; `LOG_FORMAT` is one of
/// `compact` (default), `json` or `pretty`.
fn init_tracing() -> anyhow::Result<()> {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
    let filter = EnvFilter::try_new(level.to_lowercase())
        .or_else(|_| EnvFilter::try_new("info"))?;
    let format = std::env::var("LOG_FORMAT").unwrap_or_default();

    let registry = tracing_subscriber::registry().with(filter);
    match format.as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_target(false))
            .init(),
        _ => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
    }
    Ok(())
}
