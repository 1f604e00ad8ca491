use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vtb_core::{
    actions::{ActionContext, BotSettings, Dispatcher},
    analytics::LogAnalyticsSink,
    config::Config,
    health::HttpHealthProbe,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    payment::ProviderTokenPayment,
    ports::StatStore,
    store::MemoryStore,
    uptime::UptimeDaemon,
};
use vtb_openai::WhisperConverter;
use vtb_telegram::{
    server::{BotServer, WebhookRoute},
    TelegramMessenger,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    vtb_core::logging::init("vtb")?;
    info!(version = %cfg.app_version, "starting voice-to-text bot");

    let telegram = Arc::new(TelegramMessenger::new(
        &cfg.telegram_bot_token,
        cfg.api_timeout,
        cfg.telegram_message_limit,
    )?);
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        telegram.clone(),
        ThrottleConfig::default(),
    ));

    let mut settings = BotSettings::from_config(&cfg);
    if settings.bot_name.is_none() {
        match telegram.bot_username().await {
            Ok(name) => settings.bot_name = Some(name),
            Err(err) => warn!("unable to resolve bot username: {err}"),
        }
    }

    let api_key = cfg
        .openai_api_key
        .clone()
        .context("OPENAI_API_KEY environment variable is required")?;
    let converter = Arc::new(WhisperConverter::new(api_key, cfg.api_timeout)?);
    let store: Arc<dyn StatStore> = Arc::new(MemoryStore::new());
    let payment = Arc::new(ProviderTokenPayment::new(cfg.payment_provider_token.clone()));

    let ctx = Arc::new(ActionContext::new(messenger, store.clone(), settings));
    let dispatcher = Arc::new(Dispatcher::new(
        ctx,
        converter,
        payment,
        Arc::new(LogAnalyticsSink),
    ));

    let route = WebhookRoute::new(&cfg.self_url, &cfg.webhook_path, &cfg.telegram_bot_token);
    let server = Arc::new(BotServer::new(
        dispatcher,
        telegram.clone(),
        route,
        &cfg.app_version,
    ));

    let listener = TcpListener::bind(("0.0.0.0", cfg.app_port))
        .await
        .with_context(|| format!("failed to bind port {}", cfg.app_port))?;
    let shutdown = CancellationToken::new();
    let serving = {
        let server = server.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.serve(listener, shutdown).await })
    };

    let daemon = UptimeDaemon::new(
        cfg.self_url.clone(),
        cfg.app_version.clone(),
        cfg.daemon_tick,
        Arc::new(HttpHealthProbe::new(cfg.api_timeout)?),
        store.clone(),
    );

    if cfg.self_url.is_empty() {
        warn!("SELF_URL is not set, the webhook is not registered");
    } else {
        server.apply_host_location(&cfg.self_url).await?;
        if let Err(err) = store
            .update_node_state(&cfg.self_url, true, &cfg.app_version)
            .await
        {
            error!("unable to update node state: {err}");
        }
        if cfg.next_replica_url.is_empty() {
            info!("NEXT_REPLICA_URL is not set, the uptime daemon is disabled");
        } else {
            daemon
                .start(&cfg.next_replica_url, cfg.lifecycle_interval_days)
                .await?;
        }
    }

    shutdown_signal().await;
    warn!("shutting down");

    if daemon.is_running().await {
        daemon.stop().await;
    }
    shutdown.cancel();
    match serving.await {
        Ok(result) => result?,
        Err(err) => error!("server task failed: {err}"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("unable to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => error!("unable to listen for SIGTERM: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
