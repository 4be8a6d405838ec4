mod audit;
mod bootstrap;
mod health;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use dokan_agent::FollowupSweeper;
use dokan_core::config::{AppConfig, LoadOptions};
use dokan_messenger::MessageIntake;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

fn init_logging(config: &AppConfig) {
    use dokan_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the config, so nothing may log before this point.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let router = health::router(app.db_pool.clone(), app.intake.clone()).merge(
        webhook::router(webhook::WebhookState::new(app.intake.clone(), app.sweeper.clone())),
    );
    let sweep_every = app.config.conversation.followup_sweep_interval();
    let ticker = spawn_followup_ticker(app.sweeper.clone(), sweep_every);

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "dokan-server listening"
    );
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    ticker.abort();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let pending = drain_turns(&app.intake, grace).await;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        pending_conversations = pending,
        "dokan-server stopping"
    );
    app.db_pool.close().await;

    Ok(())
}

fn spawn_followup_ticker(sweeper: Arc<FollowupSweeper>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(error) = sweeper.sweep(Utc::now()).await {
                tracing::warn!(
                    event_name = "followup.sweep.failed",
                    correlation_id = "followup-ticker",
                    error = %error,
                    "scheduled follow-up sweep failed"
                );
            }
        }
    })
}

/// Waits for buffered and in-flight turns to finish, up to `grace`. Returns how many
/// conversations were still active when waiting stopped.
async fn drain_turns(intake: &MessageIntake, grace: Duration) -> usize {
    let deadline = Instant::now() + grace;
    loop {
        let active = intake.coalescer().active_conversations();
        if active == 0 || Instant::now() >= deadline {
            return active;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_failed",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}
