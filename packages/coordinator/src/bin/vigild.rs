//! Vigil daemon.
//!
//! One process: the alert watcher, the pipeline coordinator, the analyst
//! scheduler, the webhook server, and the in-process executor/verifier agent
//! endpoints.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_coordinator::{Config, VigilRuntime};
use vigil_executor::{Executor, ExecutorConfig};
use vigil_integrations::{webhook_routes, WebhookState};
use vigil_tools::ToolExecutor;
use vigil_verifier::{Verifier, VerifierConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let runtime = VigilRuntime::initialize(config)?;
    let config = runtime.config.clone();

    // First discovery sweep before anything routes messages.
    let discovered = runtime.directory.discover_all(None).await;
    tracing::info!(
        available = discovered.available.len(),
        unavailable = discovered.unavailable.len(),
        "agent discovery complete"
    );

    // In-process agent endpoints (executor + verifier).
    let executor = Arc::new(Executor::new(
        runtime.store.clone(),
        runtime.router.clone(),
        ExecutorConfig {
            approval_timeout_minutes: config.approval_timeout_minutes,
            ..ExecutorConfig::default()
        },
    ));
    let tools = Arc::new(ToolExecutor::new(
        runtime.store.clone(),
        config.tools_dir.clone(),
    ));
    let verifier = Arc::new(Verifier::new(
        runtime.store.clone(),
        tools,
        VerifierConfig {
            deadline_ms: config.verification_deadline_ms,
            stabilization_wait_seconds: config.stabilization_wait_seconds,
            health_score_threshold: config.health_score_threshold,
        },
    ));
    let agent_app = vigil_executor::http::routes(executor).merge(vigil_verifier::http::routes(verifier));
    let agent_addr = format!("0.0.0.0:{}", config.agent_port);
    let agent_listener = tokio::net::TcpListener::bind(&agent_addr).await?;
    tracing::info!(addr = %agent_addr, "agent endpoint server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(agent_listener, agent_app).await {
            tracing::error!(error = %e, "agent endpoint server exited");
        }
    });

    // Webhook server (GitHub events, Slack approval callbacks).
    let webhook_state = Arc::new(WebhookState::new(
        runtime.store.clone(),
        config.github_webhook_secret.clone(),
        config.slack_signing_secret.clone(),
    ));
    let webhook_addr = format!("0.0.0.0:{}", config.webhook_port);
    let webhook_listener = tokio::net::TcpListener::bind(&webhook_addr).await?;
    tracing::info!(addr = %webhook_addr, "webhook server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(webhook_listener, webhook_routes(webhook_state)).await {
            tracing::error!(error = %e, "webhook server exited");
        }
    });

    // Background loops.
    runtime.watcher.start();
    runtime.analyst.start();
    tracing::info!("vigild running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    runtime.shutdown();

    Ok(())
}
