//! Racing-AI
//!
//! Self-healing race prediction engine over a synthetic race meeting, with a
//! REST API, scheduled bulletins and a CLI.

mod boosting;
mod bookmaker;
mod bulletin;
mod cli;
mod config;
mod encoder;
mod feature_builder;
mod meeting;
mod model;
mod pools;
mod race_card;
mod routes;
mod scheduler;
mod simulator;
mod types;

use anyhow::Context;
use axum::{routing::get, routing::post, Router};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bulletin::{LogNotifier, Notifier};
use crate::cli::{Cli, Commands};
use crate::meeting::Meeting;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so JSON output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "racing_ai=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, seed } => run_server(host, port, seed).await,
        Commands::Predict { date, format, seed } => cli::run_predict(date, format, seed),
        Commands::Simulate {
            days,
            start,
            format,
            seed,
        } => cli::run_simulate(days, start, format, seed),
    }
}

/// Run the API server alongside the bulletin scheduler.
async fn run_server(host: Option<String>, port: Option<u16>, seed: Option<u64>) -> anyhow::Result<()> {
    let mut config = cli::load_config(seed)?;

    // Override with CLI args
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }

    tracing::info!("Configuration loaded");
    match config.simulation.seed {
        Some(seed) => tracing::info!("Simulation seed: {}", seed),
        None => tracing::info!("Simulation seed: entropy"),
    }

    let meeting = Meeting::new(&config)?.shared();
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let jobs = scheduler::spawn(meeting.clone(), notifier.clone(), &config.schedule)?;
    tracing::info!("Started {} scheduled jobs", jobs.len());

    // Create application state
    let state = Arc::new(AppState { meeting, notifier });

    // Build router
    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/model/health", get(routes::model_health))
        .route("/predict", post(routes::predict))
        .route("/results", post(routes::results))
        .route("/races", get(routes::races))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .with_context(|| format!("Invalid host: {}", config.server.host))?,
        config.server.port,
    );
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    for job in jobs {
        job.abort();
    }

    Ok(())
}
