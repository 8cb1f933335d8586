use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use feed_pipeline::{
    api::{create_router, AppState},
    channel::{StreamConsumer, StreamPublisher},
    config::Config,
    db::{
        connect_manager, create_pool, create_redis_client, PgCatalog, RedisFeedStore,
        RedisPreferenceStore,
    },
    services::{FeedGenerator, PreferenceAggregator},
    worker::{PipelineStats, StreamWorker},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let redis_client = create_redis_client(&config.redis_url)?;
    let manager = connect_manager(redis_client.clone()).await?;
    let pool = create_pool(&config.database_url).await?;

    let preferences = Arc::new(RedisPreferenceStore::new(manager.clone()));
    let feeds = Arc::new(RedisFeedStore::new(manager.clone()));
    let catalog = Arc::new(PgCatalog::new(pool, config.catalog_page_size));
    let triggers = Arc::new(StreamPublisher::new(manager, &config.feed_stream));
    let stats = Arc::new(PipelineStats::new());

    let aggregator = Arc::new(PreferenceAggregator::new(
        preferences.clone(),
        triggers,
        config.retry_policy(),
        config.recompute_threshold,
    ));
    let generator = Arc::new(FeedGenerator::new(
        preferences.clone(),
        catalog.clone(),
        feeds,
        config.retry_policy(),
        config.feed_settings(),
    ));

    let preference_consumer = StreamConsumer::connect(
        &redis_client,
        &config.preference_stream,
        &config.preference_group,
        &config.consumer_name,
    )
    .await?;
    let feed_consumer = StreamConsumer::connect(
        &redis_client,
        &config.feed_stream,
        &config.feed_group,
        &config.consumer_name,
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let aggregator_worker = StreamWorker::new(
        Arc::new(preference_consumer),
        aggregator,
        config.worker_settings(config.batch_size),
        stats.clone(),
    );
    // One trigger per invocation
    let feed_worker = StreamWorker::new(
        Arc::new(feed_consumer),
        generator,
        config.worker_settings(1),
        stats.clone(),
    );

    let workers = vec![
        tokio::spawn(aggregator_worker.run(shutdown_rx.clone())),
        tokio::spawn(feed_worker.run(shutdown_rx.clone())),
    ];

    let state = AppState::new(stats)
        .with_probe(preferences)
        .with_probe(catalog);
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(
        addr = %addr,
        consumer = %config.consumer_name,
        "Feed pipeline running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    for worker in workers {
        match worker.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Worker exited with error"),
            Err(e) => tracing::error!(error = %e, "Worker task panicked"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM, then tells the workers to stop
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining workers");
    let _ = shutdown_tx.send(true);
}
