use crate::classifier_cell::LazyClassifier;
use crate::config::Config;
use crate::server::{HttpServer, SharedState};
use crate::telemetry::Metrics;

use pneumonia_inference::ClassifierHandle;
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    if let Err(e) = config.model.validate() {
        tracing::warn!("Model configuration looks incomplete: {}", e);
    }

    let metrics = match Metrics::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(e) => {
            tracing::error!("Failed to register metrics: {:?}", e);
            return Err(e.into());
        }
    };

    let model_config = config.model.clone();
    let saliency_config = config.saliency.clone();
    let classifier = Arc::new(LazyClassifier::new(move || {
        ClassifierHandle::load(&model_config, &saliency_config)
    }));

    let state = SharedState {
        classifier,
        metrics,
    };
    let server = HttpServer::new(state, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    if let Ok(Err(e)) = server_handle.await {
        tracing::error!("Server exited with an error: {:?}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
