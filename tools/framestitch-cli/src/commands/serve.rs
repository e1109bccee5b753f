//! Serve the export API until interrupted.

use std::sync::Arc;

use anyhow::Context;
use framestitch_common::config::AppConfig;
use framestitch_encoder::FfmpegEncoder;
use framestitch_server::ExportServer;
use framestitch_session::{ExportOrchestrator, LocalFrameStorage, OrchestratorSettings};

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let storage = LocalFrameStorage::new(&config.output_dir, &config.encoder.frame_extension);
    storage.ensure_root().await.with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let orchestrator = ExportOrchestrator::new(
        Arc::new(storage),
        Arc::new(FfmpegEncoder::new(config.encoder.clone())),
        OrchestratorSettings::from_config(&config),
    );
    let encoder = orchestrator.encoder();
    if !encoder.is_available() {
        tracing::warn!(
            backend = encoder.name(),
            program = %config.encoder.program,
            "Encoder not found on PATH; finish requests will fail until it is installed"
        );
    }
    tracing::info!(
        fps = orchestrator.settings().fps,
        grace_secs = orchestrator.settings().grace_period.as_secs(),
        retention_secs = orchestrator.settings().artifact_retention.as_secs(),
        "Export pipeline ready"
    );

    let server = ExportServer::start(&config.server, &config.output_dir, orchestrator).await?;

    println!("Framestitch listening on {}", server.base_url());
    println!("Output directory: {}", config.output_dir.display());
    println!("Press Ctrl+C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    tracing::info!("Shutting down");
    server.shutdown().await;
    Ok(())
}
