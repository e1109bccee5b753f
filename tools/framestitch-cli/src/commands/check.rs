//! Check that the host can run exports.

use framestitch_common::config::AppConfig;
use framestitch_encoder::{EncoderBackend, FfmpegEncoder};
use framestitch_session::LocalFrameStorage;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Framestitch System Check");
    println!("{}", "=".repeat(50));

    let encoder = FfmpegEncoder::new(config.encoder.clone());
    let encoder_ok = encoder.is_available();
    if encoder_ok {
        println!("[OK] Encoder: {} ({})", encoder.program(), encoder.name());
    } else {
        println!("[MISSING] Encoder: {} not found on PATH", encoder.program());
        println!("     Install ffmpeg or set encoder.program in the config file");
    }
    println!(
        "     {} fps, codec {}, pixel format {}",
        config.encoder.fps, config.encoder.codec, config.encoder.pixel_format
    );

    let storage = LocalFrameStorage::new(&config.output_dir, &config.encoder.frame_extension);
    let output_ok = match storage.ensure_root().await {
        Ok(()) => {
            let probe = storage.root().join(".framestitch-probe");
            let writable = tokio::fs::write(&probe, b"").await.is_ok();
            let _ = tokio::fs::remove_file(&probe).await;
            writable
        }
        Err(_) => false,
    };
    if output_ok {
        println!("[OK] Output directory: {}", storage.root().display());
    } else {
        println!(
            "[MISSING] Output directory not writable: {}",
            storage.root().display()
        );
    }

    println!("[OK] Bind address: {}", config.server.bind);
    println!(
        "     Sessions expire after {}s, artifacts kept {}s",
        config.session.grace_period_secs, config.session.artifact_retention_secs
    );

    println!();
    if encoder_ok && output_ok {
        println!("All required capabilities are available. Framestitch is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
