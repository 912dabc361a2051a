use anyhow::Result;
use miru_core::{CycleReport, FrameInput};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod turnstile;

/// One line of daemon output.
#[derive(Serialize)]
struct CycleEvent<'a> {
    timestamp: chrono::DateTime<chrono::Utc>,
    cycle: u64,
    #[serde(flatten)]
    report: &'a CycleReport,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries cycle events; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("mirud starting");

    let config = config::Config::from_env()?;
    tracing::info!(
        face_match_threshold = config.tracker.face_match_threshold,
        equipment_match_threshold = config.tracker.equipment_match_threshold,
        age_limit = config.tracker.age_limit,
        sample_size = config.tracker.sample_size,
        selection = ?config.tracker.selection,
        min_equipment_confidence = config.min_equipment_confidence,
        "config loaded"
    );

    let engine = engine::spawn_engine(&config)?;
    tracing::info!("mirud ready, reading frames from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut cycle = 0u64;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            res = &mut shutdown => {
                res?;
                tracing::info!("interrupt received");
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            tracing::info!("input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let frame: FrameInput = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed frame");
                continue;
            }
        };

        let report = engine.process(frame).await?;
        cycle += 1;

        let mut out = serde_json::to_vec(&CycleEvent {
            timestamp: chrono::Utc::now(),
            cycle,
            report: &report,
        })?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    let status = engine.status().await?;
    tracing::info!(
        cycles = status.cycles,
        open_cycles = status.open_cycles,
        active_identities = status.active_identities,
        turnstile_connected = status.turnstile_connected,
        "mirud shutting down"
    );

    Ok(())
}
