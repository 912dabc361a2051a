use crate::config::Config;
use crate::turnstile::{TurnstileError, TurnstileLink, TurnstileSignal};
use miru_core::{CycleReport, FrameInput, IdentityTracker};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("turnstile error: {0}")]
    Turnstile(#[from] TurnstileError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Engine counters, reported on request.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub cycles: u64,
    pub open_cycles: u64,
    pub active_identities: usize,
    pub turnstile_connected: bool,
}

/// Messages sent from the ingest loop to the engine thread.
enum EngineRequest {
    Cycle {
        frame: FrameInput,
        reply: oneshot::Sender<CycleReport>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run one full tracking cycle and drive the turnstile from its decision.
    pub async fn process(&self, frame: FrameInput) -> Result<CycleReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Cycle {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens and identifies the turnstile controller when one is configured,
/// then enters a request loop. The thread is the sole owner of the tracker,
/// so every cycle runs start to finish before the next request is taken.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let mut link = open_turnstile(config)?;
    let mut tracker = IdentityTracker::new(config.tracker.clone());
    let min_confidence = config.min_equipment_confidence;

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("miru-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut cycles = 0u64;
            let mut open_cycles = 0u64;
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Cycle { frame, reply } => {
                        let report = run_cycle(&mut tracker, &mut link, frame, min_confidence);
                        cycles += 1;
                        if report.should_open {
                            open_cycles += 1;
                        }
                        let _ = reply.send(report);
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(EngineStatus {
                            cycles,
                            open_cycles,
                            active_identities: tracker.number_of_active_identities(),
                            turnstile_connected: link.is_some(),
                        });
                    }
                }
            }
            tracing::info!(cycles, open_cycles, "engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Open and identify the controller. Fails fast if a configured device is unusable.
fn open_turnstile(config: &Config) -> Result<Option<TurnstileLink>, EngineError> {
    if !config.turnstile_enabled {
        tracing::info!("turnstile disabled via MIRU_TURNSTILE_ENABLED=0");
        return Ok(None);
    }
    let Some(path) = &config.turnstile_device else {
        tracing::warn!("no turnstile device configured; decisions are logged only");
        return Ok(None);
    };

    let mut link = TurnstileLink::open(path, &config.turnstile_reply)?;
    link.identify()?;
    tracing::info!(device = %link.device_path().display(), "turnstile controller identified");
    Ok(Some(link))
}

/// Drop equipment detections the detector was not confident about.
fn filter_low_confidence(mut frame: FrameInput, min_confidence: f32) -> FrameInput {
    frame.detections.retain(|d| d.confidence >= min_confidence);
    frame
}

/// One cycle: track, decide, signal. Turnstile write failures are logged,
/// never propagated; the decision still goes back to the caller.
fn run_cycle(
    tracker: &mut IdentityTracker,
    link: &mut Option<TurnstileLink>,
    frame: FrameInput,
    min_confidence: f32,
) -> CycleReport {
    let frame = filter_low_confidence(frame, min_confidence);
    let report = tracker.run_cycle(&frame);

    let signal = TurnstileSignal::from_decision(report.should_open);
    if report.should_open {
        tracing::info!(main = ?report.main_id, "opening turnstile");
    }
    if let Some(l) = link {
        if let Err(err) = l.send(signal) {
            tracing::warn!(error = %err, ?signal, "turnstile write failed");
        }
    }

    report
}
