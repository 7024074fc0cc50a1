//! Message-passing boundary for the mask-contour pipeline.
//!
//! The pipeline runs inside an isolated tokio task reachable only through
//! typed messages; the wire encoding (`type` tag, kebab-case) matches the
//! original worker protocol: `init` / `process-masks` in,
//! `init-complete` / `progress` / `complete` / `error` out.
//!
//! The task is an explicit finite-state machine (Idle → Initializing → Ready
//! → Processing → Ready/Failed). Requests arrive over a single channel, so
//! a second `init` issued while one is in flight is served after it and
//! observes the already-initialized state instead of re-triggering setup.
//! `process-masks` before `init` is rejected with an `error` event, never a
//! silent null. Batches run strictly sequentially, one mask at a time; the
//! only cancellation point is the boundary between masks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{DetectError, Result};
use crate::pipeline::masks::process_mask_batch;
use crate::types::{DetectedGrain, MaskBatch};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerRequest {
    /// Initialize the vision backend. Idempotent.
    Init,
    /// Process a full mask batch, strictly sequentially.
    ProcessMasks(MaskBatch),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerEvent {
    InitComplete,
    /// Emitted as each mask starts; `current` is 1-based.
    Progress { current: usize, total: usize },
    /// Terminal: all grains from the batch, flattened.
    Complete { grains: Vec<DetectedGrain> },
    /// Terminal: the batch (or the request itself) failed.
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Initializing,
    Ready,
    Processing,
    Failed,
}

/// Caller-side handle to a spawned detection worker.
///
/// Dropping the handle closes the request channel and lets the task finish
/// its current batch and exit.
pub struct WorkerHandle {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    cancel: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub fn send(&self, request: WorkerRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| DetectError::BackendUnavailable("worker task has terminated".into()))
    }

    pub fn init(&self) -> Result<()> {
        self.send(WorkerRequest::Init)
    }

    pub fn process_masks(&self, batch: MaskBatch) -> Result<()> {
        self.send(WorkerRequest::ProcessMasks(batch))
    }

    /// Request cooperative cancellation of the in-flight batch. Takes effect
    /// at the next mask boundary; the batch terminates with an `error` event.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Receive the next event, or `None` once the worker has terminated.
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }
}

/// Spawn a detection worker on the current tokio runtime.
pub fn spawn() -> WorkerHandle {
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel();
    let cancel = Arc::new(AtomicBool::new(false));

    tokio::spawn(run(req_rx, evt_tx, Arc::clone(&cancel)));

    WorkerHandle {
        requests: req_tx,
        events: evt_rx,
        cancel,
    }
}

async fn run(
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    cancel: Arc<AtomicBool>,
) {
    let mut state = WorkerState::Idle;

    while let Some(request) = requests.recv().await {
        match request {
            WorkerRequest::Init => {
                match state {
                    WorkerState::Idle | WorkerState::Failed => {
                        state = WorkerState::Initializing;
                        debug!(?state, "initializing vision backend");
                        // The vision backend is statically linked; there is
                        // nothing to load, but the gate keeps the protocol's
                        // ordering guarantees intact.
                        info!("vision backend initialized");
                        state = WorkerState::Ready;
                    }
                    WorkerState::Ready => {
                        debug!("re-init while ready; already initialized");
                    }
                    WorkerState::Initializing | WorkerState::Processing => {
                        // Unreachable from the outside: the request loop is
                        // the only place these states are entered and left.
                        warn!(?state, "init in transient state");
                    }
                }
                let _ = events.send(WorkerEvent::InitComplete);
            }

            WorkerRequest::ProcessMasks(batch) => {
                if state != WorkerState::Ready {
                    let _ = events.send(WorkerEvent::Error {
                        message: "vision backend not initialized; send init first".into(),
                    });
                    continue;
                }
                state = WorkerState::Processing;
                cancel.store(false, Ordering::SeqCst);

                let outcome = process_mask_batch(&batch, |current, total| {
                    if cancel.load(Ordering::SeqCst) {
                        return false;
                    }
                    let _ = events.send(WorkerEvent::Progress { current, total });
                    true
                });

                state = match outcome {
                    Ok(grains) => {
                        let _ = events.send(WorkerEvent::Complete { grains });
                        WorkerState::Ready
                    }
                    Err(err @ DetectError::Cancelled { .. }) => {
                        let _ = events.send(WorkerEvent::Error {
                            message: err.to_string(),
                        });
                        WorkerState::Ready
                    }
                    Err(err) => {
                        let _ = events.send(WorkerEvent::Error {
                            message: err.to_string(),
                        });
                        WorkerState::Failed
                    }
                };
            }
        }
    }
    debug!("request channel closed; worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MaskInput;

    fn empty_batch() -> MaskBatch {
        MaskBatch {
            masks: vec![],
            original_width: 64,
            original_height: 64,
            preview_width: 64,
            preview_height: 64,
        }
    }

    #[tokio::test]
    async fn process_before_init_is_rejected() {
        let mut worker = spawn();
        worker.process_masks(empty_batch()).unwrap();
        match worker.next_event().await.unwrap() {
            WorkerEvent::Error { message } => assert!(message.contains("init")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let mut worker = spawn();
        worker.init().unwrap();
        worker.init().unwrap();
        assert!(matches!(
            worker.next_event().await.unwrap(),
            WorkerEvent::InitComplete
        ));
        assert!(matches!(
            worker.next_event().await.unwrap(),
            WorkerEvent::InitComplete
        ));

        // Still ready to work afterwards.
        worker.process_masks(empty_batch()).unwrap();
        assert!(matches!(
            worker.next_event().await.unwrap(),
            WorkerEvent::Complete { .. }
        ));
    }

    #[tokio::test]
    async fn empty_batch_completes_immediately_without_progress() {
        let mut worker = spawn();
        worker.init().unwrap();
        worker.process_masks(empty_batch()).unwrap();

        assert!(matches!(
            worker.next_event().await.unwrap(),
            WorkerEvent::InitComplete
        ));
        match worker.next_event().await.unwrap() {
            WorkerEvent::Complete { grains } => assert!(grains.is_empty()),
            other => panic!("expected immediate complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn batch_emits_ordered_progress_then_complete() {
        use base64::Engine as _;
        use base64::engine::general_purpose::STANDARD;
        use std::io::Cursor;

        let mut img = image::GrayImage::new(32, 32);
        for (x, y, p) in img.enumerate_pixels_mut() {
            let dx = x as f64 - 16.0;
            let dy = y as f64 - 16.0;
            if (dx * dx + dy * dy).sqrt() <= 10.0 {
                p.0[0] = 255;
            }
        }
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let png = STANDARD.encode(&bytes);

        let batch = MaskBatch {
            masks: (0..3)
                .map(|_| MaskInput {
                    png_base64: png.clone(),
                    confidence: 0.5,
                })
                .collect(),
            original_width: 32,
            original_height: 32,
            preview_width: 32,
            preview_height: 32,
        };

        let mut worker = spawn();
        worker.init().unwrap();
        worker.process_masks(batch).unwrap();

        assert!(matches!(
            worker.next_event().await.unwrap(),
            WorkerEvent::InitComplete
        ));
        let mut progress = Vec::new();
        loop {
            match worker.next_event().await.unwrap() {
                WorkerEvent::Progress { current, total } => progress.push((current, total)),
                WorkerEvent::Complete { grains } => {
                    assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
                    assert_eq!(grains.len(), 3);
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn wire_encoding_matches_protocol() {
        let evt = WorkerEvent::Progress {
            current: 2,
            total: 5,
        };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["current"], 2);

        let req: WorkerRequest = serde_json::from_value(serde_json::json!({
            "type": "process-masks",
            "masks": [],
            "originalWidth": 10,
            "originalHeight": 10,
            "previewWidth": 10,
            "previewHeight": 10,
        }))
        .unwrap();
        assert!(matches!(req, WorkerRequest::ProcessMasks(b) if b.original_width == 10));

        let init: WorkerRequest = serde_json::from_value(serde_json::json!({"type": "init"})).unwrap();
        assert!(matches!(init, WorkerRequest::Init));
    }
}
