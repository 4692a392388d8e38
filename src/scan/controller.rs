use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

use crate::classifier::{FreshnessClassifier, SpeciesClassifier};
use crate::db::Database;
use crate::frames::FrameStore;

use super::policy::{DecisionPolicy, ScanDecision};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Nothing has been decoded yet; the capture request is ignored.
    NoFrame,
    Decided(ScanDecision),
}

/// A decision that could not be written to the history, even after a retry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistFailure {
    pub decision: ScanDecision,
    pub timestamp_ms: i64,
    pub error: String,
}

/// Runs the capture → classify → persist pipeline.
#[derive(Clone)]
pub struct ScanController {
    frames: FrameStore,
    species: Arc<SpeciesClassifier>,
    freshness: Arc<FreshnessClassifier>,
    policy: Arc<DecisionPolicy>,
    db: Database,
    capture_lock: Arc<Mutex<()>>,
    writes: TaskTracker,
    failures: mpsc::UnboundedSender<PersistFailure>,
}

impl ScanController {
    /// Also returns the receiving end of the persist-failure channel.
    pub fn new(
        frames: FrameStore,
        species: SpeciesClassifier,
        freshness: FreshnessClassifier,
        policy: DecisionPolicy,
        db: Database,
    ) -> (Self, mpsc::UnboundedReceiver<PersistFailure>) {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let controller = Self {
            frames,
            species: Arc::new(species),
            freshness: Arc::new(freshness),
            policy: Arc::new(policy),
            db,
            capture_lock: Arc::new(Mutex::new(())),
            writes: TaskTracker::new(),
            failures: failures_tx,
        };
        (controller, failures_rx)
    }

    /// Classifies the latest frame and returns the decision right away; the
    /// history write continues in the background.
    pub async fn capture(&self) -> Result<CaptureOutcome> {
        let _in_flight = self.capture_lock.lock().await;

        let Some(frame) = self.frames.latest() else {
            log_info!("capture ignored: no frame available yet");
            return Ok(CaptureOutcome::NoFrame);
        };

        let started = Instant::now();
        let frame_id = frame.id;
        let species = Arc::clone(&self.species);
        let freshness = Arc::clone(&self.freshness);
        let policy = Arc::clone(&self.policy);

        // Inference is blocking; keep it off the async workers.
        let decision = tokio::task::spawn_blocking(move || {
            let species_result = species.classify(&frame.image)?;
            policy.decide(species_result, || freshness.score(&frame.image))
        })
        .await
        .context("classifier worker join failed")??;

        log_info!(
            "frame {} classified as {} ({:.2}, freshness {:?}) in {}ms",
            frame_id,
            decision.species,
            decision.confidence,
            decision.freshness,
            started.elapsed().as_millis()
        );

        self.persist_in_background(decision.clone());
        Ok(CaptureOutcome::Decided(decision))
    }

    fn persist_in_background(&self, decision: ScanDecision) {
        let db = self.db.clone();
        let failures = self.failures.clone();
        let timestamp_ms = Utc::now().timestamp_millis();

        self.writes.spawn(async move {
            let record = decision.to_record(timestamp_ms);

            let first_err = match db.insert_scan_record(&record).await {
                Ok(id) => {
                    log_info!("stored scan record {id}");
                    return;
                }
                Err(err) => err,
            };
            log_warn!("storing scan failed, retrying once: {first_err:#}");

            let err = match db.insert_scan_record(&record).await {
                Ok(id) => {
                    log_info!("stored scan record {id} on retry");
                    return;
                }
                Err(err) => err,
            };
            log::error!("dropping scan result for {}: {err:#}", decision.species);

            let failure = PersistFailure {
                decision,
                timestamp_ms,
                error: format!("{err:#}"),
            };
            if failures.send(failure).is_err() {
                log::error!("persist failure receiver dropped");
            }
        });
    }

    /// Waits for every background write issued so far.
    pub async fn drain(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }
}
