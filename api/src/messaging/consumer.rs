//! Result consumer: decode worker results and apply status changes

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use blacktree_wire::ResultMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::deploy::fsm::{DeploymentStatus, Transition};
use crate::deploy::mapper::map_status;
use crate::errors::ApiError;
use crate::messaging::broker::Disposition;
use crate::store::DeploymentRepository;
use crate::utils::sha256_hash;

/// Result consumer settings
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Deliveries of one message before it is dropped instead of requeued
    pub max_deliveries: u32,

    /// Messages whose failed attempts are remembered in-process
    pub tracker_capacity: usize,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            max_deliveries: 5,
            tracker_capacity: 1024,
        }
    }
}

/// Effect of applying a result status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Status stored
    Applied {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    /// Deployment already had the status
    Unchanged(DeploymentStatus),

    /// Transition not allowed from the current status; nothing stored
    Ignored {
        current: DeploymentStatus,
        reported: DeploymentStatus,
    },
}

/// Counts failed attempts per message for brokers that do not report
/// a delivery count
pub struct RedeliveryTracker {
    attempts: Mutex<HashMap<String, (u32, u64)>>,
    capacity: usize,
    sequence: Mutex<u64>,
}

impl RedeliveryTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            sequence: Mutex::new(0),
        }
    }

    fn next_sequence(&self) -> u64 {
        let mut sequence = self.sequence.lock().unwrap_or_else(|e| e.into_inner());
        *sequence += 1;
        *sequence
    }

    /// Record a failed attempt and return the total failed attempts so far
    pub fn record_failure(&self, digest: &str) -> u32 {
        let seen_at = self.next_sequence();
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());

        // Evict the stalest entry if at capacity
        if !attempts.contains_key(digest) && attempts.len() >= self.capacity {
            if let Some(oldest) = attempts
                .iter()
                .min_by_key(|(_, (_, seen))| *seen)
                .map(|(digest, _)| digest.clone())
            {
                attempts.remove(&oldest);
            }
        }

        let entry = attempts.entry(digest.to_string()).or_insert((0, seen_at));
        entry.0 += 1;
        entry.1 = seen_at;
        entry.0
    }

    pub fn forget(&self, digest: &str) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.remove(digest);
    }

    pub fn len(&self) -> usize {
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies worker-reported statuses to deployments
pub struct ResultConsumer {
    deployments: Arc<dyn DeploymentRepository>,
    tracker: RedeliveryTracker,
    options: ConsumerOptions,
}

impl ResultConsumer {
    pub fn new(deployments: Arc<dyn DeploymentRepository>, options: ConsumerOptions) -> Self {
        Self {
            deployments,
            tracker: RedeliveryTracker::new(options.tracker_capacity),
            options,
        }
    }

    /// Map `raw_status` and apply it to the deployment, guarded by the
    /// transition table. Reapplying the current status is a no-op.
    pub async fn apply_result_status(
        &self,
        deployment_id: Uuid,
        raw_status: &str,
    ) -> Result<ApplyOutcome, ApiError> {
        let reported = map_status(raw_status)?;

        let mut deployment = self
            .deployments
            .find_by_id(deployment_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("deployment {deployment_id} not found")))?;

        let current = deployment.status;
        match current.transition(reported) {
            Transition::Unchanged => Ok(ApplyOutcome::Unchanged(current)),
            Transition::Rejected => Ok(ApplyOutcome::Ignored { current, reported }),
            Transition::Apply => {
                deployment.status = reported;
                self.deployments.save(deployment).await?;
                Ok(ApplyOutcome::Applied {
                    from: current,
                    to: reported,
                })
            }
        }
    }

    /// Process one raw result payload and decide how to settle it.
    ///
    /// `previous_deliveries` is the broker's count of earlier attempts, if any;
    /// otherwise failed attempts are counted in-process.
    pub async fn handle_payload(&self, payload: &[u8], previous_deliveries: Option<u32>) -> Disposition {
        let message = match ResultMessage::from_payload(payload) {
            Ok(message) => message,
            Err(e) => {
                let err = ApiError::DecodeError(e.to_string());
                warn!("Rejecting result message: {}", err);
                return Disposition::Reject;
            }
        };

        let digest = sha256_hash(payload);
        match self
            .apply_result_status(message.deployment_id, &message.status)
            .await
        {
            Ok(outcome) => {
                self.tracker.forget(&digest);
                log_outcome(message.deployment_id, &outcome);
                Disposition::Ack
            }
            Err(e @ (ApiError::UnknownStatus(_) | ApiError::NotFound(_))) => {
                self.tracker.forget(&digest);
                warn!("Rejecting result for {}: {}", message.deployment_id, e);
                Disposition::Reject
            }
            Err(e) if e.is_retryable() => {
                let attempts = match previous_deliveries {
                    Some(previous) => previous.saturating_add(1),
                    None => self.tracker.record_failure(&digest),
                };
                if attempts >= self.options.max_deliveries {
                    self.tracker.forget(&digest);
                    error!(
                        "Dropping result for {} after {} attempts: {}",
                        message.deployment_id, attempts, e
                    );
                    Disposition::Reject
                } else {
                    warn!(
                        "Requeueing result for {} (attempt {}/{}): {}",
                        message.deployment_id, attempts, self.options.max_deliveries, e
                    );
                    Disposition::Requeue
                }
            }
            Err(e) => {
                self.tracker.forget(&digest);
                error!("Rejecting result for {}: {}", message.deployment_id, e);
                Disposition::Reject
            }
        }
    }

    pub fn tracker(&self) -> &RedeliveryTracker {
        &self.tracker
    }
}

fn log_outcome(deployment_id: Uuid, outcome: &ApplyOutcome) {
    match outcome {
        ApplyOutcome::Applied { from, to } => {
            info!("Deployment {} status {} -> {}", deployment_id, from, to);
        }
        ApplyOutcome::Unchanged(status) => {
            debug!("Deployment {} already {}", deployment_id, status);
        }
        ApplyOutcome::Ignored { current, reported } => {
            debug!(
                "Ignoring stale {} report for deployment {} in status {}",
                reported, deployment_id, current
            );
        }
    }
}
