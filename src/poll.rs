//! Waiting for the oracle network to finalize an attestation.

use crate::attestation::Proof;
use crate::error::ClientError;
use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Identifies an attestation whose proof is being awaited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofQuery {
    /// Contract-side request id.
    pub request_id: B256,
    /// Voting round the request was submitted in.
    pub voting_round: u64,
    /// ABI-encoded attestation request as returned by the verifier.
    pub request_bytes: Bytes,
}

/// Somewhere attestation proofs can be fetched from.
#[async_trait]
pub trait ProofSource: Send + Sync {
    /// `Ok(None)` while the round is not finalized yet.
    async fn fetch_proof(&self, query: &ProofQuery) -> Result<Option<Proof>, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        // Rounds last 90s and finalize a few minutes after submission.
        Self {
            interval: Duration::from_secs(15),
            max_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(600),
        }
    }
}

impl PollPolicy {
    fn backoff(&self, current: Duration) -> Duration {
        current
            .saturating_mul(2)
            .min(self.max_interval)
            .max(self.interval)
    }
}

pub async fn await_proof(
    source: &dyn ProofSource,
    query: &ProofQuery,
    policy: PollPolicy,
) -> Result<Proof, ClientError> {
    // None only for timeouts too large to represent as an instant
    let deadline = Instant::now().checked_add(policy.timeout);
    let mut delay = policy.interval;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match source.fetch_proof(query).await {
            Ok(Some(proof)) => {
                info!(
                    request_id = %query.request_id,
                    attempts,
                    "attestation proof available"
                );
                return Ok(proof);
            }
            Ok(None) => {
                debug!(request_id = %query.request_id, attempts, "proof not ready");
                delay = policy.interval;
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, attempts, "proof fetch failed; backing off");
                delay = policy.backoff(delay);
            }
            Err(e) => return Err(e),
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ClientError::Timeout(policy.timeout));
                }
                delay.min(deadline - now)
            }
            None => delay,
        };
        sleep(pause).await;
    }
}
