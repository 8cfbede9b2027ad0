//! Failover-aware retry coordination.
//!
//! # States
//! - Attempting: an attempt is running against the endpoint known at its start
//! - Succeeded: terminal
//! - WaitingFailoverKnownComplete: the new endpoint is known, short fixed wait
//! - WaitingFailoverUnknown: I/O error with no failover seen yet, wait for one
//! - Exhausted: terminal, attempt budget spent
//!
//! # State Transitions
//! ```text
//! Attempting → Succeeded: attempt returned Ok
//! Attempting → WaitingFailoverKnownComplete: endpoint changed mid-flight,
//!                                            or I/O error after a known failover
//! Attempting → WaitingFailoverUnknown: I/O error, no failover seen
//! Waiting* → Attempting: wait over (change, timeout or fixed delay)
//! Attempting → Exhausted: last attempt failed
//! ```
//!
//! Chasing a known new endpoint is fast; guessing at an unannounced failover
//! blocks for up to the full session-timeout window instead of hot-looping
//! against a node that may still be unreachable.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{ClientError, ClientResult, OperationError};
use crate::lifecycle::Shutdown;
use crate::locator::{Endpoint, EndpointLocator, FailoverSnapshot, FailoverState};
use crate::observability::metrics;
use crate::resilience::backoff::with_jitter;

/// Wait constants and attempt budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub failover_complete_wait: Duration,
    pub failover_complete_jitter: Duration,
    pub regular_error_wait: Duration,
    pub failover_in_progress_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            failover_complete_wait: Duration::from_millis(config.failover_complete_wait_ms),
            failover_complete_jitter: Duration::from_millis(config.failover_complete_jitter_ms),
            regular_error_wait: Duration::from_millis(config.regular_error_wait_ms),
            failover_in_progress_wait: Duration::from_secs(config.failover_in_progress_wait_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting,
    Succeeded,
    WaitingFailoverKnownComplete,
    WaitingFailoverUnknown,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    ChangedMidFlight,
    IoError,
}

impl From<&OperationError> for AttemptOutcome {
    fn from(error: &OperationError) -> Self {
        match error {
            OperationError::EndpointChangedMidOperation { .. } => AttemptOutcome::ChangedMidFlight,
            OperationError::TransientIo(_) => AttemptOutcome::IoError,
        }
    }
}

/// Record of one failed attempt, used to drive the wait decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub index: u32,
    pub outcome: AttemptOutcome,
    pub before: FailoverSnapshot,
    pub after: FailoverSnapshot,
}

/// What to do between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPlan {
    /// Sleep a fixed interval plus up to `jitter`.
    Fixed {
        state: RetryState,
        delay: Duration,
        jitter: Duration,
    },
    /// Block until the generation moves past `since`, at most `timeout`.
    AwaitFailover { since: u64, timeout: Duration },
}

impl WaitPlan {
    pub fn state(&self) -> RetryState {
        match self {
            WaitPlan::Fixed { state, .. } => *state,
            WaitPlan::AwaitFailover { .. } => RetryState::WaitingFailoverUnknown,
        }
    }
}

/// Classify a failed attempt.
///
/// `after` is the failover state observed once the error surfaced.
pub fn plan_wait(policy: &RetryPolicy, error: &OperationError, after: FailoverSnapshot) -> WaitPlan {
    match error {
        OperationError::EndpointChangedMidOperation { .. } => WaitPlan::Fixed {
            state: RetryState::WaitingFailoverKnownComplete,
            delay: policy.failover_complete_wait,
            jitter: policy.failover_complete_jitter,
        },
        OperationError::TransientIo(_) if after.changed => WaitPlan::Fixed {
            state: RetryState::WaitingFailoverKnownComplete,
            delay: policy.regular_error_wait,
            jitter: Duration::ZERO,
        },
        OperationError::TransientIo(_) => WaitPlan::AwaitFailover {
            since: after.generation,
            timeout: policy.failover_in_progress_wait,
        },
    }
}

/// Inputs handed to each attempt.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// 1-based attempt number.
    pub index: u32,
    /// Endpoint captured at attempt start.
    pub endpoint: Endpoint,
    /// Failover state captured at attempt start.
    pub before: FailoverSnapshot,
}

/// Runs the bounded attempt loop around an operation.
#[derive(Clone)]
pub struct RetryCoordinator {
    state: Arc<FailoverState>,
    policy: RetryPolicy,
    shutdown: Option<Arc<Shutdown>>,
}

impl RetryCoordinator {
    pub fn new(locator: Arc<EndpointLocator>, policy: RetryPolicy) -> Self {
        Self {
            state: locator.failover_state(),
            policy,
            shutdown: None,
        }
    }

    /// Abandon waits when `shutdown` triggers.
    pub fn with_shutdown(mut self, shutdown: Arc<Shutdown>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt` until it succeeds or the attempt budget is spent.
    ///
    /// `operation` labels logs and metrics; `object` identifies what is being
    /// worked on in the final error.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, object: &str, mut attempt: F) -> ClientResult<T>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let max_attempts = self.policy.max_attempts;

        for index in 1..=max_attempts {
            if self.is_cancelled() {
                return Err(ClientError::Cancelled { object: object.to_string() });
            }

            // Endpoint and generation come from the same published record.
            let record = self.state.record();
            let before = record.snapshot();
            let endpoint = record.endpoint.clone();
            tracing::info!(
                event = "ATTEMPT",
                operation,
                object,
                attempt = index,
                endpoint = %endpoint,
                generation = before.generation,
                "Attempt {} to {} {}", index, operation, object
            );

            let error = match attempt(AttemptContext { index, endpoint: endpoint.clone(), before }).await {
                Ok(value) => {
                    metrics::record_attempt(operation, "success");
                    tracing::debug!(operation, object, attempt = index, state = ?RetryState::Succeeded, "Attempt succeeded");
                    return Ok(value);
                }
                Err(e) => e,
            };

            let after = self.state.snapshot();
            let record = Attempt {
                index,
                outcome: AttemptOutcome::from(&error),
                before,
                after,
            };
            metrics::record_attempt(operation, error.label());
            self.log_failure(operation, object, &endpoint, &record, &error);

            if index == max_attempts {
                break;
            }

            let plan = plan_wait(&self.policy, &error, after);
            if !self.wait(plan).await {
                return Err(ClientError::Cancelled { object: object.to_string() });
            }
        }

        metrics::record_exhausted(operation);
        tracing::error!(
            operation,
            object,
            attempts = max_attempts,
            state = ?RetryState::Exhausted,
            "Failed completely to {} {}", operation, object
        );
        Err(ClientError::AttemptsExhausted {
            object: object.to_string(),
            attempts: max_attempts,
        })
    }

    fn log_failure(
        &self,
        operation: &'static str,
        object: &str,
        endpoint: &Endpoint,
        attempt: &Attempt,
        error: &OperationError,
    ) {
        match attempt.outcome {
            AttemptOutcome::ChangedMidFlight => {
                tracing::warn!(
                    event = "FAILURE_NN",
                    operation,
                    object,
                    attempt = attempt.index,
                    endpoint = %endpoint,
                    generation = attempt.after.generation,
                    "Endpoint changed in the middle of the operation"
                );
            }
            _ => {
                tracing::error!(
                    event = "FAILURE_IO",
                    operation,
                    object,
                    attempt = attempt.index,
                    endpoint = %endpoint,
                    failover_seen = attempt.after.changed,
                    error = %error,
                    "I/O error"
                );
            }
        }
    }

    /// Carry out a wait plan. Returns false if shutdown interrupted it.
    async fn wait(&self, plan: WaitPlan) -> bool {
        let waiting = async {
            match plan {
                WaitPlan::Fixed { state, delay, jitter } => {
                    let delay = with_jitter(delay, jitter);
                    tracing::info!(state = ?state, delay = ?delay, "Waiting before next attempt");
                    tokio::time::sleep(delay).await;
                }
                WaitPlan::AwaitFailover { since, timeout } => {
                    tracing::info!(
                        timeout = ?timeout,
                        "Failover hasn't happened yet. Assuming it is in progress; waiting until it is finished"
                    );
                    if self.state.await_change(since, timeout).await {
                        tracing::info!(
                            event = "FAILOVER_COMPLETE",
                            endpoint = %self.state.endpoint(),
                            "Failover complete"
                        );
                    } else {
                        tracing::warn!(
                            timeout = ?timeout,
                            "Some big failure happened: failover did not happen within the wait window"
                        );
                    }
                }
            }
        };

        match &self.shutdown {
            Some(shutdown) => tokio::select! {
                _ = waiting => true,
                _ = shutdown.cancelled() => false,
            },
            None => {
                waiting.await;
                true
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|s| s.is_triggered())
    }
}
