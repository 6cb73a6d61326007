//! Background notify step run after a sick call is submitted.
//!
//! Jobs travel over an unbounded channel to a [`NotifyWorker`], which runs each one on its
//! own task, retries transient failures with exponential backoff, and records terminal
//! failures where operators can see them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::domain::{OrganizationId, SickCallId};
use super::events::EventPublisher;
use super::notifications::NotificationTransport;
use super::repository::CoverageRepository;
use super::service::CoverageService;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifyJob {
    pub sick_call_id: SickCallId,
    pub organization_id: OrganizationId,
    pub attempts: u32,
}

impl NotifyJob {
    pub fn new(sick_call_id: SickCallId, organization_id: OrganizationId) -> Self {
        Self {
            sick_call_id,
            organization_id,
            attempts: 0,
        }
    }
}

/// A job that exhausted its retries or hit a non-retryable error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedNotifyJob {
    pub sick_call_id: SickCallId,
    pub organization_id: OrganizationId,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl RetryPolicy {
    /// Delay after the given (1-based) failed attempt: base, 2×base, 4×base, ...
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(1u64 << exponent))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
        }
    }
}

type FailureLog = Arc<Mutex<Vec<FailedNotifyJob>>>;

/// Producer side handed to the coverage service.
#[derive(Debug, Clone, Default)]
pub struct NotifyQueue {
    sender: Option<mpsc::UnboundedSender<NotifyJob>>,
    failures: FailureLog,
}

/// Consumer side handed to the worker.
#[derive(Debug)]
pub struct NotifyJobReceiver {
    receiver: mpsc::UnboundedReceiver<NotifyJob>,
    failures: FailureLog,
}

impl NotifyQueue {
    pub fn channel() -> (Self, NotifyJobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let failures = FailureLog::default();
        (
            Self {
                sender: Some(sender),
                failures: failures.clone(),
            },
            NotifyJobReceiver { receiver, failures },
        )
    }

    /// Queue with no worker attached; enqueued jobs are dropped.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Returns false when no worker is listening.
    pub fn enqueue(&self, job: NotifyJob) -> bool {
        match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }

    pub fn failures(&self) -> Vec<FailedNotifyJob> {
        match self.failures.lock() {
            Ok(failures) => failures.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn record_failure(log: &FailureLog, failure: FailedNotifyJob) {
    match log.lock() {
        Ok(mut failures) => failures.push(failure),
        Err(poisoned) => poisoned.into_inner().push(failure),
    }
}

pub struct NotifyWorker<R, T, P> {
    service: Arc<CoverageService<R, T, P>>,
    receiver: NotifyJobReceiver,
    policy: RetryPolicy,
}

impl<R, T, P> NotifyWorker<R, T, P>
where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(
        service: Arc<CoverageService<R, T, P>>,
        receiver: NotifyJobReceiver,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            service,
            receiver,
            policy,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drain the queue until every producer is dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.receiver.receiver.recv().await {
            let service = self.service.clone();
            let policy = self.policy.clone();
            let failures = self.receiver.failures.clone();
            tokio::spawn(process_job(service, job, policy, failures));
        }
        info!("notify queue closed; worker exiting");
    }
}

async fn process_job<R, T, P>(
    service: Arc<CoverageService<R, T, P>>,
    mut job: NotifyJob,
    policy: RetryPolicy,
    failures: FailureLog,
) where
    R: CoverageRepository + 'static,
    T: NotificationTransport + 'static,
    P: EventPublisher + 'static,
{
    loop {
        job.attempts += 1;
        let err = match service.notify_next(&job.sick_call_id, &job.organization_id) {
            Ok(outcome) => {
                info!(sick_call_id = %job.sick_call_id, attempts = job.attempts, outcome = outcome.label(), "auto-notify finished");
                return;
            }
            Err(err) => err,
        };

        if err.is_retryable() && job.attempts < policy.max_attempts {
            let delay = policy.backoff_after(job.attempts);
            warn!(
                sick_call_id = %job.sick_call_id,
                attempts = job.attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "auto-notify failed; retrying"
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        error!(
            sick_call_id = %job.sick_call_id,
            attempts = job.attempts,
            error = %err,
            "auto-notify failed permanently; sick call needs manual follow-up"
        );
        let failure = FailedNotifyJob {
            sick_call_id: job.sick_call_id.clone(),
            organization_id: job.organization_id.clone(),
            attempts: job.attempts,
            error: err.to_string(),
            failed_at: Utc::now(),
        };
        service.report_notify_failure(&failure);
        record_failure(&failures, failure);
        return;
    }
}
