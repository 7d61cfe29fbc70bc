use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::models::generation::{GenerationJob, GenerationOptions, JobState};
use crate::services::providers::{GenerationProvider, ProviderError};

/// How a monitored job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Provider finished. The list may be empty: success without output.
    Succeeded(Vec<String>),
    /// Provider reported a definite failure.
    Failed,
    /// Attempt budget spent without a terminal state.
    TimedOut { attempts: u32 },
    /// Caller gave up before the budget ran out.
    Cancelled,
}

/// Bounded polling loop and submit back-off. The only place that owns wall-clock pacing.
#[derive(Debug, Clone, Copy)]
pub struct JobMonitor {
    max_attempts: u32,
    interval: Duration,
    submit_retries: u32,
    retry_backoff: Duration,
}

impl JobMonitor {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            submit_retries: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }

    /// Rate-limit retries for [`JobMonitor::submit_with_retry`]. Back-off grows linearly.
    pub fn with_submit_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.submit_retries = retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Submit, retrying only on [`ProviderError::RateLimited`].
    pub async fn submit_with_retry(
        &self,
        provider: &dyn GenerationProvider,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        let mut attempt = 0;
        loop {
            match provider.submit(prompt, options).await {
                Err(e) if e.is_retryable() && attempt < self.submit_retries => {
                    attempt += 1;
                    metrics::counter!("provider_rate_limited_total").increment(1);
                    tracing::warn!(
                        provider = %provider.kind(),
                        attempt,
                        error = %e,
                        "Submit rate limited, retrying"
                    );
                    sleep(self.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    pub async fn await_completion(
        &self,
        provider: &dyn GenerationProvider,
        job_id: &str,
    ) -> MonitorOutcome {
        self.await_completion_with_cancel(provider, job_id, &CancellationToken::new())
            .await
    }

    /// Poll until the job is terminal, the budget runs out, or `cancel` fires.
    ///
    /// Cancelling only stops local polling; the remote job keeps running.
    pub async fn await_completion_with_cancel(
        &self,
        provider: &dyn GenerationProvider,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> MonitorOutcome {
        let mut job = GenerationJob::new(job_id, provider.kind());

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return MonitorOutcome::Cancelled;
            }

            let status = provider.poll(job_id).await;
            let previous = job.state;
            job.observe(&status);

            tracing::debug!(
                job_id,
                attempt,
                state = %status.state,
                percentage = job.percentage,
                "Polled generation job"
            );
            if job.state != previous {
                tracing::info!(job_id, from = %previous, to = %job.state, "Generation job state changed");
            }

            match job.state {
                JobState::Succeeded => return MonitorOutcome::Succeeded(job.result_urls),
                JobState::Failed => return MonitorOutcome::Failed,
                _ => {}
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return MonitorOutcome::Cancelled,
                    _ = sleep(self.interval) => {}
                }
            }
        }

        tracing::warn!(job_id, attempts = self.max_attempts, "Generation job not finished within budget");
        MonitorOutcome::TimedOut {
            attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::generation::{NormalizedStatus, ProviderKind};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed list of statuses, repeating the last one forever.
    struct Scripted {
        statuses: Mutex<VecDeque<NormalizedStatus>>,
        polls: AtomicU32,
        submits: Mutex<VecDeque<Result<String, ProviderError>>>,
    }

    impl Scripted {
        fn new(statuses: Vec<NormalizedStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                polls: AtomicU32::new(0),
                submits: Mutex::new(VecDeque::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Apiframe
        }

        async fn submit(&self, _: &str, _: &GenerationOptions) -> Result<String, ProviderError> {
            self.submits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("job".into()))
        }

        async fn poll(&self, _: &str) -> NormalizedStatus {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut queue = self.statuses.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap_or_else(NormalizedStatus::unknown)
            }
        }
    }

    fn st(state: JobState, pct: Option<u8>, urls: &[&str]) -> NormalizedStatus {
        NormalizedStatus::new(state, pct, urls.iter().map(|u| u.to_string()).collect())
    }

    fn fast(max: u32) -> JobMonitor {
        JobMonitor::new(max, Duration::from_millis(1))
            .with_submit_retries(2, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_pending_running_succeeded_takes_four_polls() {
        let provider = Scripted::new(vec![
            st(JobState::Pending, None, &[]),
            st(JobState::Pending, None, &[]),
            st(JobState::Running, Some(40), &[]),
            st(JobState::Succeeded, None, &["https://cdn/out.png"]),
        ]);
        let outcome = fast(10).await_completion(&provider, "job").await;
        assert_eq!(
            outcome,
            MonitorOutcome::Succeeded(vec!["https://cdn/out.png".to_string()])
        );
        assert_eq!(provider.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failure_returns_immediately() {
        let provider = Scripted::new(vec![
            st(JobState::Running, Some(10), &[]),
            st(JobState::Failed, None, &[]),
            st(JobState::Succeeded, None, &["https://never"]),
        ]);
        let outcome = fast(10).await_completion(&provider, "job").await;
        assert_eq!(outcome, MonitorOutcome::Failed);
        assert_eq!(provider.polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_throttled_and_unknown_are_retried() {
        let provider = Scripted::new(vec![
            st(JobState::Throttled, None, &[]),
            NormalizedStatus::unknown(),
            st(JobState::Succeeded, None, &[]),
        ]);
        let outcome = fast(5).await_completion(&provider, "job").await;
        assert_eq!(outcome, MonitorOutcome::Succeeded(vec![]));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_timeout() {
        let provider = Scripted::new(vec![st(JobState::Running, Some(5), &[])]);
        let outcome = fast(3).await_completion(&provider, "job").await;
        assert_eq!(outcome, MonitorOutcome::TimedOut { attempts: 3 });
        assert_eq!(provider.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_poll() {
        let provider = Scripted::new(vec![st(JobState::Running, None, &[])]);
        let token = CancellationToken::new();
        token.cancel();
        let outcome = fast(3)
            .await_completion_with_cancel(&provider, "job", &token)
            .await;
        assert_eq!(outcome, MonitorOutcome::Cancelled);
        assert_eq!(provider.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_caller_timeout_interrupts_sleep() {
        let provider = Scripted::new(vec![st(JobState::Running, None, &[])]);
        let monitor = JobMonitor::new(100, Duration::from_secs(60));
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            monitor.await_completion(&provider, "job"),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(provider.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_retries_rate_limit_only() {
        let provider = Scripted::new(vec![]);
        provider.submits.lock().unwrap().extend([
            Err(ProviderError::RateLimited("slow down".into())),
            Ok("job-42".to_string()),
        ]);
        let id = fast(1)
            .submit_with_retry(&provider, "fox", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(id, "job-42");

        provider.submits.lock().unwrap().extend([Err(ProviderError::Request {
            status: 400,
            message: "bad prompt".into(),
        })]);
        let err = fast(1)
            .submit_with_retry(&provider, "fox", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Request { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_submit_gives_up_after_retry_budget() {
        let provider = Scripted::new(vec![]);
        provider.submits.lock().unwrap().extend([
            Err(ProviderError::RateLimited("1".into())),
            Err(ProviderError::RateLimited("2".into())),
            Err(ProviderError::RateLimited("3".into())),
            Ok("late".to_string()),
        ]);
        let err = fast(1)
            .submit_with_retry(&provider, "fox", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
