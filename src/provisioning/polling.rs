//! Bounded, cancellable polling of asynchronous backend state.
//!
//! A poll loop checks the backend on a fixed interval until the observed state is terminal,
//! the overall timeout elapses, or the process shutdown signal fires. Failed checks back off
//! for a longer interval instead of aborting. The caller always learns which of these ended
//! the loop through [`PollOutcome`].

use crate::opensearch::OpenSearchError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Timing parameters of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two status checks while the state is still in progress.
    pub interval: Duration,
    /// Upper bound on the total time spent polling.
    pub timeout: Duration,
    /// Delay after a status check that failed at the transport or HTTP level.
    pub retry_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(60_000),
            retry_backoff: Duration::from_secs(10),
        }
    }
}

/// Classification of one observed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Terminal success.
    Done,
    /// Terminal failure; polling further cannot succeed.
    Failed,
    /// Not finished yet.
    Pending,
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// A status check observed a terminal success state.
    Completed(T),
    /// A status check observed a terminal failure state.
    Failed(T),
    /// The timeout elapsed; carries the last observed state, if any.
    TimedOut(Option<T>),
    /// Shutdown was requested; carries the last observed state, if any.
    Cancelled(Option<T>),
}

/// Check status until `classify` reports a terminal state, the policy timeout elapses, or
/// `shutdown` flips to `true`.
///
/// `Ok(None)` from `check` means the backend has no status yet and is treated as pending.
pub async fn poll_until<T, F, Fut, C>(
    subject: &str,
    policy: &PollPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut check: F,
    classify: C,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, OpenSearchError>>,
    C: Fn(&T) -> Progress,
{
    // Timeouts too large to represent as an instant never expire.
    let deadline = Instant::now().checked_add(policy.timeout);
    let mut last = None;

    loop {
        if *shutdown.borrow() {
            tracing::warn!(subject, "Polling cancelled by shutdown");
            return PollOutcome::Cancelled(last);
        }

        let pause = match check().await {
            Ok(Some(state)) => match classify(&state) {
                Progress::Done => {
                    tracing::info!(subject, "Completed successfully");
                    return PollOutcome::Completed(state);
                }
                Progress::Failed => {
                    tracing::error!(subject, "Reached a failure state");
                    return PollOutcome::Failed(state);
                }
                Progress::Pending => {
                    last = Some(state);
                    tracing::info!(subject, "Still in progress; waiting");
                    policy.interval
                }
            },
            Ok(None) => {
                tracing::info!(subject, "No status reported yet; waiting");
                policy.interval
            }
            Err(error) => {
                tracing::error!(subject, error = %error, "Status check failed; backing off");
                policy.retry_backoff
            }
        };

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    tracing::error!(
                        subject,
                        timeout_secs = policy.timeout.as_secs(),
                        "Did not complete within the timeout period"
                    );
                    return PollOutcome::TimedOut(last);
                }
                pause.min(deadline - now)
            }
            None => pause,
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = shutdown_requested(shutdown) => {
                tracing::warn!(subject, "Polling cancelled by shutdown");
                return PollOutcome::Cancelled(last);
            }
        }
    }
}

/// Resolve once `shutdown` holds `true`. Never resolves if the sender is dropped first.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Running,
        Completed,
        Failed,
    }

    fn classify(step: &Step) -> Progress {
        match step {
            Step::Completed => Progress::Done,
            Step::Failed => Progress::Failed,
            Step::Running => Progress::Pending,
        }
    }

    fn policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(10),
        }
    }

    fn unavailable() -> OpenSearchError {
        OpenSearchError::UnexpectedStatus {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "cluster not ready".into(),
        }
    }

    type Scripted = Result<Option<Step>, OpenSearchError>;

    #[tokio::test(start_paused = true)]
    async fn completes_after_minimum_number_of_polls() {
        let (_tx, mut rx) = watch::channel(false);
        let mut script: VecDeque<Scripted> = VecDeque::from(vec![
            Ok(Some(Step::Running)),
            Ok(Some(Step::Running)),
            Ok(Some(Step::Completed)),
        ]);
        let mut calls = 0;
        let start = Instant::now();

        let outcome = poll_until(
            "task",
            &policy(),
            &mut rx,
            || {
                calls += 1;
                let next = script.pop_front().expect("no status check past completion");
                async move { next }
            },
            classify,
        )
        .await;

        assert_eq!(outcome, PollOutcome::Completed(Step::Completed));
        assert_eq!(calls, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn never_completing_state_times_out_within_bound() {
        let (_tx, mut rx) = watch::channel(false);
        let mut calls = 0;
        let start = Instant::now();

        let outcome = poll_until(
            "task",
            &policy(),
            &mut rx,
            || {
                calls += 1;
                async { Ok(Some(Step::Running)) }
            },
            classify,
        )
        .await;

        assert_eq!(outcome, PollOutcome::TimedOut(Some(Step::Running)));
        assert!(start.elapsed() <= Duration::from_secs(30));
        assert_eq!(calls, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_polls_without_deadline() {
        let (_tx, mut rx) = watch::channel(false);
        let mut script: VecDeque<Scripted> = VecDeque::from(vec![
            Ok(Some(Step::Running)),
            Err(unavailable()),
            Ok(Some(Step::Completed)),
        ]);
        let policy = PollPolicy {
            timeout: Duration::from_secs(u64::MAX),
            ..policy()
        };
        let start = Instant::now();

        let outcome = poll_until(
            "task",
            &policy,
            &mut rx,
            || {
                let next = script.pop_front().expect("scripted status");
                async move { next }
            },
            classify,
        )
        .await;

        assert_eq!(outcome, PollOutcome::Completed(Step::Completed));
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn absent_status_counts_as_pending() {
        let (_tx, mut rx) = watch::channel(false);
        let mut script: VecDeque<Scripted> =
            VecDeque::from(vec![Ok(None), Ok(Some(Step::Completed))]);

        let outcome = poll_until(
            "model",
            &policy(),
            &mut rx,
            || {
                let next = script.pop_front().expect("scripted status");
                async move { next }
            },
            classify,
        )
        .await;

        assert_eq!(outcome, PollOutcome::Completed(Step::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_back_off_and_retry() {
        let (_tx, mut rx) = watch::channel(false);
        let mut script: VecDeque<Scripted> =
            VecDeque::from(vec![Err(unavailable()), Ok(Some(Step::Completed))]);
        let start = Instant::now();

        let outcome = poll_until(
            "task",
            &policy(),
            &mut rx,
            || {
                let next = script.pop_front().expect("scripted status");
                async move { next }
            },
            classify,
        )
        .await;

        assert_eq!(outcome, PollOutcome::Completed(Step::Completed));
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_stops_polling() {
        let (_tx, mut rx) = watch::channel(false);
        let mut calls = 0;

        let outcome = poll_until(
            "task",
            &policy(),
            &mut rx,
            || {
                calls += 1;
                async { Ok(Some(Step::Failed)) }
            },
            classify,
        )
        .await;

        assert_eq!(outcome, PollOutcome::Failed(Step::Failed));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_waiting() {
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            let _ = tx.send(true);
        });
        let start = Instant::now();

        let outcome = poll_until(
            "task",
            &policy(),
            &mut rx,
            || async { Ok(Some(Step::Running)) },
            classify,
        )
        .await;

        assert_eq!(outcome, PollOutcome::Cancelled(Some(Step::Running)));
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_shutdown_sender_does_not_cancel() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let mut script: VecDeque<Scripted> =
            VecDeque::from(vec![Ok(Some(Step::Running)), Ok(Some(Step::Completed))]);

        let outcome = poll_until(
            "task",
            &policy(),
            &mut rx,
            || {
                let next = script.pop_front().expect("scripted status");
                async move { next }
            },
            classify,
        )
        .await;

        assert_eq!(outcome, PollOutcome::Completed(Step::Completed));
    }
}
