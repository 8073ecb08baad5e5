use crate::prelude::*;
use chrono::prelude::*;
use retry_policies::policies::ExponentialBackoff;
use retry_policies::{RetryDecision, RetryPolicy};
use std::future::Future;
use std::time::Duration;

/// How the caller classifies a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Retryability {
    Transient {
        /// Delay explicitly requested by the remote side
        retry_after: Option<Duration>,
    },
    Permanent,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryConfig {
    pub(crate) max_retries: u32,

    /// The upper bound for the delay between attempts. If the remote side
    /// asks to wait longer than this we give up right away.
    pub(crate) max_delay: Duration,
}

pub(crate) struct Attempted<T> {
    pub(crate) output: T,
    pub(crate) attempts: u32,
}

/// Runs `f` until it succeeds, fails with a permanent error or the retry
/// budget is exhausted. `f` receives the zero-based index of the attempt.
pub(crate) async fn retry_transient<T, E, Fut>(
    config: RetryConfig,
    mut f: impl FnMut(u32) -> Fut,
    classify: impl Fn(&E) -> Retryability,
) -> Attempted<Result<T, E>>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    let policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(200), config.max_delay)
        .build_with_max_retries(config.max_retries);

    let mut attempt = 0;
    loop {
        let err = match f(attempt).await {
            Ok(output) => {
                if attempt > 0 {
                    warn!(%attempt, "Operation succeeded after a retry");
                }
                return Attempted {
                    output: Ok(output),
                    attempts: attempt + 1,
                };
            }
            Err(err) => err,
        };

        let give_up = |err| Attempted {
            output: Err(err),
            attempts: attempt + 1,
        };

        let retry_after = match classify(&err) {
            Retryability::Transient { retry_after } => retry_after,
            Retryability::Permanent => {
                if attempt > 0 {
                    warn!(%attempt, "Operation failed with a non-retryable error after a retry");
                }
                return give_up(err);
            }
        };

        let execute_after = match policy.should_retry(attempt) {
            RetryDecision::Retry { execute_after } => execute_after,
            RetryDecision::DoNotRetry => {
                warn!(
                    %attempt,
                    err = tracing_err(&err),
                    "Giving up retrying the operation"
                );
                return give_up(err);
            }
        };

        let backoff = execute_after
            .signed_duration_since(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        let duration = match retry_after {
            Some(retry_after) if retry_after > config.max_delay => {
                warn!(
                    retry_after = tracing_duration(retry_after),
                    max_delay = tracing_duration(config.max_delay),
                    "Remote side asked to wait for too long, giving up",
                );
                return give_up(err);
            }
            Some(retry_after) => retry_after,
            None => backoff,
        };

        warn!(
            %attempt,
            err = tracing_err(&err),
            duration = tracing_duration(duration),
            "Sleeping before the next attempt",
        );

        tokio::time::sleep(duration).await;

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("boom (transient: {0})")]
    struct Boom(bool);

    fn classify(err: &Boom) -> Retryability {
        if err.0 {
            Retryability::Transient {
                retry_after: Some(Duration::ZERO),
            }
        } else {
            Retryability::Permanent
        }
    }

    const CONFIG: RetryConfig = RetryConfig {
        max_retries: 1,
        max_delay: Duration::from_secs(1),
    };

    #[test_log::test(tokio::test)]
    async fn transient_errors_are_retried_within_budget() {
        let calls = AtomicU32::new(0);

        let attempted = retry_transient(
            CONFIG,
            |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Boom(true))
            },
            classify,
        )
        .await;

        assert!(attempted.output.is_err());
        assert_eq!(attempted.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test_log::test(tokio::test)]
    async fn permanent_errors_are_not_retried() {
        let attempted = retry_transient(CONFIG, |_| async { Err::<(), _>(Boom(false)) }, classify).await;

        assert!(attempted.output.is_err());
        assert_eq!(attempted.attempts, 1);
    }

    #[test_log::test(tokio::test)]
    async fn succeeds_on_second_attempt() {
        let attempted = retry_transient(
            CONFIG,
            |attempt| async move {
                if attempt == 0 {
                    return Err(Boom(true));
                }
                Ok(attempt)
            },
            classify,
        )
        .await;

        assert_eq!(attempted.output.unwrap(), 1);
        assert_eq!(attempted.attempts, 2);
    }

    #[test_log::test(tokio::test)]
    async fn too_long_retry_after_gives_up() {
        let attempted = retry_transient(
            CONFIG,
            |_| async { Err::<(), _>(Boom(true)) },
            |_| Retryability::Transient {
                retry_after: Some(Duration::from_secs(60)),
            },
        )
        .await;

        assert_eq!(attempted.attempts, 1);
    }
}
