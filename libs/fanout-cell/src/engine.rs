use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use rate_limiter_cell::RateLimiter;

use crate::error::TaskError;

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    pub max_concurrency: usize,
    pub per_task_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

/// A unit of work submitted to the engine. `timeout` overrides
/// `FanoutConfig::per_task_timeout` for this task alone — the progressive
/// timeout policy builds these with a shorter timeout for near-term dates.
pub struct FanoutTask<F> {
    pub run: F,
    pub timeout: Option<Duration>,
}

impl<F> FanoutTask<F> {
    pub fn new(run: F) -> Self {
        Self { run, timeout: None }
    }

    pub fn with_timeout(run: F, timeout: Duration) -> Self {
        Self {
            run,
            timeout: Some(timeout),
        }
    }
}

#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub result: Result<T, TaskError>,
    pub duration: Duration,
    pub attempts: u32,
}

/// Bounded-concurrency executor: `max_concurrency` tasks run at once, each
/// failed attempt classified and retried with exponential backoff unless
/// permanent/conflict, each retry re-acquiring the shared
/// rate limiter. A batch-wide deadline cancels whatever is still in
/// flight and reports those tasks as cancelled rather than letting the
/// batch hang.
pub struct FanoutEngine {
    config: FanoutConfig,
    rate_limiter: Arc<RateLimiter>,
}

impl FanoutEngine {
    pub fn new(config: FanoutConfig, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            config,
            rate_limiter,
        }
    }

    pub async fn execute<F, Fut, T>(
        &self,
        tasks: Vec<FanoutTask<F>>,
        batch_deadline: Option<Duration>,
    ) -> Vec<TaskOutcome<T>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
        T: Send + 'static,
    {
        let n = tasks.len();
        debug!(count = n, "starting fan-out batch");
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let results: Arc<Mutex<Vec<Option<TaskOutcome<T>>>>> =
            Arc::new(Mutex::new((0..n).map(|_| None).collect()));

        let mut abort_handles = Vec::with_capacity(n);
        let mut join_handles = Vec::with_capacity(n);

        for (index, task) in tasks.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let rate_limiter = self.rate_limiter.clone();
            let config = self.config.clone();
            let results = results.clone();
            let per_task_timeout = task.timeout.unwrap_or(config.per_task_timeout);
            let run = task.run;

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let outcome = run_with_retry(&run, &config, &rate_limiter, per_task_timeout).await;
                results.lock().await[index] = Some(outcome);
            });
            abort_handles.push(handle.abort_handle());
            join_handles.push(handle);
        }

        let all = futures::future::join_all(join_handles);
        let finished = match batch_deadline {
            Some(deadline) => tokio::time::timeout(deadline, all).await.is_ok(),
            None => {
                all.await;
                true
            }
        };

        if !finished {
            warn!("batch deadline exceeded, cancelling in-flight tasks");
            for handle in &abort_handles {
                handle.abort();
            }
        }

        results
            .lock()
            .await
            .drain(..)
            .map(|entry| {
                entry.unwrap_or(TaskOutcome {
                    result: Err(TaskError::Cancelled),
                    duration: Duration::ZERO,
                    attempts: 0,
                })
            })
            .collect()
    }
}

async fn run_with_retry<F, Fut, T>(
    task: &F,
    config: &FanoutConfig,
    rate_limiter: &RateLimiter,
    per_task_timeout: Duration,
) -> TaskOutcome<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let start = Instant::now();

    for attempt in 0..=config.max_retries {
        rate_limiter.acquire().await;
        let attempt_result = tokio::time::timeout(per_task_timeout, task()).await;

        match attempt_result {
            Ok(Ok(value)) => {
                return TaskOutcome {
                    result: Ok(value),
                    duration: start.elapsed(),
                    attempts: attempt + 1,
                }
            }
            Ok(Err(e)) if !e.is_retryable() || attempt == config.max_retries => {
                return TaskOutcome {
                    result: Err(e),
                    duration: start.elapsed(),
                    attempts: attempt + 1,
                }
            }
            Ok(Err(_)) => {
                tokio::time::sleep(config.backoff_base * 2u32.pow(attempt)).await;
            }
            Err(_) if attempt == config.max_retries => {
                return TaskOutcome {
                    result: Err(TaskError::Timeout),
                    duration: start.elapsed(),
                    attempts: attempt + 1,
                }
            }
            Err(_) => {
                tokio::time::sleep(config.backoff_base * 2u32.pow(attempt)).await;
            }
        }
    }

    unreachable!("loop always returns on its final iteration")
}

/// Progressive timeout policy: dates closer to today lean on the cache
/// more often and get a shorter per-task timeout; dates further out get
/// the full configured timeout.
pub fn progressive_timeout(days_ahead: i64, config: &FanoutConfig) -> Duration {
    let base = config.per_task_timeout;
    if days_ahead <= 2 {
        base.mul_f64(0.6)
    } else if days_ahead <= 6 {
        base.mul_f64(0.85)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn engine(config: FanoutConfig) -> FanoutEngine {
        FanoutEngine::new(config, Arc::new(RateLimiter::new(1000, Duration::from_secs(60))))
    }

    #[tokio::test]
    async fn all_tasks_succeed_and_preserve_order() {
        let e = engine(FanoutConfig {
            max_concurrency: 4,
            per_task_timeout: Duration::from_millis(200),
            max_retries: 0,
            backoff_base: Duration::from_millis(1),
        });

        let tasks: Vec<_> = (0..5)
            .map(|i| FanoutTask::new(move || async move { Ok::<_, TaskError>(i) }))
            .collect();

        let results = e.execute(tasks, None).await;
        let values: Vec<i32> = results.into_iter().map(|r| r.result.unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let e = engine(FanoutConfig {
            max_concurrency: 1,
            per_task_timeout: Duration::from_millis(100),
            max_retries: 3,
            backoff_base: Duration::from_millis(1),
        });

        let task = FanoutTask::new(move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TaskError::Permanent("nope".to_string()))
            }
        });

        let results = e.execute(vec![task], None).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(results[0].result.is_err());
        assert_eq!(results[0].attempts, 1);
    }

    #[tokio::test]
    async fn transient_error_retries_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let e = engine(FanoutConfig {
            max_concurrency: 1,
            per_task_timeout: Duration::from_millis(100),
            max_retries: 3,
            backoff_base: Duration::from_millis(1),
        });

        let task = FanoutTask::new(move || {
            let attempts = attempts_clone.clone();
            async move {
                let count = attempts.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(TaskError::Transient("try again".to_string()))
                } else {
                    Ok(42)
                }
            }
        });

        let results = e.execute(vec![task], None).await;
        assert_eq!(results[0].result.as_ref().unwrap(), &42);
        assert_eq!(results[0].attempts, 3);
    }

    #[tokio::test]
    async fn batch_deadline_cancels_slow_tasks() {
        let e = engine(FanoutConfig {
            max_concurrency: 2,
            per_task_timeout: Duration::from_secs(5),
            max_retries: 0,
            backoff_base: Duration::from_millis(1),
        });

        let task = FanoutTask::new(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, TaskError>(1)
        });

        let results = e
            .execute(vec![task], Some(Duration::from_millis(50)))
            .await;
        assert!(matches!(results[0].result, Err(TaskError::Cancelled)));
    }

    #[test]
    fn progressive_timeout_shortens_for_near_dates() {
        let config = FanoutConfig {
            max_concurrency: 8,
            per_task_timeout: Duration::from_secs(20),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        };
        assert!(progressive_timeout(0, &config) < progressive_timeout(7, &config));
        assert_eq!(progressive_timeout(10, &config), config.per_task_timeout);
    }
}
