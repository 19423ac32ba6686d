//! Token bucket rate limiter
//!
//! Tokens refill continuously in proportion to elapsed time and are topped
//! up lazily on every check; no background timer runs. Failures that look
//! like throttling are retried with exponential backoff.

use super::types::{
    is_rate_limit_signal, ExecuteError, ExecuteOptions, RateLimitStatus, RateLimiterConfig,
    RetryClassifier, RetrySignal, PRIORITY_THRESHOLD,
};
use crate::logging::{log_info, log_warn, Logger};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Shortest sleep while waiting for a token
const MIN_TOKEN_WAIT: Duration = Duration::from_millis(1);

/// Mutable limiter state
#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    request_history: VecDeque<Instant>,
    rate_limit_errors: u64,
    current_backoff_ms: u64,
}

impl Bucket {
    fn full(config: &RateLimiterConfig) -> Self {
        Self {
            tokens: f64::from(config.max_requests),
            last_refill: Instant::now(),
            request_history: VecDeque::new(),
            rate_limit_errors: 0,
            current_backoff_ms: config.base_backoff_ms,
        }
    }
}

/// What can interrupt an `execute` call in progress
trait Interrupt: Sync {
    type Reason;

    fn wait(&self) -> impl Future<Output = Self::Reason> + Send;
}

/// Never fires
struct Uninterrupted;

impl Interrupt for Uninterrupted {
    type Reason = Infallible;

    fn wait(&self) -> impl Future<Output = Infallible> + Send {
        std::future::pending()
    }
}

impl Interrupt for CancellationToken {
    type Reason = ();

    fn wait(&self) -> impl Future<Output = ()> + Send {
        self.cancelled()
    }
}

/// Why a call stopped without a value
enum Stop<E, R> {
    Failed(E),
    Interrupted(R),
}

/// Token bucket rate limiter with rate-limit-aware retries.
///
/// State sits behind an async mutex, so one limiter can be shared by
/// reference between concurrent callers. The lock is never held across a
/// sleep or the wrapped operation.
pub struct RateLimiter {
    config: RateLimiterConfig,
    logger: Logger,
    classifier: Option<RetryClassifier>,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: RateLimiterConfig) -> Self {
        let config = config.normalized();
        Self {
            bucket: Mutex::new(Bucket::full(&config)),
            config,
            logger: Logger::default(),
            classifier: None,
        }
    }

    /// Create a rate limiter with default settings (60 requests per minute)
    pub fn default_limiter() -> Self {
        Self::new(RateLimiterConfig::default())
    }

    /// Route log messages to `logger`
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Replace the default 429 / message heuristic
    #[must_use]
    pub fn with_retry_classifier(
        mut self,
        classifier: impl Fn(&dyn RetrySignal) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.classifier = Some(std::sync::Arc::new(classifier));
        self
    }

    /// Effective configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Run `f` under the limiter.
    ///
    /// Rate-limited failures (per the configured classifier) are retried
    /// with doubling backoff until the retry budget runs out; any other
    /// failure is returned immediately and unchanged.
    pub async fn execute<T, E, F, Fut>(&self, f: F, options: ExecuteOptions) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetrySignal,
    {
        let is_retryable = |e: &E| self.classify(e);
        match self.run(f, options, is_retryable, &Uninterrupted).await {
            Ok(value) => Ok(value),
            Err(Stop::Failed(e)) => Err(e),
            Err(Stop::Interrupted(never)) => match never {},
        }
    }

    /// Like [`execute`](Self::execute) with a per-call retry predicate
    pub async fn execute_with<T, E, F, Fut, P>(
        &self,
        f: F,
        options: ExecuteOptions,
        is_retryable: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        match self.run(f, options, is_retryable, &Uninterrupted).await {
            Ok(value) => Ok(value),
            Err(Stop::Failed(e)) => Err(e),
            Err(Stop::Interrupted(never)) => match never {},
        }
    }

    /// Like [`execute`](Self::execute), abandoning token waits, backoff
    /// sleeps and the in-flight call once `cancel` fires
    pub async fn execute_with_cancel<T, E, F, Fut>(
        &self,
        f: F,
        options: ExecuteOptions,
        cancel: &CancellationToken,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetrySignal,
    {
        let is_retryable = |e: &E| self.classify(e);
        self.run(f, options, is_retryable, cancel)
            .await
            .map_err(|stop| match stop {
                Stop::Failed(e) => ExecuteError::Failed(e),
                Stop::Interrupted(()) => ExecuteError::Cancelled,
            })
    }

    /// Snapshot of bucket, window and backoff state
    pub async fn status(&self) -> RateLimitStatus {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        let now = Instant::now();
        self.prune_history(&mut bucket, now);

        RateLimitStatus {
            available_tokens: bucket.tokens,
            max_tokens: self.config.max_requests,
            requests_in_window: bucket.request_history.len(),
            rate_limit_errors: bucket.rate_limit_errors,
            current_backoff_ms: bucket.current_backoff_ms,
            time_window_ms: self.config.time_window_ms,
        }
    }

    /// Refill the bucket and clear history, error count and backoff
    pub async fn reset(&self) {
        *self.bucket.lock().await = Bucket::full(&self.config);
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn classify(&self, err: &dyn RetrySignal) -> bool {
        match &self.classifier {
            Some(classifier) => classifier(err),
            None => is_rate_limit_signal(err),
        }
    }

    async fn run<T, E, F, Fut, P, I>(
        &self,
        mut f: F,
        options: ExecuteOptions,
        is_retryable: P,
        interrupt: &I,
    ) -> Result<T, Stop<E, I::Reason>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        I: Interrupt,
    {
        let max_retries = options.retries.unwrap_or(self.config.retries);
        let mut retries_left = max_retries;

        loop {
            if options.priority {
                self.priority_pass(interrupt).await.map_err(Stop::Interrupted)?;
            } else {
                self.wait_for_token(interrupt)
                    .await
                    .map_err(Stop::Interrupted)?;
            }
            self.record_request().await;

            let result = tokio::select! {
                biased;
                reason = interrupt.wait() => return Err(Stop::Interrupted(reason)),
                result = f() => result,
            };

            match result {
                Ok(value) => {
                    self.bucket.lock().await.current_backoff_ms = self.config.base_backoff_ms;
                    return Ok(value);
                }
                Err(e) if retries_left > 0 && is_retryable(&e) => {
                    let backoff_ms = {
                        let mut bucket = self.bucket.lock().await;
                        bucket.rate_limit_errors += 1;
                        let backoff_ms = bucket.current_backoff_ms;
                        bucket.current_backoff_ms = backoff_ms.saturating_mul(2);
                        backoff_ms
                    };
                    let attempt = max_retries - retries_left + 1;
                    log_warn!(
                        self.logger,
                        "Rate limit exceeded. Backing off for {backoff_ms}ms before retry {attempt}/{max_retries}",
                    );
                    pause(Duration::from_millis(backoff_ms), interrupt)
                        .await
                        .map_err(Stop::Interrupted)?;
                    retries_left -= 1;
                }
                Err(e) => return Err(Stop::Failed(e)),
            }
        }
    }

    /// Block until a whole token is available, then take it
    async fn wait_for_token<I: Interrupt>(&self, interrupt: &I) -> Result<(), I::Reason> {
        loop {
            let wait_ms = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let needed = 1.0 - bucket.tokens;
                    Some(needed / f64::from(self.config.max_requests) * self.window_ms())
                }
            };

            match wait_ms {
                None => {
                    if self.config.min_delay_ms > 0 {
                        pause(Duration::from_millis(self.config.min_delay_ms), interrupt).await?;
                    }
                    return Ok(());
                }
                Some(wait_ms) => {
                    log_info!(
                        self.logger,
                        "Rate limit approaching. Waiting {wait_ms:.0}ms before next request",
                    );
                    // A zero-length sleep would leave the refill nothing to add
                    let wait = Duration::from_secs_f64(wait_ms / 1000.0).max(MIN_TOKEN_WAIT);
                    pause(wait, interrupt).await?;
                }
            }
        }
    }

    /// Priority calls take no token and only pay `min_delay_ms` when the
    /// bucket is running low
    async fn priority_pass<I: Interrupt>(&self, interrupt: &I) -> Result<(), I::Reason> {
        let throttle = {
            let mut bucket = self.bucket.lock().await;
            self.refill(&mut bucket);
            priority_throttled(bucket.tokens, self.config.max_requests)
        };

        if throttle {
            log_info!(self.logger, "Processing high-priority request with limited rate limiting");
            pause(Duration::from_millis(self.config.min_delay_ms), interrupt).await?;
        }
        Ok(())
    }

    async fn record_request(&self) {
        let now = Instant::now();
        let mut bucket = self.bucket.lock().await;
        bucket.request_history.push_back(now);
        self.prune_history(&mut bucket, now);
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed_ms = now.saturating_duration_since(bucket.last_refill).as_secs_f64() * 1000.0;
        if elapsed_ms > 0.0 {
            let max = f64::from(self.config.max_requests);
            let added = elapsed_ms / self.window_ms() * max;
            bucket.tokens = (bucket.tokens + added).min(max);
            bucket.last_refill = now;
        }
    }

    fn prune_history(&self, bucket: &mut Bucket, now: Instant) {
        let Some(cutoff) = now.checked_sub(Duration::from_millis(self.config.time_window_ms))
        else {
            return;
        };
        while bucket
            .request_history
            .front()
            .is_some_and(|&start| start < cutoff)
        {
            bucket.request_history.pop_front();
        }
    }

    fn window_ms(&self) -> f64 {
        self.config.time_window_ms as f64
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::default_limiter()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("has_classifier", &self.classifier.is_some())
            .finish_non_exhaustive()
    }
}

/// Strictly below a quarter of capacity; exactly 25% is not throttled
pub(crate) fn priority_throttled(tokens: f64, max_requests: u32) -> bool {
    tokens < f64::from(max_requests) * PRIORITY_THRESHOLD
}

/// Sleep for `duration` unless interrupted first
async fn pause<I: Interrupt>(duration: Duration, interrupt: &I) -> Result<(), I::Reason> {
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        reason = interrupt.wait() => Err(reason),
        () = sleep(duration) => Ok(()),
    }
}
