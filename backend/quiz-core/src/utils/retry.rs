use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            jitter_max: Some(Duration::from_millis(100)),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Retries every error until attempts run out.
pub async fn retry_async_with_config<F, Fut, T, E>(config: RetryConfig, f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    retry_async_if(config, f, |_| true).await
}

/// Retries while `should_retry` accepts the error; permanent errors return
/// immediately.
pub async fn retry_async_if<F, Fut, T, E, P>(
    config: RetryConfig,
    mut f: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts_left = config.max_attempts.max(1);
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 || !should_retry(&e) {
                    return Err(e);
                }

                let wait = match config.jitter_max {
                    Some(jitter_max) => {
                        let jitter_ms = jitter_max.as_millis() as u64;
                        let extra = if jitter_ms == 0 {
                            0
                        } else {
                            rand::random::<u64>() % (jitter_ms + 1)
                        };
                        backoff + Duration::from_millis(extra)
                    }
                    None => backoff,
                };
                tracing::debug!(
                    "Retrying after {:?} ({} attempts left)",
                    wait,
                    attempts_left
                );
                tokio::time::sleep(wait).await;

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}
