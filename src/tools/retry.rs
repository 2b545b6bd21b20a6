//! 远程调用重试策略
//!
//! 有界指数退避：第 n 次失败后睡 min(cap, initial * multiplier^(n-1))。
//! 只包住工具动作里真正出网的那一段闭包，本地格式化逻辑不在重试范围内。
//! 不可重试的错误（4xx 业务拒绝、响应解析失败）立即原样抛出，不消耗剩余次数。

use std::future::Future;
use std::time::Duration;

use crate::config::RetrySection;
use crate::tools::ToolError;

/// 重试策略：显式构造、显式注入，调用方决定包住哪段调用
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: u32,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2,
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        multiplier: u32,
        max_backoff: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier,
            max_backoff,
        }
    }

    pub fn from_config(cfg: &RetrySection) -> Self {
        Self::new(
            cfg.max_attempts,
            Duration::from_secs(cfg.initial_backoff_secs),
            cfg.multiplier,
            Duration::from_secs(cfg.max_backoff_secs),
        )
    }

    /// 第 attempt 次（1 起）失败后的退避时长
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// 执行一次可失败的远程调用；可重试错误按退避重试，最终失败原样返回
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, ToolError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(attempts = attempt, error = %e, "retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), 2, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn succeeds_after_two_retryable_failures() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = policy
            .call(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ToolError::Status {
                        status: 503,
                        message: "busy".into(),
                    })
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 两次退避：10ms + 20ms
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn terminal_fault_propagates_without_retry() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = policy
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ToolError::Status {
                    status: 404,
                    message: "missing".into(),
                })
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ToolError::Status { status: 404, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error_unchanged() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ToolError::Timeout("slow upstream".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            ToolError::Timeout(msg) => assert_eq!(msg, "slow upstream"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), 2, Duration::from_secs(10));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(8));
        assert_eq!(policy.backoff(5), Duration::from_secs(10));
        assert_eq!(policy.backoff(8), Duration::from_secs(10));
    }
}
