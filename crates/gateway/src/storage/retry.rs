//! # リトライポリシー
//!
//! 一時的なストレージ障害に対する有限回の指数バックオフリトライ。
//! 各試行にはタイムアウトを設け、他のリクエストをブロックしない。

use std::future::Future;
use std::time::Duration;

use super::StoreError;

/// バックオフ待機時間の上限
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// リトライポリシー。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大試行回数（初回を含む、1以上）
    pub max_attempts: u32,
    /// 初回リトライ前の待機時間。以降は倍々で増加する
    pub base_delay: Duration,
    /// 1試行あたりのタイムアウト
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// `attempt` 回目の失敗後に待機する時間。
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// 操作を実行し、`StoreError::Transient` のときのみリトライする。
    ///
    /// タイムアウトは `Transient` として扱う。`NotFound` と `Rejected` は
    /// 入力に対して決定的な結果なので即座に返す。
    pub async fn run<T, F, Fut>(&self, operation: &str, key: &str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.attempt_timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Transient {
                    code: "timeout".to_string(),
                    retry_after_secs: None,
                }),
            };

            match result {
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        operation,
                        key,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "一時的なストレージ障害のためリトライします"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
