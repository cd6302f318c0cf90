//! # ストレージ呼び出しポリシー
//!
//! すべてのストレージ呼び出しに上限時間を設け、タイムアウトした場合だけ
//! バックオフ後に 1 回再試行する。2 回目もタイムアウトした場合は
//! [`InfraErrorKind::Timeout`](crate::InfraErrorKind::Timeout) を返す。
//!
//! タイムアウト以外のエラーは再試行しない。

use std::{future::Future, time::Duration};

use crate::InfraError;

/// タイムアウトと再試行の設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoragePolicy {
    /// 1 回の呼び出しの上限時間
    pub timeout:       Duration,
    /// 再試行前の待ち時間
    pub retry_backoff: Duration,
}

impl StoragePolicy {
    pub fn new(timeout: Duration, retry_backoff: Duration) -> Self {
        Self {
            timeout,
            retry_backoff,
        }
    }

    /// `call` を実行する
    ///
    /// `call` は再試行のために最大 2 回呼ばれる。
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, InfraError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InfraError>>,
    {
        match self.attempt(operation, call()).await {
            Err(e) if e.is_timeout() => {
                tracing::warn!(
                    storage.operation = operation,
                    storage.backoff_ms = self.retry_backoff.as_millis() as u64,
                    "ストレージ呼び出しがタイムアウトしたため再試行します"
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.attempt(operation, call()).await
            }
            other => other,
        }
    }

    async fn attempt<T, Fut>(&self, operation: &'static str, fut: Fut) -> Result<T, InfraError>
    where
        Fut: Future<Output = Result<T, InfraError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(InfraError::timeout(operation)),
        }
    }
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000), Duration::from_millis(100))
    }
}
