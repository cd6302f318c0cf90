//! # インフラ層エラー定義
//!
//! データベース・Redis・ハッシュ計算で発生するエラーを表現する。
//!
//! ## 構造
//!
//! `std::io::Error` と同じ struct + enum パターン:
//! - [`InfraError`]: エラー種別（[`InfraErrorKind`]）と [`SpanTrace`] を保持するラッパー
//! - [`InfraErrorKind`]: エラーの具体的な種別
//!
//! `From` 実装と convenience constructor は生成時点のスパン情報を自動で捕捉する。

use std::fmt;

use derive_more::Display;
use thiserror::Error;
use tracing_error::SpanTrace;

/// インフラ層で発生するエラー
///
/// エラー種別に応じた処理には [`kind()`](InfraError::kind) を使用する:
///
/// ```ignore
/// match error.kind() {
///     InfraErrorKind::Conflict { entity, key } => { /* 一意制約違反 */ }
///     InfraErrorKind::Timeout { .. } => { /* 再試行可能 */ }
///     _ => { /* その他 */ }
/// }
/// ```
#[derive(Display)]
#[display("{kind}")]
pub struct InfraError {
    kind:       InfraErrorKind,
    span_trace: SpanTrace,
}

/// インフラ層エラーの種別
#[derive(Debug, Error)]
pub enum InfraErrorKind {
    /// データベースエラー
    #[error("データベースエラー: {0}")]
    Database(#[source] sqlx::Error),

    /// Redis エラー
    #[error("Redis エラー: {0}")]
    Redis(#[source] redis::RedisError),

    /// 一意制約違反
    ///
    /// 同じユーザー名のアイデンティティが既に存在する場合など。
    #[error("一意制約に違反しました: {entity}(key={key})")]
    Conflict {
        /// エンティティ名（例: "Identity"）
        entity: String,
        /// 衝突したキー
        key:    String,
    },

    /// ストレージ呼び出しのタイムアウト
    ///
    /// 再試行可能なエラー。[`StoragePolicy`](crate::StoragePolicy) が 1 回だけ再試行する。
    #[error("ストレージ呼び出しがタイムアウトしました: {operation}")]
    Timeout {
        /// 操作名（例: "identity.insert"）
        operation: String,
    },

    /// 永続化データの破損
    ///
    /// 保存済みの値がドメインモデルに復元できない場合。
    #[error("永続化データが不正です: {0}")]
    Corrupted(String),

    /// 予期しないエラー
    #[error("予期しないエラー: {0}")]
    Unexpected(String),
}

// ===== InfraError のメソッド =====

impl InfraError {
    /// エラー種別を取得する
    pub fn kind(&self) -> &InfraErrorKind {
        &self.kind
    }

    /// SpanTrace を取得する
    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    /// 再試行可能なタイムアウトかどうか
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, InfraErrorKind::Timeout { .. })
    }

    /// 一意制約違反かどうか
    pub fn is_conflict(&self) -> bool {
        matches!(self.kind, InfraErrorKind::Conflict { .. })
    }

    fn with_kind(kind: InfraErrorKind) -> Self {
        Self {
            kind,
            span_trace: SpanTrace::capture(),
        }
    }

    // ===== Convenience constructors =====

    /// 一意制約違反エラーを生成する
    pub fn conflict(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::with_kind(InfraErrorKind::Conflict {
            entity: entity.into(),
            key:    key.into(),
        })
    }

    /// タイムアウトエラーを生成する
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::with_kind(InfraErrorKind::Timeout {
            operation: operation.into(),
        })
    }

    /// データ破損エラーを生成する
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::with_kind(InfraErrorKind::Corrupted(msg.into()))
    }

    /// 予期しないエラーを生成する
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::with_kind(InfraErrorKind::Unexpected(msg.into()))
    }
}

// ===== トレイト実装 =====

impl fmt::Debug for InfraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfraError")
            .field("kind", &self.kind)
            .field("span_trace", &self.span_trace)
            .finish()
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

// ===== From 実装（SpanTrace 自動キャプチャ） =====

impl From<sqlx::Error> for InfraError {
    fn from(source: sqlx::Error) -> Self {
        // 接続プールの取得待ちは再試行で回復しうる
        if matches!(source, sqlx::Error::PoolTimedOut) {
            return Self::timeout("database.acquire");
        }
        Self::with_kind(InfraErrorKind::Database(source))
    }
}

impl From<redis::RedisError> for InfraError {
    fn from(source: redis::RedisError) -> Self {
        if source.is_timeout() {
            return Self::timeout("redis.command");
        }
        Self::with_kind(InfraErrorKind::Redis(source))
    }
}
