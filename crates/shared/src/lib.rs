//! # High Peaks 共有ユーティリティ
//!
//! サービス本体（`apps/identity-service`）と各クレートで共有する、
//! ビジネスロジックを含まないユーティリティを配置する。
//!
//! - [`error_response`] - RFC 9457 Problem Details 形式のエラーレスポンス
//! - [`health`] - readiness チェックのレスポンス型
//! - [`observability`] - トレーシング初期化とリクエストスパン
//! - `canonical_log` - リクエストごとのサマリログ（`observability` feature）

#[cfg(feature = "observability")]
pub mod canonical_log;
pub mod error_response;
pub mod health;
pub mod observability;

pub use error_response::ErrorResponse;
pub use health::{CheckStatus, ReadinessResponse, ReadinessStatus};
