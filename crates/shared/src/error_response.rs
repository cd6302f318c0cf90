//! # エラーレスポンス（RFC 9457 Problem Details）
//!
//! HTTP API が返すエラーボディの共通型。
//!
//! `ErrorResponse` は `Serialize` / `Deserialize` のみを持つ純粋なデータ構造で、
//! axum の `IntoResponse` 変換はサービス側で行う。

use serde::{Deserialize, Serialize};

/// error_type URI のベースパス
const ERROR_TYPE_BASE: &str = "https://highpeaks.example.com/errors";

/// エラーレスポンス（RFC 9457 Problem Details）
///
/// `type` フィールドは URI で問題の種類を識別する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub error_type: String,
    pub title:      String,
    pub status:     u16,
    pub detail:     String,
}

impl ErrorResponse {
    /// 汎用コンストラクタ
    ///
    /// `error_type_suffix` はベース URI に付加される（例: `"duplicate-username"`）。
    pub fn new(
        error_type_suffix: &str,
        title: impl Into<String>,
        status: u16,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            error_type: format!("{ERROR_TYPE_BASE}/{error_type_suffix}"),
            title: title.into(),
            status,
            detail: detail.into(),
        }
    }

    /// 400 Validation Error
    pub fn validation_error(detail: impl Into<String>) -> Self {
        Self::new("validation-error", "Validation Error", 400, detail)
    }

    /// 401 ログイン失敗
    ///
    /// 未登録・無効化済み・シークレット誤りを区別しないため detail は固定。
    pub fn invalid_credentials() -> Self {
        Self::new(
            "invalid-credentials",
            "Unauthorized",
            401,
            "ユーザー名またはシークレットが正しくありません",
        )
    }

    /// 401 未認証
    ///
    /// トークンの欠落・期限切れ・失効を区別しないため detail は固定。
    pub fn unauthenticated() -> Self {
        Self::new("unauthenticated", "Unauthorized", 401, "認証が必要です")
    }

    /// 403 Forbidden
    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new("forbidden", "Forbidden", 403, detail)
    }

    /// 404 Not Found
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new("not-found", "Not Found", 404, detail)
    }

    /// 409 ユーザー名の重複
    pub fn duplicate_username(username: &str) -> Self {
        Self::new(
            "duplicate-username",
            "Conflict",
            409,
            format!("ユーザー名 {username} は既に使われています"),
        )
    }

    /// 500 Internal Server Error
    ///
    /// detail は固定値（内部情報を漏らさないため）。
    pub fn internal_error() -> Self {
        Self::new(
            "internal-error",
            "Internal Server Error",
            500,
            "内部エラーが発生しました",
        )
    }

    /// 503 ストレージのタイムアウト
    pub fn storage_timeout() -> Self {
        Self::new(
            "storage-timeout",
            "Service Unavailable",
            503,
            "ストレージが応答しません。しばらくしてから再試行してください",
        )
    }
}
