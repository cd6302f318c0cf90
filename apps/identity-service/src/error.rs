//! # Identity Service エラー定義
//!
//! ユースケース層のエラーと、HTTP レスポンスへの変換を定義する。
//!
//! `Expired` / `Revoked` はセッション管理の内部でのみ使い、
//! 認証境界で `Unauthenticated` に集約される。

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use highpeaks_domain::DomainError;
use highpeaks_infra::InfraError;
use highpeaks_shared::ErrorResponse;
use thiserror::Error;

/// Identity Service で発生するエラー
#[derive(Debug, Error)]
pub enum IdentityError {
    /// 入力値が不正
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// ユーザー名が既に使われている
    #[error("ユーザー名が重複しています: {0}")]
    DuplicateUsername(String),

    /// ユーザー名またはシークレットの誤り
    ///
    /// 未登録・無効化済みも同じエラーになる。
    #[error("ユーザー名またはシークレットが正しくありません")]
    InvalidCredentials,

    /// 対象が見つからない
    #[error("{0}が見つかりません")]
    NotFound(&'static str),

    /// セッションの有効期限切れ
    #[error("セッションの有効期限が切れています")]
    Expired,

    /// セッションが失効済み
    #[error("セッションは失効しています")]
    Revoked,

    /// 有効なセッションがない
    #[error("認証が必要です")]
    Unauthenticated,

    /// 権限不足
    #[error("権限がありません: {0}")]
    Forbidden(String),

    /// 再試行後もストレージが応答しない
    #[error("ストレージが応答しません")]
    StorageTimeout,

    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(#[source] InfraError),
}

impl From<InfraError> for IdentityError {
    fn from(e: InfraError) -> Self {
        if e.is_timeout() {
            Self::StorageTimeout
        } else {
            Self::Internal(e)
        }
    }
}

impl From<DomainError> for IdentityError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(msg) => Self::Validation(msg),
        }
    }
}

/// JSON ボディを解釈できない場合もバリデーションエラーとして返す
impl From<JsonRejection> for IdentityError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::Validation(msg) => ErrorResponse::validation_error(msg.clone()),
            Self::DuplicateUsername(username) => ErrorResponse::duplicate_username(username),
            Self::InvalidCredentials => ErrorResponse::invalid_credentials(),
            Self::NotFound(what) => ErrorResponse::not_found(format!("{what}が見つかりません")),
            Self::Expired | Self::Revoked | Self::Unauthenticated => {
                ErrorResponse::unauthenticated()
            }
            Self::Forbidden(msg) => ErrorResponse::forbidden(msg.clone()),
            Self::StorageTimeout => {
                tracing::warn!("ストレージが再試行後も応答しませんでした");
                ErrorResponse::storage_timeout()
            }
            Self::Internal(e) => {
                tracing::error!(
                    error.kind = "internal",
                    error.message = %e,
                    span_trace = %e.span_trace(),
                    "内部エラーが発生しました"
                );
                ErrorResponse::internal_error()
            }
        };

        let status =
            StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}
