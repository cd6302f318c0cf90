//! # ドメイン層エラー定義
//!
//! ビジネスルール違反を表現するエラー型。
//! API 層で 400 Bad Request に変換される。

use thiserror::Error;

/// ドメイン層で発生するエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// # 例
    ///
    /// - ユーザー名が空、長すぎる、空白を含む
    /// - シークレットが空、長すぎる
    /// - セッションの TTL が 0 以下
    #[error("バリデーションエラー: {0}")]
    Validation(String),
}
