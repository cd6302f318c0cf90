//! # パスワード
//!
//! 認証情報（シークレット）関連の値オブジェクトを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 用途 |
//! |---|------------|------|
//! | [`PlainPassword`] | 平文シークレット | ログイン・登録・ローテーション時の入力値 |
//! | [`PasswordHash`] | 認証情報ハッシュ | 永続化用のソルト付き一方向ハッシュ |
//! | [`PasswordVerifyResult`] | 検証結果 | シークレット検証の成否 |

use crate::DomainError;

/// シークレットの最大バイト数
const MAX_SECRET_BYTES: usize = 1024;

/// 平文シークレット
///
/// 永続化もログ出力もしない。Debug 出力では値をマスクする。
#[derive(Clone)]
pub struct PlainPassword(String);

impl std::fmt::Debug for PlainPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PlainPassword").field(&"[REDACTED]").finish()
    }
}

impl PlainPassword {
    /// 検証せずにラップする
    ///
    /// ログイン時の入力値に使う。形式が不正な入力も、
    /// 照合に失敗するだけで区別しない。
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// 登録・ローテーション用に検証してからラップする
    ///
    /// # エラー
    ///
    /// 空文字列、または 1024 バイトを超える場合は `DomainError::Validation`。
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();

        if value.is_empty() {
            return Err(DomainError::Validation(
                "シークレットは必須です".to_string(),
            ));
        }

        if value.len() > MAX_SECRET_BYTES {
            return Err(DomainError::Validation(format!(
                "シークレットは {MAX_SECRET_BYTES} バイト以内である必要があります"
            )));
        }

        Ok(Self(value))
    }

    /// 文字列参照を取得する
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 認証情報ハッシュ（PHC 文字列形式）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// ハッシュ文字列からインスタンスを作成する
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// シークレット検証結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordVerifyResult {
    /// 一致した
    Match,
    /// 一致しなかった
    Mismatch,
}

impl PasswordVerifyResult {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch)
    }
}

impl From<bool> for PasswordVerifyResult {
    fn from(matched: bool) -> Self {
        if matched { Self::Match } else { Self::Mismatch }
    }
}
