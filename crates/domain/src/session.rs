//! # セッション
//!
//! 1 つのアイデンティティに紐づく、期限付きで失効可能な認証の証明。
//!
//! ## 状態遷移
//!
//! ```text
//!            ┌── 時間経過 ──→ Expired（終端）
//! Active ────┤
//!            └── revoke ───→ Revoked（終端）
//! ```
//!
//! 状態は保存せず、`revoked` フラグと `expires_at` から
//! [`Session::state_at`] で都度判定する（有効期限は遅延評価）。

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore as _;

use crate::{DomainError, identity::IdentityId};

/// トークンのエントロピー（バイト）
///
/// 32 バイト = 256 ビット。
const TOKEN_BYTES: usize = 32;

/// ログに出してよいトークン先頭の文字数
const FINGERPRINT_LEN: usize = 8;

/// セッショントークン
///
/// CSPRNG で生成した 256 ビットの乱数を URL-safe Base64（パディングなし）で表現する。
/// Debug 出力ではマスクし、ログには [`fingerprint`](SessionToken::fingerprint) のみを出す。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionToken").field(&"[REDACTED]").finish()
    }
}

impl SessionToken {
    /// 新しいトークンを生成する
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// クライアントから受け取った文字列をラップする
    ///
    /// 形式は検証しない。存在しないトークンとして扱われるだけ。
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ログ出力用の先頭数文字
    pub fn fingerprint(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(FINGERPRINT_LEN)
            .map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

/// ある時点でのセッション状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    Active,
    Expired,
    Revoked,
}

/// セッションエンティティ
///
/// # 不変条件
///
/// - `expires_at > issued_at`
/// - 失効済みのセッションは期限前でも再び有効にならない
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: SessionToken,
    identity_id: IdentityId,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

impl Session {
    /// 新しいセッションを発行する
    ///
    /// # エラー
    ///
    /// `ttl` が 0 以下の場合、または `now + ttl` が日時の範囲を超える場合は
    /// `DomainError::Validation`。
    pub fn issue(
        token: SessionToken,
        identity_id: IdentityId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, DomainError> {
        if ttl <= Duration::zero() {
            return Err(DomainError::Validation(
                "セッションの有効期間は正の値である必要があります".to_string(),
            ));
        }

        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            DomainError::Validation("セッションの有効期間が長すぎます".to_string())
        })?;

        Ok(Self {
            token,
            identity_id,
            issued_at: now,
            expires_at,
            revoked: false,
        })
    }

    /// 永続化されたデータから復元する
    pub fn from_db(
        token: SessionToken,
        identity_id: IdentityId,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        revoked: bool,
    ) -> Self {
        Self {
            token,
            identity_id,
            issued_at,
            expires_at,
            revoked,
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn identity_id(&self) -> &IdentityId {
        &self.identity_id
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// `now` 時点の状態を判定する
    ///
    /// 失効を先に判定する。`expires_at` ちょうどは期限切れとみなす。
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if self.revoked {
            SessionState::Revoked
        } else if now >= self.expires_at {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }

    /// 失効させた新しいインスタンスを返す
    ///
    /// 終端状態（Expired / Revoked）からは遷移しないため、そのまま返す。
    pub fn revoked(self, now: DateTime<Utc>) -> Self {
        match self.state_at(now) {
            SessionState::Active => Self {
                revoked: true,
                ..self
            },
            SessionState::Expired | SessionState::Revoked => self,
        }
    }

    /// レコードを削除してよくなる時刻（`expires_at + retention`）
    ///
    /// 日時の範囲を超える場合は `None`。
    pub fn purge_at(&self, retention: Duration) -> Option<DateTime<Utc>> {
        self.expires_at.checked_add_signed(retention)
    }

    /// 保持期間を過ぎて削除してよいか判定する
    ///
    /// 削除時刻が日時の範囲を超える場合は削除しない。
    pub fn is_purgeable(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.purge_at(retention).is_some_and(|purge_at| now >= purge_at)
    }
}
