//! # アイデンティティ
//!
//! プロビジョニングされたアカウント（ユーザー名とロールを持つ）を定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 備考 |
//! |---|------------|------|
//! | [`Identity`] | アイデンティティ | 物理削除しない（無効化のみ） |
//! | [`Username`] | ユーザー名 | 大文字小文字を区別せず一意 |
//! | [`Role`] | ロール | `Administrator` / `User` |
//! | [`Capability`] | 操作権限 | ロールに対するタグ付き判定 |
//!
//! ## 使用例
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use highpeaks_domain::{
//!     identity::{Capability, Identity, IdentityId, Role, Username},
//!     password::PasswordHash,
//! };
//!
//! let identity = Identity::new(
//!     IdentityId::new(),
//!     Username::new("Alice")?,
//!     PasswordHash::new("$argon2id$..."),
//!     Role::User,
//!     chrono::Utc::now(),
//! );
//!
//! assert!(identity.is_active());
//! assert_eq!(identity.username().key(), "alice");
//! assert!(!identity.role().allows(Capability::ListIdentities));
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{DomainError, password::PasswordHash};

/// ユーザー名の最大文字数
const USERNAME_MAX_LENGTH: usize = 64;

/// アイデンティティ ID
///
/// UUID v7。一度割り当てたら変更しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct IdentityId(Uuid);

impl IdentityId {
    /// 新しい ID を生成する（UUID v7）
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

/// ユーザー名（値オブジェクト）
///
/// 入力された表記のまま保持し、一意性の比較には小文字化した
/// [`key`](Username::key) を使う。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    /// ユーザー名を作成する
    ///
    /// # バリデーション
    ///
    /// - 前後の空白は除去する
    /// - 空文字列ではない
    /// - 最大 64 文字
    /// - 空白文字・制御文字を含まない
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_string();

        if value.is_empty() {
            return Err(DomainError::Validation("ユーザー名は必須です".to_string()));
        }

        if value.chars().count() > USERNAME_MAX_LENGTH {
            return Err(DomainError::Validation(format!(
                "ユーザー名は {USERNAME_MAX_LENGTH} 文字以内である必要があります"
            )));
        }

        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DomainError::Validation(
                "ユーザー名に空白・制御文字は使用できません".to_string(),
            ));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 一意性判定用のキー（小文字化）
    ///
    /// 小文字化で文字数が増えることがあるため、64 文字を超える場合がある。
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ロール
///
/// 文字列表現は `"Administrator"` / `"User"`。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoStaticStr,
    EnumString,
    strum::Display,
)]
pub enum Role {
    Administrator,
    User,
}

impl Role {
    /// このロールが操作権限を持つか判定する
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::ListIdentities | Capability::ManageIdentities => {
                matches!(self, Self::Administrator)
            }
        }
    }
}

/// 保護された操作の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Capability {
    /// アイデンティティ一覧の参照
    ListIdentities,
    /// プロビジョニング・ロール変更・無効化
    ManageIdentities,
}

/// アイデンティティの状態
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IdentityStatus {
    /// ログイン可能
    Active,
    /// 無効化済み（監査のためレコードは残す）
    Deactivated,
}

impl std::str::FromStr for IdentityStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deactivated" => Ok(Self::Deactivated),
            _ => Err(DomainError::Validation(format!(
                "不正なアイデンティティ状態: {s}"
            ))),
        }
    }
}

/// アイデンティティエンティティ
///
/// # 不変条件
///
/// - `id` は変更されない
/// - `username` は大文字小文字を区別せず一意（ストアが保証する）
/// - 変更はロール変更・認証情報ローテーション・無効化のみ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    id: IdentityId,
    username: Username,
    credential_hash: PasswordHash,
    role: Role,
    status: IdentityStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Identity {
    /// 新しいアイデンティティを作成する（状態は `Active`）
    pub fn new(
        id: IdentityId,
        username: Username,
        credential_hash: PasswordHash,
        role: Role,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            username,
            credential_hash,
            role,
            status: IdentityStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// 永続化されたデータから復元する
    pub fn from_db(
        id: IdentityId,
        username: Username,
        credential_hash: PasswordHash,
        role: Role,
        status: IdentityStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            username,
            credential_hash,
            role,
            status,
            created_at,
            updated_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &IdentityId {
        &self.id
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn credential_hash(&self) -> &PasswordHash {
        &self.credential_hash
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> IdentityStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // ビジネスロジックメソッド

    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }

    /// ロールを変更した新しいインスタンスを返す
    pub fn with_role(self, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            role,
            updated_at: now,
            ..self
        }
    }

    /// 認証情報ハッシュを差し替えた新しいインスタンスを返す
    pub fn with_credential(self, credential_hash: PasswordHash, now: DateTime<Utc>) -> Self {
        Self {
            credential_hash,
            updated_at: now,
            ..self
        }
    }

    /// 無効化した新しいインスタンスを返す
    ///
    /// 無効化済みの場合は `updated_at` も変えずにそのまま返す。
    pub fn deactivated(self, now: DateTime<Utc>) -> Self {
        if !self.is_active() {
            return self;
        }
        Self {
            status: IdentityStatus::Deactivated,
            updated_at: now,
            ..self
        }
    }
}
