//! # ユースケース層
//!
//! Identity Service のビジネスロジックを実装する。
//!
//! ## 設計方針
//!
//! - **トレイトベースの設計**: ハンドラは [`AuthService`] トレイトだけに依存する
//! - **依存性注入**: ストア・ハッシャー・時計は起動時に外部から注入する
//! - **薄いハンドラ**: ハンドラは薄く保ち、ロジックはユースケースに集約
//!
//! ## 構成
//!
//! ```text
//! AuthService ─┬─→ CredentialStore ─→ IdentityRepository
//!              └─→ SessionManager  ─→ SessionStore
//! ```

pub mod auth;
pub mod credential;
pub mod session;

use async_trait::async_trait;
pub use auth::{AuthServiceImpl, authorize};
pub use credential::CredentialStore;
use highpeaks_domain::{
    identity::{Identity, IdentityId, Role},
    session::{Session, SessionToken},
};
pub use session::SessionManager;

use crate::error::IdentityError;

/// 認証ユースケーストレイト
///
/// 具体的な実装は [`AuthServiceImpl`] で提供される。
/// `actor` は認証済みのリクエスト元。
#[async_trait]
pub trait AuthService: Send + Sync {
    /// ログインしてセッションを発行する
    ///
    /// 未登録・無効化済み・シークレット誤りはすべて `InvalidCredentials`。
    async fn login(&self, username: &str, secret: &str) -> Result<Session, IdentityError>;

    /// セッションを失効させる
    ///
    /// 既に失効済みでも成功する。未知のトークンは `NotFound`。
    async fn logout(&self, token: &SessionToken) -> Result<(), IdentityError>;

    /// トークンからアイデンティティを解決する
    ///
    /// 失敗理由によらず `Unauthenticated` を返す。
    async fn authenticate(&self, token: &SessionToken) -> Result<Identity, IdentityError>;

    /// 有効なアイデンティティを作成順に返す（管理者のみ）
    ///
    /// 無効化済みのアイデンティティは含まない。
    async fn list_identities(&self, actor: &Identity) -> Result<Vec<Identity>, IdentityError>;

    /// アイデンティティを作成する
    ///
    /// `actor` が `None` の場合は起動時のプロビジョニングとして権限確認を省く。
    async fn provision(
        &self,
        actor: Option<&Identity>,
        username: &str,
        secret: &str,
        role: Role,
    ) -> Result<Identity, IdentityError>;

    /// ロールを変更する（管理者のみ）
    async fn change_role(
        &self,
        actor: &Identity,
        id: &IdentityId,
        role: Role,
    ) -> Result<Identity, IdentityError>;

    /// 認証情報をローテーションする（管理者または本人）
    ///
    /// 既存のセッションはすべて失効する。
    async fn rotate_credential(
        &self,
        actor: &Identity,
        id: &IdentityId,
        secret: &str,
    ) -> Result<(), IdentityError>;

    /// アイデンティティを無効化する（管理者のみ、自分自身は不可）
    ///
    /// 既存のセッションはすべて失効する。
    async fn deactivate(&self, actor: &Identity, id: &IdentityId) -> Result<(), IdentityError>;
}
