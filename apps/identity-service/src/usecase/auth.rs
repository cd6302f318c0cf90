//! # 認証ユースケース
//!
//! Credential Store と Session Manager を組み合わせ、ログイン・ログアウト・
//! トークン認証と管理操作を提供する。独自の状態は持たない。
//!
//! 内部の細かいエラーはこの境界で粗いカテゴリに集約する。
//!
//! | 内部エラー | 返すエラー |
//! |-----------|-----------|
//! | ログイン時のセッション発行 `NotFound` | `InvalidCredentials` |
//! | 認証時の `NotFound` / `Expired` / `Revoked` / 無効化済み | `Unauthenticated` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use highpeaks_domain::{
    identity::{Capability, Identity, IdentityId, Role},
    session::{Session, SessionToken},
};

use super::{AuthService, CredentialStore, SessionManager};
use crate::error::IdentityError;

/// ロールが操作権限を持つか確認する
pub fn authorize(identity: &Identity, capability: Capability) -> Result<(), IdentityError> {
    if identity.role().allows(capability) {
        Ok(())
    } else {
        tracing::debug!(
            identity_id = %identity.id(),
            role = %identity.role(),
            capability = %capability,
            "権限がないため拒否しました"
        );
        Err(IdentityError::Forbidden(format!(
            "この操作には {} 権限が必要です",
            Role::Administrator
        )))
    }
}

/// 認証ユースケースの実装
pub struct AuthServiceImpl {
    credentials: Arc<CredentialStore>,
    sessions:    Arc<SessionManager>,
    session_ttl: Duration,
}

impl AuthServiceImpl {
    pub fn new(
        credentials: Arc<CredentialStore>,
        sessions: Arc<SessionManager>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            credentials,
            sessions,
            session_ttl,
        }
    }
}

#[async_trait]
impl AuthService for AuthServiceImpl {
    async fn login(&self, username: &str, secret: &str) -> Result<Session, IdentityError> {
        let identity_id = self.credentials.verify(username, secret).await?;

        // 検証と発行の間に無効化された場合
        match self.sessions.issue(&identity_id, self.session_ttl).await {
            Ok(session) => {
                tracing::info!(identity_id = %identity_id, "ログインしました");
                Ok(session)
            }
            Err(IdentityError::NotFound(_)) => Err(IdentityError::InvalidCredentials),
            Err(e) => Err(e),
        }
    }

    async fn logout(&self, token: &SessionToken) -> Result<(), IdentityError> {
        self.sessions.revoke(token).await
    }

    async fn authenticate(&self, token: &SessionToken) -> Result<Identity, IdentityError> {
        let identity_id = match self.sessions.validate(token).await {
            Ok(id) => id,
            Err(e @ (IdentityError::NotFound(_) | IdentityError::Expired | IdentityError::Revoked)) => {
                tracing::debug!(
                    session.fingerprint = token.fingerprint(),
                    reason = %e,
                    "トークン認証に失敗しました"
                );
                return Err(IdentityError::Unauthenticated);
            }
            Err(e) => return Err(e),
        };

        match self.credentials.find(&identity_id).await? {
            Some(identity) if identity.is_active() => Ok(identity),
            _ => {
                tracing::debug!(
                    identity_id = %identity_id,
                    "アイデンティティが無効化済みまたは削除済みです"
                );
                Err(IdentityError::Unauthenticated)
            }
        }
    }

    async fn list_identities(&self, actor: &Identity) -> Result<Vec<Identity>, IdentityError> {
        authorize(actor, Capability::ListIdentities)?;
        let identities = self.credentials.list().await?;
        Ok(identities.into_iter().filter(Identity::is_active).collect())
    }

    async fn provision(
        &self,
        actor: Option<&Identity>,
        username: &str,
        secret: &str,
        role: Role,
    ) -> Result<Identity, IdentityError> {
        if let Some(actor) = actor {
            authorize(actor, Capability::ManageIdentities)?;
        }
        self.credentials.create_identity(username, secret, role).await
    }

    async fn change_role(
        &self,
        actor: &Identity,
        id: &IdentityId,
        role: Role,
    ) -> Result<Identity, IdentityError> {
        authorize(actor, Capability::ManageIdentities)?;
        self.credentials.change_role(id, role).await
    }

    async fn rotate_credential(
        &self,
        actor: &Identity,
        id: &IdentityId,
        secret: &str,
    ) -> Result<(), IdentityError> {
        if actor.id() != id {
            authorize(actor, Capability::ManageIdentities)?;
        }

        self.credentials.rotate_credential(id, secret).await?;
        self.sessions.revoke_all_for_identity(id).await?;
        Ok(())
    }

    async fn deactivate(&self, actor: &Identity, id: &IdentityId) -> Result<(), IdentityError> {
        authorize(actor, Capability::ManageIdentities)?;
        if actor.id() == id {
            return Err(IdentityError::Forbidden(
                "自分自身を無効化することはできません".to_string(),
            ));
        }

        self.credentials.deactivate(id).await?;
        self.sessions.revoke_all_for_identity(id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use highpeaks_domain::clock::{Clock, ManualClock};
    use highpeaks_infra::{
        Argon2CredentialHasher,
        HashCost,
        InMemoryIdentityRepository,
        InMemorySessionStore,
        StoragePolicy,
    };
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    struct Fixture {
        sut:      AuthServiceImpl,
        clock:    Arc<ManualClock>,
        sessions: Arc<InMemorySessionStore>,
    }

    #[fixture]
    fn setup() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        ));
        let identities = Arc::new(InMemoryIdentityRepository::new());
        let sessions = Arc::new(InMemorySessionStore::new(Duration::hours(1)));
        let hasher = Argon2CredentialHasher::new(HashCost {
            memory_kib: 1024,
            iterations: 1,
        })
        .unwrap();

        let credentials = CredentialStore::new(
            identities.clone(),
            Arc::new(hasher),
            clock.clone(),
            StoragePolicy::default(),
        )
        .unwrap();
        let manager = SessionManager::new(
            sessions.clone(),
            identities,
            clock.clone(),
            StoragePolicy::default(),
        );

        Fixture {
            sut: AuthServiceImpl::new(
                Arc::new(credentials),
                Arc::new(manager),
                Duration::hours(8),
            ),
            clock,
            sessions,
        }
    }

    async fn provision(sut: &AuthServiceImpl, username: &str, role: Role) -> Identity {
        sut.provision(None, username, &format!("{username}-S3cret!"), role)
            .await
            .unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn test_ログインから認証とログアウトまでの流れ(setup: Fixture) {
        // Given
        let sut = &setup.sut;
        sut.provision(None, "alice", "S3cret!", Role::User)
            .await
            .unwrap();

        // When
        let session = sut.login("alice", "S3cret!").await.unwrap();
        let identity = sut.authenticate(session.token()).await.unwrap();

        // Then
        assert_eq!(identity.username().as_str(), "alice");
        assert_eq!(identity.role(), Role::User);
        assert_eq!(
            session.expires_at(),
            setup.clock.now() + Duration::hours(8)
        );

        // When: ログアウト
        assert_ok!(sut.logout(session.token()).await);

        // Then
        assert!(matches!(
            sut.authenticate(session.token()).await,
            Err(IdentityError::Unauthenticated)
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_誤ったシークレットではセッションが作られない(setup: Fixture) {
        let sut = &setup.sut;
        sut.provision(None, "alice", "S3cret!", Role::User)
            .await
            .unwrap();

        let result = sut.login("alice", "wrong").await;

        assert!(matches!(result, Err(IdentityError::InvalidCredentials)));
        assert_eq!(setup.sessions.session_count().unwrap(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_ログアウトは冪等で未知のトークンはnot_found(setup: Fixture) {
        let sut = &setup.sut;
        provision(sut, "alice", Role::User).await;
        let session = sut.login("alice", "alice-S3cret!").await.unwrap();

        assert_ok!(sut.logout(session.token()).await);
        assert_ok!(sut.logout(session.token()).await);
        assert!(matches!(
            sut.logout(&SessionToken::from_string("unknown")).await,
            Err(IdentityError::NotFound(_))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_期限切れのトークンはunauthenticated(setup: Fixture) {
        let sut = &setup.sut;
        provision(sut, "alice", Role::User).await;
        let session = sut.login("alice", "alice-S3cret!").await.unwrap();

        setup.clock.advance(Duration::hours(8));

        assert!(matches!(
            sut.authenticate(session.token()).await,
            Err(IdentityError::Unauthenticated)
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_一覧は管理者だけが取得できる(setup: Fixture) {
        let sut = &setup.sut;
        let admin = provision(sut, "root", Role::Administrator).await;
        let alice = provision(sut, "alice", Role::User).await;

        let denied = sut.list_identities(&alice).await;
        let listed = sut.list_identities(&admin).await.unwrap();

        assert!(matches!(denied, Err(IdentityError::Forbidden(_))));
        assert_eq!(listed.len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_一覧に無効化済みのアイデンティティは含まれない(setup: Fixture) {
        // Given
        let sut = &setup.sut;
        let admin = provision(sut, "root", Role::Administrator).await;
        let alice = provision(sut, "alice", Role::User).await;
        provision(sut, "bob", Role::User).await;

        // When
        sut.deactivate(&admin, alice.id()).await.unwrap();
        let listed = sut.list_identities(&admin).await.unwrap();

        // Then
        let names: Vec<&str> = listed.iter().map(|i| i.username().as_str()).collect();
        assert_eq!(names, vec!["root", "bob"]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_一般ユーザーはプロビジョニングできない(setup: Fixture) {
        let sut = &setup.sut;
        let alice = provision(sut, "alice", Role::User).await;

        let result = sut
            .provision(Some(&alice), "mallory", "M4llory!", Role::Administrator)
            .await;

        assert!(matches!(result, Err(IdentityError::Forbidden(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_無効化するとセッションが失効しログインできなくなる(setup: Fixture) {
        // Given
        let sut = &setup.sut;
        let admin = provision(sut, "root", Role::Administrator).await;
        let alice = provision(sut, "alice", Role::User).await;
        let session = sut.login("alice", "alice-S3cret!").await.unwrap();

        // When
        assert_ok!(sut.deactivate(&admin, alice.id()).await);

        // Then
        assert!(matches!(
            sut.authenticate(session.token()).await,
            Err(IdentityError::Unauthenticated)
        ));
        assert!(matches!(
            sut.login("alice", "alice-S3cret!").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_管理者は自分自身を無効化できない(setup: Fixture) {
        let sut = &setup.sut;
        let admin = provision(sut, "root", Role::Administrator).await;

        let result = sut.deactivate(&admin, admin.id()).await;

        assert!(matches!(result, Err(IdentityError::Forbidden(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_本人はシークレットをローテーションできる(setup: Fixture) {
        // Given
        let sut = &setup.sut;
        let alice = provision(sut, "alice", Role::User).await;
        let session = sut.login("alice", "alice-S3cret!").await.unwrap();

        // When
        assert_ok!(sut.rotate_credential(&alice, alice.id(), "N3wSecret!").await);

        // Then
        assert_err!(sut.authenticate(session.token()).await);
        assert_err!(sut.login("alice", "alice-S3cret!").await);
        assert_ok!(sut.login("alice", "N3wSecret!").await);
    }

    #[rstest]
    #[tokio::test]
    async fn test_他人のシークレットは管理者以外ローテーションできない(setup: Fixture) {
        let sut = &setup.sut;
        let alice = provision(sut, "alice", Role::User).await;
        let bob = provision(sut, "bob", Role::User).await;
        let admin = provision(sut, "root", Role::Administrator).await;

        let denied = sut.rotate_credential(&alice, bob.id(), "Pwn3d!").await;
        let allowed = sut.rotate_credential(&admin, bob.id(), "R3set!").await;

        assert!(matches!(denied, Err(IdentityError::Forbidden(_))));
        assert_ok!(allowed);
    }

    #[rstest]
    #[tokio::test]
    async fn test_管理者はロールを変更できる(setup: Fixture) {
        let sut = &setup.sut;
        let admin = provision(sut, "root", Role::Administrator).await;
        let alice = provision(sut, "alice", Role::User).await;

        let promoted = sut
            .change_role(&admin, alice.id(), Role::Administrator)
            .await
            .unwrap();
        let denied = sut.change_role(&alice, admin.id(), Role::User).await;

        assert_eq!(promoted.role(), Role::Administrator);
        assert!(matches!(denied, Err(IdentityError::Forbidden(_))));
    }

    #[test]
    fn test_authorizeはロールで判定する() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let identity = |role| {
            Identity::new(
                IdentityId::new(),
                highpeaks_domain::identity::Username::new("someone").unwrap(),
                highpeaks_domain::password::PasswordHash::new("$argon2id$dummy"),
                role,
                now,
            )
        };

        assert_ok!(authorize(
            &identity(Role::Administrator),
            Capability::ListIdentities
        ));
        assert!(matches!(
            authorize(&identity(Role::User), Capability::ListIdentities),
            Err(IdentityError::Forbidden(_))
        ));
        assert!(matches!(
            authorize(&identity(Role::User), Capability::ManageIdentities),
            Err(IdentityError::Forbidden(_))
        ));
    }
}
