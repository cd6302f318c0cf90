//! # Session Manager
//!
//! セッショントークンの発行・検証・失効を担当する。
//!
//! ## 状態遷移
//!
//! ```text
//! Active ──(期限到来)──→ Expired
//!    └────(失効)──────→ Revoked
//! ```
//!
//! 期限切れは検証時に注入された時計で判定する。失効を期限切れより先に評価する。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use highpeaks_domain::{
    clock::Clock,
    identity::IdentityId,
    session::{Session, SessionState, SessionToken},
};
use highpeaks_infra::{IdentityRepository, RevokeOutcome, SessionStore, StoragePolicy};

use crate::error::IdentityError;

/// セッションの発行と検証
pub struct SessionManager {
    store:      Arc<dyn SessionStore>,
    identities: Arc<dyn IdentityRepository>,
    clock:      Arc<dyn Clock>,
    policy:     StoragePolicy,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        identities: Arc<dyn IdentityRepository>,
        clock: Arc<dyn Clock>,
        policy: StoragePolicy,
    ) -> Self {
        Self {
            store,
            identities,
            clock,
            policy,
        }
    }

    /// セッションを発行する
    ///
    /// アイデンティティが存在しないか無効化済みなら `NotFound`。
    #[tracing::instrument(skip_all, fields(identity_id = %identity_id))]
    pub async fn issue(
        &self,
        identity_id: &IdentityId,
        ttl: Duration,
    ) -> Result<Session, IdentityError> {
        let identities = &self.identities;
        let identity = self
            .policy
            .run("identity.find_by_id", || identities.find_by_id(identity_id))
            .await?;
        if !identity.is_some_and(|i| i.is_active()) {
            return Err(IdentityError::NotFound("アイデンティティ"));
        }

        let session = Session::issue(
            SessionToken::generate(),
            *identity_id,
            self.clock.now(),
            ttl,
        )?;

        let store = &self.store;
        self.policy
            .run("session.insert", || store.insert(&session))
            .await?;

        tracing::debug!(
            session.fingerprint = session.token().fingerprint(),
            session.expires_at = %session.expires_at(),
            "セッションを発行しました"
        );
        Ok(session)
    }

    /// トークンを検証し、紐づくアイデンティティ ID を返す
    pub async fn validate(&self, token: &SessionToken) -> Result<IdentityId, IdentityError> {
        let store = &self.store;
        let session = self
            .policy
            .run("session.find", || store.find(token))
            .await?
            .ok_or(IdentityError::NotFound("セッション"))?;

        match session.state_at(self.clock.now()) {
            SessionState::Active => Ok(*session.identity_id()),
            SessionState::Expired => Err(IdentityError::Expired),
            SessionState::Revoked => Err(IdentityError::Revoked),
        }
    }

    /// セッションを失効させる
    ///
    /// 失効済み・期限切れでも成功する。ストアにないトークンだけが `NotFound`。
    pub async fn revoke(&self, token: &SessionToken) -> Result<(), IdentityError> {
        let store = &self.store;
        let now = self.clock.now();
        let outcome = self
            .policy
            .run("session.revoke", || store.revoke(token, now))
            .await?;

        match outcome {
            RevokeOutcome::Revoked => {
                tracing::debug!(
                    session.fingerprint = token.fingerprint(),
                    "セッションを失効させました"
                );
                Ok(())
            }
            RevokeOutcome::AlreadyInactive => Ok(()),
            RevokeOutcome::NotFound => Err(IdentityError::NotFound("セッション")),
        }
    }

    /// アイデンティティの全セッションを失効させ、失効させた件数を返す
    pub async fn revoke_all_for_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<usize, IdentityError> {
        let store = &self.store;
        let now = self.clock.now();
        let revoked = self
            .policy
            .run("session.revoke_all", || {
                store.revoke_all_for_identity(identity_id, now)
            })
            .await?;

        if revoked > 0 {
            tracing::info!(identity_id = %identity_id, revoked, "セッションを一括失効させました");
        }
        Ok(revoked)
    }

    /// 保持期間を過ぎたセッションを削除し、削除件数を返す
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, IdentityError> {
        let store = &self.store;
        Ok(self
            .policy
            .run("session.purge_expired", || store.purge_expired(now))
            .await?)
    }

    /// 現在時刻（リーパーが削除基準に使う）
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
