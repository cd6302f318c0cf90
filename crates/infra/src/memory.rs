//! # インメモリ実装
//!
//! `DATABASE_URL` / `REDIS_URL` が未設定のときに使うストア。
//! ユースケースやハンドラのテストでもそのまま使用する。
//!
//! 各ストアは 1 つの `RwLock` で全体を保護する。存在確認と書き込みを
//! 同じ書き込みロックの中で行うため、一意性チェックと挿入、
//! 失効の判定とフラグ設定はそれぞれ原子的になる。

use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use highpeaks_domain::{
    identity::{Identity, IdentityId, Role, Username},
    password::PasswordHash,
    session::{Session, SessionState, SessionToken},
};

use crate::{
    InfraError,
    repository::IdentityRepository,
    session::{RevokeOutcome, SessionStore},
};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, InfraError> {
    lock.read()
        .map_err(|_| InfraError::unexpected("ストアのロックが破損しています"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, InfraError> {
    lock.write()
        .map_err(|_| InfraError::unexpected("ストアのロックが破損しています"))
}

// ===== InMemoryIdentityRepository =====

/// インメモリの IdentityRepository
///
/// 挿入順を作成順として保持する。
#[derive(Default)]
pub struct InMemoryIdentityRepository {
    identities: RwLock<Vec<Identity>>,
}

impl InMemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityRepository for InMemoryIdentityRepository {
    async fn insert(&self, identity: &Identity) -> Result<(), InfraError> {
        let key = identity.username().key();
        let mut identities = write(&self.identities)?;

        if identities.iter().any(|i| i.username().key() == key) {
            return Err(InfraError::conflict("Identity", key));
        }
        identities.push(identity.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, InfraError> {
        Ok(read(&self.identities)?
            .iter()
            .find(|i| i.id() == id)
            .cloned())
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<Identity>, InfraError> {
        let key = username.key();
        Ok(read(&self.identities)?
            .iter()
            .find(|i| i.username().key() == key)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Identity>, InfraError> {
        Ok(read(&self.identities)?.clone())
    }

    async fn update_credential(
        &self,
        id: &IdentityId,
        credential_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, InfraError> {
        modify(&self.identities, id, |i| {
            i.with_credential(credential_hash.clone(), now)
        })
    }

    async fn update_role(
        &self,
        id: &IdentityId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, InfraError> {
        modify(&self.identities, id, |i| i.with_role(role, now))
    }

    async fn deactivate(
        &self,
        id: &IdentityId,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, InfraError> {
        modify(&self.identities, id, |i| i.deactivated(now))
    }

    async fn ping(&self) -> Result<(), InfraError> {
        Ok(())
    }
}

/// 書き込みロックの中で 1 件を変更し、変更後の値を返す
fn modify(
    identities: &RwLock<Vec<Identity>>,
    id: &IdentityId,
    change: impl FnOnce(Identity) -> Identity,
) -> Result<Option<Identity>, InfraError> {
    let mut identities = write(identities)?;

    Ok(identities.iter_mut().find(|i| i.id() == id).map(|stored| {
        *stored = change(stored.clone());
        stored.clone()
    }))
}

// ===== InMemorySessionStore =====

/// インメモリの SessionStore
pub struct InMemorySessionStore {
    sessions:  RwLock<HashMap<SessionToken, Session>>,
    retention: Duration,
}

impl InMemorySessionStore {
    /// # 引数
    ///
    /// - `retention`: 期限切れ後にレコードを残す期間
    pub fn new(retention: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// 保持しているセッション数（テスト・診断用）
    pub fn session_count(&self) -> Result<usize, InfraError> {
        Ok(read(&self.sessions)?.len())
    }
}

/// 1 件のセッションを失効させる（書き込みロック取得済みの前提）
fn revoke_in_place(session: &mut Session, now: DateTime<Utc>) -> RevokeOutcome {
    if session.state_at(now) != SessionState::Active {
        return RevokeOutcome::AlreadyInactive;
    }
    *session = session.clone().revoked(now);
    RevokeOutcome::Revoked
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<(), InfraError> {
        write(&self.sessions)?.insert(session.token().clone(), session.clone());
        Ok(())
    }

    async fn find(&self, token: &SessionToken) -> Result<Option<Session>, InfraError> {
        Ok(read(&self.sessions)?.get(token).cloned())
    }

    async fn revoke(
        &self,
        token: &SessionToken,
        now: DateTime<Utc>,
    ) -> Result<RevokeOutcome, InfraError> {
        let mut sessions = write(&self.sessions)?;

        Ok(match sessions.get_mut(token) {
            Some(session) => revoke_in_place(session, now),
            None => RevokeOutcome::NotFound,
        })
    }

    async fn revoke_all_for_identity(
        &self,
        identity_id: &IdentityId,
        now: DateTime<Utc>,
    ) -> Result<usize, InfraError> {
        let mut sessions = write(&self.sessions)?;

        Ok(sessions
            .values_mut()
            .filter(|s| s.identity_id() == identity_id)
            .map(|s| revoke_in_place(s, now))
            .filter(|outcome| *outcome == RevokeOutcome::Revoked)
            .count())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, InfraError> {
        let mut sessions = write(&self.sessions)?;
        let before = sessions.len();

        sessions.retain(|_, s| !s.is_purgeable(now, self.retention));
        Ok(before - sessions.len())
    }

    async fn ping(&self) -> Result<(), InfraError> {
        Ok(())
    }
}
