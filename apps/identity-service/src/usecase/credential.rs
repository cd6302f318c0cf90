//! # Credential Store
//!
//! アイデンティティとハッシュ化済み認証情報を管理する。
//!
//! ## タイミング攻撃対策
//!
//! 未登録・無効化済みのユーザー名でも、起動時に生成したダミーハッシュで
//! 検証を実行し、シークレット誤りと処理時間を揃える。
//! どの場合も同じ [`IdentityError::InvalidCredentials`] を返す。
//!
//! ## CPU バウンド処理
//!
//! Argon2id のハッシュ化と検証は `spawn_blocking` で実行する。
//!
//! ## 更新
//!
//! ロール・認証情報・状態はそれぞれ対象の列だけを書き込む。
//! ハッシュ計算中に無効化されても、ローテーションが状態を戻すことはない。

use std::sync::Arc;

use highpeaks_domain::{
    clock::Clock,
    identity::{Identity, IdentityId, Role, Username},
    password::{PasswordHash, PasswordVerifyResult, PlainPassword},
};
use highpeaks_infra::{CredentialHasher, IdentityRepository, InfraError, StoragePolicy};

use crate::error::IdentityError;

/// ダミーハッシュの生成に使う固定値（どのユーザーのシークレットとも無関係）
const DUMMY_SECRET: &str = "highpeaks-dummy-secret-for-timing";

/// アイデンティティと認証情報のストア
pub struct CredentialStore {
    repository: Arc<dyn IdentityRepository>,
    hasher:     Arc<dyn CredentialHasher>,
    clock:      Arc<dyn Clock>,
    policy:     StoragePolicy,
    dummy_hash: PasswordHash,
}

impl CredentialStore {
    /// ストアを作成する
    ///
    /// タイミング均一化用のダミーハッシュを現在のコスト設定で生成する。
    pub fn new(
        repository: Arc<dyn IdentityRepository>,
        hasher: Arc<dyn CredentialHasher>,
        clock: Arc<dyn Clock>,
        policy: StoragePolicy,
    ) -> Result<Self, InfraError> {
        let dummy_hash = hasher.hash(&PlainPassword::new(DUMMY_SECRET))?;

        Ok(Self {
            repository,
            hasher,
            clock,
            policy,
            dummy_hash,
        })
    }

    /// アイデンティティを作成する
    ///
    /// 一意性の判定と挿入はリポジトリが原子的に行う。
    #[tracing::instrument(skip_all, fields(username = %username, role = %role))]
    pub async fn create_identity(
        &self,
        username: &str,
        raw_secret: &str,
        role: Role,
    ) -> Result<Identity, IdentityError> {
        let username = Username::new(username)?;
        let secret = PlainPassword::parse(raw_secret)?;
        let hash = self.hash(secret).await?;

        let identity = Identity::new(IdentityId::new(), username, hash, role, self.clock.now());

        let repository = &self.repository;
        let inserted = self
            .policy
            .run("identity.insert", || repository.insert(&identity))
            .await;

        match inserted {
            Ok(()) => {
                tracing::info!(identity_id = %identity.id(), "アイデンティティを作成しました");
                Ok(identity)
            }
            Err(e) if e.is_conflict() => Err(IdentityError::DuplicateUsername(
                identity.username().to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// ユーザー名とシークレットを検証する
    ///
    /// 未登録・無効化済み・シークレット誤りはすべて `InvalidCredentials`。
    pub async fn verify(
        &self,
        username: &str,
        raw_secret: &str,
    ) -> Result<IdentityId, IdentityError> {
        let secret = PlainPassword::new(raw_secret);

        let found = match Username::new(username) {
            Ok(username) => {
                let repository = &self.repository;
                self.policy
                    .run("identity.find_by_username", || {
                        repository.find_by_username(&username)
                    })
                    .await?
            }
            Err(_) => None,
        };

        match found {
            Some(identity) if identity.is_active() => {
                let result = self
                    .check(secret, identity.credential_hash().clone())
                    .await?;
                if result.is_match() {
                    Ok(*identity.id())
                } else {
                    Err(IdentityError::InvalidCredentials)
                }
            }
            _ => {
                self.check(secret, self.dummy_hash.clone()).await?;
                Err(IdentityError::InvalidCredentials)
            }
        }
    }

    /// 認証情報を新しいシークレットで置き換える
    #[tracing::instrument(skip_all, fields(identity_id = %id))]
    pub async fn rotate_credential(
        &self,
        id: &IdentityId,
        new_raw_secret: &str,
    ) -> Result<(), IdentityError> {
        let secret = PlainPassword::parse(new_raw_secret)?;
        self.require(id).await?;
        let hash = self.hash(secret).await?;

        let repository = &self.repository;
        let now = self.clock.now();
        self.policy
            .run("identity.update_credential", || {
                repository.update_credential(id, &hash, now)
            })
            .await?
            .ok_or(IdentityError::NotFound("アイデンティティ"))?;
        tracing::info!("認証情報をローテーションしました");
        Ok(())
    }

    /// ID でアイデンティティを取得する
    pub async fn find(&self, id: &IdentityId) -> Result<Option<Identity>, IdentityError> {
        let repository = &self.repository;
        Ok(self
            .policy
            .run("identity.find_by_id", || repository.find_by_id(id))
            .await?)
    }

    /// 全アイデンティティを作成順に取得する
    pub async fn list(&self) -> Result<Vec<Identity>, IdentityError> {
        let repository = &self.repository;
        Ok(self
            .policy
            .run("identity.list", || repository.list())
            .await?)
    }

    /// ロールを変更する
    #[tracing::instrument(skip_all, fields(identity_id = %id, role = %role))]
    pub async fn change_role(&self, id: &IdentityId, role: Role) -> Result<Identity, IdentityError> {
        let identity = self.require(id).await?;
        if identity.role() == role {
            return Ok(identity);
        }

        let repository = &self.repository;
        let now = self.clock.now();
        let updated = self
            .policy
            .run("identity.update_role", || repository.update_role(id, role, now))
            .await?
            .ok_or(IdentityError::NotFound("アイデンティティ"))?;
        tracing::info!("ロールを変更しました");
        Ok(updated)
    }

    /// アイデンティティを無効化する（冪等）
    #[tracing::instrument(skip_all, fields(identity_id = %id))]
    pub async fn deactivate(&self, id: &IdentityId) -> Result<Identity, IdentityError> {
        let repository = &self.repository;
        let now = self.clock.now();
        let identity = self
            .policy
            .run("identity.deactivate", || repository.deactivate(id, now))
            .await?
            .ok_or(IdentityError::NotFound("アイデンティティ"))?;
        tracing::info!("アイデンティティを無効化しました");
        Ok(identity)
    }

    async fn require(&self, id: &IdentityId) -> Result<Identity, IdentityError> {
        self.find(id)
            .await?
            .ok_or(IdentityError::NotFound("アイデンティティ"))
    }

    async fn hash(&self, secret: PlainPassword) -> Result<PasswordHash, IdentityError> {
        let hasher = Arc::clone(&self.hasher);
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| InfraError::unexpected(format!("ハッシュ計算タスクが失敗しました: {e}")))??;
        Ok(hash)
    }

    async fn check(
        &self,
        secret: PlainPassword,
        hash: PasswordHash,
    ) -> Result<PasswordVerifyResult, IdentityError> {
        let hasher = Arc::clone(&self.hasher);
        let result = tokio::task::spawn_blocking(move || hasher.verify(&secret, &hash))
            .await
            .map_err(|e| InfraError::unexpected(format!("ハッシュ検証タスクが失敗しました: {e}")))??;
        Ok(result)
    }
}
