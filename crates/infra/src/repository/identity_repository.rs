//! # IdentityRepository
//!
//! アイデンティティの永続化を担当するリポジトリ。
//!
//! ## 一意性
//!
//! ユーザー名は大文字小文字を区別せず一意。`username_key`（小文字化したユーザー名）
//! 列の一意制約で保証するため、重複チェックと挿入が 1 つの原子的な操作になる。
//! 制約違反は [`InfraErrorKind::Conflict`](crate::InfraErrorKind::Conflict) として返す。
//!
//! ## 更新
//!
//! 更新は変更する列だけを書き込む。読み出した行全体を書き戻さないため、
//! 並行したローテーションが無効化を取り消すことはない。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use highpeaks_domain::{
    identity::{Identity, IdentityId, IdentityStatus, Role, Username},
    password::PasswordHash,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// 一意制約違反の SQLSTATE
const UNIQUE_VIOLATION: &str = "23505";

/// アイデンティティリポジトリトレイト
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// 新しいアイデンティティを保存する
    ///
    /// # 戻り値
    ///
    /// - `Ok(())`: 保存成功
    /// - `Err(_)`: 同じユーザー名（大文字小文字無視）が存在する場合は `Conflict`
    async fn insert(&self, identity: &Identity) -> Result<(), InfraError>;

    /// ID でアイデンティティを取得する
    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, InfraError>;

    /// ユーザー名（大文字小文字無視）でアイデンティティを取得する
    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<Identity>, InfraError>;

    /// 全アイデンティティを作成順に取得する（無効化済みを含む）
    async fn list(&self) -> Result<Vec<Identity>, InfraError>;

    /// 認証情報ハッシュだけを差し替える
    ///
    /// 更新後のアイデンティティを返す。存在しない場合は `None`。
    async fn update_credential(
        &self,
        id: &IdentityId,
        credential_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, InfraError>;

    /// ロールだけを変更する
    async fn update_role(
        &self,
        id: &IdentityId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, InfraError>;

    /// 状態を無効化済みにする
    ///
    /// 無効化済みなら何も変えずに現在の値を返す。
    async fn deactivate(
        &self,
        id: &IdentityId,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, InfraError>;

    /// 疎通確認
    async fn ping(&self) -> Result<(), InfraError>;
}

/// DB の identities テーブルの行を表す中間構造体
///
/// `TryFrom` で `Identity` への変換ロジックを一箇所に集約する。
#[derive(sqlx::FromRow)]
struct IdentityRow {
    id:              Uuid,
    username:        String,
    credential_hash: String,
    role:            String,
    status:          String,
    created_at:      DateTime<Utc>,
    updated_at:      DateTime<Utc>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = InfraError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        Ok(Identity::from_db(
            IdentityId::from_uuid(row.id),
            Username::new(row.username).map_err(|e| InfraError::corrupted(e.to_string()))?,
            PasswordHash::new(row.credential_hash),
            row.role
                .parse::<Role>()
                .map_err(|e| InfraError::corrupted(format!("不正なロール: {e}")))?,
            row.status
                .parse::<IdentityStatus>()
                .map_err(|e| InfraError::corrupted(e.to_string()))?,
            row.created_at,
            row.updated_at,
        ))
    }
}

/// PostgreSQL 実装の IdentityRepository
#[derive(Debug, Clone)]
pub struct PostgresIdentityRepository {
    pool: PgPool,
}

impl PostgresIdentityRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PostgresIdentityRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(identity_id = %identity.id()))]
    async fn insert(&self, identity: &Identity) -> Result<(), InfraError> {
        let result = sqlx::query(
            r#"
            INSERT INTO identities (
                id, username, username_key, credential_hash, role, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(identity.id().as_uuid())
        .bind(identity.username().as_str())
        .bind(identity.username().key())
        .bind(identity.credential_hash().as_str())
        .bind(<&'static str>::from(identity.role()))
        .bind(<&'static str>::from(identity.status()))
        .bind(identity.created_at())
        .bind(identity.updated_at())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(InfraError::conflict("Identity", identity.username().key()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, InfraError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT id, username, credential_hash, role, status, created_at, updated_at
            FROM identities
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<Identity>, InfraError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT id, username, credential_hash, role, status, created_at, updated_at
            FROM identities
            WHERE username_key = $1
            "#,
        )
        .bind(username.key())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Identity>, InfraError> {
        let rows = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT id, username, credential_hash, role, status, created_at, updated_at
            FROM identities
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Identity::try_from).collect()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(identity_id = %id))]
    async fn update_credential(
        &self,
        id: &IdentityId,
        credential_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, InfraError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            UPDATE identities
            SET credential_hash = $2, updated_at = $3
            WHERE id = $1
            RETURNING id, username, credential_hash, role, status, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(credential_hash.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Identity::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(identity_id = %id, role = %role))]
    async fn update_role(
        &self,
        id: &IdentityId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, InfraError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            UPDATE identities
            SET role = $2, updated_at = $3
            WHERE id = $1
            RETURNING id, username, credential_hash, role, status, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(<&'static str>::from(role))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Identity::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(identity_id = %id))]
    async fn deactivate(
        &self,
        id: &IdentityId,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, InfraError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            UPDATE identities
            SET status = $2, updated_at = $3
            WHERE id = $1 AND status = $4
            RETURNING id, username, credential_hash, role, status, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(<&'static str>::from(IdentityStatus::Deactivated))
        .bind(now)
        .bind(<&'static str>::from(IdentityStatus::Active))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Identity::try_from(row).map(Some),
            // 無効化済み、または存在しない
            None => self.find_by_id(id).await,
        }
    }

    async fn ping(&self) -> Result<(), InfraError> {
        crate::db::ping(&self.pool).await
    }
}
