//! # セッションストア
//!
//! セッションの永続化を担当するトレイトと Redis 実装を提供する。
//!
//! ## Redis キー設計
//!
//! | キー | 型 | 値 | 有効期限 |
//! |-----|-----|-----|-----|
//! | `session:{token}` | Hash | `identity_id`, `issued_at`, `expires_at`, `revoked` | `expires_at + 保持期間` |
//! | `identity_sessions:{identity_id}` | Set | 発行済みトークン | 最後に発行したセッションと同じ |
//!
//! 時刻はミリ秒単位の UNIX 時刻で保存する。期限切れの判定は読み出し時に行い、
//! 保持期間を過ぎたキーは Redis が自動で削除する。
//!
//! ## 失効の原子性
//!
//! 存在確認・状態判定・フラグ設定を Lua スクリプトで 1 回の呼び出しにまとめる。
//! 同じトークンへの並行した失効・検証は Redis 上で直列化される。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use highpeaks_domain::{
    identity::IdentityId,
    session::{Session, SessionToken},
};
use redis::{Script, aio::ConnectionManager};
use uuid::Uuid;

use crate::InfraError;

/// 失効操作の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// アクティブだったセッションを失効させた
    Revoked,
    /// 既に失効済みまたは期限切れ（変更なし）
    AlreadyInactive,
    /// ストアに存在しない（未発行または削除済み）
    NotFound,
}

/// セッションストアトレイト
///
/// 期限切れ・失効の判定はドメインモデル（[`Session::state_at`]）が行う。
/// ストアは保持期間が過ぎるまでレコードを返し続ける。
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// セッションを保存する
    async fn insert(&self, session: &Session) -> Result<(), InfraError>;

    /// トークンでセッションを取得する
    async fn find(&self, token: &SessionToken) -> Result<Option<Session>, InfraError>;

    /// セッションを失効させる
    ///
    /// 存在確認と失効フラグの設定は原子的に行う。
    async fn revoke(
        &self,
        token: &SessionToken,
        now: DateTime<Utc>,
    ) -> Result<RevokeOutcome, InfraError>;

    /// アイデンティティのアクティブなセッションをすべて失効させる
    ///
    /// # 戻り値
    ///
    /// 新たに失効させたセッションの数
    async fn revoke_all_for_identity(
        &self,
        identity_id: &IdentityId,
        now: DateTime<Utc>,
    ) -> Result<usize, InfraError>;

    /// 保持期間を過ぎたセッションを削除する
    ///
    /// # 戻り値
    ///
    /// 削除したセッションの数
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, InfraError>;

    /// 疎通確認
    async fn ping(&self) -> Result<(), InfraError>;
}

/// 失効スクリプト
///
/// 戻り値: 0 = 存在しない、1 = 既に非アクティブ、2 = 失効させた
const REVOKE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
local revoked = redis.call('HGET', KEYS[1], 'revoked')
local expires_at = tonumber(redis.call('HGET', KEYS[1], 'expires_at'))
if revoked == '1' or tonumber(ARGV[1]) >= expires_at then
    return 1
end
redis.call('HSET', KEYS[1], 'revoked', '1')
return 2
"#;

/// Redis を使用したセッションストア
pub struct RedisSessionStore {
    conn:          ConnectionManager,
    retention:     Duration,
    revoke_script: Script,
}

impl RedisSessionStore {
    /// # 引数
    ///
    /// - `conn`: [`create_connection_manager`](crate::redis::create_connection_manager) で作成した接続
    /// - `retention`: 期限切れ後にレコードを残す期間
    pub fn new(conn: ConnectionManager, retention: Duration) -> Self {
        Self {
            conn,
            retention,
            revoke_script: Script::new(REVOKE_SCRIPT),
        }
    }

    fn session_key(token: &SessionToken) -> String {
        format!("session:{}", token.as_str())
    }

    fn index_key(identity_id: &IdentityId) -> String {
        format!("identity_sessions:{}", identity_id.as_uuid())
    }

    async fn revoke_key(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<RevokeOutcome, InfraError> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .revoke_script
            .key(key)
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        match code {
            0 => Ok(RevokeOutcome::NotFound),
            1 => Ok(RevokeOutcome::AlreadyInactive),
            2 => Ok(RevokeOutcome::Revoked),
            other => Err(InfraError::unexpected(format!(
                "失効スクリプトが想定外の値を返しました: {other}"
            ))),
        }
    }
}

/// Hash フィールドから [`Session`] を復元する
fn session_from_fields(
    token: &SessionToken,
    fields: &HashMap<String, String>,
) -> Result<Session, InfraError> {
    let field = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| InfraError::corrupted(format!("セッションに {name} がありません")))
    };
    let millis = |name: &str| -> Result<DateTime<Utc>, InfraError> {
        let raw = field(name)?;
        raw.parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| InfraError::corrupted(format!("不正な {name}: {raw}")))
    };

    let identity_id = Uuid::parse_str(field("identity_id")?)
        .map_err(|e| InfraError::corrupted(format!("不正な identity_id: {e}")))?;

    Ok(Session::from_db(
        token.clone(),
        IdentityId::from_uuid(identity_id),
        millis("issued_at")?,
        millis("expires_at")?,
        field("revoked")? == "1",
    ))
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn insert(&self, session: &Session) -> Result<(), InfraError> {
        let key = Self::session_key(session.token());
        let index = Self::index_key(session.identity_id());
        let purge_at = session
            .purge_at(self.retention)
            .ok_or_else(|| InfraError::unexpected("セッションの保持期限が日時の範囲を超えています"))?
            .timestamp_millis();

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(&key)
            .arg("identity_id")
            .arg(session.identity_id().as_uuid().to_string())
            .arg("issued_at")
            .arg(session.issued_at().timestamp_millis())
            .arg("expires_at")
            .arg(session.expires_at().timestamp_millis())
            .arg("revoked")
            .arg(if session.is_revoked() { "1" } else { "0" })
            .ignore()
            .cmd("PEXPIREAT")
            .arg(&key)
            .arg(purge_at)
            .ignore()
            .cmd("SADD")
            .arg(&index)
            .arg(session.token().as_str())
            .ignore()
            .cmd("PEXPIREAT")
            .arg(&index)
            .arg(purge_at)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn find(&self, token: &SessionToken) -> Result<Option<Session>, InfraError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(Self::session_key(token))
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }
        session_from_fields(token, &fields).map(Some)
    }

    async fn revoke(
        &self,
        token: &SessionToken,
        now: DateTime<Utc>,
    ) -> Result<RevokeOutcome, InfraError> {
        self.revoke_key(&Self::session_key(token), now).await
    }

    async fn revoke_all_for_identity(
        &self,
        identity_id: &IdentityId,
        now: DateTime<Utc>,
    ) -> Result<usize, InfraError> {
        let index = Self::index_key(identity_id);
        let mut conn = self.conn.clone();
        let tokens: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&index)
            .query_async(&mut conn)
            .await?;

        let mut revoked = 0;
        let mut stale = Vec::new();
        for raw in tokens {
            let token = SessionToken::from_string(raw);
            match self.revoke_key(&Self::session_key(&token), now).await? {
                RevokeOutcome::Revoked => revoked += 1,
                RevokeOutcome::AlreadyInactive => {}
                RevokeOutcome::NotFound => stale.push(token),
            }
        }

        // 有効期限で消えたセッションをインデックスからも外す
        if !stale.is_empty() {
            let mut cmd = redis::cmd("SREM");
            cmd.arg(&index);
            for token in &stale {
                cmd.arg(token.as_str());
            }
            let _: i64 = cmd.query_async(&mut conn).await?;
        }

        Ok(revoked)
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, InfraError> {
        // キーの有効期限（expires_at + 保持期間）で Redis が削除する
        Ok(0)
    }

    async fn ping(&self) -> Result<(), InfraError> {
        crate::redis::ping(&self.conn).await
    }
}
