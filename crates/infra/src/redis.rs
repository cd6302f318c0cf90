//! # Redis 接続管理
//!
//! セッションストアが使う Redis への接続を管理する。
//!
//! `ConnectionManager` は接続が切断された場合に自動で再接続を試みる。
//! Clone は同じ多重化接続を共有するだけなので、リクエストごとに clone してよい。

use redis::{Client, aio::ConnectionManager};

use crate::InfraError;

/// Redis 接続マネージャを作成する
///
/// アプリケーション起動時に一度だけ呼び出し、作成したマネージャを
/// アプリケーション全体で共有する。
///
/// # 引数
///
/// * `redis_url` - Redis 接続 URL
///   - 形式: `redis://[[username:]password@]host[:port][/database]`
///   - TLS: `rediss://` スキームで TLS 接続
///
/// # エラー
///
/// - URL パースエラー: 不正な URL 形式
/// - 接続エラー: Redis サーバーに接続できない
pub async fn create_connection_manager(
    redis_url: &str,
) -> Result<ConnectionManager, redis::RedisError> {
    let client = Client::open(redis_url)?;
    ConnectionManager::new(client).await
}

/// 疎通確認（readiness チェック用）
pub async fn ping(conn: &ConnectionManager) -> Result<(), InfraError> {
    let mut conn = conn.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}
