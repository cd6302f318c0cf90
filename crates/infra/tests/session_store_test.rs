//! RedisSessionStore 統合テスト
//!
//! Redis を使用したテスト。トークンは毎回ランダムに生成するため、
//! テスト間でキーは衝突しない。
//!
//! 実行方法:
//! ```bash
//! export REDIS_URL=redis://localhost:16379
//! cargo test -p highpeaks-infra --test session_store_test -- --ignored
//! ```

mod common;

use chrono::Duration;
use highpeaks_domain::{
    identity::IdentityId,
    session::{Session, SessionToken},
};
use highpeaks_infra::{
    redis::create_connection_manager,
    session::{RedisSessionStore, RevokeOutcome, SessionStore},
};
use pretty_assertions::assert_eq;

/// テスト用の Redis URL
fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:16379".to_string())
}

async fn store() -> RedisSessionStore {
    let conn = create_connection_manager(&redis_url()).await.unwrap();
    RedisSessionStore::new(conn, Duration::seconds(60))
}

fn session(identity_id: IdentityId) -> Session {
    Session::issue(
        SessionToken::generate(),
        identity_id,
        chrono::Utc::now(),
        Duration::seconds(300),
    )
    .unwrap()
}

#[tokio::test]
#[ignore = "Redis が必要"]
async fn test_保存したセッションを取得できる() {
    let sut = store().await;
    let s = session(IdentityId::new());
    sut.insert(&s).await.unwrap();

    let found = sut.find(s.token()).await.unwrap().unwrap();

    assert_eq!(found.identity_id(), s.identity_id());
    assert_eq!(
        found.expires_at().timestamp_millis(),
        s.expires_at().timestamp_millis()
    );
    assert!(!found.is_revoked());
}

#[tokio::test]
#[ignore = "Redis が必要"]
async fn test_存在しないトークンはnoneを返す() {
    let sut = store().await;

    let found = sut.find(&SessionToken::generate()).await.unwrap();

    assert!(found.is_none());
}

#[tokio::test]
#[ignore = "Redis が必要"]
async fn test_失効は冪等() {
    let sut = store().await;
    let s = session(IdentityId::new());
    sut.insert(&s).await.unwrap();
    let now = common::now_utc();

    assert_eq!(sut.revoke(s.token(), now).await.unwrap(), RevokeOutcome::Revoked);
    assert_eq!(
        sut.revoke(s.token(), now).await.unwrap(),
        RevokeOutcome::AlreadyInactive
    );
    assert!(sut.find(s.token()).await.unwrap().unwrap().is_revoked());
}

#[tokio::test]
#[ignore = "Redis が必要"]
async fn test_未知のトークンの失効はnot_found() {
    let sut = store().await;

    let outcome = sut
        .revoke(&SessionToken::generate(), common::now_utc())
        .await
        .unwrap();

    assert_eq!(outcome, RevokeOutcome::NotFound);
}

#[tokio::test]
#[ignore = "Redis が必要"]
async fn test_アイデンティティの全セッションを失効できる() {
    let sut = store().await;
    let identity_id = IdentityId::new();
    let first = session(identity_id);
    let second = session(identity_id);
    sut.insert(&first).await.unwrap();
    sut.insert(&second).await.unwrap();

    let count = sut
        .revoke_all_for_identity(&identity_id, common::now_utc())
        .await
        .unwrap();

    assert_eq!(count, 2);
    assert!(sut.find(first.token()).await.unwrap().unwrap().is_revoked());
    assert!(sut.find(second.token()).await.unwrap().unwrap().is_revoked());
}
