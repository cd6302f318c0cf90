//! テスト共通フィクスチャ
//!
//! Rust の統合テスト規約に従い `tests/common/mod.rs` に配置。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use highpeaks_domain::{
    identity::{Identity, IdentityId, Role, Username},
    password::PasswordHash,
};

/// 固定の基準時刻
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// 実時刻（Redis の有効期限と整合させる場合に使う）
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// テスト用のアイデンティティを作成
///
/// ハッシュ値は検証に使わないため固定のダミー。
pub fn identity(username: &str, role: Role) -> Identity {
    Identity::new(
        IdentityId::new(),
        Username::new(username).unwrap(),
        PasswordHash::new("$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2g"),
        role,
        now(),
    )
}
