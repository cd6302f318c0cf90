//! # High Peaks インフラ層
//!
//! 永続化・ハッシュ計算など外部リソースとのやり取りを担当する。
//!
//! ## 設計方針
//!
//! ユースケース層はトレイト（[`IdentityRepository`], [`SessionStore`],
//! [`CredentialHasher`]）だけに依存し、具体的な実装は起動時に注入する。
//!
//! | トレイト | 本番実装 | 開発・テスト用実装 |
//! |---------|---------|------------------|
//! | [`IdentityRepository`] | [`PostgresIdentityRepository`] | [`InMemoryIdentityRepository`] |
//! | [`SessionStore`] | [`RedisSessionStore`] | [`InMemorySessionStore`] |
//! | [`CredentialHasher`] | [`Argon2CredentialHasher`] | 同左（低コスト設定） |
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL 接続プールとマイグレーション
//! - [`redis`] - Redis 接続マネージャ
//! - [`error`] - インフラ層エラー定義
//! - [`memory`] - インメモリ実装
//! - [`password`] - Argon2id によるハッシュ化と検証
//! - [`repository`] - アイデンティティの永続化
//! - [`session`] - セッションの永続化
//! - [`storage_policy`] - タイムアウトと 1 回限りの再試行

pub mod db;
pub mod error;
pub mod memory;
pub mod password;
pub mod redis;
pub mod repository;
pub mod session;
pub mod storage_policy;

pub use error::{InfraError, InfraErrorKind};
pub use memory::{InMemoryIdentityRepository, InMemorySessionStore};
pub use password::{Argon2CredentialHasher, CredentialHasher, HashCost};
pub use repository::{IdentityRepository, PostgresIdentityRepository};
pub use session::{RedisSessionStore, RevokeOutcome, SessionStore};
pub use storage_policy::StoragePolicy;
