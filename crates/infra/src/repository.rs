//! # リポジトリ実装
//!
//! ドメインエンティティの永続化を担当するトレイトと PostgreSQL 実装を提供する。
//! インメモリ実装は [`memory`](crate::memory) を参照。

pub mod identity_repository;

pub use identity_repository::{IdentityRepository, PostgresIdentityRepository};
