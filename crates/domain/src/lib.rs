//! # High Peaks ドメイン層
//!
//! Identity Service の中核となるドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **エンティティ**: 一意の識別子を持つオブジェクト（[`identity::Identity`], [`session::Session`]）
//! - **値オブジェクト**: 生成時に検証される不変オブジェクト（[`identity::Username`],
//!   [`password::PlainPassword`], [`session::SessionToken`]）
//! - **状態遷移**: セッションの `Active -> Expired / Revoked` はドメイン層で判定する
//!
//! ## 依存関係の方向
//!
//! ```text
//! identity-service → infra → domain
//!                  ↘  shared
//! ```
//!
//! ドメイン層はインフラ層（DB、Redis）には一切依存しない。
//!
//! ## モジュール構成
//!
//! - [`clock`] - 時刻プロバイダ
//! - [`error`] - ドメイン層エラー
//! - [`identity`] - アイデンティティ（アカウント）とロール
//! - [`password`] - 平文パスワードとパスワードハッシュ
//! - [`session`] - セッションとトークン

pub mod clock;
pub mod error;
pub mod identity;
pub mod password;
pub mod session;

pub use error::DomainError;
