//! # Identity Service ライブラリ
//!
//! アカウントの認証とセッション管理を担う HTTP サービスのコアモジュール。
//!
//! ## モジュール構成
//!
//! - `app_builder`: DI とルーター構築
//! - `bootstrap`: 起動時の管理者プロビジョニング
//! - `config`: 環境変数からの設定読み込み
//! - `error`: エラー定義と HTTP レスポンスへの変換
//! - `handler`: HTTP ハンドラ
//! - `reaper`: 期限切れセッションの定期削除
//! - `usecase`: Credential Store / Session Manager / Auth Service

pub mod app_builder;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod handler;
pub mod reaper;
pub mod usecase;
