//! # Identity Service 設定
//!
//! 環境変数から Identity Service の設定を読み込む。
//!
//! 値が不正な場合は [`ConfigError`] を返す（パニックしない）。
//! 空文字列は未設定として扱う。
//!
//! 秒単位の期間は [`MAX_DURATION_SECONDS`] を上限とする。上限がないと
//! 発行時刻への加算が日時の表現範囲を超える。

use std::{fmt, str::FromStr, time::Duration as StdDuration};

use highpeaks_infra::{HashCost, StoragePolicy};
use thiserror::Error;

/// 秒単位の期間として受け付ける上限（10 年）
pub const MAX_DURATION_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// 設定読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 値を解釈できない、または範囲外
    #[error("環境変数 {name} の値が不正です: {value:?}（{reason}）")]
    Invalid {
        name:   &'static str,
        value:  String,
        reason: String,
    },

    /// 組で指定すべき変数の片方だけが設定されている
    #[error("環境変数 {0} と {1} は両方設定する必要があります")]
    Incomplete(&'static str, &'static str),
}

/// 起動時に作成する管理者
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub secret:   String,
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Identity Service の設定
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// バインドアドレス
    pub host:              String,
    /// ポート番号
    pub port:              u16,
    /// セッションの有効期間
    pub session_ttl:       chrono::Duration,
    /// 期限切れ・失効後にセッションを保持する期間
    pub session_retention: chrono::Duration,
    /// 期限切れセッション削除の実行間隔
    pub reaper_interval:   StdDuration,
    /// Argon2id のコスト
    pub hash_cost:         HashCost,
    /// ストレージ呼び出しのタイムアウトと再試行
    pub storage_policy:    StoragePolicy,
    /// PostgreSQL 接続 URL（未設定ならインメモリ）
    pub database_url:      Option<String>,
    /// Redis 接続 URL（未設定ならインメモリ）
    pub redis_url:         Option<String>,
    /// 起動時に作成する管理者
    pub bootstrap_admin:   Option<BootstrapAdmin>,
}

impl IdentityConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から設定を読み込む
    ///
    /// テストでは `HashMap` を参照する関数を渡す。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup };

        let session_ttl = vars.duration("SESSION_TTL_SECONDS", 28_800, 1)?;
        let session_retention = vars.duration("SESSION_RETENTION_SECONDS", 3_600, 0)?;
        let reaper_interval_seconds = vars.seconds("REAPER_INTERVAL_SECONDS", 300, 1)?;
        let hash_cost: u32 = vars.positive("HASH_COST", 1)?;
        let hash_memory_kib: u32 = vars.positive("HASH_MEMORY_KIB", 65_536)?;
        let storage_timeout_ms: u64 = vars.positive("STORAGE_TIMEOUT_MS", 2_000)?;
        let retry_backoff_ms: u64 = vars.non_negative("STORAGE_RETRY_BACKOFF_MS", 100)?;

        let bootstrap_admin = match (
            vars.get("BOOTSTRAP_ADMIN_USERNAME"),
            vars.get("BOOTSTRAP_ADMIN_SECRET"),
        ) {
            (Some(username), Some(secret)) => Some(BootstrapAdmin { username, secret }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Incomplete(
                    "BOOTSTRAP_ADMIN_USERNAME",
                    "BOOTSTRAP_ADMIN_SECRET",
                ));
            }
        };

        Ok(Self {
            host: vars.get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: vars.parse("PORT", 80)?,
            session_ttl,
            session_retention,
            reaper_interval: StdDuration::from_secs(reaper_interval_seconds.unsigned_abs()),
            hash_cost: HashCost {
                memory_kib: hash_memory_kib,
                iterations: hash_cost,
            },
            storage_policy: StoragePolicy::new(
                StdDuration::from_millis(storage_timeout_ms),
                StdDuration::from_millis(retry_backoff_ms),
            ),
            database_url: vars.get("DATABASE_URL"),
            redis_url: vars.get("REDIS_URL"),
            bootstrap_admin,
        })
    }
}

/// 環境変数の参照と型変換
struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn positive<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + fmt::Display,
        T::Err: fmt::Display,
    {
        let value = self.parse(name, default)?;
        if value <= T::default() {
            return Err(ConfigError::Invalid {
                name,
                value: value.to_string(),
                reason: "1 以上である必要があります".to_string(),
            });
        }
        Ok(value)
    }

    /// `min..=MAX_DURATION_SECONDS` の秒数を読む
    fn seconds(&self, name: &'static str, default: i64, min: i64) -> Result<i64, ConfigError> {
        let value: i64 = self.parse(name, default)?;
        let reason = if value < min {
            format!("{min} 以上である必要があります")
        } else if value > MAX_DURATION_SECONDS {
            format!("{MAX_DURATION_SECONDS} 以下である必要があります")
        } else {
            return Ok(value);
        };
        Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason,
        })
    }

    fn duration(
        &self,
        name: &'static str,
        default: i64,
        min: i64,
    ) -> Result<chrono::Duration, ConfigError> {
        let value = self.seconds(name, default, min)?;
        chrono::Duration::try_seconds(value).ok_or_else(|| ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "期間として表現できません".to_string(),
        })
    }

    fn non_negative<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + fmt::Display,
        T::Err: fmt::Display,
    {
        let value = self.parse(name, default)?;
        if value < T::default() {
            return Err(ConfigError::Invalid {
                name,
                value: value.to_string(),
                reason: "0 以上である必要があります".to_string(),
            });
        }
        Ok(value)
    }
}
