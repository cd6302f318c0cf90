//! # 認証情報ハッシュ
//!
//! Argon2id によるシークレットのハッシュ化と検証を提供する。
//!
//! ハッシュは PHC 文字列形式（`$argon2id$v=19$m=...,t=...,p=1$salt$hash`）で、
//! パラメータとソルトを含む。検証時はハッシュ側のパラメータが使われるため、
//! コスト設定を変えても既存のハッシュは検証できる。

use argon2::{
    Algorithm,
    Argon2,
    Params,
    PasswordHasher as _,
    PasswordVerifier as _,
    Version,
    password_hash::{PasswordHash as Argon2PasswordHash, SaltString, rand_core::OsRng},
};
use highpeaks_domain::password::{PasswordHash, PasswordVerifyResult, PlainPassword};

use crate::InfraError;

/// シークレットのハッシュ化と検証を担当するトレイト
///
/// CPU バウンドな処理のため、非同期コンテキストからは
/// `tokio::task::spawn_blocking` 経由で呼び出すこと。
pub trait CredentialHasher: Send + Sync {
    /// ソルト付きハッシュを生成する
    fn hash(&self, password: &PlainPassword) -> Result<PasswordHash, InfraError>;

    /// シークレットがハッシュと一致するか検証する
    ///
    /// # Errors
    ///
    /// - 不正なハッシュ形式の場合
    fn verify(
        &self,
        password: &PlainPassword,
        hash: &PasswordHash,
    ) -> Result<PasswordVerifyResult, InfraError>;
}

/// Argon2id のコストパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// メモリコスト（KiB）
    pub memory_kib: u32,
    /// 反復回数（t_cost）
    pub iterations: u32,
}

impl Default for HashCost {
    /// OWASP 推奨パラメータ（RFC 9106）: 64 MiB, t=1, p=1
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 1,
        }
    }
}

/// Argon2id による実装
pub struct Argon2CredentialHasher {
    argon2: Argon2<'static>,
}

impl Argon2CredentialHasher {
    /// # Errors
    ///
    /// パラメータが Argon2 の許容範囲外の場合（反復回数 0 など）
    pub fn new(cost: HashCost) -> Result<Self, InfraError> {
        let params = Params::new(
            cost.memory_kib,
            cost.iterations,
            1,    // parallelism
            None, // output length (default: 32)
        )
        .map_err(|e| InfraError::unexpected(format!("Argon2 パラメータが不正です: {e}")))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl CredentialHasher for Argon2CredentialHasher {
    fn hash(&self, password: &PlainPassword) -> Result<PasswordHash, InfraError> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed = self
            .argon2
            .hash_password(password.as_str().as_bytes(), &salt)
            .map_err(|e| InfraError::unexpected(format!("ハッシュ化に失敗しました: {e}")))?;

        Ok(PasswordHash::new(hashed.to_string()))
    }

    fn verify(
        &self,
        password: &PlainPassword,
        hash: &PasswordHash,
    ) -> Result<PasswordVerifyResult, InfraError> {
        let parsed = Argon2PasswordHash::new(hash.as_str())
            .map_err(|e| InfraError::corrupted(format!("不正なハッシュ形式: {e}")))?;

        let matched = self
            .argon2
            .verify_password(password.as_str().as_bytes(), &parsed)
            .is_ok();

        Ok(PasswordVerifyResult::from(matched))
    }
}
