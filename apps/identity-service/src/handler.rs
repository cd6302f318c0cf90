//! # HTTP リクエストハンドラ
//!
//! axum のルートに対応するハンドラ関数を定義する。
//!
//! ## 設計方針
//!
//! - 各ハンドラはサブモジュールに配置
//! - 親モジュールで re-export し、フラットな API を提供
//! - ハンドラは薄く保ち、ビジネスロジックは usecase 層に委譲
//!
//! ## ハンドラ一覧
//!
//! - `health`: ヘルスチェック
//! - `auth`: ログイン・ログアウト・本人情報
//! - `user`: アイデンティティ管理（管理者向け）

pub mod auth;
pub mod health;
pub mod user;

use std::sync::Arc;

pub use auth::{LoginRequest, LoginResponse, LogoutRequest, login, logout, me};
use axum::http::{HeaderMap, header::AUTHORIZATION};
pub use health::{ReadinessState, health_check, readiness_check};
use highpeaks_domain::{
    identity::{Identity, Role},
    session::SessionToken,
};
use serde::Serialize;
pub use user::{
    ChangeRoleRequest,
    CreateIdentityRequest,
    RotateCredentialRequest,
    change_role,
    create_identity,
    deactivate_identity,
    list_identities,
    rotate_credential,
};
use uuid::Uuid;

use crate::{error::IdentityError, usecase::AuthService};

/// 認証・管理ハンドラの共有状態
pub struct AuthState {
    pub service: Arc<dyn AuthService>,
}

/// アイデンティティの公開表現
///
/// 認証情報ハッシュと状態は含めない。
#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub id:       Uuid,
    pub username: String,
    pub role:     Role,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id:       *identity.id().as_uuid(),
            username: identity.username().to_string(),
            role:     identity.role(),
        }
    }
}

/// `Authorization: Bearer <token>` からトークンを取り出す
fn bearer_token(headers: &HeaderMap) -> Option<SessionToken> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(SessionToken::from_string(token))
    } else {
        None
    }
}

/// リクエスト元のアイデンティティを解決する
async fn authenticated(state: &AuthState, headers: &HeaderMap) -> Result<Identity, IdentityError> {
    let token = bearer_token(headers).ok_or(IdentityError::Unauthenticated)?;
    state.service.authenticate(&token).await
}

#[cfg(test)]
pub(crate) mod test_support {
    //! ハンドラテスト用のスタブ

    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::{body::Body, http::Request, response::Response};
    use chrono::{TimeZone, Utc};
    use highpeaks_domain::{
        identity::{Capability, IdentityId, Role, Username},
        password::PasswordHash,
        session::Session,
    };

    use super::*;
    use crate::usecase::authorize;

    pub const ADMIN_TOKEN: &str = "admin-token";
    pub const USER_TOKEN: &str = "user-token";

    pub fn identity(username: &str, role: Role) -> Identity {
        Identity::new(
            IdentityId::new(),
            Username::new(username).unwrap(),
            PasswordHash::new("$argon2id$dummy"),
            role,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    /// 固定のトークンで管理者と一般ユーザーを認証するスタブ
    pub struct StubAuthService {
        pub admin:   Identity,
        pub user:    Identity,
        /// 管理系の操作が返すエラー（`None` なら成功）
        pub failure: Mutex<Option<IdentityError>>,
    }

    impl Default for StubAuthService {
        fn default() -> Self {
            Self {
                admin:   identity("root", Role::Administrator),
                user:    identity("alice", Role::User),
                failure: Mutex::new(None),
            }
        }
    }

    impl StubAuthService {
        pub fn failing(error: IdentityError) -> Self {
            let stub = Self::default();
            *stub.failure.lock().unwrap() = Some(error);
            stub
        }

        fn take_failure(&self) -> Result<(), IdentityError> {
            match self.failure.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl AuthService for StubAuthService {
        async fn login(&self, username: &str, secret: &str) -> Result<Session, IdentityError> {
            self.take_failure()?;
            if username == "alice" && secret == "S3cret!" {
                Ok(Session::issue(
                    SessionToken::from_string(USER_TOKEN),
                    *self.user.id(),
                    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                    chrono::Duration::hours(8),
                )?)
            } else {
                Err(IdentityError::InvalidCredentials)
            }
        }

        async fn logout(&self, token: &SessionToken) -> Result<(), IdentityError> {
            match token.as_str() {
                ADMIN_TOKEN | USER_TOKEN => Ok(()),
                _ => Err(IdentityError::NotFound("セッション")),
            }
        }

        async fn authenticate(&self, token: &SessionToken) -> Result<Identity, IdentityError> {
            match token.as_str() {
                ADMIN_TOKEN => Ok(self.admin.clone()),
                USER_TOKEN => Ok(self.user.clone()),
                _ => Err(IdentityError::Unauthenticated),
            }
        }

        async fn list_identities(
            &self,
            actor: &Identity,
        ) -> Result<Vec<Identity>, IdentityError> {
            authorize(actor, Capability::ListIdentities)?;
            self.take_failure()?;
            Ok(vec![self.admin.clone(), self.user.clone()])
        }

        async fn provision(
            &self,
            actor: Option<&Identity>,
            username: &str,
            _secret: &str,
            role: Role,
        ) -> Result<Identity, IdentityError> {
            if let Some(actor) = actor {
                authorize(actor, Capability::ManageIdentities)?;
            }
            self.take_failure()?;
            Ok(identity(username, role))
        }

        async fn change_role(
            &self,
            actor: &Identity,
            _id: &IdentityId,
            role: Role,
        ) -> Result<Identity, IdentityError> {
            authorize(actor, Capability::ManageIdentities)?;
            self.take_failure()?;
            Ok(self.user.clone().with_role(role, Utc::now()))
        }

        async fn rotate_credential(
            &self,
            actor: &Identity,
            id: &IdentityId,
            _secret: &str,
        ) -> Result<(), IdentityError> {
            if actor.id() != id {
                authorize(actor, Capability::ManageIdentities)?;
            }
            self.take_failure()
        }

        async fn deactivate(
            &self,
            actor: &Identity,
            _id: &IdentityId,
        ) -> Result<(), IdentityError> {
            authorize(actor, Capability::ManageIdentities)?;
            self.take_failure()
        }
    }

    pub fn state(stub: StubAuthService) -> Arc<AuthState> {
        Arc::new(AuthState {
            service: Arc::new(stub),
        })
    }

    pub async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    pub fn json_request(
        method: axum::http::Method,
        uri: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap()
    }

    pub fn empty_request(
        method: axum::http::Method,
        uri: &str,
        token: Option<&str>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }
}
