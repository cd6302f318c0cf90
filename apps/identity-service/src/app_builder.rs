//! # アプリケーション構築
//!
//! DI（ストア・ユースケース・State）の初期化とルーター構築を担当する。
//! `main.rs` は接続先の決定とサーバー起動に集中する。

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use highpeaks_domain::clock::Clock;
use highpeaks_infra::{
    CredentialHasher,
    IdentityRepository,
    InMemoryIdentityRepository,
    InMemorySessionStore,
    InfraError,
    SessionStore,
    StoragePolicy,
};
use highpeaks_shared::{canonical_log::CanonicalLogLineLayer, observability::make_request_span};
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        AuthState,
        ReadinessState,
        change_role,
        create_identity,
        deactivate_identity,
        health_check,
        list_identities,
        login,
        logout,
        me,
        readiness_check,
        rotate_credential,
    },
    usecase::{AuthService, AuthServiceImpl, CredentialStore, SessionManager},
};

/// 永続化先
///
/// 起動時に一度だけ作成し、プロセスの終了まで共有する。
#[derive(Clone)]
pub struct Stores {
    pub identities: Arc<dyn IdentityRepository>,
    pub sessions:   Arc<dyn SessionStore>,
}

impl Stores {
    /// 両ストアをインメモリで作成する
    pub fn in_memory(session_retention: chrono::Duration) -> Self {
        Self {
            identities: Arc::new(InMemoryIdentityRepository::new()),
            sessions:   Arc::new(InMemorySessionStore::new(session_retention)),
        }
    }
}

/// ユースケースの組み立て結果
#[derive(Clone)]
pub struct Services {
    pub auth:     Arc<dyn AuthService>,
    /// リーパーが使う
    pub sessions: Arc<SessionManager>,
}

impl Services {
    /// ストアからユースケースを組み立てる
    ///
    /// # Errors
    ///
    /// ダミーハッシュの生成に失敗した場合。
    pub fn build(
        stores: &Stores,
        hasher: Arc<dyn CredentialHasher>,
        clock: Arc<dyn Clock>,
        session_ttl: chrono::Duration,
        policy: StoragePolicy,
    ) -> Result<Self, InfraError> {
        let credentials = Arc::new(CredentialStore::new(
            stores.identities.clone(),
            hasher,
            clock.clone(),
            policy,
        )?);
        let sessions = Arc::new(SessionManager::new(
            stores.sessions.clone(),
            stores.identities.clone(),
            clock,
            policy,
        ));
        let auth = Arc::new(AuthServiceImpl::new(
            credentials,
            sessions.clone(),
            session_ttl,
        ));

        Ok(Self { auth, sessions })
    }
}

/// ルーターを構築する
///
/// `readiness_timeout` は `/health/ready` の各 ping の上限時間。
pub fn build_router(services: &Services, stores: &Stores, readiness_timeout: Duration) -> Router {
    let auth_state = Arc::new(AuthState {
        service: services.auth.clone(),
    });
    let readiness_state = Arc::new(ReadinessState {
        identities: stores.identities.clone(),
        sessions:   stores.sessions.clone(),
        timeout:    readiness_timeout,
    });

    Router::new()
        .route("/health", get(health_check))
        .merge(
            Router::new()
                .route("/health/ready", get(readiness_check))
                .with_state(readiness_state),
        )
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/users", get(list_identities).post(create_identity))
        .route("/users/{id}", delete(deactivate_identity))
        .route("/users/{id}/role", put(change_role))
        .route("/users/{id}/credential", put(rotate_credential))
        .with_state(auth_state)
        .layer(CanonicalLogLineLayer)
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
}

#[cfg(test)]
impl Services {
    /// 低コストのハッシュ設定とインメモリストアで組み立てる
    pub(crate) fn in_memory_for_test() -> Self {
        use highpeaks_domain::clock::SystemClock;
        use highpeaks_infra::{Argon2CredentialHasher, HashCost};

        let hasher = Argon2CredentialHasher::new(HashCost {
            memory_kib: 1024,
            iterations: 1,
        })
        .unwrap();

        Self::build(
            &Stores::in_memory(chrono::Duration::hours(1)),
            Arc::new(hasher),
            Arc::new(SystemClock),
            chrono::Duration::hours(8),
            StoragePolicy::default(),
        )
        .unwrap()
    }
}
