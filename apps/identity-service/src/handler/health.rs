//! # ヘルスチェックハンドラ
//!
//! ## エンドポイント
//!
//! - `GET /health` - liveness。プレーンテキスト `OK` を返す
//! - `GET /health/ready` - readiness。両ストアへの疎通を確認する
//!
//! レスポンス型は [`highpeaks_shared::ReadinessResponse`] を参照。

use std::{sync::Arc, time::Duration};

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use highpeaks_infra::{IdentityRepository, InfraError, SessionStore};
use highpeaks_shared::{CheckStatus, ReadinessResponse};

/// Readiness Check の共有状態
pub struct ReadinessState {
    pub identities: Arc<dyn IdentityRepository>,
    pub sessions:   Arc<dyn SessionStore>,
    /// 各 ping の上限時間
    pub timeout:    Duration,
}

/// GET /health
pub async fn health_check() -> &'static str {
    "OK"
}

/// GET /health/ready
///
/// どちらかのストアが応答しなければ 503。
pub async fn readiness_check(State(state): State<Arc<ReadinessState>>) -> impl IntoResponse {
    let (identities, sessions) = tokio::join!(
        check(state.timeout, state.identities.ping()),
        check(state.timeout, state.sessions.ping()),
    );

    let response = ReadinessResponse::from_checks([
        ("identity_store", identities),
        ("session_store", sessions),
    ]);
    let status = if response.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

async fn check(
    timeout: Duration,
    ping: impl Future<Output = Result<(), InfraError>>,
) -> CheckStatus {
    match tokio::time::timeout(timeout, ping).await {
        Ok(Ok(())) => CheckStatus::Ok,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "ストアへの疎通確認に失敗しました");
            CheckStatus::Error
        }
        Err(_) => {
            tracing::warn!("ストアへの疎通確認がタイムアウトしました");
            CheckStatus::Error
        }
    }
}
