//! # 認証ハンドラ
//!
//! ## エンドポイント
//!
//! - `POST /login` - ログインしてトークンを発行
//! - `POST /logout` - トークンを失効
//! - `GET /me` - トークンの持ち主を返す

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use highpeaks_domain::session::SessionToken;
use serde::{Deserialize, Serialize};

use super::{AuthState, IdentityResponse, authenticated};
use crate::error::IdentityError;

// --- リクエスト/レスポンス型 ---

/// ログインリクエスト
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub secret:   String,
}

/// ログインレスポンス
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token:      String,
    pub expires_at: DateTime<Utc>,
}

/// ログアウトリクエスト
#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub token: String,
}

// --- ハンドラ ---

/// POST /login
///
/// 失敗理由（未登録・無効化済み・シークレット誤り）は区別せず 401 を返す。
pub async fn login(
    State(state): State<Arc<AuthState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, IdentityError> {
    let Json(req) = payload?;
    let session = state.service.login(&req.username, &req.secret).await?;

    Ok(Json(LoginResponse {
        token:      session.token().as_str().to_string(),
        expires_at: session.expires_at(),
    }))
}

/// POST /logout
///
/// 既に失効済みのトークンでも 204。未知のトークンは 404。
pub async fn logout(
    State(state): State<Arc<AuthState>>,
    payload: Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, IdentityError> {
    let Json(req) = payload?;
    state
        .service
        .logout(&SessionToken::from_string(req.token))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /me
pub async fn me(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, IdentityError> {
    let identity = authenticated(&state, &headers).await?;
    Ok(Json(IdentityResponse::from(&identity)))
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Method, Request},
        routing::{get, post},
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tower::ServiceExt;

    use super::*;
    use crate::handler::test_support::{
        StubAuthService,
        USER_TOKEN,
        empty_request,
        json_body,
        json_request,
        state,
    };

    fn create_test_app(stub: StubAuthService) -> Router {
        Router::new()
            .route("/login", post(login))
            .route("/logout", post(logout))
            .route("/me", get(me))
            .with_state(state(stub))
    }

    #[tokio::test]
    async fn test_login_成功() {
        // Given
        let sut = create_test_app(StubAuthService::default());
        let body = serde_json::json!({ "username": "alice", "secret": "S3cret!" });

        // When
        let response = sut
            .oneshot(json_request(Method::POST, "/login", None, &body))
            .await
            .unwrap();

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["token"], USER_TOKEN);
        assert_eq!(json["expiresAt"], "2026-01-01T08:00:00Z");
    }

    #[tokio::test]
    async fn test_login_認証失敗() {
        // Given
        let sut = create_test_app(StubAuthService::default());
        let body = serde_json::json!({ "username": "alice", "secret": "wrong" });

        // When
        let response = sut
            .oneshot(json_request(Method::POST, "/login", None, &body))
            .await
            .unwrap();

        // Then
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(
            json["type"],
            "https://highpeaks.example.com/errors/invalid-credentials"
        );
    }

    #[tokio::test]
    async fn test_login_ストレージタイムアウトは503() {
        let sut = create_test_app(StubAuthService::failing(IdentityError::StorageTimeout));
        let body = serde_json::json!({ "username": "alice", "secret": "S3cret!" });

        let response = sut
            .oneshot(json_request(Method::POST, "/login", None, &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_logout_成功() {
        let sut = create_test_app(StubAuthService::default());
        let body = serde_json::json!({ "token": USER_TOKEN });

        let response = sut
            .oneshot(json_request(Method::POST, "/logout", None, &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_logout_未知のトークンは404() {
        let sut = create_test_app(StubAuthService::default());
        let body = serde_json::json!({ "token": "unknown" });

        let response = sut
            .oneshot(json_request(Method::POST, "/logout", None, &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_me_トークンの持ち主を返す() {
        let sut = create_test_app(StubAuthService::default());

        let response = sut
            .oneshot(empty_request(Method::GET, "/me", Some(USER_TOKEN)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["username"], "alice");
        assert_eq!(json["role"], "User");
        assert!(json["id"].is_string());
        assert!(json.get("credentialHash").is_none());
    }

    #[tokio::test]
    async fn test_me_トークンなしは401() {
        let sut = create_test_app(StubAuthService::default());

        let response = sut
            .oneshot(empty_request(Method::GET, "/me", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[rstest]
    #[case(Some("application/json"), "{\"username\": ")]
    #[case(Some("application/json"), "{\"username\": \"alice\"}")]
    #[case(None, "{\"username\": \"alice\", \"secret\": \"S3cret!\"}")]
    #[tokio::test]
    async fn test_login_解釈できないボディは400のproblem_details(
        #[case] content_type: Option<&str>,
        #[case] body: &'static str,
    ) {
        // Given
        let sut = create_test_app(StubAuthService::default());
        let mut builder = Request::builder().method(Method::POST).uri("/login");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }

        // When
        let response = sut
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap();

        // Then
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(
            json["type"],
            "https://highpeaks.example.com/errors/validation-error"
        );
        assert_eq!(json["status"], 400);
    }
}
