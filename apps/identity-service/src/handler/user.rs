//! # アイデンティティ管理ハンドラ
//!
//! ## エンドポイント
//!
//! - `GET /users` - 一覧（管理者）
//! - `POST /users` - 作成（管理者）
//! - `PUT /users/{id}/role` - ロール変更（管理者）
//! - `PUT /users/{id}/credential` - シークレットのローテーション（管理者または本人）
//! - `DELETE /users/{id}` - 無効化（管理者）
//!
//! すべて `Authorization: Bearer <token>` が必要。

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use highpeaks_domain::identity::{IdentityId, Role};
use serde::Deserialize;
use uuid::Uuid;

use super::{AuthState, IdentityResponse, authenticated};
use crate::error::IdentityError;

// --- リクエスト型 ---

/// アイデンティティ作成リクエスト
#[derive(Deserialize)]
pub struct CreateIdentityRequest {
    pub username: String,
    pub secret:   String,
    #[serde(default = "default_role")]
    pub role:     Role,
}

fn default_role() -> Role {
    Role::User
}

/// ロール変更リクエスト
#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

/// シークレットのローテーションリクエスト
#[derive(Deserialize)]
pub struct RotateCredentialRequest {
    pub secret: String,
}

// --- ハンドラ ---

/// GET /users
pub async fn list_identities(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, IdentityError> {
    let actor = authenticated(&state, &headers).await?;
    let identities = state.service.list_identities(&actor).await?;

    Ok(Json(
        identities
            .iter()
            .map(IdentityResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// POST /users
pub async fn create_identity(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateIdentityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, IdentityError> {
    let actor = authenticated(&state, &headers).await?;
    let Json(req) = payload?;
    let identity = state
        .service
        .provision(Some(&actor), &req.username, &req.secret, req.role)
        .await?;

    Ok((StatusCode::CREATED, Json(IdentityResponse::from(&identity))))
}

/// PUT /users/{id}/role
pub async fn change_role(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<ChangeRoleRequest>, JsonRejection>,
) -> Result<impl IntoResponse, IdentityError> {
    let actor = authenticated(&state, &headers).await?;
    let Json(req) = payload?;
    let identity = state
        .service
        .change_role(&actor, &IdentityId::from_uuid(id), req.role)
        .await?;

    Ok(Json(IdentityResponse::from(&identity)))
}

/// PUT /users/{id}/credential
///
/// 成功すると対象の既存セッションはすべて失効する。
pub async fn rotate_credential(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<RotateCredentialRequest>, JsonRejection>,
) -> Result<impl IntoResponse, IdentityError> {
    let actor = authenticated(&state, &headers).await?;
    let Json(req) = payload?;
    state
        .service
        .rotate_credential(&actor, &IdentityId::from_uuid(id), &req.secret)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /users/{id}
///
/// レコードは削除せず無効化する。
pub async fn deactivate_identity(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, IdentityError> {
    let actor = authenticated(&state, &headers).await?;
    state
        .service
        .deactivate(&actor, &IdentityId::from_uuid(id))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Method, Request},
        routing::{delete, get, put},
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tower::ServiceExt;

    use super::*;
    use crate::handler::test_support::{
        ADMIN_TOKEN,
        StubAuthService,
        USER_TOKEN,
        empty_request,
        json_body,
        json_request,
        state,
    };

    fn create_test_app(stub: StubAuthService) -> Router {
        Router::new()
            .route("/users", get(list_identities).post(create_identity))
            .route("/users/{id}", delete(deactivate_identity))
            .route("/users/{id}/role", put(change_role))
            .route("/users/{id}/credential", put(rotate_credential))
            .with_state(state(stub))
    }

    #[rstest]
    #[case(None, StatusCode::UNAUTHORIZED)]
    #[case(Some("expired-token"), StatusCode::UNAUTHORIZED)]
    #[case(Some(USER_TOKEN), StatusCode::FORBIDDEN)]
    #[case(Some(ADMIN_TOKEN), StatusCode::OK)]
    #[tokio::test]
    async fn test_list_identities_認可(
        #[case] token: Option<&str>,
        #[case] expected: StatusCode,
    ) {
        let sut = create_test_app(StubAuthService::default());

        let response = sut
            .oneshot(empty_request(Method::GET, "/users", token))
            .await
            .unwrap();

        assert_eq!(response.status(), expected);
    }

    #[tokio::test]
    async fn test_list_identities_成功() {
        // Given
        let sut = create_test_app(StubAuthService::default());

        // When
        let response = sut
            .oneshot(empty_request(Method::GET, "/users", Some(ADMIN_TOKEN)))
            .await
            .unwrap();

        // Then
        let json = json_body(response).await;
        let users = json.as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0]["username"], "root");
        assert_eq!(users[0]["role"], "Administrator");
        assert_eq!(users[1]["username"], "alice");
        assert_eq!(users[1]["role"], "User");
    }

    #[tokio::test]
    async fn test_create_identity_成功() {
        let sut = create_test_app(StubAuthService::default());
        let body = serde_json::json!({ "username": "bob", "secret": "B0bSecret", "role": "User" });

        let response = sut
            .oneshot(json_request(Method::POST, "/users", Some(ADMIN_TOKEN), &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = json_body(response).await;
        assert_eq!(json["username"], "bob");
        assert_eq!(json["role"], "User");
    }

    #[tokio::test]
    async fn test_create_identity_重複は409() {
        let sut = create_test_app(StubAuthService::failing(
            IdentityError::DuplicateUsername("bob".to_string()),
        ));
        let body = serde_json::json!({ "username": "bob", "secret": "B0bSecret" });

        let response = sut
            .oneshot(json_request(Method::POST, "/users", Some(ADMIN_TOKEN), &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_create_identity_一般ユーザーは403() {
        let sut = create_test_app(StubAuthService::default());
        let body = serde_json::json!({ "username": "bob", "secret": "B0bSecret" });

        let response = sut
            .oneshot(json_request(Method::POST, "/users", Some(USER_TOKEN), &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_change_role_成功() {
        let stub = StubAuthService::default();
        let uri = format!("/users/{}/role", stub.user.id());
        let sut = create_test_app(stub);
        let body = serde_json::json!({ "role": "Administrator" });

        let response = sut
            .oneshot(json_request(Method::PUT, &uri, Some(ADMIN_TOKEN), &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["role"], "Administrator");
    }

    #[tokio::test]
    async fn test_change_role_存在しない対象は404() {
        let sut = create_test_app(StubAuthService::failing(IdentityError::NotFound(
            "アイデンティティ",
        )));
        let uri = format!("/users/{}/role", Uuid::now_v7());
        let body = serde_json::json!({ "role": "User" });

        let response = sut
            .oneshot(json_request(Method::PUT, &uri, Some(ADMIN_TOKEN), &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rotate_credential_本人は成功() {
        let stub = StubAuthService::default();
        let uri = format!("/users/{}/credential", stub.user.id());
        let sut = create_test_app(stub);
        let body = serde_json::json!({ "secret": "N3wSecret!" });

        let response = sut
            .oneshot(json_request(Method::PUT, &uri, Some(USER_TOKEN), &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_rotate_credential_他人は403() {
        let stub = StubAuthService::default();
        let uri = format!("/users/{}/credential", stub.admin.id());
        let sut = create_test_app(stub);
        let body = serde_json::json!({ "secret": "Pwn3d!" });

        let response = sut
            .oneshot(json_request(Method::PUT, &uri, Some(USER_TOKEN), &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_deactivate_identity_成功() {
        let stub = StubAuthService::default();
        let uri = format!("/users/{}", stub.user.id());
        let sut = create_test_app(stub);

        let response = sut
            .oneshot(empty_request(Method::DELETE, &uri, Some(ADMIN_TOKEN)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    fn malformed_request(token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/users")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from("{\"username\": \"bob\",")).unwrap()
    }

    #[tokio::test]
    async fn test_create_identity_解釈できないボディは400のproblem_details() {
        let sut = create_test_app(StubAuthService::default());

        let response = sut
            .oneshot(malformed_request(Some(ADMIN_TOKEN)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(
            json["type"],
            "https://highpeaks.example.com/errors/validation-error"
        );
    }

    #[tokio::test]
    async fn test_create_identity_未認証ならボディより先に401() {
        let sut = create_test_app(StubAuthService::default());

        let response = sut.oneshot(malformed_request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
