//! # 起動時のプロビジョニング
//!
//! 設定された管理者アカウントを作成する。同じユーザー名が既にあれば何もしない
//! （シークレットもロールも上書きしない）。

use highpeaks_domain::identity::Role;

use crate::{config::BootstrapAdmin, error::IdentityError, usecase::AuthService};

/// 管理者を作成する
///
/// 作成した場合は `true`、既に存在した場合は `false`。
pub async fn provision_admin(
    service: &dyn AuthService,
    admin: &BootstrapAdmin,
) -> Result<bool, IdentityError> {
    match service
        .provision(None, &admin.username, &admin.secret, Role::Administrator)
        .await
    {
        Ok(identity) => {
            tracing::info!(
                identity_id = %identity.id(),
                username = %identity.username(),
                "管理者アカウントを作成しました"
            );
            Ok(true)
        }
        Err(IdentityError::DuplicateUsername(username)) => {
            tracing::info!(
                username = %username,
                "管理者アカウントは既に存在するため作成をスキップしました"
            );
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::app_builder::Services;

    fn admin() -> BootstrapAdmin {
        BootstrapAdmin {
            username: "root".to_string(),
            secret:   "R00tSecret!".to_string(),
        }
    }

    #[tokio::test]
    async fn test_管理者を作成してログインできる() {
        let services = Services::in_memory_for_test();

        let created = provision_admin(services.auth.as_ref(), &admin())
            .await
            .unwrap();
        let session = services.auth.login("root", "R00tSecret!").await.unwrap();
        let identity = services.auth.authenticate(session.token()).await.unwrap();

        assert!(created);
        assert_eq!(identity.role(), Role::Administrator);
    }

    #[tokio::test]
    async fn test_既存のユーザー名なら上書きしない() {
        let services = Services::in_memory_for_test();
        let auth: Arc<dyn AuthService> = services.auth.clone();
        auth.provision(None, "root", "Original!", Role::User)
            .await
            .unwrap();

        let created = provision_admin(auth.as_ref(), &admin()).await.unwrap();

        assert!(!created);
        assert!(auth.login("root", "Original!").await.is_ok());
        assert!(matches!(
            auth.login("root", "R00tSecret!").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }
}
