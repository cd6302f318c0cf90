//! # Identity Service サーバー
//!
//! アカウントの認証とセッション管理を担当する HTTP サーバー。
//!
//! ## 役割
//!
//! - **ログイン**: ユーザー名とシークレットを検証し、セッショントークンを発行する
//! - **トークン認証**: Bearer トークンからアカウントを解決する
//! - **アカウント管理**: 管理者による作成・ロール変更・無効化
//!
//! ## ストアの選択
//!
//! ```text
//! DATABASE_URL あり → PostgreSQL（起動時にマイグレーション）
//!              なし → インメモリ
//! REDIS_URL    あり → Redis
//!              なし → インメモリ
//! ```
//!
//! 環境変数の一覧は [`config`](highpeaks_identity_service::config) を参照。
//!
//! ## 起動方法
//!
//! ```bash
//! # 開発環境（インメモリ）
//! PORT=8080 cargo run -p highpeaks-identity-service
//!
//! # 本番環境
//! DATABASE_URL=postgres://... REDIS_URL=redis://... cargo run -p highpeaks-identity-service --release
//! ```

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use highpeaks_domain::clock::SystemClock;
use highpeaks_identity_service::{
    app_builder::{Services, Stores, build_router},
    bootstrap::provision_admin,
    config::IdentityConfig,
    reaper::spawn_reaper,
};
use highpeaks_infra::{
    Argon2CredentialHasher,
    IdentityRepository,
    InMemoryIdentityRepository,
    InMemorySessionStore,
    PostgresIdentityRepository,
    RedisSessionStore,
    SessionStore,
    db,
    redis,
};
use highpeaks_shared::observability::{TracingConfig, init_tracing};
use tokio::net::TcpListener;

/// Identity Service サーバーのエントリーポイント
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    // トレーシング初期化
    let tracing_config = TracingConfig::from_env("identity-service");
    init_tracing(&tracing_config);
    let _tracing_guard = tracing::info_span!("app", service = "identity-service").entered();

    // 設定読み込み
    let config = IdentityConfig::from_env().context("設定の読み込みに失敗しました")?;

    tracing::info!(
        "Identity Service サーバーを起動します: {}:{}",
        config.host,
        config.port
    );

    let stores = connect_stores(&config).await?;

    let hasher = Argon2CredentialHasher::new(config.hash_cost)
        .context("ハッシュ設定が不正です")?;
    let services = Services::build(
        &stores,
        Arc::new(hasher),
        Arc::new(SystemClock),
        config.session_ttl,
        config.storage_policy,
    )
    .context("ユースケースの初期化に失敗しました")?;

    if let Some(admin) = &config.bootstrap_admin {
        provision_admin(services.auth.as_ref(), admin)
            .await
            .context("管理者アカウントの作成に失敗しました")?;
    }

    let reaper = spawn_reaper(services.sessions.clone(), config.reaper_interval);

    let app = build_router(&services, &stores, config.storage_policy.timeout);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("アドレスのパースに失敗しました")?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Identity Service サーバーが起動しました: {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.abort();
    tracing::info!("Identity Service サーバーを停止しました");

    Ok(())
}

/// 設定に応じて永続化先へ接続する
async fn connect_stores(config: &IdentityConfig) -> anyhow::Result<Stores> {
    let identities: Arc<dyn IdentityRepository> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url)
                .await
                .context("データベース接続に失敗しました")?;
            tracing::info!("データベースに接続しました");

            db::run_migrations(&pool)
                .await
                .context("マイグレーションの実行に失敗しました")?;
            tracing::info!("マイグレーションを適用しました");

            Arc::new(PostgresIdentityRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL が未設定のため、インメモリのアイデンティティストアを使用します");
            Arc::new(InMemoryIdentityRepository::new())
        }
    };

    let sessions: Arc<dyn SessionStore> = match &config.redis_url {
        Some(url) => {
            let conn = redis::create_connection_manager(url)
                .await
                .context("Redis 接続に失敗しました")?;
            tracing::info!("Redis に接続しました");

            Arc::new(RedisSessionStore::new(conn, config.session_retention))
        }
        None => {
            tracing::warn!("REDIS_URL が未設定のため、インメモリのセッションストアを使用します");
            Arc::new(InMemorySessionStore::new(config.session_retention))
        }
    };

    Ok(Stores {
        identities,
        sessions,
    })
}

/// SIGINT / SIGTERM を待つ
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "SIGINT ハンドラの登録に失敗しました");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM ハンドラの登録に失敗しました");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("シャットダウンシグナルを受信しました");
}
