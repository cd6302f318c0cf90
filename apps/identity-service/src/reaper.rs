//! # 期限切れセッションの削除
//!
//! 一定間隔で [`SessionManager::purge_expired`] を呼ぶバックグラウンドタスク。
//! 期限切れの判定は検証時に行われるため、このタスクはストレージの回収だけを担う。

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;

use crate::usecase::SessionManager;

/// リーパーを起動する
///
/// 最初の削除は起動から `interval` 後。失敗してもログを出して次の周期を待つ。
pub fn spawn_reaper(sessions: Arc<SessionManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 初回の tick は即座に完了する
        ticker.tick().await;

        loop {
            ticker.tick().await;
            purge_once(&sessions).await;
        }
    })
}

async fn purge_once(sessions: &SessionManager) {
    match sessions.purge_expired(sessions.now()).await {
        Ok(0) => {}
        Ok(purged) => tracing::info!(purged, "期限切れセッションを削除しました"),
        Err(e) => tracing::error!(error = %e, "期限切れセッションの削除に失敗しました"),
    }
}
