use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::registry::ConnectionRegistry;

/// 在线列表广播器
///
/// 固定间隔把全部在线身份推送给所有连接，与加入/断开事件解耦，
/// 以限制连接抖动时的广播频率。
pub struct PresenceBroadcaster;

impl PresenceBroadcaster {
    pub fn spawn(
        registry: Weak<ConnectionRegistry>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(Self::run(registry, every, shutdown))
    }

    async fn run(registry: Weak<ConnectionRegistry>, every: Duration, shutdown: CancellationToken) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即完成，跳过
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Presence broadcaster shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(registry) = registry.upgrade() else {
                        tracing::debug!("Connection registry dropped, stopping presence broadcaster");
                        break;
                    };
                    let report = registry.broadcast_presence().await;
                    tracing::trace!(delivered = report.delivered, failed = report.failed, "Active users broadcast");
                }
            }
        }
    }
}
