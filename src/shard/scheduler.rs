//! Per-shard tick loop / 分片定时循环
//!
//! One timer task per shard: first armed shortly after the first
//! Configure, then rearmed at fire-time + interval. A tick that overruns
//! the interval queues the next tick immediately after completion. A
//! read-only shard is an absorption state: the loop exits without
//! rearming. / 每个分片一个定时任务；只读是吸收态，循环退出不再重排。

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::Shard;

/// Delay before the first tick after the first Configure
/// / 首次 Configure 后第一次 tick 的延迟
pub(crate) const FIRST_ARM_DELAY: Duration = Duration::from_secs(5);

/// Arm the tick loop for a shard / 为分片启动定时循环
///
/// Holds only a weak reference so a dropped shard stops its own timer.
pub(crate) fn arm(shard: &Arc<Shard>, initial_delay: Duration) {
    let weak = Arc::downgrade(shard);
    let name = shard.name.clone();
    tokio::spawn(async move {
        tokio::time::sleep(initial_delay).await;
        loop {
            let Some(shard) = weak.upgrade() else {
                return;
            };
            if shard.is_read_only().await {
                // 吸收态：不再重排
                tracing::debug!("Scheduler for {} stopped: shard is read-only", name);
                return;
            }

            let fired = Instant::now();
            shard.tick().await;
            let interval = Duration::from_millis(shard.tick_interval_ms().await);
            drop(shard);

            // Rearm relative to fire time; an overrun tick reschedules
            // immediately / 相对触发时刻重排，超时则立即排队
            tokio::time::sleep(interval.saturating_sub(fired.elapsed())).await;
        }
    });
}
