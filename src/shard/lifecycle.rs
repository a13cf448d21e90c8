//! Lifecycle step - rolling migration of the oldest rows to cold storage
//! / 生命周期步骤：最老的行滚动迁移到冷存储分片
//!
//! Safety property: a document is never simultaneously absent from this
//! shard and from every cold shard. The local delete runs only after
//! every cold write succeeded, and cold upserts are id-idempotent, so a
//! crash in between leaves at worst a duplicated (still findable) row.
//! / 安全性质：本地删除只在所有冷写入成功后执行。

use super::error::ShardError;
use super::types::{ConfigPatch, Document};
use super::Shard;

/// One lifecycle round, invoked from the shard tick after replication
/// / 单轮生命周期检查，在复制之后由 tick 调用
pub(crate) async fn step(shard: &Shard) -> Result<(), ShardError> {
    // Snapshot thresholds and the purge window under the lock / 锁内取快照
    let snapshot = {
        let inner = shard.inner.lock().await;
        let config = inner.effective_config();
        if config.read_only {
            return Ok(());
        }
        let (Some(prefix), Some(threshold)) =
            (config.cold_shard_prefix.clone(), config.purge_count_threshold)
        else {
            // 没有冷分片目标就无处可迁移
            return Ok(());
        };
        if config.cold_shard_capacity == 0 {
            tracing::warn!("Lifecycle on {}: coldShardCapacity is 0, skipping", shard.name);
            return Ok(());
        }

        let (count, bytes) = inner.store.count_and_bytes().await?;
        if count < threshold && bytes <= config.size_threshold_bytes {
            return Ok(());
        }

        let to_purge = match config.purge_target_count {
            Some(target) => count.saturating_sub(target),
            None => count / 5,
        };
        if to_purge == 0 {
            return Ok(());
        }

        let rows = inner.store.scan_oldest(to_purge as i64).await?;
        let cold_index = inner.meta.current_cold_index().await?;
        (prefix, config.cold_shard_capacity, config.id_type, rows, cold_index)
    };
    let (prefix, capacity, id_type, rows, start_index) = snapshot;
    if rows.is_empty() {
        return Ok(());
    }

    // Fill cold shards outside the lock so new Index calls keep landing
    // / 在锁外填充冷分片，不阻塞新的写入
    let mut i = start_index;
    let mut remaining = rows.as_slice();
    let mut all_written = true;

    while !remaining.is_empty() {
        let stub = match shard.registry.resolve_cold(&prefix, i).await {
            Ok(stub) => stub,
            Err(err) => {
                tracing::warn!("Cold shard {}-{} resolution failed: {}", prefix, i, err);
                all_written = false;
                break;
            }
        };

        // Stats failures are treated as an empty shard / 统计失败按空分片处理
        let stats = stub.stats().await.unwrap_or_default();
        let available = capacity.saturating_sub(stats.count);
        if available == 0 || (stats.read_only && stats.count > 0) {
            // 已满或已封存的分片跳到下一个
            i += 1;
            continue;
        }

        let take = (available as usize).min(remaining.len());
        let (chunk, rest) = remaining.split_at(take);
        let was_empty = stats.count == 0;

        if was_empty {
            // Pin the id mode before the shard's first write so the batch
            // validates deterministically / 首次写入前固定 ID 类型
            if let Err(err) = stub.configure(ConfigPatch::pin_id_type(id_type)).await {
                tracing::warn!("Cold shard {}-{} configure failed: {}", prefix, i, err);
                all_written = false;
                break;
            }
        }

        let docs: Vec<Document> = chunk
            .iter()
            .map(|r| Document { id: r.id.clone(), content: r.content.clone() })
            .collect();

        match stub.index(docs).await {
            Ok(_) => {
                if was_empty {
                    // Sealed read-only right after its first write; the data
                    // is already safe if sealing itself fails
                    // / 首次写入后立即封只读
                    if let Err(err) = stub.configure(ConfigPatch::read_only()).await {
                        tracing::warn!(
                            "Cold shard {}-{} seal failed: {}",
                            prefix,
                            i,
                            err
                        );
                    }
                }
                if take as u64 == available {
                    // 恰好填满，推进序号
                    i += 1;
                }
                remaining = rest;
            }
            Err(err) => {
                tracing::warn!("Cold shard {}-{} write failed: {}", prefix, i, err);
                all_written = false;
                break;
            }
        }
    }

    // Persist the index move, then delete only if every write landed
    // / 先持久化冷分片序号，所有写入成功后才删除本地行
    let inner = shard.inner.lock().await;
    if i != start_index {
        inner.meta.set_current_cold_index(i).await?;
    }

    if all_written {
        let last_moved = rows.last().map(|r| r.rowid).unwrap_or_default();
        let deleted = inner.store.delete_up_to(last_moved).await?;
        let (count, bytes) = inner.store.count_and_bytes().await.unwrap_or_default();
        tracing::info!(
            "Lifecycle on {}: moved {} rows to cold storage, deleted {}, now {} docs / {} bytes, cold index {}",
            shard.name,
            rows.len(),
            deleted,
            count,
            bytes,
            i
        );
    } else {
        // 数据仍在本地，下一个 tick 重试
        tracing::warn!(
            "Lifecycle on {}: cold migration incomplete, keeping local rows for retry",
            shard.name
        );
    }
    Ok(())
}
