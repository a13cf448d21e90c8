//! Replication step - stream new rows to every configured replica
//! / 复制步骤：把新行推送到所有配置的副本
//!
//! Delivery is at-least-once; replicas upsert by id, which makes the
//! combination effectively exactly-once. The cursor advances to the top
//! of the scanned window even when some replicas fail - a replica that
//! missed a window resynchronizes on its re-attach path.
//! / 至少一次投递加按 ID 幂等写入；游标在部分失败时仍然前进。

use futures::future::join_all;

use super::error::ShardError;
use super::types::Document;
use super::Shard;

/// One replication round, invoked from the shard tick / 单轮复制
pub(crate) async fn step(shard: &Shard) -> Result<(), ShardError> {
    // Snapshot rows and targets under the shard lock / 锁内取快照
    let (rows, replicas) = {
        let inner = shard.inner.lock().await;
        let config = inner.effective_config();
        if config.read_only || config.replicas.is_empty() {
            return Ok(());
        }
        let cursor = inner.meta.last_synced_rowid().await?;
        let rows = inner.store.scan_since(cursor, None).await?;
        (rows, config.replicas)
    };

    if rows.is_empty() {
        return Ok(());
    }

    let docs: Vec<Document> = rows
        .iter()
        .map(|r| Document { id: r.id.clone(), content: r.content.clone() })
        .collect();
    let max_rowid = rows.last().map(|r| r.rowid).unwrap_or_default();

    // Parallel fan-out; per-replica failures are absorbed / 并行扇出
    let tasks = replicas.iter().map(|replica| {
        let docs = docs.clone();
        async move {
            match shard.registry.resolve(replica).await {
                Ok(stub) => match stub.sync(docs).await {
                    Ok(_) => true,
                    Err(err) => {
                        tracing::warn!(
                            "Replica {} sync failed: {}",
                            replica.shard_name(),
                            err
                        );
                        false
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        "Replica {} resolution failed: {}",
                        replica.shard_name(),
                        err
                    );
                    false
                }
            }
        }
    });
    let results = join_all(tasks).await;
    let failed = results.iter().filter(|ok| !**ok).count();

    // Advance even on partial failure; advancement stays monotonic
    // / 部分失败也前进游标，但保持单调
    {
        let inner = shard.inner.lock().await;
        let current = inner.meta.last_synced_rowid().await?;
        if max_rowid > current {
            inner.meta.set_last_synced_rowid(max_rowid).await?;
        }
    }

    if failed > 0 {
        tracing::warn!(
            "Replication round on {}: {} rows, {}/{} replicas failed",
            shard.name,
            rows.len(),
            failed,
            results.len()
        );
    } else {
        tracing::debug!(
            "Replication round on {}: {} rows to {} replicas",
            shard.name,
            rows.len(),
            results.len()
        );
    }
    Ok(())
}
