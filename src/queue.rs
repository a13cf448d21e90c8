//! Durable ingestion queue / 持久化摄入队列
//!
//! Writes accepted on the HTTP surface land here first; a background
//! consumer drains batches into the primary shard in arrival order.
//! Batches that fail validation are dropped with a logged reason (they
//! can never succeed); transient failures retry with an attempt cap.
//! / 写入先落队列，后台消费者按到达顺序推进主分片；校验失败的批次
//! 直接丢弃，瞬时失败按次数上限重试。

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use yaosearch_backend::shard::error::ShardError;
use yaosearch_backend::shard::types::Document;

use crate::state::AppState;

/// Batches pulled per drain round / 每轮拉取的批次数
const DRAIN_BATCH: i64 = 16;
/// A batch failing this many times is dropped / 失败超过该次数的批次被丢弃
const MAX_ATTEMPTS: i64 = 5;
/// Idle poll interval / 空闲轮询间隔
const IDLE_POLL_MS: u64 = 200;

#[derive(Debug)]
struct QueuedBatch {
    id: i64,
    batch_id: String,
    payload: String,
    attempts: i64,
}

#[derive(Clone)]
pub struct IngestQueue {
    db: SqlitePool,
}

impl IngestQueue {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append one batch / 追加一个批次
    pub async fn enqueue(&self, docs: &[Document]) -> Result<String> {
        let batch_id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(docs)?;
        sqlx::query(
            "INSERT INTO ingest_queue (batch_id, payload, attempts, created_at) VALUES (?, ?, 0, ?)",
        )
        .bind(&batch_id)
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;
        Ok(batch_id)
    }

    pub async fn pending_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM ingest_queue")
            .fetch_one(&self.db)
            .await
            .unwrap_or(0)
    }

    async fn fetch_oldest(&self, limit: i64) -> Result<Vec<QueuedBatch>> {
        let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
            "SELECT id, batch_id, payload, attempts FROM ingest_queue ORDER BY id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, batch_id, payload, attempts)| QueuedBatch {
                id,
                batch_id,
                payload,
                attempts,
            })
            .collect())
    }

    async fn remove(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM ingest_queue WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn bump_attempts(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE ingest_queue SET attempts = attempts + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// Start the background consumer / 启动后台消费者
pub fn spawn_consumer(state: Arc<AppState>) {
    tokio::spawn(async move {
        tracing::info!("Ingestion queue consumer started");
        loop {
            match drain_round(&state).await {
                Ok(drained) if drained > 0 => {}
                Ok(_) => {
                    tokio::time::sleep(std::time::Duration::from_millis(IDLE_POLL_MS)).await;
                }
                Err(err) => {
                    tracing::error!("Queue drain round failed: {}", err);
                    tokio::time::sleep(std::time::Duration::from_millis(IDLE_POLL_MS)).await;
                }
            }
        }
    });
}

/// Drain up to one round of batches; returns how many were processed
/// / 消费一轮批次，返回处理数量
async fn drain_round(state: &Arc<AppState>) -> Result<usize> {
    let batches = state.queue.fetch_oldest(DRAIN_BATCH).await?;
    if batches.is_empty() {
        return Ok(0);
    }

    let primary = state.registry.get_or_open(&state.primary_shard).await?;

    let mut processed = 0;
    for batch in batches {
        let docs: Vec<Document> = match serde_json::from_str(&batch.payload) {
            Ok(docs) => docs,
            Err(err) => {
                // 损坏的负载无法恢复，丢弃
                tracing::error!("Queue batch {} has corrupt payload: {}", batch.batch_id, err);
                state.queue.remove(batch.id).await?;
                state.metrics.add(&state.metrics.batches_failed, 1);
                processed += 1;
                continue;
            }
        };

        match primary.index(docs).await {
            Ok(outcome) => {
                state.queue.remove(batch.id).await?;
                state.metrics.add(&state.metrics.documents_indexed, outcome.indexed);
                processed += 1;
            }
            Err(ShardError::Validation(errors)) => {
                // 校验失败的批次重试也不会成功
                tracing::warn!(
                    "Queue batch {} rejected: {} field errors, dropping",
                    batch.batch_id,
                    errors.len()
                );
                state.queue.remove(batch.id).await?;
                state.metrics.add(&state.metrics.batches_failed, 1);
                processed += 1;
            }
            Err(ShardError::ReadOnly) => {
                tracing::error!(
                    "Queue batch {} targets a read-only shard, dropping",
                    batch.batch_id
                );
                state.queue.remove(batch.id).await?;
                state.metrics.add(&state.metrics.batches_failed, 1);
                processed += 1;
            }
            Err(err) => {
                if batch.attempts + 1 >= MAX_ATTEMPTS {
                    tracing::error!(
                        "Queue batch {} failed {} times, dropping: {}",
                        batch.batch_id,
                        batch.attempts + 1,
                        err
                    );
                    state.queue.remove(batch.id).await?;
                    state.metrics.add(&state.metrics.batches_failed, 1);
                } else {
                    tracing::warn!(
                        "Queue batch {} failed (attempt {}), will retry: {}",
                        batch.batch_id,
                        batch.attempts + 1,
                        err
                    );
                    state.queue.bump_attempts(batch.id).await?;
                }
                // 留在队列里的批次阻塞本轮，保持顺序
                break;
            }
        }
    }
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yaosearch_backend::shard::types::DocId;

    async fn test_queue() -> IngestQueue {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        IngestQueue::new(pool)
    }

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document {
                id: DocId::Str(format!("d{}", i)),
                content: format!("payload {}", i),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_enqueue_and_fetch_order() {
        let queue = test_queue().await;
        queue.enqueue(&docs(2)).await.unwrap();
        queue.enqueue(&docs(3)).await.unwrap();

        assert_eq!(queue.pending_count().await, 2);

        let batches = queue.fetch_oldest(10).await.unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches[0].id < batches[1].id);

        let first: Vec<Document> = serde_json::from_str(&batches[0].payload).unwrap();
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_and_bump() {
        let queue = test_queue().await;
        queue.enqueue(&docs(1)).await.unwrap();
        let batch = queue.fetch_oldest(1).await.unwrap().remove(0);

        queue.bump_attempts(batch.id).await.unwrap();
        let batch = queue.fetch_oldest(1).await.unwrap().remove(0);
        assert_eq!(batch.attempts, 1);

        queue.remove(batch.id).await.unwrap();
        assert_eq!(queue.pending_count().await, 0);
    }
}
