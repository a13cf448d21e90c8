//! Index shard - the stateful core of the search service / 索引分片核心
//!
//! One shard = one FTS database + one persisted config + one tick loop.
//! The same state machine serves four roles: indexer, query engine,
//! replication source and lifecycle manager. / 一个分片等于一个全文索引库、
//! 一份持久化配置和一个定时循环；索引、查询、复制、生命周期共用同一状态机。
//!
//! Concurrency model / 并发模型：
//! - Every operation that touches shard state runs under one async mutex
//!   (single-writer discipline) / 所有触碰状态的操作走同一把异步锁
//! - Outbound fan-out (replica sync, cold-shard queries) runs on
//!   snapshotted data outside the lock so a slow peer never blocks new
//!   writes for longer than one batch / 对外扇出在锁外进行
//! - Cold shards and replicas never call back into their source, so the
//!   lock order is acyclic / 冷分片和副本不会回调源分片

pub mod error;
pub mod meta;
pub mod registry;
pub mod remote;
pub mod store;
pub mod types;

mod lifecycle;
mod replicator;
mod router;
mod scheduler;

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use crate::search::{filter_content, plan, planner::MAX_REQUESTED, truncate_bytes, PlanOutcome};

use self::error::ShardError;
use self::meta::MetaStore;
use self::registry::{InvalidateFn, ShardHandle, ShardRegistry};
use self::store::Store;
use self::types::{
    validate_batch, validate_replicas, ConfigPatch, Document, FieldError, Hit, IndexOutcome,
    SearchRequest, ShardConfig, ShardStats, StoredDocument, MAX_FILTERED_BYTES,
    MIN_TICK_INTERVAL_MS,
};

/// Soft deadline on the whole search path / 搜索路径的软超时
const SEARCH_DEADLINE: Duration = Duration::from_secs(5);

/// Externally visible shard state / 对外可见的分片状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// No config persisted yet / 尚未持久化配置
    Fresh,
    /// Read-write primary or replica / 可读写
    Active,
    /// Sealed cold shard / 已封存的冷分片
    ReadOnly,
}

pub(crate) struct ShardInner {
    pub(crate) store: Store,
    pub(crate) meta: MetaStore,
    pub(crate) config: Option<ShardConfig>,
    timer_armed: bool,
}

impl ShardInner {
    /// Persisted config, or defaults for a fresh shard / 有效配置
    pub(crate) fn effective_config(&self) -> ShardConfig {
        self.config.clone().unwrap_or_default()
    }
}

pub struct Shard {
    pub(crate) name: String,
    pub(crate) registry: Arc<dyn ShardRegistry>,
    invalidate: Option<InvalidateFn>,
    pub(crate) inner: tokio::sync::Mutex<ShardInner>,
    self_ref: OnceLock<Weak<Shard>>,
}

impl Shard {
    /// Open a shard database and restore its persisted state
    /// / 打开分片数据库并恢复持久化状态
    pub async fn open(
        db_path: &Path,
        name: String,
        registry: Arc<dyn ShardRegistry>,
        invalidate: Option<InvalidateFn>,
    ) -> Result<Arc<Self>, ShardError> {
        let store = Store::open(db_path).await?;
        let meta = MetaStore::open(store.pool().clone()).await?;
        let config = meta.load_config().await?;

        if let Some(config) = &config {
            store.ensure_schema(config.id_type).await?;
        }
        let rearm = config.as_ref().map(|c| !c.read_only).unwrap_or(false);

        let shard = Arc::new(Self {
            name,
            registry,
            invalidate,
            inner: tokio::sync::Mutex::new(ShardInner {
                store,
                meta,
                config,
                timer_armed: rearm,
            }),
            self_ref: OnceLock::new(),
        });
        let _ = shard.self_ref.set(Arc::downgrade(&shard));

        // A configured shard resumes ticking after a restart; the timer
        // itself does not survive the process / 重启后已配置分片恢复定时
        if rearm {
            scheduler::arm(&shard, scheduler::FIRST_ARM_DELAY);
        }
        Ok(shard)
    }

    pub async fn state(&self) -> ShardState {
        let inner = self.inner.lock().await;
        match &inner.config {
            None => ShardState::Fresh,
            Some(c) if c.read_only => ShardState::ReadOnly,
            Some(_) => ShardState::Active,
        }
    }

    pub(crate) async fn is_read_only(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.config.as_ref().map(|c| c.read_only).unwrap_or(false)
    }

    pub(crate) async fn tick_interval_ms(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.effective_config().tick_interval_ms
    }

    /// Validate, filter and upsert a batch / 校验、过滤并写入一批文档
    ///
    /// The whole batch is rejected on any validation failure; nothing is
    /// committed in that case.
    pub async fn index(&self, docs: Vec<Document>) -> Result<IndexOutcome, ShardError> {
        let outcome = self.write_batch(docs).await?;
        // 写入提交后发出缓存失效信号
        if let Some(invalidate) = &self.invalidate {
            invalidate();
        }
        Ok(outcome)
    }

    /// Same semantics as `index`, called by another shard / 分片间同步写入
    pub async fn sync(&self, docs: Vec<Document>) -> Result<IndexOutcome, ShardError> {
        self.index(docs).await
    }

    async fn write_batch(&self, docs: Vec<Document>) -> Result<IndexOutcome, ShardError> {
        let inner = self.inner.lock().await;
        let config = inner.effective_config();

        if config.read_only {
            return Err(ShardError::ReadOnly);
        }

        let errors = validate_batch(&docs, config.id_type);
        if !errors.is_empty() {
            return Err(ShardError::Validation(errors));
        }

        let stored: Vec<StoredDocument> = docs
            .into_iter()
            .map(|d| {
                let filtered = filter_content(&d.content);
                StoredDocument {
                    id: d.id,
                    filtered_content: truncate_bytes(&filtered, MAX_FILTERED_BYTES).to_string(),
                }
            })
            .collect();

        inner.store.ensure_schema(config.id_type).await?;
        inner.store.upsert(&stored).await?;

        tracing::debug!("Shard {}: indexed {} documents", self.name, stored.len());
        Ok(IndexOutcome { indexed: stored.len() as u64 })
    }

    /// Full-text search; any internal failure yields an empty list, never
    /// an error to the caller / 搜索；内部错误一律返回空列表
    pub async fn search(&self, req: SearchRequest) -> Vec<Hit> {
        match tokio::time::timeout(SEARCH_DEADLINE, self.search_inner(req)).await {
            Ok(hits) => hits,
            Err(_) => {
                tracing::warn!("Shard {}: search deadline exceeded", self.name);
                Vec::new()
            }
        }
    }

    async fn search_inner(&self, req: SearchRequest) -> Vec<Hit> {
        let requested = req.max.min(MAX_REQUESTED);

        let query_plan = match plan(&req.query, requested) {
            PlanOutcome::Accepted(p) => p,
            PlanOutcome::Rejected { reason } => {
                tracing::debug!("Shard {}: query rejected ({})", self.name, reason);
                return Vec::new();
            }
        };

        // Local match and fan-out decision under the lock / 锁内本地匹配
        let (mut hits, fan_out) = {
            let inner = self.inner.lock().await;
            let config = inner.effective_config();

            let local = match inner
                .store
                .match_query(&query_plan.processed, query_plan.row_cap as i64)
                .await
            {
                Ok(hits) => hits,
                Err(err) => {
                    tracing::warn!("Shard {}: local match failed: {}", self.name, err);
                    return Vec::new();
                }
            };

            let fan_out = if req.include_cold && !config.read_only {
                let cold_shards = inner.meta.current_cold_index().await.unwrap_or(0);
                config
                    .cold_shard_prefix
                    .filter(|_| cold_shards > 0)
                    .map(|prefix| (prefix, cold_shards))
            } else {
                None
            };
            (local, fan_out)
        };

        // Cold fan-out outside the lock; cold shards never recurse
        // / 锁外冷分片扇出，冷分片不会再扇出
        if let Some((prefix, cold_shards)) = fan_out {
            let cold_hits = router::fan_out(
                self.registry.as_ref(),
                &prefix,
                cold_shards,
                &req.query,
                query_plan.row_cap,
            )
            .await;
            hits.extend(cold_hits);
        }

        hits.sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(query_plan.row_cap);
        hits
    }

    /// Best-effort statistics; never mutates, never fails / 尽力而为的统计
    pub async fn stats(&self) -> ShardStats {
        let inner = self.inner.lock().await;
        let read_only = inner.config.as_ref().map(|c| c.read_only).unwrap_or(false);
        match inner.store.count_and_bytes().await {
            Ok((count, bytes)) => ShardStats { count, bytes, read_only },
            Err(err) => {
                tracing::warn!("Shard {}: stats failed: {}", self.name, err);
                ShardStats { count: 0, bytes: 0, read_only }
            }
        }
    }

    /// Merge a partial config into the persisted one / 合并部分配置
    pub async fn configure(&self, patch: ConfigPatch) -> Result<(), ShardError> {
        let mut should_arm = false;
        {
            let mut inner = self.inner.lock().await;
            let current = inner.effective_config();

            if current.read_only {
                // ReadOnly → Active 禁止；幂等的封存调用放行
                if patch_is_idempotent_on_sealed(&patch) {
                    return Ok(());
                }
                return Err(ShardError::ReadOnly);
            }

            let mut next = current;

            if let Some(replicas) = &patch.replicas {
                let errors = validate_replicas(replicas);
                if !errors.is_empty() {
                    return Err(ShardError::Validation(errors));
                }
                next.replicas = replicas.clone();
            }

            if let Some(id_type) = patch.id_type {
                if id_type != next.id_type {
                    // idType 在存在数据后不可变更
                    let (count, _) = inner.store.count_and_bytes().await?;
                    if count > 0 {
                        return Err(ShardError::Validation(vec![FieldError {
                            field: "idType".to_string(),
                            message: "idType cannot change while documents exist".to_string(),
                            value: serde_json::json!(id_type),
                        }]));
                    }
                    if inner.store.id_mode().is_some() {
                        inner.store.rebuild_schema(id_type).await?;
                    }
                    next.id_type = id_type;
                }
            }

            if let Some(ms) = patch.tick_interval_ms {
                next.tick_interval_ms = ms.max(MIN_TICK_INTERVAL_MS);
            }
            if let Some(v) = patch.purge_count_threshold {
                next.purge_count_threshold = Some(v);
            }
            if let Some(v) = patch.purge_target_count {
                next.purge_target_count = Some(v);
            }
            if let Some(v) = patch.size_threshold_bytes {
                next.size_threshold_bytes = v;
            }
            if let Some(v) = &patch.cold_shard_prefix {
                next.cold_shard_prefix = Some(v.clone());
            }
            if let Some(v) = patch.cold_shard_capacity {
                next.cold_shard_capacity = v;
            }
            if let Some(v) = patch.read_only {
                next.read_only = v;
            }

            inner.store.ensure_schema(next.id_type).await?;
            inner.meta.save_config(&next).await?;
            let read_only_now = next.read_only;
            inner.config = Some(next);

            if !read_only_now && !inner.timer_armed {
                inner.timer_armed = true;
                should_arm = true;
            }
        }

        if should_arm {
            if let Some(me) = self.self_ref.get().and_then(Weak::upgrade) {
                scheduler::arm(&me, scheduler::FIRST_ARM_DELAY);
            }
        }
        Ok(())
    }

    /// One scheduler tick: replication, then lifecycle / 单次定时：先复制后迁移
    pub async fn tick(&self) {
        if self.is_read_only().await {
            return;
        }
        if let Err(err) = replicator::step(self).await {
            tracing::warn!("Shard {}: replication step failed: {}", self.name, err);
        }
        if let Err(err) = lifecycle::step(self).await {
            tracing::warn!("Shard {}: lifecycle step failed: {}", self.name, err);
        }
    }
}

/// On a sealed shard, only a patch that changes nothing (or re-seals) is
/// accepted / 封存分片只接受不改变任何东西的补丁
fn patch_is_idempotent_on_sealed(patch: &ConfigPatch) -> bool {
    patch.id_type.is_none()
        && patch.tick_interval_ms.is_none()
        && patch.purge_count_threshold.is_none()
        && patch.purge_target_count.is_none()
        && patch.size_threshold_bytes.is_none()
        && patch.cold_shard_prefix.is_none()
        && patch.cold_shard_capacity.is_none()
        && patch.replicas.is_none()
        && !matches!(patch.read_only, Some(false))
}

#[async_trait]
impl ShardHandle for Shard {
    async fn index(&self, docs: Vec<Document>) -> Result<IndexOutcome, ShardError> {
        Shard::index(self, docs).await
    }

    async fn sync(&self, docs: Vec<Document>) -> Result<IndexOutcome, ShardError> {
        Shard::sync(self, docs).await
    }

    async fn search(&self, req: SearchRequest) -> Result<Vec<Hit>, ShardError> {
        Ok(Shard::search(self, req).await)
    }

    async fn stats(&self) -> Result<ShardStats, ShardError> {
        Ok(Shard::stats(self).await)
    }

    async fn configure(&self, patch: ConfigPatch) -> Result<(), ShardError> {
        Shard::configure(self, patch).await
    }
}
