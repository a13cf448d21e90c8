//! Node shared state / 节点共享状态

use sqlx::SqlitePool;
use std::sync::Arc;

use yaosearch_backend::shard::registry::LocalRegistry;

use crate::cache::ResultCache;
use crate::metrics::Metrics;
use crate::queue::IngestQueue;

pub struct AppState {
    /// Node database (queue + settings) / 节点数据库
    pub db: SqlitePool,
    /// Shard registry for this node / 本节点的分片注册表
    pub registry: Arc<LocalRegistry>,
    pub queue: IngestQueue,
    pub cache: Arc<ResultCache>,
    pub metrics: Arc<Metrics>,
    /// The shard ingestion writes to / 摄入写入的分片
    pub primary_shard: String,
    /// The shard queries read from on this node / 本节点查询的分片
    pub query_shard: String,
    /// Cluster token for admin and node-to-node calls / 集群令牌
    pub api_token: String,
}
