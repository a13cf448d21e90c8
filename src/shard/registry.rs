//! Shard registry - resolves shard names to typed RPC stubs
//! / 分片注册表：把分片名解析为类型化的 RPC 存根
//!
//! The registry is an opaque capability injected into every shard at
//! construction; shards address each other by name only and never hold
//! direct pointers. Cold shards never call back into the primary, so name
//! resolution cannot form cycles. / 注册表是构造时注入的能力对象，
//! 分片之间只按名称寻址。

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use super::error::ShardError;
use super::remote::RemoteShard;
use super::types::{
    ConfigPatch, Document, Hit, IndexOutcome, ReplicaDescriptor, SearchRequest, ShardStats,
};
use super::Shard;

/// Fire-and-forget cache-invalidate side channel / 缓存失效侧信道
pub type InvalidateFn = Arc<dyn Fn() + Send + Sync>;

/// Typed RPC surface of a shard, local or remote / 分片的类型化 RPC 表面
#[async_trait]
pub trait ShardHandle: Send + Sync {
    async fn index(&self, docs: Vec<Document>) -> Result<IndexOutcome, ShardError>;
    async fn sync(&self, docs: Vec<Document>) -> Result<IndexOutcome, ShardError>;
    async fn search(&self, req: SearchRequest) -> Result<Vec<Hit>, ShardError>;
    async fn stats(&self) -> Result<ShardStats, ShardError>;
    async fn configure(&self, patch: ConfigPatch) -> Result<(), ShardError>;
}

/// Name-to-stub resolution capability / 名称到存根的解析能力
#[async_trait]
pub trait ShardRegistry: Send + Sync {
    /// Resolve a replica descriptor / 解析副本描述符
    async fn resolve(
        &self,
        descriptor: &ReplicaDescriptor,
    ) -> Result<Arc<dyn ShardHandle>, ShardError>;

    /// Resolve a cold shard by prefix and index / 按前缀和序号解析冷分片
    async fn resolve_cold(
        &self,
        prefix: &str,
        index: u32,
    ) -> Result<Arc<dyn ShardHandle>, ShardError>;
}

/// The node-local registry / 节点本地注册表
///
/// Names listed in the peer map resolve to HTTP stubs against another
/// node; every other name resolves to a shard database under this node's
/// shard directory, created implicitly on first address.
/// / 对端表中的名称解析为远程存根，其余名称在本地按需创建分片。
pub struct LocalRegistry {
    shard_dir: PathBuf,
    /// shard name → peer base URL / 分片名到对端地址
    peers: HashMap<String, String>,
    api_token: Option<String>,
    http: reqwest::Client,
    shards: tokio::sync::RwLock<HashMap<String, Arc<Shard>>>,
    invalidate: Option<InvalidateFn>,
    me: Weak<LocalRegistry>,
}

impl LocalRegistry {
    pub fn new(
        shard_dir: PathBuf,
        peers: HashMap<String, String>,
        api_token: Option<String>,
        invalidate: Option<InvalidateFn>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            shard_dir,
            peers,
            api_token,
            http: reqwest::Client::new(),
            shards: tokio::sync::RwLock::new(HashMap::new()),
            invalidate,
            me: me.clone(),
        })
    }

    /// Resolve a name to a stub / 按名称解析
    pub async fn resolve_name(&self, name: &str) -> Result<Arc<dyn ShardHandle>, ShardError> {
        if name.is_empty() {
            return Err(ShardError::Registry("empty shard name".to_string()));
        }
        if let Some(base_url) = self.peers.get(name) {
            return Ok(Arc::new(RemoteShard::new(
                self.http.clone(),
                base_url.clone(),
                name.to_string(),
                self.api_token.clone(),
            )));
        }
        let shard = self.get_or_open(name).await?;
        Ok(shard as Arc<dyn ShardHandle>)
    }

    /// Get the local shard instance, creating it on first address
    /// / 获取本地分片实例，首次寻址时隐式创建
    pub async fn get_or_open(&self, name: &str) -> Result<Arc<Shard>, ShardError> {
        {
            let shards = self.shards.read().await;
            if let Some(shard) = shards.get(name) {
                return Ok(shard.clone());
            }
        }

        let mut shards = self.shards.write().await;
        // 双重检查
        if let Some(shard) = shards.get(name) {
            return Ok(shard.clone());
        }

        let registry: Arc<dyn ShardRegistry> = self
            .me
            .upgrade()
            .ok_or_else(|| ShardError::Registry("registry dropped".to_string()))?;

        let db_path = self.shard_dir.join(format!("shard_{}.db", sanitize_name(name)));
        let shard =
            Shard::open(&db_path, name.to_string(), registry, self.invalidate.clone()).await?;
        shards.insert(name.to_string(), shard.clone());
        tracing::info!("Shard created on first address: {}", name);
        Ok(shard)
    }

    /// Names of all shards opened on this node / 本节点已打开的分片名
    pub async fn local_shard_names(&self) -> Vec<String> {
        self.shards.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ShardRegistry for LocalRegistry {
    async fn resolve(
        &self,
        descriptor: &ReplicaDescriptor,
    ) -> Result<Arc<dyn ShardHandle>, ShardError> {
        // The region field is a placement hint; resolution is by name
        // / 区域字段只是放置提示，解析仍按名称
        self.resolve_name(descriptor.shard_name()).await
    }

    async fn resolve_cold(
        &self,
        prefix: &str,
        index: u32,
    ) -> Result<Arc<dyn ShardHandle>, ShardError> {
        self.resolve_name(&format!("{}-{}", prefix, index)).await
    }
}

/// Shard names become file names; keep them filesystem-safe
/// / 分片名会出现在文件名里，必须对文件系统安全
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("primary"), "primary");
        assert_eq!(sanitize_name("cold-3"), "cold-3");
        assert_eq!(sanitize_name("../evil/name"), "___evil_name");
    }

    #[tokio::test]
    async fn test_implicit_creation_and_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            LocalRegistry::new(dir.path().to_path_buf(), HashMap::new(), None, None);

        let a = registry.get_or_open("primary").await.unwrap();
        let b = registry.get_or_open("primary").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.local_shard_names().await, vec!["primary".to_string()]);
    }

    #[tokio::test]
    async fn test_cold_resolution_naming() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            LocalRegistry::new(dir.path().to_path_buf(), HashMap::new(), None, None);

        registry.resolve_cold("archive", 0).await.unwrap();
        let names = registry.local_shard_names().await;
        assert_eq!(names, vec!["archive-0".to_string()]);
    }

    #[tokio::test]
    async fn test_descriptor_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            LocalRegistry::new(dir.path().to_path_buf(), HashMap::new(), None, None);

        let desc = ReplicaDescriptor::Region {
            name: "replica-apac".to_string(),
            region: Some("apac".to_string()),
        };
        registry.resolve(&desc).await.unwrap();
        assert!(registry
            .local_shard_names()
            .await
            .contains(&"replica-apac".to_string()));
    }
}
