//! Persisted shard scalars - version, config, cursor, cold index
//! / 分片持久化标量：版本、配置、复制游标、冷分片序号
//!
//! Each value is an individually-durable key/value write in the shard's
//! `shard_meta` table; there is no multi-key transaction by design of the
//! callers (cursor and cold index advance monotonically on their own).

use sqlx::{Pool, Sqlite};

use super::error::ShardError;
use super::types::ShardConfig;

/// Current shard schema version / 当前分片结构版本
pub const DB_VERSION: i64 = 1;

const KEY_DB_VERSION: &str = "db_version";
const KEY_CONFIG: &str = "config";
const KEY_LAST_SYNCED_ROWID: &str = "last_synced_rowid";
const KEY_CURRENT_COLD_INDEX: &str = "current_cold_index";

/// Replication cursor before anything was delivered; integer-mode rowids
/// may legitimately be 0 / 初始复制游标，整数模式的 rowid 可以为 0
pub const INITIAL_CURSOR: i64 = -1;

pub struct MetaStore {
    db: Pool<Sqlite>,
}

impl MetaStore {
    /// Wrap the shard pool and enforce the schema version
    /// / 包装分片连接池并检查结构版本
    pub async fn open(db: Pool<Sqlite>) -> Result<Self, ShardError> {
        let meta = Self { db };
        match meta.get_raw(KEY_DB_VERSION).await? {
            Some(v) => {
                let version: i64 = v.parse().unwrap_or(0);
                // 拒绝打开更高版本写入的分片库
                if version > DB_VERSION {
                    return Err(ShardError::SchemaVersion(version));
                }
            }
            None => meta.set_raw(KEY_DB_VERSION, &DB_VERSION.to_string()).await?,
        }
        Ok(meta)
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, ShardError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM shard_meta WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.db)
                .await?;
        Ok(row.map(|(v,)| v))
    }

    async fn set_raw(&self, key: &str, value: &str) -> Result<(), ShardError> {
        sqlx::query("INSERT OR REPLACE INTO shard_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Load the persisted config; a corrupted value is treated as absent
    /// so the shard keeps accepting writes / 损坏的配置按不存在处理
    pub async fn load_config(&self) -> Result<Option<ShardConfig>, ShardError> {
        match self.get_raw(KEY_CONFIG).await? {
            None => Ok(None),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(config) => Ok(Some(config)),
                Err(err) => {
                    tracing::error!("Stored shard config is corrupted, ignoring: {}", err);
                    Ok(None)
                }
            },
        }
    }

    pub async fn save_config(&self, config: &ShardConfig) -> Result<(), ShardError> {
        let raw = serde_json::to_string(config)
            .map_err(|e| ShardError::Internal(format!("config serialize failed: {}", e)))?;
        self.set_raw(KEY_CONFIG, &raw).await
    }

    pub async fn last_synced_rowid(&self) -> Result<i64, ShardError> {
        Ok(self
            .get_raw(KEY_LAST_SYNCED_ROWID)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(INITIAL_CURSOR))
    }

    pub async fn set_last_synced_rowid(&self, rowid: i64) -> Result<(), ShardError> {
        self.set_raw(KEY_LAST_SYNCED_ROWID, &rowid.to_string()).await
    }

    pub async fn current_cold_index(&self) -> Result<u32, ShardError> {
        Ok(self
            .get_raw(KEY_CURRENT_COLD_INDEX)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    pub async fn set_current_cold_index(&self, index: u32) -> Result<(), ShardError> {
        self.set_raw(KEY_CURRENT_COLD_INDEX, &index.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::store::Store;
    use crate::shard::types::{IdType, ShardConfig};

    async fn open_meta(dir: &tempfile::TempDir) -> MetaStore {
        let store = Store::open(&dir.path().join("shard_meta_test.db")).await.unwrap();
        MetaStore::open(store.pool().clone()).await.unwrap()
    }

    #[tokio::test]
    async fn test_version_written_on_first_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("s.db")).await.unwrap();
        let _meta = MetaStore::open(store.pool().clone()).await.unwrap();

        let row: (String,) = sqlx::query_as("SELECT value FROM shard_meta WHERE key = 'db_version'")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.0, DB_VERSION.to_string());
    }

    #[tokio::test]
    async fn test_higher_version_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("s.db")).await.unwrap();
        sqlx::query("INSERT OR REPLACE INTO shard_meta (key, value) VALUES ('db_version', '2')")
            .execute(store.pool())
            .await
            .unwrap();

        match MetaStore::open(store.pool().clone()).await {
            Err(ShardError::SchemaVersion(2)) => {}
            other => panic!("expected SchemaVersion error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let meta = open_meta(&dir).await;

        assert!(meta.load_config().await.unwrap().is_none());

        let config = ShardConfig {
            id_type: IdType::Integer,
            cold_shard_prefix: Some("cold".to_string()),
            ..Default::default()
        };
        meta.save_config(&config).await.unwrap();

        let loaded = meta.load_config().await.unwrap().unwrap();
        assert_eq!(loaded.id_type, IdType::Integer);
        assert_eq!(loaded.cold_shard_prefix.as_deref(), Some("cold"));
    }

    #[tokio::test]
    async fn test_corrupted_config_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let meta = open_meta(&dir).await;

        sqlx::query("INSERT OR REPLACE INTO shard_meta (key, value) VALUES ('config', '{not json')")
            .execute(&meta.db)
            .await
            .unwrap();

        // 损坏的配置不会导致错误，按未配置处理
        assert!(meta.load_config().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cursor_and_cold_index_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let meta = open_meta(&dir).await;

        assert_eq!(meta.last_synced_rowid().await.unwrap(), INITIAL_CURSOR);
        assert_eq!(meta.current_cold_index().await.unwrap(), 0);

        meta.set_last_synced_rowid(99).await.unwrap();
        meta.set_current_cold_index(3).await.unwrap();
        assert_eq!(meta.last_synced_rowid().await.unwrap(), 99);
        assert_eq!(meta.current_cold_index().await.unwrap(), 3);
    }
}
