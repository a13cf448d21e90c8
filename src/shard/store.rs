//! Shard FTS store - one SQLite database per shard / 分片全文索引存储
//!
//! Storage scheme / 存储方案：
//! - Each shard owns an independent database file (no cross-shard locking)
//!   / 每个分片一个独立数据库文件，避免并发锁冲突
//! - `documents`: an FTS5 virtual table with porter/unicode61 tokenization
//!   / FTS5 虚拟表，porter + unicode61 分词
//! - `shard_meta`: key/value table for persisted scalars / 元数据表
//!
//! Features / 特性：
//! - WAL mode + busy_timeout on every connection / WAL 模式
//! - Batched upserts chunked to stay under the statement parameter budget
//!   / 批量写入按参数预算分块
//! - Quoted-phrase fallback for queries the FTS parser rejects
//!   / 解析失败的查询回退为引号短语

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::{Path, PathBuf};

use super::error::ShardError;
use super::types::{DocId, Hit, IdType, ScannedRow, StoredDocument};

/// SQLite allows 32 bound parameters per statement here; 15 documents at
/// two parameters each keeps a one-statement batch inside the budget.
/// / 每条语句最多 32 个绑定参数，15 个文档（30 参数）为一块。
const UPSERT_CHUNK: usize = 15;

/// Conservative row cap for the quoted-phrase fallback / 短语回退的保守上限
const FALLBACK_CAP: i64 = 50;

pub struct Store {
    db: Pool<Sqlite>,
    db_path: PathBuf,
    /// Schema mode; `None` until the first configure/write pins it
    /// / 表结构模式，首次配置或写入后固定
    mode: parking_lot::RwLock<Option<IdType>>,
}

impl Store {
    /// Open (or create) the shard database / 打开或创建分片数据库
    pub async fn open(db_path: &Path) -> Result<Self, ShardError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.to_string_lossy());
        let db = SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&db_url)
            .await?;

        // 启用WAL模式，提高并发性能
        sqlx::query("PRAGMA journal_mode=WAL").execute(&db).await?;
        // 设置busy_timeout，避免锁超时
        sqlx::query("PRAGMA busy_timeout=10000").execute(&db).await?;
        // 优化写入性能
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&db).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shard_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await?;

        tracing::debug!("Shard database opened: {:?} (WAL mode)", db_path);

        Ok(Self { db, db_path: db_path.to_path_buf(), mode: parking_lot::RwLock::new(None) })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }

    pub fn id_mode(&self) -> Option<IdType> {
        *self.mode.read()
    }

    /// Create the FTS table for the given id mode if it does not exist yet
    /// / 按 ID 模式创建 FTS 表（若不存在）
    pub async fn ensure_schema(&self, id_type: IdType) -> Result<(), ShardError> {
        {
            let mode = self.mode.read();
            if *mode == Some(id_type) {
                return Ok(());
            }
            if let Some(existing) = *mode {
                return Err(ShardError::Internal(format!(
                    "store already initialized with id mode {:?}, got {:?}",
                    existing, id_type
                )));
            }
        }

        let ddl = match id_type {
            // rowid doubles as the document id / rowid 即文档 ID
            IdType::Integer => {
                "CREATE VIRTUAL TABLE IF NOT EXISTS documents USING fts5(content, tokenize='porter unicode61')"
            }
            // Separate unindexed id column; rowid assigned by the store
            // / 独立的未索引 ID 列，rowid 由存储分配
            IdType::String => {
                "CREATE VIRTUAL TABLE IF NOT EXISTS documents USING fts5(id UNINDEXED, content, tokenize='porter unicode61')"
            }
        };
        sqlx::query(ddl).execute(&self.db).await?;
        *self.mode.write() = Some(id_type);
        Ok(())
    }

    /// Drop and recreate the FTS table under a new id mode; only legal
    /// while the shard holds no documents / 重建表结构，仅限空分片
    pub async fn rebuild_schema(&self, id_type: IdType) -> Result<(), ShardError> {
        sqlx::query("DROP TABLE IF EXISTS documents").execute(&self.db).await?;
        *self.mode.write() = None;
        self.ensure_schema(id_type).await
    }

    fn require_mode(&self) -> Result<IdType, ShardError> {
        self.id_mode()
            .ok_or_else(|| ShardError::Internal("store schema not initialized".to_string()))
    }

    /// Upsert a batch of documents / 批量写入文档
    ///
    /// Batches larger than the chunk size are split into independent
    /// statements executed in insertion order; a failure leaves earlier
    /// chunks committed, so callers must treat this as best-effort
    /// idempotent. Ordering among duplicate ids within one call is
    /// undefined.
    pub async fn upsert(&self, docs: &[StoredDocument]) -> Result<(), ShardError> {
        if docs.is_empty() {
            return Ok(());
        }
        let mode = self.require_mode()?;

        for chunk in docs.chunks(UPSERT_CHUNK) {
            match mode {
                IdType::Integer => {
                    // FTS rewrites on rowid collision / rowid 冲突时 FTS 重写
                    let placeholders =
                        vec!["(?, ?)"; chunk.len()].join(", ");
                    let sql = format!(
                        "REPLACE INTO documents(rowid, content) VALUES {}",
                        placeholders
                    );
                    let mut query = sqlx::query(&sql);
                    for doc in chunk {
                        let rowid = match &doc.id {
                            DocId::Int(n) => *n,
                            DocId::Str(_) => {
                                return Err(ShardError::Internal(
                                    "string id reached integer-mode upsert".to_string(),
                                ))
                            }
                        };
                        query = query.bind(rowid).bind(&doc.filtered_content);
                    }
                    query.execute(&self.db).await?;
                }
                IdType::String => {
                    let in_list = vec!["?"; chunk.len()].join(", ");
                    let delete_sql =
                        format!("DELETE FROM documents WHERE id IN ({})", in_list);
                    let mut delete = sqlx::query(&delete_sql);
                    for doc in chunk {
                        delete = delete.bind(doc.id.to_string());
                    }
                    delete.execute(&self.db).await?;

                    let placeholders = vec!["(?, ?)"; chunk.len()].join(", ");
                    let sql = format!(
                        "INSERT INTO documents(id, content) VALUES {}",
                        placeholders
                    );
                    let mut insert = sqlx::query(&sql);
                    for doc in chunk {
                        insert = insert.bind(doc.id.to_string()).bind(&doc.filtered_content);
                    }
                    insert.execute(&self.db).await?;
                }
            }
        }
        Ok(())
    }

    /// Full-text match with a bound limit / 全文匹配，限制行数
    ///
    /// Dangerous query text is wrapped as a quoted phrase up front; a query
    /// the FTS parser still rejects is retried once as a quoted phrase with
    /// a conservative cap.
    pub async fn match_query(&self, query: &str, limit: i64) -> Result<Vec<Hit>, ShardError> {
        let text = if needs_phrase_quote(query) {
            quote_phrase(query)
        } else {
            query.to_string()
        };

        match self.run_match(&text, limit).await {
            Ok(hits) => Ok(hits),
            Err(first_err) => {
                tracing::debug!("FTS query failed, retrying as phrase: {}", first_err);
                let quoted = quote_phrase(query);
                if quoted == text {
                    return Err(first_err);
                }
                self.run_match(&quoted, FALLBACK_CAP.min(limit.max(1))).await
            }
        }
    }

    async fn run_match(&self, text: &str, limit: i64) -> Result<Vec<Hit>, ShardError> {
        let mode = self.require_mode()?;
        let sql = match mode {
            IdType::Integer => {
                "SELECT rowid, content, rank FROM documents WHERE documents MATCH ? ORDER BY rank LIMIT ?"
            }
            IdType::String => {
                "SELECT id, content, rank FROM documents WHERE documents MATCH ? ORDER BY rank LIMIT ?"
            }
        };

        let rows = sqlx::query(sql)
            .bind(text)
            .bind(limit)
            .fetch_all(&self.db)
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let id = match mode {
                IdType::Integer => DocId::Int(row.try_get::<i64, _>("rowid")?),
                IdType::String => DocId::Str(row.try_get::<String, _>("id")?),
            };
            hits.push(Hit {
                id,
                content: row.try_get("content")?,
                rank: row.try_get("rank")?,
            });
        }
        Ok(hits)
    }

    /// Rows with `rowid > cursor`, in rowid order / 游标之后的行，按 rowid 升序
    pub async fn scan_since(
        &self,
        cursor: i64,
        limit: Option<i64>,
    ) -> Result<Vec<ScannedRow>, ShardError> {
        match self.run_scan(cursor, limit).await {
            Ok(rows) => Ok(rows),
            // 瞬时读故障重试一次
            Err(err) => {
                tracing::warn!("scan_since failed, retrying once: {}", err);
                self.run_scan(cursor, limit).await
            }
        }
    }

    /// The oldest rows, in rowid order / 最老的行，按 rowid 升序
    pub async fn scan_oldest(&self, limit: i64) -> Result<Vec<ScannedRow>, ShardError> {
        // Integer ids may be 0, so scanning from the start must not use a
        // `rowid > 0` filter / 整数 ID 可以为 0，从头扫描不能用 rowid > 0
        match self.run_scan(i64::MIN, Some(limit)).await {
            Ok(rows) => Ok(rows),
            Err(err) => {
                tracing::warn!("scan_oldest failed, retrying once: {}", err);
                self.run_scan(i64::MIN, Some(limit)).await
            }
        }
    }

    async fn run_scan(
        &self,
        cursor: i64,
        limit: Option<i64>,
    ) -> Result<Vec<ScannedRow>, ShardError> {
        let mode = self.require_mode()?;
        let limit = limit.unwrap_or(i64::MAX);
        let sql = match mode {
            IdType::Integer => {
                "SELECT rowid, content FROM documents WHERE rowid > ? ORDER BY rowid LIMIT ?"
            }
            IdType::String => {
                "SELECT rowid, id, content FROM documents WHERE rowid > ? ORDER BY rowid LIMIT ?"
            }
        };

        let rows = sqlx::query(sql)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.db)
            .await?;

        let mut scanned = Vec::with_capacity(rows.len());
        for row in rows {
            let rowid: i64 = row.try_get("rowid")?;
            let id = match mode {
                IdType::Integer => DocId::Int(rowid),
                IdType::String => DocId::Str(row.try_get::<String, _>("id")?),
            };
            scanned.push(ScannedRow { rowid, id, content: row.try_get("content")? });
        }
        Ok(scanned)
    }

    /// Delete every row with `rowid <= max_rowid` in one statement
    /// / 单条语句删除 rowid 不大于给定值的所有行
    pub async fn delete_up_to(&self, max_rowid: i64) -> Result<u64, ShardError> {
        self.require_mode()?;
        let result = sqlx::query("DELETE FROM documents WHERE rowid <= ?")
            .bind(max_rowid)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Document count plus the actual on-disk size / 文档数与真实磁盘占用
    pub async fn count_and_bytes(&self) -> Result<(u64, u64), ShardError> {
        let count: i64 = if self.id_mode().is_some() {
            match sqlx::query_scalar("SELECT COUNT(*) FROM documents")
                .fetch_one(&self.db)
                .await
            {
                Ok(n) => n,
                Err(err) => {
                    tracing::warn!("count failed, retrying once: {}", err);
                    sqlx::query_scalar("SELECT COUNT(*) FROM documents")
                        .fetch_one(&self.db)
                        .await?
                }
            }
        } else {
            0
        };
        Ok((count as u64, self.db_size()))
    }

    /// Real file size: database + WAL + SHM / 数据库及其 WAL、SHM 文件大小
    pub fn db_size(&self) -> u64 {
        let db_shm = self.db_path.with_extension("db-shm");
        let db_wal = self.db_path.with_extension("db-wal");

        let size1 = std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);
        let size2 = std::fs::metadata(&db_shm).map(|m| m.len()).unwrap_or(0);
        let size3 = std::fs::metadata(&db_wal).map(|m| m.len()).unwrap_or(0);

        size1 + size2 + size3
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

/// Queries containing FTS-significant characters are forced into phrase
/// mode / 含特殊字符的查询强制为短语模式
fn needs_phrase_quote(query: &str) -> bool {
    query.contains('"') || query.contains('\'') || query.contains(';') || query.contains("--")
}

/// Wrap as a quoted phrase, doubling embedded quotes / 包装为引号短语
fn quote_phrase(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store(dir: &tempfile::TempDir, mode: IdType) -> Store {
        let store = Store::open(&dir.path().join("shard_test.db")).await.unwrap();
        store.ensure_schema(mode).await.unwrap();
        store
    }

    fn doc(id: DocId, content: &str) -> StoredDocument {
        StoredDocument { id, filtered_content: content.to_string() }
    }

    #[tokio::test]
    async fn test_upsert_and_match_string_mode() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, IdType::String).await;

        store
            .upsert(&[doc(DocId::Str("a".into()), "javascript programming tutorial")])
            .await
            .unwrap();

        let hits = store.match_query("javascript", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, DocId::Str("a".into()));
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, IdType::String).await;

        store.upsert(&[doc(DocId::Str("u".into()), "alpha")]).await.unwrap();
        store.upsert(&[doc(DocId::Str("u".into()), "beta")]).await.unwrap();

        let (count, _) = store.count_and_bytes().await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.match_query("alpha", 10).await.unwrap().len(), 0);
        assert_eq!(store.match_query("beta", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_integer_mode_rowid_is_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, IdType::Integer).await;

        store.upsert(&[doc(DocId::Int(7), "rust ownership")]).await.unwrap();
        store.upsert(&[doc(DocId::Int(7), "rust borrowing")]).await.unwrap();

        let (count, _) = store.count_and_bytes().await.unwrap();
        assert_eq!(count, 1);

        let rows = store.scan_since(0, None).await.unwrap();
        assert_eq!(rows[0].rowid, 7);
        assert_eq!(rows[0].id, DocId::Int(7));
    }

    #[tokio::test]
    async fn test_large_batch_chunked() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, IdType::String).await;

        // 超过一个块大小，强制分块执行
        let docs: Vec<StoredDocument> = (0..40)
            .map(|i| doc(DocId::Str(format!("doc-{}", i)), &format!("token{} payload", i)))
            .collect();
        store.upsert(&docs).await.unwrap();

        let (count, _) = store.count_and_bytes().await.unwrap();
        assert_eq!(count, 40);
        let hits = store.match_query("token17", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_scan_since_ordered_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, IdType::String).await;

        for i in 0..10 {
            store
                .upsert(&[doc(DocId::Str(format!("d{}", i)), "payload text")])
                .await
                .unwrap();
        }

        let rows = store.scan_since(4, None).await.unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows.windows(2).all(|w| w[0].rowid < w[1].rowid));
        assert!(rows.iter().all(|r| r.rowid > 4));
    }

    #[tokio::test]
    async fn test_delete_up_to() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, IdType::String).await;

        for i in 0..10 {
            store
                .upsert(&[doc(DocId::Str(format!("d{}", i)), "payload text")])
                .await
                .unwrap();
        }

        let deleted = store.delete_up_to(6).await.unwrap();
        assert_eq!(deleted, 6);
        let rows = store.scan_since(0, None).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.rowid > 6));
    }

    #[tokio::test]
    async fn test_match_limit_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, IdType::String).await;

        for i in 0..20 {
            store
                .upsert(&[doc(DocId::Str(format!("d{}", i)), "shared token here")])
                .await
                .unwrap();
        }
        let hits = store.match_query("shared", 5).await.unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn test_dangerous_query_forced_to_phrase() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, IdType::String).await;

        store
            .upsert(&[doc(DocId::Str("a".into()), "drop table users")])
            .await
            .unwrap();

        // 含引号与分号的查询不会报错，而是按短语匹配
        let hits = store.match_query("users; drop", 10).await.unwrap();
        assert!(hits.is_empty());
        let hits = store.match_query("\"drop table\"", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_retried_as_phrase() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, IdType::String).await;

        store
            .upsert(&[doc(DocId::Str("a".into()), "state of art search")])
            .await
            .unwrap();

        // "state-of-art" 对 FTS5 是语法错误，回退为短语后按相邻词序列匹配
        let hits = store.match_query("state-of-art", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_count_and_bytes_reports_real_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, IdType::String).await;

        store
            .upsert(&[doc(DocId::Str("a".into()), "some indexed content")])
            .await
            .unwrap();

        let (count, bytes) = store.count_and_bytes().await.unwrap();
        assert_eq!(count, 1);
        assert!(bytes > 0);
    }

    #[tokio::test]
    async fn test_mode_conflict_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, IdType::String).await;
        assert!(store.ensure_schema(IdType::Integer).await.is_err());
    }
}
