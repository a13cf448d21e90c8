//! Shard wire and persisted types / 分片的传输与持久化类型

use serde::{Deserialize, Serialize};

/// Default scheduler tick interval / 默认调度间隔
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 60_000;
/// Minimum scheduler tick interval / 最小调度间隔
pub const MIN_TICK_INTERVAL_MS: u64 = 1_000;
/// Hard size ceiling trigger - 9 GB against a 10 GB database cap
/// / 硬性容量阈值
pub const DEFAULT_SIZE_THRESHOLD_BYTES: u64 = 9_000_000_000;
/// Maximum byte length of a string document id / 字符串文档 ID 的最大字节数
pub const MAX_ID_BYTES: usize = 255;
/// Filtered content is truncated to this many bytes / 过滤后内容的截断长度
pub const MAX_FILTERED_BYTES: usize = 500;

/// Document id - either a string or a non-negative integer
/// / 文档 ID，字符串或非负整数
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocId {
    Int(i64),
    Str(String),
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocId::Int(n) => write!(f, "{}", n),
            DocId::Str(s) => write!(f, "{}", s),
        }
    }
}

/// A document as submitted for indexing; unknown fields are ignored
/// / 提交索引的文档，未知字段被忽略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub content: String,
}

/// The indexed form of a document / 文档的已索引形态
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: DocId,
    pub filtered_content: String,
}

/// A row read back from the store / 从存储读回的行
#[derive(Debug, Clone)]
pub struct ScannedRow {
    pub rowid: i64,
    pub id: DocId,
    pub content: String,
}

/// A search hit / 搜索命中
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub id: DocId,
    pub content: String,
    /// FTS5 bm25 rank; lower is better / FTS5 排名，越小越相关
    pub rank: f64,
}

/// Shard statistics / 分片统计
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ShardStats {
    pub count: u64,
    pub bytes: u64,
    pub read_only: bool,
}

/// Which id shape a shard accepts; immutable while data exists
/// / 分片接受的 ID 类型，存在数据后不可变更
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    String,
    Integer,
}

impl Default for IdType {
    fn default() -> Self {
        IdType::String
    }
}

/// Replica address - a tagged sum type / 副本地址，带标签的和类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReplicaDescriptor {
    /// Addressed by name with a "prefer this region" hint
    /// / 按名称寻址，附带区域偏好
    Region {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
    /// Addressed by stable identifier / 按稳定标识符寻址
    Local { id: String },
}

impl ReplicaDescriptor {
    /// The shard name this descriptor resolves through / 解析用的分片名
    pub fn shard_name(&self) -> &str {
        match self {
            ReplicaDescriptor::Region { name, .. } => name,
            ReplicaDescriptor::Local { id } => id,
        }
    }
}

/// Persistent per-shard configuration / 分片持久化配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShardConfig {
    pub id_type: IdType,
    pub tick_interval_ms: u64,
    pub purge_count_threshold: Option<u64>,
    pub purge_target_count: Option<u64>,
    pub size_threshold_bytes: u64,
    pub cold_shard_prefix: Option<String>,
    pub cold_shard_capacity: u64,
    pub replicas: Vec<ReplicaDescriptor>,
    pub read_only: bool,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            id_type: IdType::default(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            purge_count_threshold: None,
            purge_target_count: None,
            size_threshold_bytes: DEFAULT_SIZE_THRESHOLD_BYTES,
            cold_shard_prefix: None,
            cold_shard_capacity: 0,
            replicas: Vec::new(),
            read_only: false,
        }
    }
}

/// Partial configuration merged by `Configure` / Configure 合并的部分配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub id_type: Option<IdType>,
    pub tick_interval_ms: Option<u64>,
    pub purge_count_threshold: Option<u64>,
    pub purge_target_count: Option<u64>,
    pub size_threshold_bytes: Option<u64>,
    pub cold_shard_prefix: Option<String>,
    pub cold_shard_capacity: Option<u64>,
    pub replicas: Option<Vec<ReplicaDescriptor>>,
    pub read_only: Option<bool>,
}

impl ConfigPatch {
    /// A patch that only flips the read-only flag / 只设置只读标志的补丁
    pub fn read_only() -> Self {
        Self { read_only: Some(true), ..Default::default() }
    }

    /// A patch that only pins the id type / 只固定 ID 类型的补丁
    pub fn pin_id_type(id_type: IdType) -> Self {
        Self { id_type: Some(id_type), ..Default::default() }
    }
}

/// Search request as seen by the shard RPC surface / 分片搜索请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub include_cold: bool,
    #[serde(default = "default_search_max")]
    pub max: usize,
}

fn default_search_max() -> usize {
    50
}

/// Result of an accepted index/sync batch / 成功写入批次的结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexOutcome {
    pub indexed: u64,
}

/// One field-level validation failure / 单个字段校验错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub value: serde_json::Value,
}

/// Validate a batch against the configured id type; the whole batch is
/// rejected on any failure / 按 ID 类型校验整批文档，任一失败拒绝整批
pub fn validate_batch(docs: &[Document], id_type: IdType) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for (i, doc) in docs.iter().enumerate() {
        match (&doc.id, id_type) {
            (DocId::Str(s), IdType::String) => {
                if s.is_empty() {
                    errors.push(FieldError {
                        field: format!("documents[{}].id", i),
                        message: "id must be a non-empty string".to_string(),
                        value: serde_json::Value::String(s.clone()),
                    });
                } else if s.len() > MAX_ID_BYTES {
                    errors.push(FieldError {
                        field: format!("documents[{}].id", i),
                        message: format!("id exceeds {} bytes", MAX_ID_BYTES),
                        value: serde_json::Value::String(s.clone()),
                    });
                }
            }
            (DocId::Int(n), IdType::Integer) => {
                if *n < 0 {
                    errors.push(FieldError {
                        field: format!("documents[{}].id", i),
                        message: "id must be a non-negative integer".to_string(),
                        value: serde_json::json!(n),
                    });
                }
            }
            (DocId::Int(n), IdType::String) => {
                errors.push(FieldError {
                    field: format!("documents[{}].id", i),
                    message: "shard is configured for string ids".to_string(),
                    value: serde_json::json!(n),
                });
            }
            (DocId::Str(s), IdType::Integer) => {
                errors.push(FieldError {
                    field: format!("documents[{}].id", i),
                    message: "shard is configured for integer ids".to_string(),
                    value: serde_json::Value::String(s.clone()),
                });
            }
        }

        if doc.content.is_empty() {
            errors.push(FieldError {
                field: format!("documents[{}].content", i),
                message: "content must be a non-empty string".to_string(),
                value: serde_json::Value::String(String::new()),
            });
        }
    }
    errors
}

/// Validate a replica list: non-empty names, no duplicates
/// / 校验副本列表：名称非空且不重复
pub fn validate_replicas(replicas: &[ReplicaDescriptor]) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (i, r) in replicas.iter().enumerate() {
        let name = r.shard_name();
        if name.is_empty() {
            errors.push(FieldError {
                field: format!("replicas[{}]", i),
                message: "replica name must be non-empty".to_string(),
                value: serde_json::json!(r),
            });
        } else if !seen.insert(name.to_string()) {
            errors.push(FieldError {
                field: format!("replicas[{}]", i),
                message: "duplicate replica".to_string(),
                value: serde_json::json!(r),
            });
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_untagged_serde() {
        let d: Document = serde_json::from_str(r#"{"id": "a", "content": "x"}"#).unwrap();
        assert_eq!(d.id, DocId::Str("a".to_string()));

        let d: Document = serde_json::from_str(r#"{"id": 42, "content": "x"}"#).unwrap();
        assert_eq!(d.id, DocId::Int(42));

        // 额外字段被忽略
        let d: Document =
            serde_json::from_str(r#"{"id": 1, "content": "x", "extra": true}"#).unwrap();
        assert_eq!(d.id, DocId::Int(1));
    }

    #[test]
    fn test_replica_descriptor_tagged_serde() {
        let r: ReplicaDescriptor =
            serde_json::from_str(r#"{"kind": "region", "name": "replica-apac", "region": "apac"}"#)
                .unwrap();
        assert_eq!(r.shard_name(), "replica-apac");

        let r: ReplicaDescriptor = serde_json::from_str(r#"{"kind": "local", "id": "r1"}"#).unwrap();
        assert_eq!(r.shard_name(), "r1");
    }

    #[test]
    fn test_shard_config_camel_case_keys() {
        let json = serde_json::to_value(ShardConfig::default()).unwrap();
        assert!(json.get("idType").is_some());
        assert!(json.get("tickIntervalMs").is_some());
        assert!(json.get("sizeThresholdBytes").is_some());
    }

    #[test]
    fn test_validate_batch_id_type_mismatch() {
        let docs = vec![
            Document { id: DocId::Str("a".into()), content: "hello".into() },
            Document { id: DocId::Int(3), content: "world".into() },
        ];
        let errors = validate_batch(&docs, IdType::String);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "documents[1].id");
    }

    #[test]
    fn test_validate_batch_rejects_bad_fields() {
        let docs = vec![
            Document { id: DocId::Str(String::new()), content: String::new() },
            Document { id: DocId::Int(-1), content: "x".into() },
        ];
        let errors = validate_batch(&docs, IdType::Integer);
        // 第一个文档：ID 类型不匹配 + 空内容；第二个：负数 ID
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_validate_batch_long_string_id() {
        let docs = vec![Document { id: DocId::Str("i".repeat(256)), content: "x".into() }];
        assert_eq!(validate_batch(&docs, IdType::String).len(), 1);
    }

    #[test]
    fn test_validate_replicas_duplicates() {
        let replicas = vec![
            ReplicaDescriptor::Local { id: "r1".into() },
            ReplicaDescriptor::Region { name: "r1".into(), region: None },
        ];
        let errors = validate_replicas(&replicas);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "duplicate replica");
    }
}
