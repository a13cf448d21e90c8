//! Shard error types / 分片错误类型

use super::types::FieldError;

/// Errors surfaced by shard operations / 分片操作返回的错误
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    /// Every write path on a read-only shard fails with this
    /// / 只读分片拒绝所有写入
    #[error("shard is read-only")]
    ReadOnly,

    /// Whole-batch rejection with the per-field list / 整批拒绝并附字段错误
    #[error("validation failed ({} field errors)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),

    /// A shard database written by a newer version / 更高版本写入的分片库
    #[error("unsupported shard schema version {0}")]
    SchemaVersion(i64),

    #[error("registry resolution failed: {0}")]
    Registry(String),

    /// Transport or remote-side failure on a cross-shard call
    /// / 跨分片调用的传输或远端错误
    #[error("rpc failed: {0}")]
    Rpc(String),

    #[error("{0}")]
    Internal(String),
}

impl ShardError {
    /// Stable status code used on the RPC wire / RPC 线路上的状态码
    pub fn rpc_code(&self) -> u16 {
        match self {
            ShardError::Validation(_) => 422,
            ShardError::ReadOnly => 423,
            ShardError::SchemaVersion(_) => 409,
            _ => 500,
        }
    }

    /// Rebuild a typed error from a wire code + message / 从线路码还原错误
    pub fn from_rpc(code: u16, message: String, fields: Option<Vec<FieldError>>) -> Self {
        match code {
            422 => ShardError::Validation(fields.unwrap_or_default()),
            423 => ShardError::ReadOnly,
            _ => ShardError::Rpc(message),
        }
    }

    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            ShardError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_code_roundtrip() {
        let err = ShardError::ReadOnly;
        let back = ShardError::from_rpc(err.rpc_code(), err.to_string(), None);
        assert!(matches!(back, ShardError::ReadOnly));

        let err = ShardError::Validation(vec![]);
        let back = ShardError::from_rpc(err.rpc_code(), err.to_string(), Some(vec![]));
        assert!(matches!(back, ShardError::Validation(_)));
    }
}
