//! Remote shard stub - typed RPC over HTTP / 远程分片存根
//!
//! Speaks the node-to-node `/api/rpc/{shard}/{op}` surface; the JSON
//! envelope mirrors the public ApiResponse shape with a typed error code.
//! / 走节点间 RPC 接口，JSON 信封携带类型化错误码。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::ShardError;
use super::registry::ShardHandle;
use super::types::{
    ConfigPatch, Document, FieldError, Hit, IndexOutcome, SearchRequest, ShardStats,
};

/// Wire envelope for shard RPCs / 分片 RPC 的线路信封
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<Vec<FieldError>>,
}

impl RpcResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: serde_json::to_value(data).ok(),
            field_errors: None,
        }
    }

    pub fn from_error(err: &ShardError) -> Self {
        Self {
            code: err.rpc_code(),
            message: err.to_string(),
            data: None,
            field_errors: err.field_errors().map(|f| f.to_vec()),
        }
    }
}

pub struct RemoteShard {
    client: reqwest::Client,
    base_url: String,
    shard: String,
    api_token: Option<String>,
}

impl RemoteShard {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        shard: String,
        api_token: Option<String>,
    ) -> Self {
        Self { client, base_url, shard, api_token }
    }

    async fn call(
        &self,
        op: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ShardError> {
        let url = format!(
            "{}/api/rpc/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.shard,
            op
        );

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.api_token {
            request = request.header("x-api-token", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ShardError::Rpc(format!("{}: {}", url, e)))?;

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| ShardError::Rpc(format!("{}: invalid envelope: {}", url, e)))?;

        if envelope.code == 200 {
            Ok(envelope.data.unwrap_or(serde_json::Value::Null))
        } else {
            Err(ShardError::from_rpc(envelope.code, envelope.message, envelope.field_errors))
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, ShardError> {
        serde_json::from_value(value)
            .map_err(|e| ShardError::Rpc(format!("invalid rpc payload: {}", e)))
    }
}

#[async_trait]
impl ShardHandle for RemoteShard {
    async fn index(&self, docs: Vec<Document>) -> Result<IndexOutcome, ShardError> {
        let data = self.call("index", serde_json::json!({ "documents": docs })).await?;
        Self::decode(data)
    }

    async fn sync(&self, docs: Vec<Document>) -> Result<IndexOutcome, ShardError> {
        let data = self.call("sync", serde_json::json!({ "documents": docs })).await?;
        Self::decode(data)
    }

    async fn search(&self, req: SearchRequest) -> Result<Vec<Hit>, ShardError> {
        let data = self.call("search", serde_json::to_value(&req).unwrap_or_default()).await?;
        Self::decode(data)
    }

    async fn stats(&self) -> Result<ShardStats, ShardError> {
        let data = self.call("stats", serde_json::json!({})).await?;
        Self::decode(data)
    }

    async fn configure(&self, patch: ConfigPatch) -> Result<(), ShardError> {
        self.call("configure", serde_json::to_value(&patch).unwrap_or_default()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::types::DocId;

    #[test]
    fn test_envelope_success_roundtrip() {
        let outcome = IndexOutcome { indexed: 3 };
        let envelope = RpcResponse::success(outcome);
        let raw = serde_json::to_string(&envelope).unwrap();
        let parsed: RpcResponse = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.code, 200);
        let back: IndexOutcome = serde_json::from_value(parsed.data.unwrap()).unwrap();
        assert_eq!(back.indexed, 3);
    }

    #[test]
    fn test_envelope_carries_field_errors() {
        let err = ShardError::Validation(vec![FieldError {
            field: "documents[0].id".to_string(),
            message: "id must be a non-empty string".to_string(),
            value: serde_json::Value::String(String::new()),
        }]);
        let envelope = RpcResponse::from_error(&err);
        assert_eq!(envelope.code, 422);

        let raw = serde_json::to_string(&envelope).unwrap();
        let parsed: RpcResponse = serde_json::from_str(&raw).unwrap();
        let back = ShardError::from_rpc(parsed.code, parsed.message, parsed.field_errors);
        match back {
            ShardError::Validation(fields) => assert_eq!(fields.len(), 1),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_hit_payload_decodes() {
        let hits = vec![Hit { id: DocId::Str("a".into()), content: "x".into(), rank: -1.5 }];
        let value = serde_json::to_value(&hits).unwrap();
        let back: Vec<Hit> = RemoteShard::decode(value).unwrap();
        assert_eq!(back[0].id, DocId::Str("a".into()));
    }
}
