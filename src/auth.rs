//! Cluster token auth / 集群令牌认证
//!
//! Admin and node-to-node endpoints require the shared cluster token in
//! the `x-api-token` header. / 管理与节点间接口要求共享令牌。

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

pub const TOKEN_HEADER: &str = "x-api-token";

/// Validate the cluster token / 校验集群令牌
pub fn require_token(
    headers: &HeaderMap,
    expected: &str,
) -> Result<(), (StatusCode, Json<Value>)> {
    let provided = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if expected.is_empty() || provided != expected {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid or missing api token"})),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_required() {
        let headers = HeaderMap::new();
        assert!(require_token(&headers, "secret").is_err());

        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, "wrong".parse().unwrap());
        assert!(require_token(&headers, "secret").is_err());

        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, "secret".parse().unwrap());
        assert!(require_token(&headers, "secret").is_ok());
    }

    #[test]
    fn test_empty_expected_token_rejects() {
        // 未配置令牌时宁可全拒，也不放行
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, "".parse().unwrap());
        assert!(require_token(&headers, "").is_err());
    }
}
