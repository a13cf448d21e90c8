//! Cold-shard fan-out on the query path / 查询路径的冷分片扇出
//!
//! Splits the requested row count across the existing cold shards, queries
//! them in parallel and merges by rank. A failing cold shard contributes
//! an empty result; the query itself never fails here.
//! / 把请求预算分摊到冷分片上并行查询，按排名归并；单个冷分片失败
//! 只贡献空结果。

use futures::future::join_all;

use super::registry::ShardRegistry;
use super::types::{Hit, SearchRequest};

/// Query cold shards `[0, shards)` and merge / 查询冷分片并归并
///
/// Cold shards are always queried with `include_cold = false`; they never
/// recurse into further fan-out.
pub(crate) async fn fan_out(
    registry: &dyn ShardRegistry,
    prefix: &str,
    shards: u32,
    query: &str,
    max: usize,
) -> Vec<Hit> {
    if shards == 0 || max == 0 {
        return Vec::new();
    }
    let per_shard = ((max + shards as usize - 1) / shards as usize).max(1);

    let tasks = (0..shards).map(|i| async move {
        match registry.resolve_cold(prefix, i).await {
            Ok(stub) => match stub
                .search(SearchRequest {
                    query: query.to_string(),
                    include_cold: false,
                    max: per_shard,
                })
                .await
            {
                Ok(hits) => hits,
                Err(err) => {
                    tracing::warn!("Cold shard {}-{} search failed: {}", prefix, i, err);
                    Vec::new()
                }
            },
            Err(err) => {
                tracing::warn!("Cold shard {}-{} resolution failed: {}", prefix, i, err);
                Vec::new()
            }
        }
    });

    let mut hits: Vec<Hit> = join_all(tasks).await.into_iter().flatten().collect();
    // 按排名升序稳定排序（越小越相关）
    hits.sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(max);
    hits
}
