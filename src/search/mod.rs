//! Search primitives - filtering and query planning / 搜索原语模块
//!
//! Architecture principle: this module only exposes pure primitives; the
//! shard controls flow / 架构原则：本模块只暴露原语，分片控制流程。
//! Call direction: shard → search (unidirectional) / 调用方向单向。

pub mod filter;
pub mod planner;

pub use filter::{filter_content, filter_query, truncate_bytes};
pub use planner::{plan, CostBucket, PlanOutcome, QueryPlan};
