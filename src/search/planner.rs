//! Query planner - cost analysis before the index is touched / 查询计划器
//!
//! Classifies a query by its share of common terms, picks a row cap per
//! cost bucket and rejects queries that would scan a large part of the
//! index for no selectivity. / 按常见词比例分类查询，选择行数上限，
//! 拒绝没有选择性的查询。

use serde::Serialize;

use super::filter::{filter_query, is_common_token};

/// Row cap for high-cost queries / 高成本查询的行数上限
const HIGH_COST_CAP: usize = 50;
/// Row cap for medium-cost queries / 中等成本查询的行数上限
const MEDIUM_COST_CAP: usize = 200;
/// Requested maximums above this are clamped before planning
/// / 进入计划器前请求上限被钳制到该值
pub const MAX_REQUESTED: usize = 100;
/// Share of common tokens above which a query is rejected
/// / 常见词比例超过该值的查询被拒绝
const REJECT_RATIO: f64 = 0.80;

/// Cost bucket / 成本等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CostBucket {
    Low,
    Medium,
    High,
}

/// An accepted query plan / 已接受的查询计划
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Query text after stop-word removal / 去停用词后的查询文本
    pub processed: String,
    pub cost: CostBucket,
    /// Maximum rows the store may return / 存储层最多返回的行数
    pub row_cap: usize,
}

/// Planner outcome / 计划结果
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    Accepted(QueryPlan),
    Rejected { reason: &'static str },
}

/// Plan a query / 规划查询
///
/// `requested_max` must already be clamped to [`MAX_REQUESTED`] by the
/// caller; the planner clamps again so a stray call site cannot widen the
/// cap.
pub fn plan(raw: &str, requested_max: usize) -> PlanOutcome {
    let requested = requested_max.min(MAX_REQUESTED).max(1);

    let processed = filter_query(raw);
    if processed.is_empty() {
        return PlanOutcome::Rejected { reason: "only stop words" };
    }

    let tokens: Vec<&str> = processed.split_whitespace().collect();
    let common = tokens.iter().filter(|t| is_common_token(t)).count();
    let ratio = common as f64 / tokens.len() as f64;

    if ratio > REJECT_RATIO {
        return PlanOutcome::Rejected { reason: "too common" };
    }

    let cost = if ratio == 0.0 {
        CostBucket::Low
    } else if ratio < 0.5 {
        CostBucket::Medium
    } else {
        CostBucket::High
    };

    let row_cap = match cost {
        CostBucket::High => requested.min(HIGH_COST_CAP),
        CostBucket::Medium => requested.min(MEDIUM_COST_CAP),
        CostBucket::Low => requested,
    };

    PlanOutcome::Accepted(QueryPlan { processed, cost, row_cap })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept(raw: &str, max: usize) -> QueryPlan {
        match plan(raw, max) {
            PlanOutcome::Accepted(p) => p,
            PlanOutcome::Rejected { reason } => panic!("rejected: {}", reason),
        }
    }

    #[test]
    fn test_reject_only_stop_words() {
        match plan("the and or", 10) {
            PlanOutcome::Rejected { reason } => assert_eq!(reason, "only stop words"),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_reject_too_common() {
        // 去掉停用词后剩 "cat meme"，两个都是常见词
        match plan("the and or cat meme", 100) {
            PlanOutcome::Rejected { reason } => assert_eq!(reason, "too common"),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_low_cost_no_extra_cap() {
        let p = accept("javascript tutorial", 80);
        assert_eq!(p.cost, CostBucket::Low);
        assert_eq!(p.row_cap, 80);
    }

    #[test]
    fn test_medium_cost_bucket() {
        // 三个词里一个常见词，比例 1/3
        let p = accept("cat ownership borrowing", 100);
        assert_eq!(p.cost, CostBucket::Medium);
        assert_eq!(p.row_cap, 100);
    }

    #[test]
    fn test_high_cost_capped_at_50() {
        // 两个词里一个常见词，比例 0.5 落在 high
        let p = accept("cat compiler", 100);
        assert_eq!(p.cost, CostBucket::High);
        assert_eq!(p.row_cap, 50);
    }

    #[test]
    fn test_requested_max_clamped() {
        let p = accept("rust ownership", 5000);
        assert_eq!(p.row_cap, MAX_REQUESTED);
    }

    #[test]
    fn test_processed_keeps_case() {
        let p = accept("The JavaScript Tutorial", 10);
        assert_eq!(p.processed, "JavaScript Tutorial");
    }
}
