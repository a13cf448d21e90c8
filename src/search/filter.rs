//! Content filter - noise word removal before indexing / 内容过滤器
//!
//! Tokenization for matching lives inside SQLite FTS5 (`porter unicode61`);
//! this module only decides which tokens are worth indexing at all.
//! 过滤器只负责去掉不值得索引的词，分词交给 FTS5。
//!
//! Two variants / 两个变体：
//! - `filter_content`: for documents, removes Stop AND Common words / 文档过滤
//! - `filter_query`: for queries, removes Stop words only and keeps the
//!   original case, since a user may legitimately search a common term
//!   / 查询过滤，保留原始大小写
//!
//! Both variants are idempotent / 两个变体都是幂等的。

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Generic English stop words / 通用英文停用词
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "am", "an",
        "and", "any", "are", "aren", "as", "at", "be", "because", "been",
        "before", "being", "below", "between", "both", "but", "by", "can",
        "cannot", "could", "did", "do", "does", "doing", "down", "during",
        "each", "few", "for", "from", "further", "had", "has", "have",
        "having", "he", "her", "here", "hers", "herself", "him", "himself",
        "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself",
        "just", "me", "more", "most", "my", "myself", "no", "nor", "not",
        "now", "of", "off", "on", "once", "only", "or", "other", "our",
        "ours", "ourselves", "out", "over", "own", "same", "she", "should",
        "so", "some", "such", "than", "that", "the", "their", "theirs",
        "them", "themselves", "then", "there", "these", "they", "this",
        "those", "through", "to", "too", "under", "until", "up", "very",
        "was", "we", "were", "what", "when", "where", "which", "while",
        "who", "whom", "why", "will", "with", "would", "you", "your",
        "yours", "yourself", "yourselves",
    ]
    .into_iter()
    .collect()
});

/// Domain-specific common terms - words that appear in a large share of
/// indexed content and carry almost no selectivity / 领域常见词
static COMMON_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "cat", "cats", "dog", "dogs", "funny", "meme", "memes", "lol",
        "lmao", "wow", "cute", "epic", "fail", "win", "best", "top", "new",
        "hot", "viral", "trending", "video", "videos", "image", "images",
        "photo", "photos", "picture", "pictures", "gif", "gifs", "clip",
        "clips", "post", "posts", "share", "shared", "like", "likes",
        "follow", "followers", "daily", "today", "random", "stuff",
        "thing", "things", "good", "great", "nice", "awesome", "amazing",
        "check", "look", "see", "watch", "click", "free", "online",
    ]
    .into_iter()
    .collect()
});

/// Tokens shorter or longer than this are dropped / 超出长度范围的词被丢弃
const MIN_TOKEN_LEN: usize = 2;
const MAX_TOKEN_LEN: usize = 50;

fn token_len_ok(token: &str) -> bool {
    let len = token.chars().count();
    (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&len)
}

/// Filter document content before indexing / 索引前过滤文档内容
///
/// Lowercases, collapses every run of non-word characters into a single
/// space, then keeps tokens of length 2..=50 that are in neither the Stop
/// nor the Common set. Deterministic for a given input.
pub fn filter_content(raw: &str) -> String {
    let lowered = raw.to_lowercase();

    // Replace non-word runs with a single space / 非单词字符归并为空格
    let mut cleaned = String::with_capacity(lowered.len());
    let mut last_was_space = true;
    for c in lowered.chars() {
        if c.is_alphanumeric() || c == '_' {
            cleaned.push(c);
            last_was_space = false;
        } else if !last_was_space {
            cleaned.push(' ');
            last_was_space = true;
        }
    }

    cleaned
        .split_whitespace()
        .filter(|t| token_len_ok(t))
        .filter(|t| !STOP_WORDS.contains(t) && !COMMON_WORDS.contains(t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Filter a search query / 过滤搜索查询
///
/// Removes only Stop-set tokens and keeps the original case; common terms
/// stay because the user may be searching exactly for one. Punctuation is
/// left in place so phrase quoting still reaches the store layer.
pub fn filter_query(raw: &str) -> String {
    raw.split_whitespace()
        .filter(|t| token_len_ok(t))
        .filter(|t| !STOP_WORDS.contains(t.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a token counts as "common" for query cost analysis
/// / 词是否属于常见词（用于查询成本分析）
pub fn is_common_token(token: &str) -> bool {
    let lower = token.to_lowercase();
    STOP_WORDS.contains(lower.as_str()) || COMMON_WORDS.contains(lower.as_str())
}

/// Truncate a string to at most `max_bytes` bytes on a char boundary
/// / 按字符边界截断到指定字节数
pub fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_content_basic() {
        assert_eq!(
            filter_content("JavaScript programming tutorial"),
            "javascript programming tutorial"
        );
    }

    #[test]
    fn test_filter_content_all_noise() {
        // 全部是停用词或常见词
        assert_eq!(filter_content("The cat is funny meme"), "");
    }

    #[test]
    fn test_filter_content_punctuation() {
        assert_eq!(
            filter_content("rust-lang: ownership & borrowing!"),
            "rust lang ownership borrowing"
        );
    }

    #[test]
    fn test_filter_content_length_bounds() {
        // 单字符和超长词被丢弃
        let long = "x".repeat(51);
        let input = format!("q {} database", long);
        assert_eq!(filter_content(&input), "database");
    }

    #[test]
    fn test_filter_content_idempotent() {
        let inputs = [
            "The quick brown fox jumps over the lazy dog",
            "distributed full text search engine",
            "cat meme video!!!",
        ];
        for input in inputs {
            let once = filter_content(input);
            assert_eq!(filter_content(&once), once);
        }
    }

    #[test]
    fn test_filter_query_keeps_common_terms() {
        // 查询过滤保留常见词
        assert_eq!(filter_query("the cat meme"), "cat meme");
    }

    #[test]
    fn test_filter_query_preserves_case() {
        assert_eq!(filter_query("The JavaScript Tutorial"), "JavaScript Tutorial");
    }

    #[test]
    fn test_filter_query_idempotent() {
        let once = filter_query("the Best Rust tutorial");
        assert_eq!(filter_query(&once), once);
    }

    #[test]
    fn test_truncate_bytes() {
        assert_eq!(truncate_bytes("hello", 10), "hello");
        assert_eq!(truncate_bytes("hello", 3), "hel");
        // 不在多字节字符中间截断
        let s = "日本語テキスト";
        let t = truncate_bytes(s, 7);
        assert!(t.len() <= 7);
        assert!(s.starts_with(t));
    }
}
