// ── Pool inference ──
//
// The peer does not say which models share a quota pool, so pools are
// inferred from display labels. User rules run first; the built-in
// precedence below is fixed and never reordered by them.

use serde::{Deserialize, Serialize};

/// Shared by Claude and GPT-family models.
pub const CLAUDE_POOL: &str = "claude_pool";
pub const GEMINI_PRO_POOL: &str = "gemini_pro_pool";
pub const GEMINI_FLASH_POOL: &str = "gemini_flash_pool";
pub const DEFAULT_POOL: &str = "default_pool";

/// User override: labels containing `contains` (case-insensitive) go to
/// `pool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRule {
    pub contains: String,
    pub pool: String,
}

/// Maps a model label to a pool id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolClassifier {
    /// Lowercased needles, in configured order.
    rules: Vec<PoolRule>,
}

impl PoolClassifier {
    /// Build from user rules; rules with an empty needle or pool are ignored.
    pub fn new(rules: impl IntoIterator<Item = PoolRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter(|r| !r.contains.trim().is_empty() && !r.pool.trim().is_empty())
            .map(|r| PoolRule {
                contains: r.contains.to_lowercase(),
                pool: r.pool.trim().to_owned(),
            })
            .collect();
        Self { rules }
    }

    /// Pool id for `label`: first matching user rule, else the built-in
    /// heuristic.
    pub fn classify(&self, label: &str) -> String {
        let lower = label.to_lowercase();
        self.rules
            .iter()
            .find(|r| lower.contains(&r.contains))
            .map_or_else(|| builtin_pool(&lower).to_owned(), |r| r.pool.clone())
    }
}

/// Built-in precedence: claude, gemini+pro, gemini+flash, gpt, default.
/// Expects a lowercased label.
fn builtin_pool(lower: &str) -> &'static str {
    if lower.contains("claude") {
        CLAUDE_POOL
    } else if lower.contains("gemini") && lower.contains("pro") {
        GEMINI_PRO_POOL
    } else if lower.contains("gemini") && lower.contains("flash") {
        GEMINI_FLASH_POOL
    } else if lower.contains("gpt") {
        CLAUDE_POOL
    } else {
        DEFAULT_POOL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_precedence() {
        let c = PoolClassifier::default();
        assert_eq!(c.classify("Claude Opus 4.5 (Thinking)"), CLAUDE_POOL);
        assert_eq!(c.classify("Gemini 3 Pro (High)"), GEMINI_PRO_POOL);
        assert_eq!(c.classify("Gemini 3 Flash"), GEMINI_FLASH_POOL);
        assert_eq!(c.classify("GPT OSS 120b"), CLAUDE_POOL);
        assert_eq!(c.classify("Some Other Model"), DEFAULT_POOL);
    }

    #[test]
    fn precedence_resolves_overlaps() {
        let c = PoolClassifier::default();
        // "claude" beats everything, "pro" beats "flash".
        assert_eq!(c.classify("Claude via Gemini Pro"), CLAUDE_POOL);
        assert_eq!(c.classify("Gemini Flash Pro"), GEMINI_PRO_POOL);
        assert_eq!(c.classify("Gemini"), DEFAULT_POOL);
        assert_eq!(c.classify("gpt-gemini-flash"), GEMINI_FLASH_POOL);
    }

    #[test]
    fn user_rules_apply_first_in_order() {
        let c = PoolClassifier::new([
            PoolRule {
                contains: "GPT".into(),
                pool: "openai_pool".into(),
            },
            PoolRule {
                contains: "oss".into(),
                pool: "never_reached".into(),
            },
            PoolRule {
                contains: "  ".into(),
                pool: "ignored".into(),
            },
        ]);
        assert_eq!(c.classify("GPT OSS 120b"), "openai_pool");
        assert_eq!(c.classify("Claude Sonnet 4.5"), CLAUDE_POOL);
        // The blank rule was dropped rather than matching every double space.
        assert_eq!(c.classify("Some  Other Model"), DEFAULT_POOL);
    }
}
