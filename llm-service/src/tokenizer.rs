//! Model-keyed token estimation.
//!
//! Estimates are byte-ratio based rather than true BPE: a heavyweight
//! tokenizer dependency buys little here because budgets are enforced with
//! headroom and a conservative overestimate is safe. The ratio is looked up
//! per model family; unrecognized models fall back to the generic encoding.

/// Estimates token counts for a given model family.
///
/// Construct with [`TokenEstimator::for_model`]; the estimator is `Copy` and
/// carries only the bytes-per-token divisor.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    bytes_per_token: usize,
}

/// Known model-family prefixes and their approximate bytes-per-token ratio.
///
/// Code-heavy models tokenize denser than prose; 3 is a conservative pick
/// for them, 4 matches the common English-text approximation.
const MODEL_RATIOS: &[(&str, usize)] = &[
    ("gpt-", 4),
    ("o1", 4),
    ("o3", 4),
    ("qwen", 3),
    ("llama", 4),
    ("deepseek", 3),
    ("codellama", 3),
    ("mistral", 4),
    ("glm", 3),
];

impl TokenEstimator {
    /// Looks up the estimator for a model name; unrecognized models get the
    /// generic encoding.
    pub fn for_model(model: &str) -> Self {
        let lowered = model.to_ascii_lowercase();
        for (prefix, ratio) in MODEL_RATIOS {
            if lowered.starts_with(prefix) {
                return Self {
                    bytes_per_token: *ratio,
                };
            }
        }
        Self::generic()
    }

    /// Generic fallback encoding: 1 token ≈ 4 bytes.
    pub fn generic() -> Self {
        Self { bytes_per_token: 4 }
    }

    /// Estimated token count for `text`. Empty input counts as zero.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        text.len().div_ceil(self.bytes_per_token).max(1)
    }

    /// Upper byte bound that stays within `tokens` under this encoding.
    pub fn max_bytes(&self, tokens: usize) -> usize {
        tokens.saturating_mul(self.bytes_per_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_ratio_rounds_up() {
        let t = TokenEstimator::generic();
        assert_eq!(t.count(""), 0);
        assert_eq!(t.count("ab"), 1);
        assert_eq!(t.count("abcd"), 1);
        assert_eq!(t.count("abcde"), 2);
    }

    #[test]
    fn model_lookup_falls_back() {
        let known = TokenEstimator::for_model("qwen3:14b");
        let unknown = TokenEstimator::for_model("totally-novel-model");
        assert_eq!(known.count("abcdef"), 2); // 6 bytes / 3
        assert_eq!(unknown.count("abcdef"), 2); // 6 bytes / 4, rounded up
        assert_eq!(unknown.count("abcdefgh"), 2);
    }
}
