//! Score extraction from review text.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Matches the `Total score: <n>` line the strategies ask the model to
    /// emit; tolerant of markdown emphasis and a `/100` suffix.
    static ref SCORE: Regex =
        Regex::new(r"(?i)total\s*score\s*[:：]\s*\**\s*(\d{1,3})").unwrap();
}

/// Parses the score out of a review result. Absent or unparseable ⇒ 0.
pub fn parse_review_score(review_text: &str) -> u32 {
    SCORE
        .captures(review_text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_score_parses() {
        assert_eq!(parse_review_score("Looks fine.\nTotal score: 85"), 85);
    }

    #[test]
    fn markdown_and_suffix_tolerated() {
        assert_eq!(parse_review_score("**Total Score:** 92/100"), 92);
    }

    #[test]
    fn missing_or_malformed_scores_zero() {
        assert_eq!(parse_review_score("no score here"), 0);
        assert_eq!(parse_review_score(""), 0);
        assert_eq!(parse_review_score("Total score: high"), 0);
    }
}
