//! Review strategies: system/user prompt pairs keyed by detected language.
//!
//! Prompts are built in code. Each language gets a short system preamble
//! naming the things a reviewer of that language actually looks for; the
//! generic strategy covers everything the classifier couldn't place. The
//! configured style only adjusts the reviewer's tone.

use llm_service::ChatMessage;

use crate::budget::ReviewRequest;
use crate::config::ReviewStyle;
use crate::lang::Language;

/// A system/user prompt pair ready to render into chat messages.
#[derive(Debug, Clone)]
pub struct ReviewStrategy {
    pub system_prompt: String,
}

/// Focus line appended to the system prompt per language.
fn language_focus(lang: Language) -> &'static str {
    match lang {
        Language::Python => {
            "The change is Python. Watch for mutable default arguments, \
             unhandled exceptions, misuse of comprehensions, and blocking \
             calls in async code."
        }
        Language::JavaScript => {
            "The change is JavaScript. Watch for unhandled promise \
             rejections, equality pitfalls, and accidental globals."
        }
        Language::TypeScript => {
            "The change is TypeScript. Watch for unsound casts, `any` \
             leakage, and incorrect narrowing."
        }
        Language::Java => {
            "The change is Java. Watch for resource leaks, equals/hashCode \
             contracts, and concurrency hazards."
        }
        Language::Go => {
            "The change is Go. Watch for ignored error returns, goroutine \
             leaks, and data races."
        }
        Language::Php => {
            "The change is PHP. Watch for injection risks, loose \
             comparisons, and missing input validation."
        }
        Language::Cpp => {
            "The change is C/C++. Watch for memory safety, ownership of raw \
             pointers, and undefined behavior."
        }
        Language::Vue => {
            "The change is a Vue component. Watch for reactivity pitfalls, \
             prop mutation, and lifecycle misuse."
        }
        Language::Yaml => {
            "The change is YAML configuration. Watch for indentation \
             mistakes, duplicated keys, and unquoted values that change type."
        }
        Language::Proto => {
            "The change is a protobuf schema. Watch for field-number reuse, \
             breaking wire-compatibility, and missing reserved entries."
        }
        Language::Unknown => {
            "Review the change on general correctness, readability, and \
             error handling."
        }
    }
}

/// Tone line selected by the configured style.
fn style_tone(style: ReviewStyle) -> &'static str {
    match style {
        ReviewStyle::Professional => {
            "Keep the feedback concise and professional; point out concrete \
             problems with concrete fixes."
        }
        ReviewStyle::Gentle => {
            "Keep the feedback encouraging; phrase problems as suggestions \
             and acknowledge what is done well."
        }
        ReviewStyle::Humorous => {
            "Keep the feedback light and witty, but never at the expense of \
             clarity about real problems."
        }
    }
}

/// Builds the strategy for a language/style pair.
pub fn strategy_for(lang: Language, style: ReviewStyle) -> ReviewStrategy {
    let system_prompt = format!(
        "You are a senior engineer reviewing a version-control change. The \
         change arrives as a unified git diff. Respond in well-formed \
         markdown. Avoid restating the diff; focus on defects, risks, and \
         concrete improvements. If nothing is wrong, say so briefly. End \
         with a line `Total score: <0-100>`. {} {}",
        language_focus(lang),
        style_tone(style)
    );
    ReviewStrategy { system_prompt }
}

/// Renders the chat messages for one budgeted per-hunk review call.
pub fn hunk_messages(req: &ReviewRequest, style: ReviewStyle) -> Vec<ChatMessage> {
    let strategy = strategy_for(req.language, style);

    let mut user = format!(
        "Review this single change block and nothing else:\n\
         ```diff\n{}\n```\n",
        req.diff_text
    );
    if let Some(content) = &req.file_content {
        user.push_str(&format!(
            "\nFor context only (do not review), the file content around the \
             change:\n```\n{}\n```\n",
            content
        ));
    }
    if let Some(ctx) = &req.context_diff {
        user.push_str(&format!(
            "\nFor context only (do not review), the file's full diff:\n\
             ```diff\n{}\n```\n",
            ctx
        ));
    }
    if !req.commits_text.is_empty() {
        user.push_str(&format!("\nCommit messages: {}\n", req.commits_text));
    }

    vec![
        ChatMessage::system(strategy.system_prompt),
        ChatMessage::user(user),
    ]
}

/// Renders the chat messages for one aggregate (whole-diff) review call,
/// used on the push path where no line anchoring exists.
pub fn aggregate_messages(req: &ReviewRequest, style: ReviewStyle) -> Vec<ChatMessage> {
    let strategy = strategy_for(req.language, style);

    let mut user = format!(
        "Review the following changes as a whole:\n```diff\n{}\n```\n",
        req.diff_text
    );
    if !req.commits_text.is_empty() {
        user.push_str(&format!("\nCommit messages: {}\n", req.commits_text));
    }

    vec![
        ChatMessage::system(strategy.system_prompt),
        ChatMessage::user(user),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Language;

    fn req(lang: Language) -> ReviewRequest {
        ReviewRequest {
            diff_text: "+x = 1\n".into(),
            context_diff: Some("@@ -1 +1 @@\n+x = 1\n".into()),
            file_content: Some("x = 1\n".into()),
            commits_text: "fix: init x".into(),
            language: lang,
            token_count: 10,
        }
    }

    #[test]
    fn messages_carry_system_then_user() {
        let msgs = hunk_messages(&req(Language::Python), ReviewStyle::Professional);
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].content.contains("Python"));
        assert!(msgs[1].content.contains("Commit messages: fix: init x"));
    }

    #[test]
    fn unknown_language_gets_generic_strategy() {
        let s = strategy_for(Language::Unknown, ReviewStyle::Professional);
        assert!(s.system_prompt.contains("general correctness"));
    }
}
