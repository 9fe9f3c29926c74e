//! Source-language classification for review-strategy selection.
//!
//! A closed [`Language`] enum and an ordered detector chain: file-extension
//! matching first (over explicit paths and paths mined from diff headers),
//! then content heuristics. The first detector that returns a language wins;
//! everything else falls through to [`Language::Unknown`].

use lazy_static::lazy_static;
use regex::Regex;

/// Closed set of languages the reviewer has dedicated strategies for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Java,
    Go,
    Php,
    Cpp,
    Vue,
    Yaml,
    Proto,
    Unknown,
}

impl Language {
    pub fn is_known(self) -> bool {
        self != Language::Unknown
    }
}

/// Extension → language table (case-insensitive on the extension).
const EXTENSIONS: &[(&str, Language)] = &[
    (".py", Language::Python),
    (".js", Language::JavaScript),
    (".jsx", Language::JavaScript),
    (".ts", Language::TypeScript),
    (".tsx", Language::TypeScript),
    (".vue", Language::Vue),
    (".java", Language::Java),
    (".go", Language::Go),
    (".php", Language::Php),
    (".cpp", Language::Cpp),
    (".cc", Language::Cpp),
    (".cxx", Language::Cpp),
    (".c", Language::Cpp),
    (".h", Language::Cpp),
    (".hpp", Language::Cpp),
    (".proto", Language::Proto),
    (".yaml", Language::Yaml),
    (".yml", Language::Yaml),
];

lazy_static! {
    /// File paths named in unified-diff headers (`+++ b/...`, `--- a/...`,
    /// `diff --git a/... b/...`).
    static ref DIFF_PATH: Regex =
        Regex::new(r"(?m)^(?:\+\+\+ (?:b/)?|--- (?:a/)?|diff --git a/)(\S+)").unwrap();
}

/// Classifies the change, extension detector first, content heuristics as a
/// fallback. First match wins.
pub fn detect(paths: &[&str], diff_text: &str) -> Language {
    if let Some(lang) = detect_by_extension(paths, diff_text) {
        return lang;
    }
    if let Some(lang) = detect_by_content(diff_text) {
        return lang;
    }
    Language::Unknown
}

/// Majority vote over extensions of explicit paths plus paths mined from the
/// diff text. `None` when no path carries a known extension.
fn detect_by_extension(paths: &[&str], diff_text: &str) -> Option<Language> {
    let mut counts: Vec<(Language, usize)> = Vec::new();

    let mined = DIFF_PATH
        .captures_iter(diff_text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str());

    for path in paths.iter().copied().chain(mined) {
        if let Some(lang) = language_for_path(path) {
            match counts.iter_mut().find(|(l, _)| *l == lang) {
                Some((_, n)) => *n += 1,
                None => counts.push((lang, 1)),
            }
        }
    }

    counts.into_iter().max_by_key(|(_, n)| *n).map(|(l, _)| l)
}

/// Language for a single file path by extension, or `None`.
pub fn language_for_path(path: &str) -> Option<Language> {
    let lowered = path.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(ext, _)| lowered.ends_with(ext))
        .map(|(_, lang)| *lang)
}

/// Indicator-substring heuristics, applied when no path gave a signal.
/// Order matters: Vue templates contain JS, and JS keywords shadow Python's.
fn detect_by_content(diff_text: &str) -> Option<Language> {
    let lowered = diff_text.to_ascii_lowercase();

    const VUE_HINTS: &[&str] = &[
        "<template>",
        "<script setup",
        "defineprops",
        "defineemits",
        "v-model",
        "v-for=",
    ];
    const JS_HINTS: &[&str] = &[
        "console.log",
        "=> {",
        "const ",
        "let ",
        "document.",
        "window.",
        "addeventlistener",
    ];
    const PY_HINTS: &[&str] = &[
        "def ",
        "import ",
        "self.",
        "if __name__",
        "print(",
        "except ",
        "elif ",
    ];

    if VUE_HINTS.iter().any(|h| lowered.contains(h)) {
        return Some(Language::Vue);
    }
    if JS_HINTS.iter().any(|h| lowered.contains(h)) {
        return Some(Language::JavaScript);
    }
    if PY_HINTS.iter().any(|h| lowered.contains(h)) {
        return Some(Language::Python);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_beats_content() {
        // The body looks like JS, but the path says Python.
        let diff = "+++ b/scripts/run.py\n@@ -1,1 +1,2 @@\n+const x = 1\n";
        assert_eq!(detect(&[], diff), Language::Python);
    }

    #[test]
    fn explicit_paths_count_toward_majority() {
        assert_eq!(detect(&["a.java", "b.java", "c.py"], ""), Language::Java);
    }

    #[test]
    fn content_fallback_spots_python() {
        let diff = "@@ -1,1 +1,2 @@\n+def handler(self):\n+    return 1\n";
        assert_eq!(detect(&[], diff), Language::Python);
    }

    #[test]
    fn unknown_when_nothing_matches() {
        assert_eq!(detect(&["README.md"], "@@ -1 +1 @@\n+plain text\n"), Language::Unknown);
    }

    #[test]
    fn case_insensitive_extensions() {
        assert_eq!(language_for_path("Main.JAVA"), Some(Language::Java));
        assert_eq!(language_for_path("noext"), None);
    }
}
