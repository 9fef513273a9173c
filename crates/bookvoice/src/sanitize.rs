//! Helpers for sanitizing data before it reaches users, logs or the filesystem.
//!
//! - Span fields only carry file names, never full paths.
//! - Child-process output is stripped of known-benign diagnostic chatter
//!   before it becomes part of a job message.
//! - Book titles are turned into safe folder names.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Lines matching any of these are noise from the ML runtimes behind the
/// external executables: deprecation notices, thread/parallelism chatter and
/// accelerator-library banners.
static BENIGN_LINE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)deprecat",
        r"(?i)\bFutureWarning\b",
        r"(?i)^\s*warnings\.warn\(",
        r"(?i)TOKENIZERS_PARALLELISM",
        r"(?i)huggingface/tokenizers",
        r"(?i)\bOMP_NUM_THREADS\b|\bOpenMP\b|\bomp\b.*thread",
        r"(?i)\b(intra|inter)[- ]op parallelism\b",
        r"(?i)\busing \d+ threads?\b",
        r"(?i)\bnum_threads\b",
        r"(?i)\boneDNN\b|\bMKL(DNN)?\b|\bNNPACK\b",
        r"(?i)\bcu(da|dnn|blas)\b.*(not found|could not load|unavailable|falling back)",
        r"(?i)tensorflow binary is optimized",
        r"(?i)\bxformers\b|\btriton\b",
        r"(?i)^\s*\[W [A-Za-z]+\.cpp:\d+\]",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static UNSAFE_TITLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).unwrap());

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name, never the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns true if a single output line is known-benign noise.
pub fn is_benign_line(line: &str) -> bool {
    BENIGN_LINE_PATTERNS.iter().any(|re| re.is_match(line))
}

/// Builds the user-visible tail of a failed process's output.
///
/// Keeps the last `max_lines` meaningful lines. If filtering removed
/// everything, the last non-empty raw line is kept: it may be the only
/// diagnostic the process produced.
pub fn failure_tail(output: &str, max_lines: usize) -> String {
    let meaningful: Vec<&str> = output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty() && !is_benign_line(line))
        .collect();

    if meaningful.is_empty() {
        return output
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();
    }

    let start = meaningful.len().saturating_sub(max_lines);
    meaningful[start..].join("\n")
}

/// Turns a book title into a folder name safe on every platform.
///
/// Falls back to `"untitled"` when nothing usable remains.
pub fn sanitize_title(title: &str) -> String {
    let replaced = UNSAFE_TITLE_CHARS.replace_all(title.trim(), "_");
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c == ' ');

    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        "untitled".to_string()
    } else {
        trimmed.chars().take(120).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/home/user/Books/alice.pdf")),
            "alice.pdf"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_benign_lines_are_detected() {
        assert!(is_benign_line(
            "UserWarning: torch.nn.utils.weight_norm is deprecated"
        ));
        assert!(is_benign_line(
            "huggingface/tokenizers: The current process just got forked"
        ));
        assert!(is_benign_line("oneDNN custom operations are on."));
        assert!(!is_benign_line("Error: out of disk space"));
    }

    #[test]
    fn test_failure_tail_drops_benign_lines() {
        let output = "FutureWarning: something\n\nTraceback (most recent call last):\nValueError: bad input\n";
        assert_eq!(
            failure_tail(output, 6),
            "Traceback (most recent call last):\nValueError: bad input"
        );
    }

    #[test]
    fn test_failure_tail_limits_lines() {
        let output = "line one\nline two\nline three\nline four";
        assert_eq!(failure_tail(output, 2), "line three\nline four");
    }

    #[test]
    fn test_failure_tail_keeps_only_line_even_if_benign() {
        let output = "\nDeprecationWarning: the only thing we printed\n";
        assert_eq!(
            failure_tail(output, 5),
            "DeprecationWarning: the only thing we printed"
        );
    }

    #[test]
    fn test_failure_tail_empty_output() {
        assert_eq!(failure_tail("", 5), "");
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Alice"), "Alice");
        assert_eq!(sanitize_title("  War: and/Peace?  "), "War_ and_Peace_");
        assert_eq!(sanitize_title("..."), "untitled");
        assert_eq!(sanitize_title(""), "untitled");
        assert_eq!(sanitize_title("a   b"), "a b");
    }
}
