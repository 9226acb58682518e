//! Gitignore-style ignore matcher.
//!
//! Supports the commonly used subset of gitignore syntax: comments, `!`
//! negation (last matching rule wins), trailing `/` for directory-only rules,
//! patterns anchored by an inner or leading `/`, and the `*`, `?` and `**`
//! wildcards. A path below an ignored directory is ignored regardless of
//! later negations, as in git.

use code_index_ports::{IgnoreMatchInput, IgnorePort};
use code_index_shared::{ErrorEnvelope, Result};
use std::path::Path;

/// Ignore files read from the workspace root, in precedence order.
pub const IGNORE_FILE_NAMES: &[&str] = &[".gitignore", ".contextignore"];

/// Compiled ignore rules.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    rules: Vec<IgnoreRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IgnoreRule {
    negated: bool,
    dir_only: bool,
    anchored: bool,
    segments: Vec<Box<str>>,
}

impl IgnoreMatcher {
    /// Compile patterns; later patterns take precedence.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            rules: patterns
                .into_iter()
                .filter_map(|pattern| parse_rule(pattern.as_ref()))
                .collect(),
        }
    }

    /// Load `.gitignore` and `.contextignore` from `root`, then append
    /// `extra_patterns`. Missing files are skipped.
    pub async fn load(root: &Path, extra_patterns: &[Box<str>]) -> Result<Self> {
        let mut patterns: Vec<String> = Vec::new();
        for name in IGNORE_FILE_NAMES {
            match tokio::fs::read_to_string(root.join(name)).await {
                Ok(text) => patterns.extend(text.lines().map(str::to_owned)),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {},
                Err(error) => {
                    return Err(ErrorEnvelope::from(error).with_metadata("file", *name));
                },
            }
        }
        patterns.extend(extra_patterns.iter().map(ToString::to_string));
        Ok(Self::new(patterns))
    }

    /// Number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn decide(&self, segments: &[&str], is_dir: bool) -> Option<bool> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(segments, is_dir))
            .map(|rule| !rule.negated)
    }
}

impl IgnorePort for IgnoreMatcher {
    fn is_ignored(&self, input: IgnoreMatchInput<'_>) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let normalized = input.relative_path.replace('\\', "/");
        let segments: Vec<&str> = normalized
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();
        if segments.is_empty() {
            return false;
        }
        for depth in 1..segments.len() {
            if let Some(parent) = segments.get(..depth)
                && self.decide(parent, true) == Some(true)
            {
                return true;
            }
        }
        self.decide(&segments, input.is_dir) == Some(true)
    }
}

impl IgnoreRule {
    fn matches(&self, path: &[&str], is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.anchored {
            let pattern: Vec<&str> = self.segments.iter().map(AsRef::as_ref).collect();
            return match_segments(&pattern, path);
        }
        match (self.segments.first(), path.last()) {
            (Some(pattern), Some(name)) => match_glob(pattern, name),
            _ => false,
        }
    }
}

fn parse_rule(line: &str) -> Option<IgnoreRule> {
    let line = line.trim_end();
    if line.trim().is_empty() || line.starts_with('#') {
        return None;
    }
    let (negated, body) = line
        .strip_prefix('!')
        .map_or((false, line), |rest| (true, rest));
    let body = body.strip_prefix('\\').unwrap_or(body).trim_start();
    let body = body.replace('\\', "/");
    let dir_only = body.ends_with('/');
    let trimmed = body.trim_end_matches('/');
    let anchored = trimmed.contains('/');
    let segments: Vec<Box<str>> = trimmed
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(Box::from)
        .collect();
    if segments.is_empty() {
        return None;
    }
    Some(IgnoreRule {
        negated,
        dir_only,
        anchored,
        segments,
    })
}

/// Segment-wise match where `**` spans zero or more segments.
fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => (0..=path.len())
            .any(|skip| path.get(skip..).is_some_and(|tail| match_segments(rest, tail))),
        Some((head, rest)) => match path.split_first() {
            Some((segment, path_rest)) => {
                match_glob(head, segment) && match_segments(rest, path_rest)
            },
            None => false,
        },
    }
}

/// Single-segment glob with `*` and `?`.
fn match_glob(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            },
            Some(&ch) if ch == '?' || Some(&ch) == text.get(t) => {
                p += 1;
                t += 1;
            },
            _ => match backtrack {
                Some((star, consumed)) => {
                    p = star + 1;
                    t = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                },
                None => return false,
            },
        }
    }
    pattern.get(p..).is_some_and(|rest| rest.iter().all(|ch| *ch == '*'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignored(matcher: &IgnoreMatcher, path: &str, is_dir: bool) -> bool {
        matcher.is_ignored(IgnoreMatchInput {
            relative_path: path,
            is_dir,
        })
    }

    #[test]
    fn unanchored_patterns_match_at_any_depth() {
        let matcher = IgnoreMatcher::new(["*.log", "build/"]);
        assert!(ignored(&matcher, "debug.log", false));
        assert!(ignored(&matcher, "a/b/trace.log", false));
        assert!(ignored(&matcher, "pkg/build", true));
        assert!(ignored(&matcher, "pkg/build/out.rs", false));
        assert!(!ignored(&matcher, "src/build.rs", false));
    }

    #[test]
    fn anchored_patterns_match_from_root_only() {
        let matcher = IgnoreMatcher::new(["/generated", "docs/*.md"]);
        assert!(ignored(&matcher, "generated/api.rs", false));
        assert!(!ignored(&matcher, "src/generated/api.rs", false));
        assert!(ignored(&matcher, "docs/intro.md", false));
        assert!(!ignored(&matcher, "docs/deep/intro.md", false));
    }

    #[test]
    fn double_star_spans_directories() {
        let matcher = IgnoreMatcher::new(["**/fixtures/**/*.json", "vendor/**"]);
        assert!(ignored(&matcher, "fixtures/a.json", false));
        assert!(ignored(&matcher, "crates/x/fixtures/deep/b.json", false));
        assert!(!ignored(&matcher, "crates/x/fixtures/deep/b.rs", false));
        assert!(ignored(&matcher, "vendor/lib/mod.rs", false));
    }

    #[test]
    fn negation_reincludes_files_but_not_below_ignored_dirs() {
        let matcher = IgnoreMatcher::new(["*.rs", "!keep.rs", "out/", "!out/main.rs"]);
        assert!(ignored(&matcher, "src/lib.rs", false));
        assert!(!ignored(&matcher, "src/keep.rs", false));
        assert!(ignored(&matcher, "out/main.rs", false));
    }

    #[test]
    fn comments_blanks_and_windows_separators() {
        let matcher = IgnoreMatcher::new(["# comment", "", "   ", "target\\"]);
        assert_eq!(matcher.rule_count(), 1);
        assert!(ignored(&matcher, "target\\debug\\app", false));
    }

    #[test]
    fn glob_wildcards() {
        assert!(match_glob("*.rs", "main.rs"));
        assert!(match_glob("ma?n.*", "main.rs"));
        assert!(match_glob("*", ""));
        assert!(!match_glob("*.rs", "main.rsx"));
        assert!(match_glob("a*b*c", "axxbyyc"));
    }

    #[tokio::test]
    async fn load_reads_both_ignore_files_and_extras() -> Result<()> {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos());
        let root =
            std::env::temp_dir().join(format!("cidx-ignore-{}-{nanos}", std::process::id()));
        tokio::fs::create_dir_all(&root).await?;
        tokio::fs::write(root.join(".gitignore"), "dist/\n").await?;
        tokio::fs::write(root.join(".contextignore"), "*.snap\n").await?;

        let matcher = IgnoreMatcher::load(&root, &["secrets/".into()]).await?;
        assert_eq!(matcher.rule_count(), 3);
        assert!(ignored(&matcher, "dist/app.js", false));
        assert!(ignored(&matcher, "tests/ui.snap", false));
        assert!(ignored(&matcher, "secrets", true));

        tokio::fs::remove_dir_all(&root).await?;
        Ok(())
    }
}
