use crate::error::{AppError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which implementation of [`PatternMatcher`] compiles ignore rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatcherEngine {
    /// Full gitignore semantics: negation, anchoring, directory-only rules.
    #[default]
    Gitignore,
    /// Plain glob matching; negated rules are dropped.
    Glob,
}

impl fmt::Display for MatcherEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatcherEngine::Gitignore => write!(f, "gitignore"),
            MatcherEngine::Glob => write!(f, "glob"),
        }
    }
}

impl FromStr for MatcherEngine {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gitignore" => Ok(MatcherEngine::Gitignore),
            "glob" => Ok(MatcherEngine::Glob),
            other => Err(AppError::InvalidArgument(format!(
                "Unknown matcher engine '{}'. Use 'gitignore' or 'glob'.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ignore,
    /// A negated rule re-included the path.
    Whitelist,
    NoMatch,
}

/// One compiled rule set, scoped to the directory it was declared in.
pub trait PatternMatcher: fmt::Debug {
    /// `path` is absolute; paths outside the matcher's base never match.
    fn verdict(&self, path: &Path, is_dir: bool) -> Verdict;

    fn engine(&self) -> MatcherEngine;

    /// Where the rules came from, for log messages.
    fn origin(&self) -> String;
}

/// Compiles rule lines with the requested engine.
pub fn compile(
    engine: MatcherEngine,
    base: &Path,
    origin: Option<&Path>,
    lines: &[String],
) -> Result<Box<dyn PatternMatcher>> {
    match engine {
        MatcherEngine::Gitignore => Ok(Box::new(GitignoreMatcher::build(base, origin, lines)?)),
        MatcherEngine::Glob => Ok(Box::new(GlobMatcher::build(base, origin, lines)?)),
    }
}

#[derive(Debug)]
pub struct GitignoreMatcher {
    inner: Gitignore,
    origin: String,
}

impl GitignoreMatcher {
    pub fn build(base: &Path, origin: Option<&Path>, lines: &[String]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(base);
        for line in lines {
            builder.add_line(origin.map(Path::to_path_buf), line)?;
        }
        let inner = builder.build()?;
        log::trace!(
            "Compiled {} gitignore rules from {}",
            inner.num_ignores() + inner.num_whitelists(),
            describe_origin(base, origin)
        );
        Ok(Self {
            inner,
            origin: describe_origin(base, origin),
        })
    }
}

impl PatternMatcher for GitignoreMatcher {
    fn verdict(&self, path: &Path, is_dir: bool) -> Verdict {
        if !path.starts_with(self.inner.path()) {
            return Verdict::NoMatch;
        }
        let matched = self.inner.matched(path, is_dir);
        if matched.is_ignore() {
            Verdict::Ignore
        } else if matched.is_whitelist() {
            Verdict::Whitelist
        } else {
            Verdict::NoMatch
        }
    }

    fn engine(&self) -> MatcherEngine {
        MatcherEngine::Gitignore
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }
}

#[derive(Debug)]
pub struct GlobMatcher {
    base: PathBuf,
    any: GlobSet,
    dirs_only: GlobSet,
    origin: String,
}

impl GlobMatcher {
    pub fn build(base: &Path, origin: Option<&Path>, lines: &[String]) -> Result<Self> {
        let mut any = GlobSetBuilder::new();
        let mut dirs_only = GlobSetBuilder::new();
        let mut dropped = 0usize;
        let mut rejected = 0usize;

        for raw in lines {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('!') {
                dropped += 1;
                continue;
            }

            let dir_only = line.ends_with('/');
            let body = line.trim_end_matches('/');
            let anchored = body.starts_with('/') || body.contains('/');
            let body = body.trim_start_matches('/');
            if body.is_empty() {
                continue;
            }
            let pattern = if anchored {
                body.to_string()
            } else {
                format!("**/{}", body)
            };

            let glob = match GlobBuilder::new(&pattern).literal_separator(true).build() {
                Ok(glob) => glob,
                Err(e) => {
                    log::debug!(
                        "Skipping invalid ignore pattern \"{}\" in {}: {}",
                        raw,
                        describe_origin(base, origin),
                        e
                    );
                    rejected += 1;
                    continue;
                }
            };
            if dir_only {
                dirs_only.add(glob);
            } else {
                any.add(glob);
            }
        }

        if dropped > 0 {
            log::debug!(
                "Glob matcher dropped {} negated rule(s) from {}",
                dropped,
                describe_origin(base, origin)
            );
        }
        if rejected > 0 {
            log::debug!(
                "Glob matcher skipped {} unparsable rule(s) from {}",
                rejected,
                describe_origin(base, origin)
            );
        }

        Ok(Self {
            base: base.to_path_buf(),
            any: any.build()?,
            dirs_only: dirs_only.build()?,
            origin: describe_origin(base, origin),
        })
    }
}

impl PatternMatcher for GlobMatcher {
    fn verdict(&self, path: &Path, is_dir: bool) -> Verdict {
        let relative = match path.strip_prefix(&self.base) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => return Verdict::NoMatch,
        };
        if self.any.is_match(relative) || (is_dir && self.dirs_only.is_match(relative)) {
            Verdict::Ignore
        } else {
            Verdict::NoMatch
        }
    }

    fn engine(&self) -> MatcherEngine {
        MatcherEngine::Glob
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }
}

fn describe_origin(base: &Path, origin: Option<&Path>) -> String {
    match origin {
        Some(path) => path.display().to_string(),
        None => format!("command-line patterns at {}", base.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_engine_from_str() {
        assert_eq!("glob".parse::<MatcherEngine>().unwrap(), MatcherEngine::Glob);
        assert_eq!(
            "GITIGNORE".parse::<MatcherEngine>().unwrap(),
            MatcherEngine::Gitignore
        );
        assert!("regex".parse::<MatcherEngine>().is_err());
    }

    #[test]
    fn test_gitignore_matcher_negation_and_dir_rules() {
        let base = Path::new("/repo");
        let matcher =
            GitignoreMatcher::build(base, None, &lines(&["*.log", "!keep.log", "build/"])).unwrap();

        assert_eq!(
            matcher.verdict(Path::new("/repo/app.log"), false),
            Verdict::Ignore
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/nested/app.log"), false),
            Verdict::Ignore
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/keep.log"), false),
            Verdict::Whitelist
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/build"), true),
            Verdict::Ignore
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/build"), false),
            Verdict::NoMatch
        );
        assert_eq!(
            matcher.verdict(Path::new("/elsewhere/app.log"), false),
            Verdict::NoMatch
        );
    }

    #[test]
    fn test_glob_matcher_drops_negation() {
        let base = Path::new("/repo");
        let matcher =
            GlobMatcher::build(base, None, &lines(&["# comment", "*.log", "!keep.log", "temp/"]))
                .unwrap();

        assert_eq!(
            matcher.verdict(Path::new("/repo/sub/app.log"), false),
            Verdict::Ignore
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/keep.log"), false),
            Verdict::Ignore
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/temp"), true),
            Verdict::Ignore
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/temp"), false),
            Verdict::NoMatch
        );
        assert_eq!(matcher.engine(), MatcherEngine::Glob);
    }

    #[test]
    fn test_glob_matcher_anchored_patterns() {
        let base = Path::new("/repo");
        let matcher = GlobMatcher::build(base, None, &lines(&["/root.txt", "docs/*.md"])).unwrap();

        assert_eq!(
            matcher.verdict(Path::new("/repo/root.txt"), false),
            Verdict::Ignore
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/sub/root.txt"), false),
            Verdict::NoMatch
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/docs/intro.md"), false),
            Verdict::Ignore
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/docs/deep/intro.md"), false),
            Verdict::NoMatch
        );
    }

    #[test]
    fn test_compile_reports_requested_engine() {
        let base = Path::new("/repo");
        let compiled = compile(MatcherEngine::Gitignore, base, None, &lines(&["*.tmp"])).unwrap();
        assert_eq!(compiled.engine(), MatcherEngine::Gitignore);
        let compiled = compile(MatcherEngine::Glob, base, None, &lines(&["*.tmp"])).unwrap();
        assert_eq!(compiled.engine(), MatcherEngine::Glob);
    }

    #[test]
    fn test_glob_matcher_skips_unparsable_lines() {
        let base = Path::new("/repo");
        let matcher = GlobMatcher::build(
            base,
            None,
            &lines(&["secret.txt", "foo{a,b", "a[z-a]", "*.log"]),
        )
        .unwrap();

        assert_eq!(
            matcher.verdict(Path::new("/repo/secret.txt"), false),
            Verdict::Ignore
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/sub/app.log"), false),
            Verdict::Ignore
        );
        assert_eq!(
            matcher.verdict(Path::new("/repo/a.txt"), false),
            Verdict::NoMatch
        );
    }
}
