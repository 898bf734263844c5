pub mod matcher;

use crate::config::{DEFAULT_CONFIG_FILENAME, RunConfiguration};
use crate::error::{AppError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use log;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub use matcher::{GitignoreMatcher, GlobMatcher, MatcherEngine, PatternMatcher, Verdict};

pub const IGNORE_FILENAME: &str = ".gitignore";
pub const GIT_DIR_NAME: &str = ".git";

/// The ignore files that apply inside one directory, outermost first.
#[derive(Debug, Default)]
pub struct IgnoreScope {
    matchers: Vec<Rc<dyn PatternMatcher>>,
}

impl IgnoreScope {
    /// The deepest rule set with an opinion decides.
    fn verdict(&self, path: &Path, is_dir: bool) -> Verdict {
        self.matchers
            .iter()
            .rev()
            .map(|m| m.verdict(path, is_dir))
            .find(|v| *v != Verdict::NoMatch)
            .unwrap_or(Verdict::NoMatch)
    }
}

/// Decides whether a walked path is excluded, discovering `.gitignore` files lazily.
#[derive(Debug)]
pub struct IgnoreResolver {
    root: PathBuf,
    output_path: PathBuf,
    config_path: PathBuf,
    engine: MatcherEngine,
    use_gitignore: bool,
    include_ignore_files: bool,
    extra: Option<Rc<dyn PatternMatcher>>,
    scopes: HashMap<PathBuf, Rc<IgnoreScope>>,
    degraded: bool,
    ignored: usize,
}

impl IgnoreResolver {
    pub fn new(run: &RunConfiguration) -> Result<Self> {
        let mut resolver = Self {
            root: run.repo_root.clone(),
            output_path: run.output_path.clone(),
            config_path: run.repo_root.join(DEFAULT_CONFIG_FILENAME),
            engine: run.matcher,
            use_gitignore: run.use_gitignore,
            include_ignore_files: run.include_ignore_files,
            extra: None,
            scopes: HashMap::new(),
            degraded: false,
            ignored: 0,
        };

        if !run.ignore_patterns.is_empty() {
            log::debug!(
                "Compiling {} extra ignore pattern(s) with the {} engine",
                run.ignore_patterns.len(),
                resolver.engine
            );
            let root = resolver.root.clone();
            let extra = resolver
                .compile_with_fallback(&root, None, &run.ignore_patterns)?
                .ok_or_else(|| {
                    AppError::Glob("Extra ignore patterns could not be compiled".to_string())
                })?;
            resolver.extra = Some(extra);
        }

        log::debug!(
            "Ignore resolver ready (gitignore: {}, engine: {})",
            resolver.use_gitignore,
            resolver.engine
        );
        Ok(resolver)
    }

    /// Number of paths excluded by ignore rules so far.
    pub fn ignored_count(&self) -> usize {
        self.ignored
    }

    /// True once any rule set had to fall back to the glob engine.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn is_ignored(&mut self, path: &Path, is_dir: bool) -> bool {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        if is_dir && file_name == GIT_DIR_NAME {
            log::trace!("Pruning git directory: {}", path.display());
            return true;
        }
        if !is_dir && path == self.output_path {
            log::debug!("Skipping the output artifact itself: {}", path.display());
            return true;
        }
        if !is_dir && self.use_gitignore && !self.include_ignore_files && file_name == IGNORE_FILENAME
        {
            log::trace!("Skipping rule file: {}", path.display());
            return true;
        }
        if !is_dir && !self.include_ignore_files && path == self.config_path {
            log::trace!("Skipping the dump configuration: {}", path.display());
            return true;
        }

        if let Some(extra) = self.extra.clone() {
            match extra.verdict(path, is_dir) {
                Verdict::Ignore => return self.record_ignore(path, extra.origin()),
                Verdict::Whitelist => return false,
                Verdict::NoMatch => {}
            }
        }

        if self.use_gitignore {
            let parent = path.parent().unwrap_or(&self.root).to_path_buf();
            let scope = self.scope_for(&parent);
            match scope.verdict(path, is_dir) {
                Verdict::Ignore => {
                    let origin = scope
                        .matchers
                        .iter()
                        .rev()
                        .find(|m| m.verdict(path, is_dir) == Verdict::Ignore)
                        .map(|m| m.origin())
                        .unwrap_or_default();
                    return self.record_ignore(path, origin);
                }
                Verdict::Whitelist | Verdict::NoMatch => {}
            }
        }

        false
    }

    fn record_ignore(&mut self, path: &Path, origin: String) -> bool {
        self.ignored += 1;
        log::info!(
            "Ignored: {} (rule from {})",
            pathdiff::diff_paths(path, &self.root)
                .unwrap_or_else(|| path.to_path_buf())
                .display(),
            origin
        );
        true
    }

    /// Rules in effect for entries directly inside `dir`.
    pub fn scope_for(&mut self, dir: &Path) -> Rc<IgnoreScope> {
        if let Some(scope) = self.scopes.get(dir) {
            return Rc::clone(scope);
        }

        let mut matchers = if dir == self.root {
            Vec::new()
        } else {
            match dir.parent() {
                Some(parent) if dir.starts_with(&self.root) => {
                    self.scope_for(parent).matchers.clone()
                }
                _ => return Rc::new(IgnoreScope::default()),
            }
        };

        if let Some(own) = self.load_ignore_file(dir) {
            matchers.push(own);
        }

        let scope = Rc::new(IgnoreScope { matchers });
        self.scopes.insert(dir.to_path_buf(), Rc::clone(&scope));
        scope
    }

    fn load_ignore_file(&mut self, dir: &Path) -> Option<Rc<dyn PatternMatcher>> {
        let ignore_path = dir.join(IGNORE_FILENAME);
        let content = match fs::read_to_string(&ignore_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Could not read {}: {}", ignore_path.display(), e);
                return None;
            }
        };
        let lines: Vec<String> = content.lines().map(String::from).collect();
        log::debug!(
            "Loaded {} line(s) from {}",
            lines.len(),
            ignore_path.display()
        );

        match self.compile_with_fallback(dir, Some(&ignore_path), &lines) {
            Ok(matcher) => matcher,
            Err(e) => {
                log::warn!("Ignoring unusable rule file {}: {}", ignore_path.display(), e);
                None
            }
        }
    }

    /// Compiles with the configured engine; a gitignore failure degrades to the glob engine.
    fn compile_with_fallback(
        &mut self,
        base: &Path,
        origin: Option<&Path>,
        lines: &[String],
    ) -> Result<Option<Rc<dyn PatternMatcher>>> {
        if lines.iter().all(|l| l.trim().is_empty()) {
            return Ok(None);
        }

        match matcher::compile(self.engine, base, origin, lines) {
            Ok(m) => Ok(Some(Rc::from(m))),
            Err(e) if self.engine == MatcherEngine::Gitignore => {
                let fallback: Rc<dyn PatternMatcher> =
                    Rc::from(matcher::compile(MatcherEngine::Glob, base, origin, lines)?);
                if !self.degraded {
                    log::warn!(
                        "The {} engine rejected rules in {} ({}); using {} matching without negation for such rule sets",
                        self.engine,
                        fallback.origin(),
                        e,
                        fallback.engine()
                    );
                    self.degraded = true;
                } else {
                    log::debug!(
                        "The {} engine rejected rules in {}: {}",
                        self.engine,
                        fallback.origin(),
                        e
                    );
                }
                Ok(Some(fallback))
            }
            Err(e) => Err(e),
        }
    }
}

/// Restricts output to files matching at least one include pattern, when any are given.
#[derive(Debug)]
pub struct IncludeFilter {
    set: GlobSet,
    active: bool,
}

impl IncludeFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        Ok(Self {
            set: build_glob_set_from_vec(patterns)?,
            active: !patterns.is_empty(),
        })
    }

    /// `relative_path` uses forward slashes.
    pub fn matches(&self, relative_path: &str) -> bool {
        !self.active || self.set.is_match(relative_path)
    }
}

fn build_glob_set_from_vec(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern_str in patterns {
        let mut processed_pattern = pattern_str.trim().to_string();
        if processed_pattern.ends_with('/') && processed_pattern.len() > 1 {
            processed_pattern.push_str("**");
        }
        match Glob::new(&processed_pattern) {
            Ok(glob) => {
                log::trace!(
                    "Adding include pattern: {} (processed as {})",
                    pattern_str,
                    processed_pattern
                );
                builder.add(glob);
            }
            Err(e) => {
                log::error!("Invalid glob pattern \"{}\": {}", pattern_str, e);
                return Err(AppError::Glob(format!(
                    "Invalid glob pattern \"{}\" (processed as \"{}\"): {}",
                    pattern_str, processed_pattern, e
                )));
            }
        }
    }
    builder.build().map_err(|e| {
        log::error!("Error building glob set: {}", e);
        AppError::Glob(e.to_string())
    })
}
