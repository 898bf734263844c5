use crate::error::{AppError, Result};
use crate::output_formats::Delimiters;
use crate::rules::MatcherEngine;
use crate::tokens::Tokenizer;
use globset::Glob;
use log;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILENAME: &str = ".git-dump.toml";
pub const DEFAULT_OUTPUT_FILENAME: &str = "repository_contents.txt";
pub const DEFAULT_START_DELIMITER: &str = "--- FILE: {path} ---";
pub const DEFAULT_END_DELIMITER: &str = "--- END FILE ---";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 512_000;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    #[serde(default = "default_true")]
    pub use_gitignore: bool,
    #[serde(default)]
    pub include_ignore_files: bool,
    #[serde(default)]
    pub matcher: MatcherEngine,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct FiltersConfig {
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Relative paths resolve against the repository root.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_start_delimiter")]
    pub start_delimiter: String,
    #[serde(default = "default_end_delimiter")]
    pub end_delimiter: String,
    #[serde(default = "default_true")]
    pub tree: bool,
    #[serde(default)]
    pub count_tokens: bool,
    #[serde(default)]
    pub tokenizer: Tokenizer,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_true() -> bool {
    true
}
fn default_start_delimiter() -> String {
    DEFAULT_START_DELIMITER.to_string()
}
fn default_end_delimiter() -> String {
    DEFAULT_END_DELIMITER.to_string()
}
fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            use_gitignore: default_true(),
            include_ignore_files: false,
            matcher: MatcherEngine::default(),
        }
    }
}
impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            start_delimiter: default_start_delimiter(),
            end_delimiter: default_end_delimiter(),
            tree: default_true(),
            count_tokens: false,
            tokenizer: Tokenizer::default(),
        }
    }
}
impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

impl Config {
    /// Validates and canonicalizes the repository path given on the command line.
    pub fn determine_repo_root(cli_repo_path: &Path) -> Result<PathBuf> {
        let expanded = shellexpand::tilde(&cli_repo_path.to_string_lossy()).into_owned();
        let path_to_resolve = PathBuf::from(expanded);

        if !path_to_resolve.exists() {
            return Err(AppError::InvalidRepository {
                path: path_to_resolve,
                reason: "path does not exist".to_string(),
            });
        }
        if !path_to_resolve.is_dir() {
            return Err(AppError::InvalidRepository {
                path: path_to_resolve,
                reason: "path is not a directory".to_string(),
            });
        }

        path_to_resolve
            .canonicalize()
            .map_err(|e| AppError::InvalidRepository {
                path: path_to_resolve.clone(),
                reason: format!("cannot canonicalize: {}", e),
            })
    }

    pub fn resolve_config_path(
        repo_root: &Path,
        cli_config_file: Option<&String>,
        cli_disable_config: bool,
    ) -> Result<Option<PathBuf>> {
        if cli_disable_config {
            log::debug!("Config file loading disabled via CLI flag.");
            return Ok(None);
        }

        match cli_config_file {
            Some(p_str) => {
                let path = PathBuf::from(shellexpand::tilde(p_str).as_ref());
                if !path.is_file() {
                    return Err(AppError::Config(format!(
                        "Specified config file not found at path: {}",
                        path.display()
                    )));
                }
                log::debug!("Using specified config file path: {}", path.display());
                Ok(Some(path))
            }
            None => {
                let default_path = repo_root.join(DEFAULT_CONFIG_FILENAME);
                if default_path.is_file() {
                    log::debug!("Using default config file path: {}", default_path.display());
                    Ok(Some(default_path))
                } else {
                    log::debug!(
                        "No config file specified and default not found at: {}",
                        default_path.display()
                    );
                    Ok(None)
                }
            }
        }
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        log::info!("Loading configuration from: {}", config_path.display());
        let toml_content = fs::read_to_string(config_path).map_err(|e| AppError::FileRead {
            path: config_path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&toml_content).map_err(|e| match e {
            AppError::TomlParse(msg) => AppError::TomlParse(format!(
                "Error parsing config file '{}': {}",
                config_path.display(),
                msg
            )),
            other => other,
        })
    }

    pub fn from_toml_str(toml_content: &str) -> Result<Self> {
        toml::from_str::<Config>(toml_content)
            .map_err(|e| AppError::TomlParse(format!("{}. Check TOML syntax and structure.", e)))
    }
}

/// Per-invocation switches that never come from the config file.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    pub quiet: bool,
    pub dry_run: bool,
}

/// Everything one run needs, resolved once and passed by reference.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub repo_root: PathBuf,
    pub output_path: PathBuf,
    pub use_gitignore: bool,
    pub include_ignore_files: bool,
    pub matcher: MatcherEngine,
    pub ignore_patterns: Vec<String>,
    pub include_patterns: Vec<String>,
    pub delimiters: Delimiters,
    pub max_file_size: u64,
    pub include_tree: bool,
    pub count_tokens: bool,
    pub tokenizer: Tokenizer,
    pub quiet: bool,
    pub dry_run: bool,
}

impl RunConfiguration {
    /// `repo_root` must already be canonical (see [`Config::determine_repo_root`]).
    /// A relative `output.path` is taken relative to the repository root; without one the
    /// artifact lands in the current directory.
    pub fn resolve(repo_root: &Path, config: &Config, flags: RunFlags) -> Result<Self> {
        log::debug!("Resolving run configuration for {}", repo_root.display());

        if config.output.start_delimiter.is_empty() {
            return Err(AppError::InvalidArgument(
                "Start delimiter cannot be empty".to_string(),
            ));
        }
        validate_patterns("ignore", &config.filters.ignore)?;
        validate_patterns("include", &config.filters.include)?;

        let output_path = match &config.output.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => repo_root.join(p),
            None => env::current_dir()
                .map_err(AppError::Io)?
                .join(DEFAULT_OUTPUT_FILENAME),
        };
        if output_path.is_dir() {
            return Err(AppError::Config(format!(
                "Output path '{}' is a directory",
                output_path.display()
            )));
        }
        let output_path = normalize_output_path(output_path);
        log::trace!("Output artifact path: {}", output_path.display());

        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            output_path,
            use_gitignore: config.general.use_gitignore,
            include_ignore_files: config.general.include_ignore_files,
            matcher: config.general.matcher,
            ignore_patterns: config.filters.ignore.clone(),
            include_patterns: config.filters.include.clone(),
            delimiters: Delimiters::new(
                &config.output.start_delimiter,
                &config.output.end_delimiter,
            ),
            max_file_size: config.limits.max_file_size,
            include_tree: config.output.tree,
            count_tokens: config.output.count_tokens,
            tokenizer: config.output.tokenizer,
            quiet: flags.quiet,
            dry_run: flags.dry_run,
        })
    }
}

fn validate_patterns(kind: &str, patterns: &[String]) -> Result<()> {
    for pattern in patterns {
        let trimmed = pattern.trim().trim_start_matches('!');
        if trimmed.is_empty() {
            return Err(AppError::Glob(format!("Empty {} pattern", kind)));
        }
        Glob::new(trimmed.trim_end_matches('/')).map_err(|e| {
            AppError::Glob(format!("Invalid {} pattern \"{}\": {}", kind, pattern, e))
        })?;
    }
    Ok(())
}

/// Canonicalizes the parent directory when it exists so the path compares equal to walked entries.
fn normalize_output_path(path: PathBuf) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(canonical_parent) => canonical_parent.join(name),
            Err(_) => path,
        },
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert!(config.general.use_gitignore);
        assert!(!config.general.include_ignore_files);
        assert_eq!(config.general.matcher, MatcherEngine::Gitignore);
        assert_eq!(config.output.start_delimiter, "--- FILE: {path} ---");
        assert_eq!(config.output.end_delimiter, "--- END FILE ---");
        assert!(config.output.tree);
        assert!(!config.output.count_tokens);
        assert_eq!(config.limits.max_file_size, 512_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
[filters]
ignore = ["*.log"]

[limits]
max_file_size = 10
"#,
        )
        .unwrap();
        assert_eq!(config.filters.ignore, vec!["*.log".to_string()]);
        assert_eq!(config.limits.max_file_size, 10);
        assert!(config.output.tree);
        assert_eq!(config.output.end_delimiter, DEFAULT_END_DELIMITER);
    }

    #[test]
    fn test_engine_and_tokenizer_parse_from_toml() {
        let config = Config::from_toml_str(
            r#"
[general]
matcher = "glob"

[output]
tokenizer = "chars"
"#,
        )
        .unwrap();
        assert_eq!(config.general.matcher, MatcherEngine::Glob);
        assert_eq!(config.output.tokenizer, Tokenizer::CharHeuristic);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Config::from_toml_str("[output]\ncolour = true\n").unwrap_err();
        assert!(matches!(err, AppError::TomlParse(_)));
    }

    #[test]
    fn test_determine_repo_root_rejects_missing_and_files() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        assert!(matches!(
            Config::determine_repo_root(&missing),
            Err(AppError::InvalidRepository { .. })
        ));

        let file = temp.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            Config::determine_repo_root(&file),
            Err(AppError::InvalidRepository { .. })
        ));

        let root = Config::determine_repo_root(temp.path()).unwrap();
        assert!(root.is_absolute());
    }

    #[test]
    fn test_resolve_config_path_prefers_explicit_then_default() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            Config::resolve_config_path(temp.path(), None, false).unwrap(),
            None
        );

        let default_path = temp.path().join(DEFAULT_CONFIG_FILENAME);
        fs::write(&default_path, "").unwrap();
        assert_eq!(
            Config::resolve_config_path(temp.path(), None, false).unwrap(),
            Some(default_path.clone())
        );
        assert_eq!(
            Config::resolve_config_path(temp.path(), None, true).unwrap(),
            None
        );

        let missing = temp.path().join("missing.toml").to_string_lossy().to_string();
        assert!(matches!(
            Config::resolve_config_path(temp.path(), Some(&missing), false),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_resolve_rejects_bad_glob_and_empty_delimiter() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();

        let mut config = Config::default();
        config.output.path = Some(PathBuf::from("out.txt"));
        config.filters.include = vec!["src/[".to_string()];
        let err = RunConfiguration::resolve(&root, &config, RunFlags::default()).unwrap_err();
        assert!(err.is_configuration());

        let mut config = Config::default();
        config.output.path = Some(PathBuf::from("out.txt"));
        config.output.start_delimiter.clear();
        let err = RunConfiguration::resolve(&root, &config, RunFlags::default()).unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[test]
    fn test_resolve_rejects_directory_output() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir(root.join("out")).unwrap();

        let mut config = Config::default();
        config.output.path = Some(PathBuf::from("out"));
        let err = RunConfiguration::resolve(&root, &config, RunFlags::default()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_resolve_places_relative_output_under_repo_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();

        let mut config = Config::default();
        config.output.path = Some(PathBuf::from("dump.txt"));
        let run = RunConfiguration::resolve(
            &root,
            &config,
            RunFlags {
                quiet: true,
                dry_run: true,
            },
        )
        .unwrap();
        assert_eq!(run.output_path, root.join("dump.txt"));
        assert!(run.quiet);
        assert!(run.dry_run);
        assert!(run.include_tree);
    }
}
