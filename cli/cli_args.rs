use clap::{Args, Parser};
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigFileOpts {
    #[arg(
        long,
        help = "Path of the TOML config file (default: <REPO_PATH>/.git-dump.toml).",
        value_name = "FILE",
        conflicts_with = "no_config",
        help_heading = "Configuration"
    )]
    pub config: Option<String>,

    #[arg(
        long,
        help = "Do not load any TOML config file.",
        conflicts_with = "config",
        help_heading = "Configuration"
    )]
    pub no_config: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterOpts {
    #[arg(
        long,
        help = "Do not honor .gitignore files.",
        help_heading = "Filtering"
    )]
    pub no_gitignore: bool,

    #[arg(
        short = 'i',
        long = "ignore",
        help = "Additional ignore pattern (gitignore syntax). Repeatable.",
        value_name = "PATTERN",
        action = clap::ArgAction::Append,
        help_heading = "Filtering"
    )]
    pub ignore: Vec<String>,

    #[arg(
        long = "include",
        help = "Only dump files matching this glob. Repeatable.",
        value_name = "PATTERN",
        action = clap::ArgAction::Append,
        help_heading = "Filtering"
    )]
    pub include: Vec<String>,

    #[arg(
        long,
        help = "Dump .gitignore files and .git-dump.toml as content too.",
        help_heading = "Filtering"
    )]
    pub include_ignore_files: bool,

    #[arg(long, help = "Engine used for ignore patterns.", value_name = "ENGINE", value_parser = ["gitignore", "glob"], help_heading = "Filtering")]
    pub matcher: Option<String>,

    #[arg(
        long,
        help = "Skip files larger than this many bytes [default: 512000].",
        value_name = "BYTES",
        help_heading = "Filtering"
    )]
    pub max_size: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct OutputOpts {
    #[arg(
        short = 'o',
        long,
        help = "Output file [default: repository_contents.txt].",
        value_name = "FILE",
        help_heading = "Output"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        help = "Line written before each file; {path} is replaced by its relative path.",
        value_name = "TEMPLATE",
        help_heading = "Output"
    )]
    pub start_delimiter: Option<String>,

    #[arg(
        long,
        help = "Line written after each file; {path} is replaced by its relative path.",
        value_name = "TEMPLATE",
        help_heading = "Output"
    )]
    pub end_delimiter: Option<String>,

    #[arg(
        long,
        help = "Leave out the repository structure block.",
        help_heading = "Output"
    )]
    pub no_tree: bool,

    #[arg(
        long,
        help = "Estimate the token count of the output.",
        help_heading = "Output"
    )]
    pub count_tokens: bool,

    #[arg(long, help = "Tokenizer used by --count-tokens.", value_name = "TOKENIZER", value_parser = ["cl100k", "chars"], help_heading = "Output")]
    pub tokenizer: Option<String>,

    #[arg(
        long,
        help = "Show what would be dumped without writing the output file.",
        help_heading = "Output"
    )]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Dump the text files of a repository into a single document.",
    long_about = "git-dump walks a repository, honors .gitignore files and extra patterns, skips \nbinary and oversized files, and concatenates the rest between delimiters, \noptionally preceded by a directory tree. Useful as context for language models.",
    help_template = "{about-section}\nUsage: {usage}\n\n{all-args}{after-help}",
    after_help = "EXAMPLES:\n  git-dump .\n  git-dump ~/src/project -o project.txt --include '*.rs' --count-tokens\n  git-dump . -i 'docs/' --no-tree --dry-run"
)]
pub struct Cli {
    #[arg(help = "Repository directory to dump.", value_name = "REPO_PATH")]
    pub repo_path: PathBuf,

    #[clap(flatten)]
    pub output: OutputOpts,

    #[clap(flatten)]
    pub filters: FilterOpts,

    #[clap(flatten)]
    pub config_file: ConfigFileOpts,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase message verbosity (-v, -vv, -vvv).")]
    pub verbose: u8,

    #[arg(
        short,
        long,
        help = "Silence informational messages, warnings and the summary."
    )]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repeatable_patterns_and_flags() {
        let cli = Cli::try_parse_from([
            "git-dump",
            "repo",
            "-i",
            "*.log",
            "--ignore",
            "tmp/",
            "--include",
            "*.py",
            "--no-tree",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.repo_path, PathBuf::from("repo"));
        assert_eq!(cli.filters.ignore, vec!["*.log", "tmp/"]);
        assert_eq!(cli.filters.include, vec!["*.py"]);
        assert!(cli.output.no_tree);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_rejects_unknown_tokenizer_and_conflicting_config_flags() {
        assert!(Cli::try_parse_from(["git-dump", ".", "--tokenizer", "gpt2"]).is_err());
        assert!(
            Cli::try_parse_from(["git-dump", ".", "--config", "a.toml", "--no-config"]).is_err()
        );
        assert!(Cli::try_parse_from(["git-dump"]).is_err());
    }
}
