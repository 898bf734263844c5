pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod gather;
pub mod output_formats;
pub mod rules;
pub mod tokens;

pub use config::{Config, RunConfiguration, RunFlags};
pub use content::{FileCandidate, SkipReason, TextChunks};
pub use context::{ComposeStats, DumpReport, IncludedFile, SkippedFile, compose, run_dump};
pub use error::{AppError, Result};
pub use gather::{TreeNode, WalkOutcome, build_tree_from_paths, render_tree, walk_repository};
pub use output_formats::Delimiters;
pub use rules::{IgnoreResolver, IncludeFilter, MatcherEngine, PatternMatcher};
pub use tokens::{TokenEstimate, TokenTally, Tokenizer};
