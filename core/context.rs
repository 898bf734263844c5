use crate::config::RunConfiguration;
use crate::content::{FileCandidate, SkipReason, TextChunks};
use crate::error::{AppError, Result};
use crate::gather;
use crate::output_formats::{Delimiters, tree_block};
use crate::rules::{IgnoreResolver, IncludeFilter};
use crate::tokens::{TokenEstimate, TokenTally, Tokenizer};
use log;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedFile {
    pub relative_path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub relative_path: String,
    pub reason: SkipReason,
    /// Zero when the size was never read.
    pub size: u64,
}

/// What a run did, for the summary and the dry-run listing.
#[derive(Debug, Clone, Default)]
pub struct DumpReport {
    pub repo_root: PathBuf,
    pub output_path: PathBuf,
    pub dry_run: bool,
    /// In emission order.
    pub included: Vec<IncludedFile>,
    pub skipped: Vec<SkippedFile>,
    pub ignored: usize,
    pub not_included: usize,
    pub total_bytes: u64,
    pub bytes_written: u64,
    pub tokens: Option<TokenEstimate>,
    pub tree: Option<String>,
    pub matcher_degraded: bool,
}

impl DumpReport {
    fn new(run: &RunConfiguration) -> Self {
        Self {
            repo_root: run.repo_root.clone(),
            output_path: run.output_path.clone(),
            dry_run: run.dry_run,
            ..Self::default()
        }
    }

    pub fn skipped_by_reason(&self) -> BTreeMap<SkipReason, usize> {
        let mut counts = BTreeMap::new();
        for file in &self.skipped {
            *counts.entry(file.reason).or_insert(0) += 1;
        }
        counts
    }

    fn record_included(&mut self, candidate: &FileCandidate) {
        self.total_bytes += candidate.size;
        self.included.push(IncludedFile {
            relative_path: candidate.relative_path.clone(),
            size: candidate.size,
        });
    }

    fn record_skipped(&mut self, candidate: FileCandidate, reason: SkipReason) {
        self.skipped.push(SkippedFile {
            relative_path: candidate.relative_path,
            reason,
            size: candidate.size,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeStats {
    pub bytes_written: u64,
    pub tokens: Option<TokenEstimate>,
}

/// Walks, classifies, verifies and writes the dump described by `run`.
pub fn run_dump(run: &RunConfiguration) -> Result<DumpReport> {
    log::debug!("Starting dump of {}", run.repo_root.display());
    let mut resolver = IgnoreResolver::new(run)?;
    let include = IncludeFilter::new(&run.include_patterns)?;
    let walked = gather::walk_repository(&run.repo_root, &mut resolver, &include)?;

    let mut report = DumpReport::new(run);
    report.ignored = walked.ignored;
    report.not_included = walked.not_included;
    report.matcher_degraded = resolver.is_degraded();

    for candidate in walked.skipped {
        if let Some(reason) = candidate.skip_reason() {
            report.record_skipped(candidate, reason);
        }
    }

    let mut accepted = Vec::with_capacity(walked.files.len());
    for file in walked.files {
        let mut candidate =
            FileCandidate::classify(file.relative_path, file.absolute_path, run.max_file_size);
        candidate.verify_text();
        match candidate.skip_reason() {
            None => {
                log::info!(
                    "Including: {} ({} bytes)",
                    candidate.relative_path,
                    candidate.size
                );
                report.record_included(&candidate);
                accepted.push(candidate);
            }
            Some(reason) => {
                log_skip(&candidate, reason, run.max_file_size);
                report.record_skipped(candidate, reason);
            }
        }
    }
    log::debug!(
        "{} file(s) accepted, {} skipped",
        accepted.len(),
        report.skipped.len()
    );

    if run.include_tree {
        let paths: Vec<String> = accepted.iter().map(|c| c.relative_path.clone()).collect();
        report.tree = Some(gather::render_tree(&root_name(&run.repo_root), &paths));
    }

    let tokenizer = run.count_tokens.then_some(run.tokenizer);
    let stats = if run.dry_run {
        log::info!("Dry run: nothing will be written to {}", run.output_path.display());
        compose(
            &mut io::sink(),
            report.tree.as_deref(),
            &accepted,
            &run.delimiters,
            tokenizer,
            &run.output_path,
        )?
    } else {
        let mut writer = create_output(&run.output_path)?;
        let stats = compose(
            &mut writer,
            report.tree.as_deref(),
            &accepted,
            &run.delimiters,
            tokenizer,
            &run.output_path,
        )?;
        writer.flush().map_err(|e| AppError::OutputWrite {
            path: run.output_path.clone(),
            source: e,
        })?;
        log::info!(
            "Wrote {} bytes to {}",
            stats.bytes_written,
            run.output_path.display()
        );
        stats
    };

    report.bytes_written = stats.bytes_written;
    report.tokens = stats.tokens;
    Ok(report)
}

fn log_skip(candidate: &FileCandidate, reason: SkipReason, max_file_size: u64) {
    match reason {
        SkipReason::Oversized => log::warn!(
            "Skipping {} - exceeds max size ({} > {})",
            candidate.relative_path,
            candidate.size,
            max_file_size
        ),
        other => log::warn!("Skipping {} - {}", candidate.relative_path, other),
    }
}

fn root_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    let to_output_error = |e: io::Error| AppError::OutputWrite {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(to_output_error)?;
    }
    let file = File::create(path).map_err(to_output_error)?;
    Ok(BufWriter::new(file))
}

/// Counts what passes through and feeds the optional token tally.
struct Emitter<'w, W: Write> {
    writer: &'w mut W,
    bytes: u64,
    tally: Option<TokenTally>,
    output_path: &'w Path,
}

impl<W: Write> Emitter<'_, W> {
    fn emit(&mut self, text: &str) -> Result<()> {
        self.writer
            .write_all(text.as_bytes())
            .map_err(|e| AppError::OutputWrite {
                path: self.output_path.to_path_buf(),
                source: e,
            })?;
        self.bytes += text.len() as u64;
        if let Some(tally) = self.tally.as_mut() {
            tally.feed(text);
        }
        Ok(())
    }
}

/// Writes the tree block and every file block, streaming each file from disk.
///
/// Files are expected to be verified already; a read or decode failure here is
/// fatal since part of the document has been written.
pub fn compose<W: Write>(
    writer: &mut W,
    tree: Option<&str>,
    files: &[FileCandidate],
    delimiters: &Delimiters,
    tokenizer: Option<Tokenizer>,
    output_path: &Path,
) -> Result<ComposeStats> {
    let mut emitter = Emitter {
        writer,
        bytes: 0,
        tally: tokenizer.map(TokenTally::new),
        output_path,
    };

    if let Some(tree) = tree {
        emitter.emit(&tree_block(tree))?;
    }

    for file in files {
        emitter.emit(&delimiters.start_for(&file.relative_path))?;
        emitter.emit("\n")?;

        let mut last_char = None;
        for chunk in TextChunks::open(&file.absolute_path)? {
            let chunk = chunk?;
            if let Some(c) = chunk.chars().next_back() {
                last_char = Some(c);
            }
            emitter.emit(&chunk)?;
        }
        if last_char.is_some_and(|c| c != '\n') {
            emitter.emit("\n")?;
        }

        emitter.emit(&delimiters.end_for(&file.relative_path))?;
        emitter.emit("\n")?;
        log::trace!("Emitted {}", file.relative_path);
    }

    Ok(ComposeStats {
        bytes_written: emitter.bytes,
        tokens: emitter.tally.map(TokenTally::finish),
    })
}
