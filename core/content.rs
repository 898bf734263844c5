use crate::error::{AppError, Result};
use content_inspector::ContentType;
use log;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Bytes inspected by the binary heuristic.
pub const PREFIX_LEN: usize = 8192;
/// Read buffer of [`TextChunks`].
pub const CHUNK_SIZE: usize = 8192;
const CONTROL_RATIO_LIMIT: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    Binary,
    Oversized,
    Unreadable,
    Decode,
    Symlink,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::Binary => "binary",
            SkipReason::Oversized => "oversized",
            SkipReason::Unreadable => "unreadable",
            SkipReason::Decode => "invalid encoding",
            SkipReason::Symlink => "symlink",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileClass {
    Text,
    Skipped(SkipReason),
}

/// A walked file on its way to the output.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    /// Forward-slash path relative to the repository root.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
    pub class: FileClass,
}

impl FileCandidate {
    /// Size gate first, then the prefix heuristic.
    pub fn classify(relative_path: String, absolute_path: PathBuf, max_file_size: u64) -> Self {
        let mut candidate = Self {
            relative_path,
            absolute_path,
            size: 0,
            class: FileClass::Text,
        };

        let metadata = match fs::metadata(&candidate.absolute_path) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::debug!(
                    "Cannot stat {}: {}",
                    candidate.absolute_path.display(),
                    e
                );
                candidate.class = FileClass::Skipped(SkipReason::Unreadable);
                return candidate;
            }
        };
        candidate.size = metadata.len();

        if candidate.size > max_file_size {
            candidate.class = FileClass::Skipped(SkipReason::Oversized);
            return candidate;
        }

        candidate.class = match read_prefix(&candidate.absolute_path) {
            Ok(prefix) if looks_binary(&prefix) => FileClass::Skipped(SkipReason::Binary),
            Ok(_) => FileClass::Text,
            Err(e) => {
                log::debug!(
                    "Cannot read {}: {}",
                    candidate.absolute_path.display(),
                    e
                );
                FileClass::Skipped(SkipReason::Unreadable)
            }
        };
        candidate
    }

    pub fn skipped(relative_path: String, absolute_path: PathBuf, reason: SkipReason) -> Self {
        Self {
            relative_path,
            absolute_path,
            size: 0,
            class: FileClass::Skipped(reason),
        }
    }

    pub fn is_text(&self) -> bool {
        self.class == FileClass::Text
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self.class {
            FileClass::Text => None,
            FileClass::Skipped(reason) => Some(reason),
        }
    }

    /// Streams the whole file once; invalid UTF-8 anywhere demotes it to a decode skip.
    pub fn verify_text(&mut self) {
        if !self.is_text() {
            return;
        }
        let chunks = match TextChunks::open(&self.absolute_path) {
            Ok(chunks) => chunks,
            Err(e) => {
                log::debug!("{}", e);
                self.class = FileClass::Skipped(SkipReason::Unreadable);
                return;
            }
        };
        for chunk in chunks {
            if let Err(e) = chunk {
                log::debug!("{}", e);
                self.class = FileClass::Skipped(match e {
                    AppError::Decode { .. } => SkipReason::Decode,
                    _ => SkipReason::Unreadable,
                });
                return;
            }
        }
    }
}

fn read_prefix(path: &Path) -> io::Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(PREFIX_LEN);
    File::open(path)?
        .take(PREFIX_LEN as u64)
        .read_to_end(&mut prefix)?;
    Ok(prefix)
}

/// Content inspection first, then NUL bytes, broken UTF-8 or too many control characters.
pub fn looks_binary(prefix: &[u8]) -> bool {
    if prefix.is_empty() {
        return false;
    }
    match content_inspector::inspect(prefix) {
        ContentType::UTF_8 | ContentType::UTF_8_BOM => {}
        // Wide encodings cannot be emitted as UTF-8 text.
        _ => return true,
    }
    if prefix.contains(&0) {
        return true;
    }
    if let Err(e) = std::str::from_utf8(prefix) {
        // A sequence cut by the prefix boundary is fine.
        if e.error_len().is_some() {
            return true;
        }
    }
    let control = prefix.iter().filter(|b| is_suspicious_control(**b)).count();
    control as f64 / prefix.len() as f64 > CONTROL_RATIO_LIMIT
}

fn is_suspicious_control(b: u8) -> bool {
    match b {
        b'\t' | b'\n' | b'\r' | 0x0c | 0x1b => false,
        0x00..=0x1f | 0x7f => true,
        _ => false,
    }
}

/// Bounded-buffer UTF-8 reader. Yields each decoded chunk once; the file closes on drop.
#[derive(Debug)]
pub struct TextChunks {
    path: PathBuf,
    file: File,
    buf: Box<[u8]>,
    carry: Vec<u8>,
    offset: u64,
    done: bool,
}

impl TextChunks {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| AppError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            buf: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            carry: Vec::new(),
            offset: 0,
            done: false,
        })
    }

    fn decode_error(&mut self, valid_up_to: usize) -> AppError {
        self.done = true;
        AppError::Decode {
            path: self.path.clone(),
            offset: self.offset + valid_up_to as u64,
        }
    }
}

impl Iterator for TextChunks {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let read = match self.file.read(&mut self.buf) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(AppError::FileRead {
                        path: self.path.clone(),
                        source: e,
                    }));
                }
            };

            if read == 0 {
                self.done = true;
                if !self.carry.is_empty() {
                    return Some(Err(self.decode_error(0)));
                }
                return None;
            }

            let mut bytes = std::mem::take(&mut self.carry);
            bytes.extend_from_slice(&self.buf[..read]);

            match String::from_utf8(bytes) {
                Ok(text) => {
                    self.offset += text.len() as u64;
                    return Some(Ok(text));
                }
                Err(e) => {
                    let utf8_error = e.utf8_error();
                    let valid = utf8_error.valid_up_to();
                    if utf8_error.error_len().is_some() {
                        return Some(Err(self.decode_error(valid)));
                    }
                    // Incomplete sequence at the end: keep it for the next read.
                    let mut bytes = e.into_bytes();
                    self.carry = bytes.split_off(valid);
                    if bytes.is_empty() {
                        continue;
                    }
                    return match String::from_utf8(bytes) {
                        Ok(text) => {
                            self.offset += text.len() as u64;
                            Some(Ok(text))
                        }
                        Err(_) => Some(Err(self.decode_error(0))),
                    };
                }
            }
        }
        None
    }
}
