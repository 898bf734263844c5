use crate::error::{AppError, Result};
use log;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tiktoken_rs::{CoreBPE, cl100k_base};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Tokenizer {
    /// Exact count with tiktoken's `cl100k_base` encoding.
    #[default]
    #[serde(rename = "cl100k")]
    Cl100k,
    /// Characters divided by four.
    #[serde(rename = "chars")]
    CharHeuristic,
}

impl Tokenizer {
    pub fn is_exact(&self) -> bool {
        matches!(self, Tokenizer::Cl100k)
    }
}

impl fmt::Display for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tokenizer::Cl100k => write!(f, "tiktoken cl100k_base"),
            Tokenizer::CharHeuristic => write!(f, "heuristic (characters / 4)"),
        }
    }
}

impl FromStr for Tokenizer {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cl100k" | "tiktoken" => Ok(Tokenizer::Cl100k),
            "chars" | "heuristic" => Ok(Tokenizer::CharHeuristic),
            other => Err(AppError::InvalidArgument(format!(
                "Unknown tokenizer '{}'. Use 'cl100k' or 'chars'.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimate {
    pub count: usize,
    pub method: Tokenizer,
}

/// Running token count over streamed text.
///
/// The exact tokenizer only encodes text up to a newline that is followed by a
/// non-whitespace character, which is always a pre-tokenization boundary, so
/// splitting the stream there does not change the total. Memory is bounded by
/// the longest line.
pub struct TokenTally {
    method: Tokenizer,
    bpe: Option<CoreBPE>,
    pending: String,
    scanned: usize,
    tokens: usize,
    chars: usize,
}

impl fmt::Debug for TokenTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenTally")
            .field("method", &self.method)
            .field("tokens", &self.tokens)
            .field("chars", &self.chars)
            .finish()
    }
}

impl TokenTally {
    /// Falls back to the heuristic when the exact tokenizer cannot be loaded.
    pub fn new(requested: Tokenizer) -> Self {
        let bpe = match requested {
            Tokenizer::Cl100k => match cl100k_base() {
                Ok(bpe) => Some(bpe),
                Err(e) => {
                    log::warn!(
                        "{}; estimating tokens as characters / 4 instead",
                        AppError::TikToken(e.to_string())
                    );
                    None
                }
            },
            Tokenizer::CharHeuristic => None,
        };
        let method = if bpe.is_some() {
            Tokenizer::Cl100k
        } else {
            Tokenizer::CharHeuristic
        };
        log::debug!("Token counting with {}", method);

        Self {
            method,
            bpe,
            pending: String::new(),
            scanned: 0,
            tokens: 0,
            chars: 0,
        }
    }

    pub fn feed(&mut self, text: &str) {
        let Some(bpe) = &self.bpe else {
            self.chars += text.chars().count();
            return;
        };

        self.pending.push_str(text);
        let bytes = self.pending.as_bytes();
        let boundary = (self.scanned.max(1)..bytes.len())
            .rev()
            .find(|&i| bytes[i - 1] == b'\n' && !bytes[i].is_ascii_whitespace());

        match boundary {
            Some(split) => {
                let rest = self.pending.split_off(split);
                self.tokens += bpe.encode_ordinary(&self.pending).len();
                self.pending = rest;
                self.scanned = 0;
            }
            None => self.scanned = self.pending.len(),
        }
    }

    pub fn finish(mut self) -> TokenEstimate {
        let count = match &self.bpe {
            Some(bpe) => {
                if !self.pending.is_empty() {
                    self.tokens += bpe.encode_ordinary(&self.pending).len();
                }
                self.tokens
            }
            None => self.chars / 4,
        };
        TokenEstimate {
            count,
            method: self.method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally_of(text: &str, tokenizer: Tokenizer) -> TokenEstimate {
        let mut tally = TokenTally::new(tokenizer);
        tally.feed(text);
        tally.finish()
    }

    #[test]
    fn test_heuristic_is_chars_over_four() {
        let estimate = tally_of("abcdefgh", Tokenizer::CharHeuristic);
        assert_eq!(estimate.count, 2);
        assert_eq!(estimate.method, Tokenizer::CharHeuristic);
        assert!(!estimate.method.is_exact());

        // Characters, not bytes.
        let estimate = tally_of("éééé", Tokenizer::CharHeuristic);
        assert_eq!(estimate.count, 1);
    }

    #[test]
    fn test_streamed_count_matches_one_shot() {
        let text = "fn main() {\n    println!(\"hello\");\n}\n\n// trailing comment\nlet x = 1;\n";
        let whole = tally_of(text, Tokenizer::Cl100k);
        assert_eq!(whole.method, Tokenizer::Cl100k);
        assert!(whole.count > 0);

        let mut tally = TokenTally::new(Tokenizer::Cl100k);
        for piece in text.as_bytes().chunks(7) {
            tally.feed(std::str::from_utf8(piece).unwrap());
        }
        assert_eq!(tally.finish().count, whole.count);
    }

    #[test]
    fn test_tokenizer_from_str() {
        assert_eq!("chars".parse::<Tokenizer>().unwrap(), Tokenizer::CharHeuristic);
        assert_eq!("cl100k".parse::<Tokenizer>().unwrap(), Tokenizer::Cl100k);
        assert!("gpt2".parse::<Tokenizer>().is_err());
    }
}
