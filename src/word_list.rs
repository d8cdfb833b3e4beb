//! Corpus loading and the pattern index. Words are normalized into uppercase
//! `A-Z` strings, bucketed by length, and each bucket is sorted once by
//! descending frequency (ties broken lexicographically) so that every lookup
//! is stable-ordered by construction.
//!
//! Lookups scan the length bucket and filter against the pattern, which is
//! `O(|bucket|)` in the worst case; the all-wildcard pattern short-circuits
//! to the whole bucket.

use fancy_regex::Regex;
use lazy_static::lazy_static;
use log::{debug, info};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

use crate::error::Error;
use crate::types::WordId;

lazy_static! {
    /// A corpus line is a word with an optional `;count` or `,count` suffix.
    static ref CORPUS_LINE_RE: Regex =
        Regex::new(r"^\s*(?P<word>[^;,]+?)\s*(?:[;,]\s*(?P<count>\d+)\s*)?$").unwrap();
}

/// The wildcard byte used in patterns.
pub const WILDCARD: u8 = b'.';

/// A constraint signature for a slot: one byte per cell, either an uppercase
/// letter or [`WILDCARD`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    bytes: SmallVec<[u8; 16]>,
}

impl Pattern {
    /// The all-wildcard pattern of the given length.
    #[must_use]
    pub fn open(len: usize) -> Pattern {
        Pattern {
            bytes: SmallVec::from_elem(WILDCARD, len),
        }
    }

    #[must_use]
    pub fn from_bytes(bytes: impl IntoIterator<Item = u8>) -> Pattern {
        Pattern {
            bytes: bytes.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of non-wildcard positions.
    #[must_use]
    pub fn fixed_letters(&self) -> usize {
        self.bytes.iter().filter(|&&b| b != WILDCARD).count()
    }

    /// True when no position is constrained.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.bytes.iter().all(|&b| b == WILDCARD)
    }

    /// Does the given word satisfy this pattern?
    #[must_use]
    pub fn matches(&self, word: &str) -> bool {
        let word = word.as_bytes();
        word.len() == self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(word)
                .all(|(&p, &w)| p == WILDCARD || p == w)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.bytes {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

/// A canonical corpus word with its raw count and normalized frequency.
#[derive(Debug, Clone)]
pub struct WordEntry {
    pub text: String,
    pub count: u64,
    /// `count / total_count` over the pre-filter corpus; lower means rarer.
    pub freq: f64,
}

/// The corpus index: a flat word arena plus per-length buckets.
#[derive(Debug)]
pub struct WordList {
    words: Vec<WordEntry>,
    by_length: Vec<Vec<WordId>>,
    word_id_by_string: HashMap<String, WordId>,
}

/// Normalize a raw corpus string: NFKD fold, uppercase, keep only `A-Z`.
/// Idempotent.
#[must_use]
pub fn normalize_word(raw: &str) -> String {
    raw.nfkd()
        .flat_map(char::to_uppercase)
        .filter(char::is_ascii_alphabetic)
        .collect()
}

impl WordList {
    /// Build the index from `(raw word, count)` pairs. Duplicate normalized
    /// forms keep the maximum count; words outside the length window or
    /// below `min_count` are dropped. Frequencies are normalized over the
    /// pre-filter total so that difficulty cutoffs don't shift the scale.
    #[must_use]
    pub fn build(
        corpus: impl IntoIterator<Item = (String, u64)>,
        min_word_length: usize,
        max_word_length: usize,
        min_count: u64,
    ) -> WordList {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for (raw, count) in corpus {
            let word = normalize_word(&raw);
            if word.len() < min_word_length || word.len() > max_word_length {
                continue;
            }
            let entry = counts.entry(word).or_insert(0);
            *entry = (*entry).max(count);
        }

        let total_count: u64 = counts.values().sum();
        let total = if total_count == 0 { 1 } else { total_count };

        let mut words: Vec<WordEntry> = counts
            .into_iter()
            .filter(|&(_, count)| count >= min_count)
            .map(|(text, count)| WordEntry {
                text,
                count,
                freq: count as f64 / total as f64,
            })
            .collect();

        // Bucket order doubles as lookup order, so sort the arena itself:
        // descending frequency, ties lexicographic.
        words.sort_by(|a, b| {
            b.freq
                .partial_cmp(&a.freq)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.text.cmp(&b.text))
        });

        let mut by_length: Vec<Vec<WordId>> = vec![Vec::new(); max_word_length + 1];
        let mut word_id_by_string = HashMap::with_capacity(words.len());
        for (id, entry) in words.iter().enumerate() {
            by_length[entry.text.len()].push(id);
            word_id_by_string.insert(entry.text.clone(), id);
        }

        for (length, bucket) in by_length.iter().enumerate() {
            if !bucket.is_empty() {
                debug!("indexed {} words of length {length}", bucket.len());
            }
        }
        info!("word list built: {} words, total count {total_count}", words.len());

        WordList {
            words,
            by_length,
            word_id_by_string,
        }
    }

    /// Load a corpus file: one word per line, optional `;count` suffix
    /// (missing counts default to 1). Unreadable paths and corpora that are
    /// empty after filtering both surface as [`Error::CorpusMissing`].
    pub fn load_file(
        path: &Path,
        min_word_length: usize,
        max_word_length: usize,
        min_count: u64,
    ) -> Result<WordList, Error> {
        let contents = fs::read_to_string(path)
            .map_err(|err| Error::CorpusMissing(format!("{}: {err}", path.display())))?;

        let pairs = contents.lines().filter_map(|line| {
            let captures = CORPUS_LINE_RE.captures(line).ok().flatten()?;
            let word = captures.name("word")?.as_str().to_string();
            let count = captures
                .name("count")
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(1);
            Some((word, count))
        });

        let word_list = WordList::build(pairs, min_word_length, max_word_length, min_count);
        if word_list.is_empty() {
            return Err(Error::CorpusMissing(format!(
                "{}: no words survived normalization and filtering",
                path.display()
            )));
        }
        Ok(word_list)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[must_use]
    pub fn word(&self, id: WordId) -> &WordEntry {
        &self.words[id]
    }

    /// Normalized frequency of a word; lower means rarer.
    #[must_use]
    pub fn freq(&self, id: WordId) -> f64 {
        self.words[id].freq
    }

    #[must_use]
    pub fn word_id(&self, text: &str) -> Option<WordId> {
        self.word_id_by_string.get(text).copied()
    }

    /// All word ids of the given length, in lookup order.
    #[must_use]
    pub fn words_of_length(&self, length: usize) -> &[WordId] {
        self.by_length.get(length).map_or(&[], Vec::as_slice)
    }

    /// All word ids of the pattern's length that satisfy it, preserving the
    /// bucket's descending-frequency order.
    pub fn matching_ids<'a>(&'a self, pattern: &'a Pattern) -> impl Iterator<Item = WordId> + 'a {
        let open = pattern.is_open();
        self.words_of_length(pattern.len())
            .iter()
            .copied()
            .filter(move |&id| open || pattern.matches(&self.words[id].text))
    }

    /// Early-exit feasibility probe used by the solver's forward check.
    #[must_use]
    pub fn has_match(&self, pattern: &Pattern) -> bool {
        self.matching_ids(pattern).next().is_some()
    }

    #[must_use]
    pub fn match_count(&self, pattern: &Pattern) -> usize {
        self.matching_ids(pattern).count()
    }
}
