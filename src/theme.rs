//! Theme entry selection: rank corpus words against a theme string by
//! semantic or string similarity, pick one, and pre-place it in a designated
//! slot. Selection never errors; when nothing clears the threshold the solve
//! simply proceeds without a theme.

use log::{info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::SmallRng;
use rand::Rng;

use crate::grid_config::{Choice, GridConfig};
use crate::types::{SlotId, WordId};
use crate::util::{cosine_similarity, sequence_ratio};
use crate::word_list::WordList;

/// Capability seam for semantic similarity: anything that can turn texts
/// into dense vectors. The solver core never depends on a concrete
/// embedding backend.
pub trait EmbeddingOracle {
    fn embed(&self, texts: &[&str]) -> Vec<Vec<f32>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityMode {
    /// Cosine similarity of oracle embeddings.
    Semantic,
    /// Sequence-matcher ratio against the theme and its tokens.
    String,
}

/// Parameters for one theme selection.
#[derive(Debug, Clone)]
pub struct ThemeQuery {
    pub theme: String,
    pub min_len: usize,
    pub max_len: usize,
    /// Minimum raw corpus count for a candidate.
    pub min_frequency: u64,
    pub mode: SimilarityMode,
    pub threshold: f64,
    /// Weight the random pick by similarity score instead of uniform.
    pub weighted: bool,
}

impl ThemeQuery {
    #[must_use]
    pub fn new(theme: impl Into<String>) -> ThemeQuery {
        ThemeQuery {
            theme: theme.into(),
            min_len: 5,
            max_len: 5,
            min_frequency: 20,
            mode: SimilarityMode::String,
            threshold: 0.5,
            weighted: true,
        }
    }
}

/// Similarity between a candidate word and the theme in STRING mode:
/// sequence-matcher ratio, taking the max over theme tokens longer than two
/// characters, and 1.0 outright when one string contains the other.
#[must_use]
pub fn string_similarity(word: &str, theme: &str) -> f64 {
    let word = word.to_lowercase();
    let theme = theme.to_lowercase();

    if word.contains(&theme) || theme.contains(&word) {
        return 1.0;
    }

    let mut similarity = sequence_ratio(&word, &theme);
    for token in theme.split_whitespace() {
        if token.chars().count() > 2 {
            similarity = similarity.max(sequence_ratio(&word, token));
        }
    }
    similarity
}

/// Score every candidate in the length window against the theme and return
/// them sorted by descending similarity (ties lexicographic).
#[must_use]
pub fn find_theme_entries(
    word_list: &WordList,
    query: &ThemeQuery,
    oracle: Option<&dyn EmbeddingOracle>,
) -> Vec<(WordId, f64)> {
    let candidates: Vec<WordId> = (query.min_len..=query.max_len)
        .flat_map(|length| word_list.words_of_length(length).iter().copied())
        .filter(|&id| word_list.word(id).count >= query.min_frequency)
        .collect();

    if candidates.is_empty() {
        warn!("no theme candidates in length window {}..={}", query.min_len, query.max_len);
        return Vec::new();
    }

    let mut entries: Vec<(WordId, f64)> = match query.mode {
        SimilarityMode::String => candidates
            .iter()
            .map(|&id| (id, string_similarity(&word_list.word(id).text, &query.theme)))
            .collect(),
        SimilarityMode::Semantic => {
            let Some(oracle) = oracle else {
                warn!("semantic similarity requested without an embedding oracle");
                return Vec::new();
            };
            let theme_embedding = match oracle.embed(&[&query.theme]).into_iter().next() {
                Some(vector) => vector,
                None => return Vec::new(),
            };
            let texts: Vec<&str> = candidates
                .iter()
                .map(|&id| word_list.word(id).text.as_str())
                .collect();
            let word_embeddings = oracle.embed(&texts);
            candidates
                .iter()
                .zip(word_embeddings)
                .map(|(&id, vector)| (id, cosine_similarity(&vector, &theme_embedding)))
                .collect()
        }
    };

    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| word_list.word(a.0).text.cmp(&word_list.word(b.0).text))
    });
    entries
}

/// Pick one theme entry above the similarity threshold, uniformly or
/// weighted by score. `None` means the caller proceeds without a theme.
#[must_use]
pub fn choose_theme_entry(
    word_list: &WordList,
    query: &ThemeQuery,
    oracle: Option<&dyn EmbeddingOracle>,
    rng: &mut SmallRng,
) -> Option<WordId> {
    let entries = find_theme_entries(word_list, query, oracle);
    let eligible: Vec<(WordId, f64)> = entries
        .into_iter()
        .filter(|&(_, score)| score >= query.threshold)
        .collect();

    if eligible.is_empty() {
        warn!(
            "no theme entries above threshold {} for theme {:?}",
            query.threshold, query.theme
        );
        return None;
    }

    let picked = if query.weighted {
        let weights: Vec<f64> = eligible.iter().map(|&(_, score)| score.max(1e-6)).collect();
        match WeightedIndex::new(&weights) {
            Ok(distribution) => eligible[distribution.sample(rng)].0,
            Err(_) => eligible[rng.gen_range(0..eligible.len())].0,
        }
    } else {
        eligible[rng.gen_range(0..eligible.len())].0
    };

    info!(
        "selected theme entry {:?} for theme {:?}",
        word_list.word(picked).text,
        query.theme
    );
    Some(picked)
}

/// Pre-place the chosen theme word: pick uniformly among the declared theme
/// slots the word fits, falling back to any slot it fits. A slot fits when
/// its length matches and its current pattern admits the word, so
/// pre-filled letters are never overwritten. Writes the letters into the
/// config's grid; the returned choice is pre-assigned and never
/// backtracked.
pub fn place_theme_entry(
    grid_config: &mut GridConfig,
    word_list: &WordList,
    word_id: WordId,
    theme_slot_ids: &[SlotId],
    rng: &mut SmallRng,
) -> Option<Choice> {
    let word = &word_list.word(word_id).text;
    let fits = |slot_id: SlotId| {
        grid_config
            .pattern_in(&grid_config.grid, slot_id)
            .matches(word)
    };

    let mut candidates: Vec<SlotId> = theme_slot_ids
        .iter()
        .copied()
        .filter(|&slot_id| fits(slot_id))
        .collect();
    if candidates.is_empty() {
        candidates = grid_config
            .slot_configs
            .iter()
            .map(|slot| slot.id)
            .filter(|&slot_id| fits(slot_id))
            .collect();
    }
    if candidates.is_empty() {
        warn!("no compatible slot of length {} for theme entry {word:?}", word.len());
        return None;
    }

    let slot_id = candidates[rng.gen_range(0..candidates.len())];
    let cells: Vec<(usize, usize)> = grid_config.slot_configs[slot_id].cells.to_vec();
    for (&(row, col), &byte) in cells.iter().zip(word.as_bytes()) {
        grid_config.grid.set(row, col, crate::types::Cell::Letter(byte));
    }

    info!(
        "placed theme entry {word:?} in slot {}",
        grid_config.slot_configs[slot_id].label
    );
    Some(Choice { slot_id, word_id })
}
