//! The solver core: a depth-first backtracking CSP over slots with dynamic
//! slot ordering, frequency-driven candidate ordering, forward checking
//! through the pattern index, and an optional parallel fan-out over the top
//! candidates at a node.
//!
//! All search state travels through an explicit [`SolverContext`] and
//! [`SearchState`]; there is no module-level state.

use float_ord::FloatOrd;
use instant::Instant;
use log::{debug, trace};
use lru::LruCache;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_derive::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::config::{SolverConfig, MAX_BACKTRACK_CEILING};
use crate::grid_config::{Choice, GridConfig};
use crate::types::{Direction, SlotId, WordId};
use crate::word_list::{Pattern, WordList};

/// Grow the candidate breadth for a slot that keeps getting revisited.
#[must_use]
pub fn local_max_backtrack(base: usize, attempts: u32) -> usize {
    if attempts > 3 {
        MAX_BACKTRACK_CEILING.min((base as f64 * (1.0 + f64::from(attempts) / 10.0)) as usize)
    } else {
        base
    }
}

/// A successful fill: the complete grid and the word chosen for every slot.
#[derive(Debug, Clone)]
pub struct FillSuccess {
    pub grid: crate::grid_config::Grid,
    pub choices: Vec<Choice>,
    pub statistics: Statistics,
}

/// Terminal states of one fill attempt, reported to the retry supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillFailure {
    /// Some slot had an empty lookup before any search happened.
    Infeasible,
    /// The wall-clock budget ran out; short-circuits the entire descent.
    Timeout,
    /// The candidate space was exhausted without a solution.
    Exhausted,
}

/// A failed fill attempt together with the observations the supervisor
/// needs for its escape decisions.
#[derive(Debug, Clone)]
pub struct FillReport {
    pub failure: FillFailure,
    /// Per-slot backtracking entry counts from this attempt.
    pub slot_attempts: Vec<u32>,
    pub statistics: Statistics,
}

/// Snapshot of the search counters, reported with every outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Statistics {
    pub attempts: u64,
    pub backtracks: u64,
    pub words_tried: u64,
    pub successful_placements: u64,
    pub failed_placements: u64,
    pub time_ms: u64,
    pub success_rate: f64,
    /// Outer grid-mutation retries consumed before this outcome.
    pub retries: u64,
    /// Deepest placed-words stack observed, a progress measure across
    /// escape attempts.
    pub max_placed: u64,
}

impl Statistics {
    /// One-line human-readable summary, used by the CLI and failure
    /// narratives.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "attempts={} backtracks={} words_tried={} placements={}/{} success_rate={:.1}% retries={} time={}ms",
            self.attempts,
            self.backtracks,
            self.words_tried,
            self.successful_placements,
            self.successful_placements + self.failed_placements,
            self.success_rate * 100.0,
            self.retries,
            self.time_ms,
        )
    }
}

#[derive(Debug, Default)]
struct StatCounters {
    attempts: AtomicU64,
    backtracks: AtomicU64,
    words_tried: AtomicU64,
    successful_placements: AtomicU64,
    failed_placements: AtomicU64,
    max_placed: AtomicU64,
}

impl StatCounters {
    fn record_placed_depth(&self, depth: usize) {
        self.max_placed.fetch_max(depth as u64, Ordering::Relaxed);
    }
}

/// Key of the placement feasibility cache: the word and the slot anchor.
pub type CacheKey = (WordId, usize, usize, Direction);

/// The placement feasibility cache. Owned by the caller so it can outlive a
/// single fill attempt; the supervisor clears it after every grid mutation.
pub type PlacementCache = Mutex<LruCache<CacheKey, bool>>;

/// Build a placement cache with the given entry cap.
#[must_use]
pub fn new_placement_cache(capacity: usize) -> PlacementCache {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
    Mutex::new(LruCache::new(capacity))
}

/// Everything a fill attempt shares across its recursion (and across
/// parallel candidate tasks): the immutable word list and config, the
/// wall-clock deadline, the statistics counters, and the placement cache.
pub struct SolverContext<'a> {
    pub word_list: &'a WordList,
    pub config: &'a SolverConfig,
    started: Instant,
    budget: Duration,
    /// Dynamic candidate breadth for this attempt; the supervisor escalates
    /// it between attempts.
    max_backtrack: usize,
    beam_width: usize,
    counters: StatCounters,
    placement_cache: &'a PlacementCache,
    deadline_hit: AtomicBool,
}

impl<'a> SolverContext<'a> {
    #[must_use]
    pub fn new(
        word_list: &'a WordList,
        config: &'a SolverConfig,
        started: Instant,
        budget: Duration,
        max_backtrack: usize,
        beam_width: usize,
        placement_cache: &'a PlacementCache,
    ) -> SolverContext<'a> {
        SolverContext {
            word_list,
            config,
            started,
            budget,
            max_backtrack,
            beam_width,
            counters: StatCounters::default(),
            placement_cache,
            deadline_hit: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn out_of_time(&self) -> bool {
        if self.elapsed() >= self.budget {
            self.deadline_hit.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    #[must_use]
    pub fn statistics(&self, retries: u64) -> Statistics {
        let words_tried = self.counters.words_tried.load(Ordering::Relaxed);
        let successful = self.counters.successful_placements.load(Ordering::Relaxed);
        Statistics {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            backtracks: self.counters.backtracks.load(Ordering::Relaxed),
            words_tried,
            successful_placements: successful,
            failed_placements: self.counters.failed_placements.load(Ordering::Relaxed),
            time_ms: self.elapsed().as_millis() as u64,
            success_rate: successful as f64 / words_tried.max(1) as f64,
            retries,
            max_placed: self.counters.max_placed.load(Ordering::Relaxed),
        }
    }

    /// Memoized feasibility of a word at a slot anchor: geometric fit plus
    /// agreement with the letters fixed before the search began (theme
    /// entries and template prefills). Deliberately not the global forward
    /// check.
    fn placement_is_valid(
        &self,
        grid_config: &GridConfig,
        slot_id: SlotId,
        word_id: WordId,
    ) -> bool {
        let slot = &grid_config.slot_configs[slot_id];
        let key = (word_id, slot.row, slot.col, slot.direction);

        if let Some(&cached) = self.placement_cache.lock().unwrap().get(&key) {
            return cached;
        }

        let word = &self.word_list.word(word_id).text;
        let valid = word.len() == slot.length
            && grid_config.pattern_in(&grid_config.grid, slot_id).matches(word);
        self.placement_cache.lock().unwrap().put(key, valid);
        valid
    }
}

/// Cooperative cancellation: a chain of flags, one per parallel fan-out,
/// checked at candidate boundaries. Setting any ancestor stops the subtree.
struct Cancel<'a> {
    flag: AtomicBool,
    parent: Option<&'a Cancel<'a>>,
}

impl<'a> Cancel<'a> {
    fn root() -> Cancel<'static> {
        Cancel {
            flag: AtomicBool::new(false),
            parent: None,
        }
    }

    #[cfg(feature = "rayon")]
    fn child(parent: &'a Cancel<'a>) -> Cancel<'a> {
        Cancel {
            flag: AtomicBool::new(false),
            parent: Some(parent),
        }
    }

    fn set(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.parent.map_or(false, Cancel::is_set)
    }
}

/// The mutable per-descent state. Parallel candidate tasks each work on
/// their own clone, so no slot is mutated by two tasks at once.
#[derive(Debug, Clone)]
struct SearchState {
    grid: crate::grid_config::Grid,
    assigned: Vec<bool>,
    placed: Vec<Choice>,
    slot_attempts: Vec<u32>,
    rng: SmallRng,
}

enum NodeFailure {
    Timeout,
    Dead,
}

type NodeResult = Result<(), NodeFailure>;

/// Run one complete fill attempt over the given grid. `pre_assignments`
/// (the theme entry, typically) are applied first and never backtracked.
/// `seed` varies per outer attempt so retries explore differently.
pub fn fill_once(
    ctx: &SolverContext,
    grid_config: &GridConfig,
    pre_assignments: &[Choice],
    seed: u64,
) -> Result<FillSuccess, FillReport> {
    let slot_count = grid_config.slot_count();
    let mut state = SearchState {
        grid: grid_config.grid.clone(),
        assigned: vec![false; slot_count],
        placed: Vec::with_capacity(slot_count),
        slot_attempts: vec![0; slot_count],
        rng: SmallRng::seed_from_u64(seed),
    };

    let report = |failure: FillFailure, state: &SearchState| FillReport {
        failure,
        slot_attempts: state.slot_attempts.clone(),
        statistics: ctx.statistics(0),
    };

    for &choice in pre_assignments {
        let word = &ctx.word_list.word(choice.word_id).text;
        let slot = &grid_config.slot_configs[choice.slot_id];
        let pattern = grid_config.pattern_in(&state.grid, choice.slot_id);
        if word.len() != slot.length || !pattern.matches(word) {
            return Err(report(FillFailure::Infeasible, &state));
        }
        let _ = grid_config.place_in(&mut state.grid, choice.slot_id, word);
        state.assigned[choice.slot_id] = true;
        state.placed.push(choice);
    }

    // Initial feasibility: a slot with an empty lookup before any search
    // means the grid itself is unfillable, not merely this descent.
    for slot in &grid_config.slot_configs {
        if state.assigned[slot.id] {
            continue;
        }
        let pattern = grid_config.pattern_in(&state.grid, slot.id);
        if !ctx.word_list.has_match(&pattern) {
            debug!("slot {} has no candidates for pattern {pattern}", slot.label);
            return Err(report(FillFailure::Infeasible, &state));
        }
    }

    let cancel = Cancel::root();
    match search(ctx, grid_config, &mut state, 0, &cancel) {
        Ok(()) => {
            #[cfg(feature = "check_invariants")]
            {
                for choice in &state.placed {
                    let pattern = grid_config.pattern_in(&state.grid, choice.slot_id);
                    assert!(
                        pattern.matches(&ctx.word_list.word(choice.word_id).text),
                        "placed word must match its slot's final pattern"
                    );
                }
                assert!(
                    state.grid.cells().iter().all(|cell| {
                        !matches!(cell, crate::types::Cell::Empty)
                    }),
                    "every white cell must hold a letter in a solution"
                );
            }

            Ok(FillSuccess {
                grid: state.grid,
                choices: state.placed,
                statistics: ctx.statistics(0),
            })
        }
        Err(NodeFailure::Timeout) => Err(report(FillFailure::Timeout, &state)),
        Err(NodeFailure::Dead) => Err(report(FillFailure::Exhausted, &state)),
    }
}

fn search(
    ctx: &SolverContext,
    grid_config: &GridConfig,
    state: &mut SearchState,
    depth: usize,
    cancel: &Cancel,
) -> NodeResult {
    ctx.counters.attempts.fetch_add(1, Ordering::Relaxed);

    // Goal test: with every slot assigned, the fill is a solution iff every
    // white cell received a letter from some placed word.
    if state.placed.len() == grid_config.slot_count() {
        return if grid_config.fully_covered() {
            Ok(())
        } else {
            Err(NodeFailure::Dead)
        };
    }

    if ctx.out_of_time() {
        return Err(NodeFailure::Timeout);
    }
    if cancel.is_set() {
        return Err(NodeFailure::Dead);
    }
    if depth >= grid_config.slot_count() * 3 {
        return Err(NodeFailure::Dead);
    }

    // Forward check every unassigned slot, keeping the derived patterns and
    // candidate counts for slot ordering.
    let mut open_slots: Vec<(SlotId, Pattern, usize)> =
        Vec::with_capacity(grid_config.slot_count() - state.placed.len());
    for slot in &grid_config.slot_configs {
        if state.assigned[slot.id] {
            continue;
        }
        let pattern = grid_config.pattern_in(&state.grid, slot.id);
        let available = ctx.word_list.match_count(&pattern);
        if available == 0 {
            return Err(NodeFailure::Dead);
        }
        open_slots.push((slot.id, pattern, available));
    }

    let (slot_id, pattern) = pick_slot(grid_config, state, &open_slots);

    state.slot_attempts[slot_id] += 1;
    let attempts = state.slot_attempts[slot_id];
    let breadth = local_max_backtrack(ctx.max_backtrack, attempts).min(ctx.config.max_attempts);
    let jitter = attempts > 2;
    let freq_weight = ctx.config.frequency_weight();

    let mut candidates: Vec<(f64, WordId)> = ctx
        .word_list
        .matching_ids(&pattern)
        .map(|word_id| {
            let mut score = freq_weight * ctx.word_list.freq(word_id);
            if jitter {
                score += state.rng.gen_range(0.0..0.1);
            }
            (score, word_id)
        })
        .collect();
    candidates.sort_by(|a, b| {
        FloatOrd(b.0)
            .cmp(&FloatOrd(a.0))
            .then_with(|| ctx.word_list.word(a.1).text.cmp(&ctx.word_list.word(b.1).text))
    });
    candidates.truncate(breadth);

    trace!(
        "depth {depth}: slot {} pattern {pattern} with {} candidates",
        grid_config.slot_configs[slot_id].label,
        candidates.len()
    );

    #[cfg(feature = "rayon")]
    if ctx.config.parallel_candidates && candidates.len() > 1 {
        return search_parallel(ctx, grid_config, state, &candidates, slot_id, depth, cancel);
    }

    for &(_, word_id) in &candidates {
        if cancel.is_set() {
            return Err(NodeFailure::Dead);
        }
        match try_candidate(ctx, grid_config, state, slot_id, word_id, depth, cancel) {
            Ok(()) => return Ok(()),
            Err(NodeFailure::Timeout) => return Err(NodeFailure::Timeout),
            Err(NodeFailure::Dead) => {}
        }
    }

    Err(NodeFailure::Dead)
}

/// Place one candidate, recurse, and undo on failure. Local placement
/// failures are silent: they just advance the candidate loop.
fn try_candidate(
    ctx: &SolverContext,
    grid_config: &GridConfig,
    state: &mut SearchState,
    slot_id: SlotId,
    word_id: WordId,
    depth: usize,
    cancel: &Cancel,
) -> NodeResult {
    if !ctx.placement_is_valid(grid_config, slot_id, word_id) {
        ctx.counters.failed_placements.fetch_add(1, Ordering::Relaxed);
        return Err(NodeFailure::Dead);
    }

    ctx.counters.words_tried.fetch_add(1, Ordering::Relaxed);
    let word = &ctx.word_list.word(word_id).text;
    let undo = grid_config.place_in(&mut state.grid, slot_id, word);
    state.assigned[slot_id] = true;
    state.placed.push(Choice { slot_id, word_id });
    ctx.counters.successful_placements.fetch_add(1, Ordering::Relaxed);
    ctx.counters.record_placed_depth(state.placed.len());

    match search(ctx, grid_config, state, depth + 1, cancel) {
        Ok(()) => Ok(()),
        Err(failure) => {
            state.placed.pop();
            state.assigned[slot_id] = false;
            grid_config.undo_in(&mut state.grid, &undo);
            ctx.counters.backtracks.fetch_add(1, Ordering::Relaxed);
            ctx.counters.failed_placements.fetch_add(1, Ordering::Relaxed);
            Err(failure)
        }
    }
}

#[cfg(feature = "rayon")]
#[allow(clippy::too_many_arguments)]
fn search_parallel(
    ctx: &SolverContext,
    grid_config: &GridConfig,
    state: &mut SearchState,
    candidates: &[(f64, WordId)],
    slot_id: SlotId,
    depth: usize,
    cancel: &Cancel,
) -> NodeResult {
    let fan_out = candidates.len().min(ctx.beam_width);
    // Fork seeds are drawn sequentially so the fan-out itself stays a pure
    // function of the descent seed.
    let seeds: Vec<u64> = (0..fan_out).map(|_| state.rng.gen()).collect();
    let node_cancel = Cancel::child(cancel);

    let outcome = candidates[..fan_out]
        .par_iter()
        .zip(seeds)
        .find_map_any(|(&(_, word_id), seed)| {
            if node_cancel.is_set() {
                return None;
            }
            let mut fork = state.clone();
            fork.rng = SmallRng::seed_from_u64(seed);
            match try_candidate(ctx, grid_config, &mut fork, slot_id, word_id, depth, &node_cancel)
            {
                Ok(()) => {
                    node_cancel.set();
                    Some(Ok(fork))
                }
                Err(NodeFailure::Timeout) => {
                    node_cancel.set();
                    Some(Err(NodeFailure::Timeout))
                }
                Err(NodeFailure::Dead) => None,
            }
        });

    match outcome {
        Some(Ok(fork)) => {
            *state = fork;
            Ok(())
        }
        Some(Err(failure)) => Err(failure),
        None => Err(NodeFailure::Dead),
    }
}

/// Score every open slot and pick the highest, ties broken lexicographically
/// by (row, col, direction).
fn pick_slot(
    grid_config: &GridConfig,
    state: &SearchState,
    open_slots: &[(SlotId, Pattern, usize)],
) -> (SlotId, Pattern) {
    let mut best: Option<(f64, (usize, usize, Direction), SlotId, &Pattern)> = None;
    for (slot_id, pattern, available) in open_slots {
        let score = slot_score(grid_config, state, *slot_id, pattern, *available);
        let slot = &grid_config.slot_configs[*slot_id];
        let key = (slot.row, slot.col, slot.direction);
        let better = match &best {
            None => true,
            Some((best_score, best_key, ..)) => match score.partial_cmp(best_score) {
                Some(std::cmp::Ordering::Greater) => true,
                Some(std::cmp::Ordering::Equal) => key < *best_key,
                _ => false,
            },
        };
        if better {
            best = Some((score, key, *slot_id, pattern));
        }
    }
    let (_, _, slot_id, pattern) = best.expect("pick_slot requires at least one open slot");
    (slot_id, pattern.clone())
}

/// Slot priority: higher fills sooner. Length and existing constraints
/// dominate; availability and board position nudge; repeated attempts
/// demote.
fn slot_score(
    grid_config: &GridConfig,
    state: &SearchState,
    slot_id: SlotId,
    pattern: &Pattern,
    available: usize,
) -> f64 {
    let slot = &grid_config.slot_configs[slot_id];

    let placed_crossings = grid_config
        .crossings(slot_id)
        .iter()
        .filter(|crossing| state.assigned[crossing.other_slot_id])
        .count();

    let availability_bonus = 30.0_f64.min(5.0 * (1.0 + available as f64 / 100.0));
    let edge_penalty = edge_penalty(grid_config, slot_id);
    let location = location_bonus(grid_config, state, slot_id, edge_penalty);

    10.0 * slot.length as f64
        + 5.0 * pattern.fixed_letters() as f64
        + 3.0 * placed_crossings as f64
        + availability_bonus
        + location
        - 2.0 * f64::from(state.slot_attempts[slot_id])
        - edge_penalty
}

/// 0.2 per grid boundary the slot touches.
fn edge_penalty(grid_config: &GridConfig, slot_id: SlotId) -> f64 {
    let slot = &grid_config.slot_configs[slot_id];
    let grid = &grid_config.grid;
    let (end_row, end_col) = *slot.cells.last().unwrap_or(&(slot.row, slot.col));

    let mut penalty = 0.0;
    if slot.row == 0 || end_row + 1 >= grid.height() {
        penalty += 0.2;
    }
    if slot.col == 0 || end_col + 1 >= grid.width() {
        penalty += 0.2;
    }
    penalty
}

/// Board-position bonus: center proximity, relative length, and how much
/// crossing potential the slot's cells still have.
fn location_bonus(
    grid_config: &GridConfig,
    state: &SearchState,
    slot_id: SlotId,
    edge_penalty: f64,
) -> f64 {
    let slot = &grid_config.slot_configs[slot_id];
    let grid = &state.grid;
    let (height, width) = (grid.height(), grid.width());

    let center_row = height / 2;
    let center_col = width / 2;
    let distance = slot.row.abs_diff(center_row) + slot.col.abs_diff(center_col);
    let center_bonus = 1.0 - distance as f64 / (height + width) as f64;

    let length_bonus = slot.length as f64 / height.max(width) as f64;

    // For each cell of the slot, look along the perpendicular line: lines
    // that still have empty cells are crossing opportunities.
    let mut crossing_lines = 0usize;
    let mut empty_cells = 0usize;
    for &(row, col) in &slot.cells {
        let empties = match slot.direction {
            Direction::Across => (0..height)
                .filter(|&r| grid.get(r, col) == crate::types::Cell::Empty)
                .count(),
            Direction::Down => (0..width)
                .filter(|&c| grid.get(row, c) == crate::types::Cell::Empty)
                .count(),
        };
        if empties > 0 {
            crossing_lines += 1;
        }
        empty_cells += empties;
    }
    let intersection_bonus =
        (crossing_lines as f64 + 0.5 * empty_cells as f64) / (slot.length as f64 * 2.0);

    center_bonus * 0.3 + length_bonus * 0.2 + intersection_bonus * 0.4 - edge_penalty * 0.1
}

#[cfg(test)]
mod tests {
    use super::{fill_once, local_max_backtrack, FillFailure, SolverContext};
    use crate::config::SolverConfig;
    use crate::grid_config::{Choice, Grid, GridConfig};
    use crate::types::Direction;
    use crate::word_list::WordList;
    use indoc::indoc;
    use instant::Instant;
    use std::time::Duration;

    fn word_list_from(words: &[(&str, u64)]) -> WordList {
        WordList::build(
            words.iter().map(|&(word, count)| (word.to_string(), count)),
            3,
            15,
            1,
        )
    }

    fn context<'a>(
        word_list: &'a WordList,
        config: &'a SolverConfig,
        cache: &'a super::PlacementCache,
        budget_ms: u64,
    ) -> SolverContext<'a> {
        SolverContext::new(
            word_list,
            config,
            Instant::now(),
            Duration::from_millis(budget_ms),
            config.max_backtrack,
            config.beam_width,
            cache,
        )
    }

    fn assert_consistent(word_list: &WordList, grid_config: &GridConfig, choices: &[Choice]) {
        for choice in choices {
            let slot = &grid_config.slot_configs[choice.slot_id];
            let word = &word_list.word(choice.word_id).text;
            assert_eq!(word.len(), slot.length);
        }
        // Every intersection agrees because the words were written into one
        // shared grid; re-derive each slot's letters and compare.
        let mut grid = grid_config.grid.clone();
        for choice in choices {
            let word = &word_list.word(choice.word_id).text;
            let _ = grid_config.place_in(&mut grid, choice.slot_id, word);
        }
        for choice in choices {
            let pattern = grid_config.pattern_in(&grid, choice.slot_id);
            assert!(pattern.matches(&word_list.word(choice.word_id).text));
        }
    }

    #[test]
    fn test_local_max_backtrack_growth() {
        assert_eq!(local_max_backtrack(500, 1), 500);
        assert_eq!(local_max_backtrack(500, 3), 500);
        assert_eq!(local_max_backtrack(500, 4), 700);
        assert_eq!(local_max_backtrack(500, 10), 1000);
        assert_eq!(local_max_backtrack(9_000, 40), 10_000);
    }

    #[test]
    fn test_fills_three_by_three_with_center_block() {
        let word_list = word_list_from(&[("cat", 1), ("car", 1), ("arc", 1), ("tar", 1), ("art", 1)]);
        let config = SolverConfig::default();
        let grid = Grid::from_template_string(indoc! {"
            ...
            .#.
            ...
        "})
        .unwrap();
        let grid_config = GridConfig::new(grid, 3);

        let cache = super::new_placement_cache(1 << 16);
        let ctx = context(&word_list, &config, &cache, 10_000);
        let success = fill_once(&ctx, &grid_config, &[], 0).expect("3x3 grid must fill");
        assert_eq!(success.choices.len(), 4);
        assert_consistent(&word_list, &grid_config, &success.choices);
        assert!(success.grid.cells().iter().all(|cell| {
            matches!(cell, crate::types::Cell::Letter(_) | crate::types::Cell::Block)
        }));
    }

    #[test]
    fn test_fills_open_five_by_five_word_square() {
        // A palindromic word square: every row reads as a column too, so
        // five words fill all ten slots consistently.
        let word_list = word_list_from(&[
            ("sator", 5),
            ("arepo", 4),
            ("tenet", 3),
            ("opera", 2),
            ("rotas", 1),
        ]);
        let config = SolverConfig::default();
        let grid_config = GridConfig::new(Grid::new_empty(5, 5), 3);

        let cache = super::new_placement_cache(1 << 16);
        let ctx = context(&word_list, &config, &cache, 30_000);
        let success = fill_once(&ctx, &grid_config, &[], 0).expect("5x5 word square must fill");
        assert_eq!(success.choices.len(), 10);
        assert_consistent(&word_list, &grid_config, &success.choices);
    }

    #[test]
    fn test_single_candidate_slots_solve_without_backtracks() {
        let word_list = word_list_from(&[("arc", 1), ("art", 1), ("car", 1), ("tar", 1)]);
        let config = SolverConfig::default();
        let grid = Grid::from_template_string("...\n.#.\n...").unwrap();
        let grid_config = GridConfig::new(grid, 3);

        // Pre-assign the top across and left down words; the two remaining
        // slots each have exactly one candidate.
        let top = grid_config.find_slot(Direction::Across, 0, 0, 3).unwrap();
        let left = grid_config.find_slot(Direction::Down, 0, 0, 3).unwrap();
        let pre = vec![
            Choice {
                slot_id: top,
                word_id: word_list.word_id("ARC").unwrap(),
            },
            Choice {
                slot_id: left,
                word_id: word_list.word_id("ART").unwrap(),
            },
        ];

        let cache = super::new_placement_cache(1 << 16);
        let ctx = context(&word_list, &config, &cache, 10_000);
        let success = fill_once(&ctx, &grid_config, &pre, 0).expect("forced grid must fill");
        assert_eq!(success.statistics.backtracks, 0);
        let placed: Vec<&str> = success
            .choices
            .iter()
            .map(|choice| word_list.word(choice.word_id).text.as_str())
            .collect();
        assert!(placed.contains(&"TAR"));
        assert!(placed.contains(&"CAR"));
    }

    #[test]
    fn test_zero_timeout_fails_before_any_placement() {
        let word_list = word_list_from(&[("cat", 1), ("car", 1), ("arc", 1), ("tar", 1)]);
        let config = SolverConfig::default();
        let grid_config = GridConfig::new(Grid::new_empty(3, 3), 3);

        let cache = super::new_placement_cache(1 << 16);
        let ctx = context(&word_list, &config, &cache, 0);
        let report = fill_once(&ctx, &grid_config, &[], 0).unwrap_err();
        assert_eq!(report.failure, FillFailure::Timeout);
        assert_eq!(report.statistics.words_tried, 0);
    }

    #[test]
    fn test_missing_length_is_infeasible() {
        let word_list = word_list_from(&[("cat", 1)]);
        let config = SolverConfig::default();
        let grid_config = GridConfig::new(Grid::new_empty(5, 5), 3);

        let cache = super::new_placement_cache(1 << 16);
        let ctx = context(&word_list, &config, &cache, 10_000);
        let report = fill_once(&ctx, &grid_config, &[], 0).unwrap_err();
        assert_eq!(report.failure, FillFailure::Infeasible);
    }

    #[test]
    fn test_unfillable_square_exhausts() {
        // Only one 3-letter word: the intersections can never agree unless
        // the word is symmetric, and "CAT" is not.
        let word_list = word_list_from(&[("cat", 1)]);
        let config = SolverConfig::default();
        let grid_config = GridConfig::new(Grid::new_empty(3, 3), 3);

        let cache = super::new_placement_cache(1 << 16);
        let ctx = context(&word_list, &config, &cache, 10_000);
        let report = fill_once(&ctx, &grid_config, &[], 0).unwrap_err();
        assert!(matches!(
            report.failure,
            FillFailure::Exhausted | FillFailure::Infeasible
        ));
    }

    #[test]
    fn test_sequential_solve_is_deterministic() {
        let word_list = word_list_from(&[
            ("sator", 5),
            ("arepo", 4),
            ("tenet", 3),
            ("opera", 2),
            ("rotas", 1),
        ]);
        let config = SolverConfig::default();
        let grid_config = GridConfig::new(Grid::new_empty(5, 5), 3);

        let cache_a = super::new_placement_cache(1 << 16);
        let first = fill_once(
            &context(&word_list, &config, &cache_a, 30_000),
            &grid_config,
            &[],
            9,
        )
        .expect("must fill");
        let cache_b = super::new_placement_cache(1 << 16);
        let second = fill_once(
            &context(&word_list, &config, &cache_b, 30_000),
            &grid_config,
            &[],
            9,
        )
        .expect("must fill");
        assert_eq!(first.choices, second.choices);
        assert_eq!(first.grid, second.grid);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_parallel_candidates_still_solve() {
        let word_list = word_list_from(&[
            ("sator", 5),
            ("arepo", 4),
            ("tenet", 3),
            ("opera", 2),
            ("rotas", 1),
        ]);
        let config = SolverConfig {
            parallel_candidates: true,
            ..SolverConfig::default()
        };
        let grid_config = GridConfig::new(Grid::new_empty(5, 5), 3);

        let cache = super::new_placement_cache(1 << 16);
        let ctx = context(&word_list, &config, &cache, 30_000);
        let success = fill_once(&ctx, &grid_config, &[], 0).expect("parallel fill must succeed");
        assert_eq!(success.choices.len(), 10);
        assert_consistent(&word_list, &grid_config, &success.choices);
    }

    #[test]
    fn test_pre_assignment_conflicts_are_infeasible() {
        let word_list = word_list_from(&[("cat", 1), ("dog", 1), ("arc", 1), ("tar", 1)]);
        let config = SolverConfig::default();
        let grid = Grid::from_template_string("c..\n.#.\n...").unwrap();
        let grid_config = GridConfig::new(grid, 3);

        let top = grid_config.find_slot(Direction::Across, 0, 0, 3).unwrap();
        let pre = vec![Choice {
            slot_id: top,
            word_id: word_list.word_id("DOG").unwrap(),
        }];

        let cache = super::new_placement_cache(1 << 16);
        let ctx = context(&word_list, &config, &cache, 10_000);
        let report = fill_once(&ctx, &grid_config, &pre, 0).unwrap_err();
        assert_eq!(report.failure, FillFailure::Infeasible);
    }
}
