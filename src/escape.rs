//! The escape and retry supervisor, and the crate's public solve entry
//! points. On solver failure it escalates search budgets, regrows random
//! grids with a raised black-square ratio, and as a last resort inserts
//! black squares to break infeasible configurations, re-enumerating slots
//! and re-invoking the solver with a fresh search state.

use instant::Instant;
use log::{info, warn};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde_derive::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::backtracking_search::{
    fill_once, new_placement_cache, FillFailure, FillReport, FillSuccess, SolverContext,
    Statistics,
};
use crate::config::{
    SolverConfig, BEAM_WIDTH_CEILING, MAX_BACKTRACK_CEILING, MAX_BLACK_SQUARE_RATIO,
};
use crate::error::{Error, FailureReport};
use crate::grid_config::{
    can_place_block, generate_random_grid, Choice, Grid, GridConfig, SlotConfig, Template,
};
use crate::theme::{choose_theme_entry, place_theme_entry, EmbeddingOracle, ThemeQuery};
use crate::types::{Cell, Direction, SlotId, WordId};
use crate::word_list::WordList;

/// Where the solve's grid comes from.
pub enum GridSource {
    /// A compiled template: fixed geometry, declared slot labels, and
    /// optional theme slots.
    Template(Template),
    /// An explicit grid; slots are enumerated with numbered labels.
    Explicit(Grid),
    /// Randomly generated from the config's dimensions and ratio; regrown
    /// between failed attempts.
    Random,
}

/// The filled puzzle returned on success. No partial grids are ever
/// returned on failure.
#[derive(Debug, Clone, Serialize)]
pub struct FilledPuzzle {
    pub grid: Grid,
    /// Slot label -> placed word, for every slot.
    pub filled_slots: BTreeMap<String, String>,
    /// The subset of `filled_slots` that was pre-assigned by theme
    /// selection.
    pub theme_entries: BTreeMap<String, String>,
    pub slots: Vec<SlotConfig>,
    pub statistics: Statistics,
}

/// Solve a template, optionally seeding it with a theme entry.
pub fn solve_template(
    word_list: &WordList,
    config: &SolverConfig,
    template: &Template,
    theme: Option<&ThemeQuery>,
    oracle: Option<&dyn EmbeddingOracle>,
) -> Result<FilledPuzzle, Error> {
    solve(
        word_list,
        config,
        GridSource::Template(template.clone()),
        theme,
        oracle,
    )
}

/// Solve an explicit grid.
pub fn solve_grid(
    word_list: &WordList,
    config: &SolverConfig,
    grid: Grid,
) -> Result<FilledPuzzle, Error> {
    solve(word_list, config, GridSource::Explicit(grid), None, None)
}

/// Generate a random grid from the config and solve it.
pub fn solve_random(word_list: &WordList, config: &SolverConfig) -> Result<FilledPuzzle, Error> {
    solve(word_list, config, GridSource::Random, None, None)
}

/// The full solve: theme selection, up to `max_grid_iterations` fill
/// attempts with escalating budgets and grid mutations between them, and a
/// structured failure with statistics and a narrative when everything is
/// exhausted.
pub fn solve(
    word_list: &WordList,
    config: &SolverConfig,
    source: GridSource,
    theme: Option<&ThemeQuery>,
    oracle: Option<&dyn EmbeddingOracle>,
) -> Result<FilledPuzzle, Error> {
    config.validate()?;

    let started = Instant::now();
    let budget = Duration::from_millis(config.timeout_ms);
    let mut rng = SmallRng::seed_from_u64(config.rng_seed);
    let placement_cache = new_placement_cache(config.placement_cache_size);

    // The theme word is chosen once and survives grid regrowth; only its
    // slot is re-picked when the geometry changes.
    let theme_word: Option<WordId> =
        theme.and_then(|query| choose_theme_entry(word_list, query, oracle, &mut rng));

    let (mut grid_config, declared_theme_slots) = match &source {
        GridSource::Template(template) => {
            let compiled = template.compile(config.min_word_length)?;
            (compiled.grid_config, compiled.theme_slot_ids)
        }
        GridSource::Explicit(grid) => (
            GridConfig::new(grid.clone(), config.min_word_length),
            Vec::new(),
        ),
        GridSource::Random => {
            let grid = generate_random_grid(
                config.grid_width,
                config.grid_height,
                config.black_square_ratio,
                &mut rng,
            );
            (GridConfig::new(grid, config.min_word_length), Vec::new())
        }
    };

    let mut pre_assignment = theme_word.and_then(|word_id| {
        place_theme_entry(
            &mut grid_config,
            word_list,
            word_id,
            &declared_theme_slots,
            &mut rng,
        )
    });

    // An input grid with no white cells is trivially solved. This applies
    // to the caller's grid only; surgery is never allowed to blank out the
    // whole puzzle.
    if grid_config.grid.white_cell_count() == 0 {
        return Ok(empty_puzzle(grid_config, Statistics::default()));
    }

    let base_ratio = config.black_square_ratio;
    let mut ratio = base_ratio;
    let mut max_backtrack = config.max_backtrack;
    let mut beam_width = config.beam_width;
    let max_iterations = config.max_grid_iterations;
    let mut last_statistics = Statistics::default();

    for attempt in 0..max_iterations {
        if started.elapsed() >= budget {
            let mut statistics = last_statistics.clone();
            statistics.retries = attempt as u64;
            statistics.time_ms = started.elapsed().as_millis() as u64;
            return Err(Error::TimeBudgetExceeded(Box::new(FailureReport {
                narrative: timeout_narrative(&grid_config, attempt, max_iterations, &statistics),
                statistics,
            })));
        }

        let ctx = SolverContext::new(
            word_list,
            config,
            started,
            budget,
            max_backtrack,
            beam_width,
            &placement_cache,
        );
        let pre: Vec<Choice> = pre_assignment.iter().copied().collect();
        let seed = config.rng_seed.wrapping_add(attempt as u64);

        match fill_once(&ctx, &grid_config, &pre, seed) {
            Ok(mut success) => {
                success.statistics.retries = attempt as u64;
                info!("solved on attempt {}: {}", attempt + 1, success.statistics.summary());
                return Ok(build_puzzle(word_list, &grid_config, success, pre_assignment));
            }
            Err(report) => {
                let mut statistics = report.statistics.clone();
                statistics.retries = attempt as u64;

                if report.failure == FillFailure::Timeout {
                    return Err(Error::TimeBudgetExceeded(Box::new(FailureReport {
                        narrative: timeout_narrative(
                            &grid_config,
                            attempt,
                            max_iterations,
                            &statistics,
                        ),
                        statistics,
                    })));
                }

                info!(
                    "attempt {}/{} failed ({:?}); {}",
                    attempt + 1,
                    max_iterations,
                    report.failure,
                    statistics.summary()
                );
                last_statistics = statistics;

                max_backtrack = MAX_BACKTRACK_CEILING.min((max_backtrack as f64 * 1.5) as usize);
                beam_width = BEAM_WIDTH_CEILING.min((beam_width as f64 * 1.3) as usize);

                if attempt + 1 == max_iterations {
                    // Last resort, on the final attempt only: aggressive
                    // black-square insertion, then one more fill over the
                    // re-enumerated slots.
                    let theme_slot_geometry = pre_assignment
                        .map(|choice| slot_geometry(&grid_config, choice.slot_id));
                    let mutated = escape_black_squares(
                        &grid_config,
                        word_list,
                        &report,
                        pre_assignment.map(|choice| choice.slot_id),
                    )
                    .map(|grid| GridConfig::new(grid, config.min_word_length))
                    // A mutation that removes every slot would blank out
                    // the puzzle; keep the old grid and give up instead.
                    .filter(|mutated| mutated.slot_count() > 0);

                    if let Some(new_config) = mutated {
                        grid_config = new_config;
                        placement_cache.lock().unwrap().clear();
                        pre_assignment = reresolve_theme(
                            &mut grid_config,
                            word_list,
                            theme_word,
                            theme_slot_geometry,
                            &declared_theme_slots,
                            false,
                            &mut rng,
                        );

                        if started.elapsed() < budget {
                            let ctx = SolverContext::new(
                                word_list,
                                config,
                                started,
                                budget,
                                max_backtrack,
                                beam_width,
                                &placement_cache,
                            );
                            let pre: Vec<Choice> = pre_assignment.iter().copied().collect();
                            let seed = config.rng_seed.wrapping_add(max_iterations as u64);
                            match fill_once(&ctx, &grid_config, &pre, seed) {
                                Ok(mut success) => {
                                    success.statistics.retries = (attempt + 1) as u64;
                                    info!(
                                        "solved after black-square escape: {}",
                                        success.statistics.summary()
                                    );
                                    return Ok(build_puzzle(
                                        word_list,
                                        &grid_config,
                                        success,
                                        pre_assignment,
                                    ));
                                }
                                Err(rerun) => {
                                    let mut statistics = rerun.statistics.clone();
                                    statistics.retries = (attempt + 1) as u64;
                                    if rerun.failure == FillFailure::Timeout {
                                        return Err(Error::TimeBudgetExceeded(Box::new(
                                            FailureReport {
                                                narrative: timeout_narrative(
                                                    &grid_config,
                                                    attempt,
                                                    max_iterations,
                                                    &statistics,
                                                ),
                                                statistics,
                                            },
                                        )));
                                    }
                                    last_statistics = statistics;
                                }
                            }
                        }
                    }
                } else if matches!(&source, GridSource::Random) {
                    // Random grids are simply regrown between attempts,
                    // with the black ratio rising gradually after half the
                    // budget.
                    if attempt + 1 > max_iterations / 2 && ratio < MAX_BLACK_SQUARE_RATIO {
                        ratio = MAX_BLACK_SQUARE_RATIO.min(
                            base_ratio + (attempt + 1) as f64 / max_iterations as f64 * 0.15,
                        );
                        info!("raising black square ratio to {ratio:.2}");
                    }
                    let grid = generate_random_grid(
                        config.grid_width,
                        config.grid_height,
                        ratio,
                        &mut rng,
                    );
                    grid_config = GridConfig::new(grid, config.min_word_length);
                    placement_cache.lock().unwrap().clear();
                    pre_assignment = reresolve_theme(
                        &mut grid_config,
                        word_list,
                        theme_word,
                        None,
                        &declared_theme_slots,
                        true,
                        &mut rng,
                    );
                }
            }
        }
    }

    let mut statistics = last_statistics;
    statistics.retries = max_iterations as u64;
    statistics.time_ms = started.elapsed().as_millis() as u64;
    Err(Error::NoSolution(Box::new(FailureReport {
        narrative: format!(
            "gave up after {max_iterations} grid attempts on a {}x{} grid \
             (black ratio {ratio:.2}, max_backtrack {max_backtrack}, beam width {beam_width}); \
             last attempt: {}",
            grid_config.grid.width(),
            grid_config.grid.height(),
            statistics.summary(),
        ),
        statistics,
    })))
}

fn timeout_narrative(
    grid_config: &GridConfig,
    attempt: usize,
    max_iterations: usize,
    statistics: &Statistics,
) -> String {
    format!(
        "stopped on attempt {}/{max_iterations} over a {}x{} grid; {}",
        attempt + 1,
        grid_config.grid.width(),
        grid_config.grid.height(),
        statistics.summary(),
    )
}

fn slot_geometry(grid_config: &GridConfig, slot_id: SlotId) -> (Direction, usize, usize, usize) {
    let slot = &grid_config.slot_configs[slot_id];
    (slot.direction, slot.row, slot.col, slot.length)
}

/// Re-attach the theme after the grid changed. Mutated grids keep the theme
/// letters in place, so the slot is re-found by geometry; regrown grids get
/// a fresh placement.
fn reresolve_theme(
    grid_config: &mut GridConfig,
    word_list: &WordList,
    theme_word: Option<WordId>,
    previous_geometry: Option<(Direction, usize, usize, usize)>,
    declared_theme_slots: &[SlotId],
    regrown: bool,
    rng: &mut SmallRng,
) -> Option<Choice> {
    let word_id = theme_word?;

    if regrown {
        return place_theme_entry(grid_config, word_list, word_id, declared_theme_slots, rng);
    }

    let (direction, row, col, length) = previous_geometry?;
    match grid_config.find_slot(direction, row, col, length) {
        Some(slot_id) => Some(Choice { slot_id, word_id }),
        None => {
            warn!("theme slot disappeared during grid surgery; continuing without theme");
            None
        }
    }
}

/// Aggressive black-square insertion, run only on the final attempt, in
/// priority order. Returns the mutated grid, or `None` when nothing
/// applies.
///
/// 1. Block out the empty cells of every slot whose pattern has zero
///    candidates.
/// 2. Otherwise: midpoint-split the most attempted slot with count > 5 and
///    length > 4.
/// 3. Otherwise: midpoint-split the most constrained slot with length > 3.
/// 4. Otherwise: block the one-third point of the top three most-attempted
///    slots with length > 3.
///
/// Point insertions (2-4) preserve R1/R2 via `can_place_block`; the theme
/// slot is never touched.
fn escape_black_squares(
    grid_config: &GridConfig,
    word_list: &WordList,
    report: &FillReport,
    protected: Option<SlotId>,
) -> Option<Grid> {
    let mut grid = grid_config.grid.clone();

    let mut blocked_out: Vec<&str> = Vec::new();
    for slot in &grid_config.slot_configs {
        if Some(slot.id) == protected {
            continue;
        }
        let pattern = grid_config.pattern_in(&grid, slot.id);
        if !word_list.has_match(&pattern) {
            for &(row, col) in &slot.cells {
                if grid.get(row, col) == Cell::Empty {
                    grid.set(row, col, Cell::Block);
                }
            }
            blocked_out.push(&slot.label);
        }
    }
    if !blocked_out.is_empty() {
        info!("blocked out zero-candidate slots: {}", blocked_out.join(", "));
        return Some(grid);
    }

    let mut by_attempts: Vec<&SlotConfig> = grid_config
        .slot_configs
        .iter()
        .filter(|slot| Some(slot.id) != protected)
        .collect();
    by_attempts.sort_by_key(|slot| std::cmp::Reverse(report.slot_attempts[slot.id]));

    for slot in &by_attempts {
        if report.slot_attempts[slot.id] > 5 && slot.length > 4 {
            let (row, col) = slot.cells[slot.length / 2];
            if can_place_block(&grid, row, col) {
                grid.set(row, col, Cell::Block);
                info!("split high-attempt slot {} at its midpoint", slot.label);
                return Some(grid);
            }
        }
    }

    let mut constrained: Vec<(usize, &SlotConfig)> = grid_config
        .slot_configs
        .iter()
        .filter(|slot| Some(slot.id) != protected && slot.length > 3)
        .map(|slot| {
            let pattern = grid_config.pattern_in(&grid, slot.id);
            (word_list.match_count(&pattern), slot)
        })
        .collect();
    constrained.sort_by_key(|&(count, slot)| (count, slot.id));
    for &(_, slot) in &constrained {
        let (row, col) = slot.cells[slot.length / 2];
        if can_place_block(&grid, row, col) {
            grid.set(row, col, Cell::Block);
            info!("split most constrained slot {} at its midpoint", slot.label);
            return Some(grid);
        }
    }

    let mut modified = false;
    for slot in by_attempts.iter().take(3) {
        if slot.length > 3 {
            let (row, col) = slot.cells[slot.length / 3];
            if can_place_block(&grid, row, col) {
                grid.set(row, col, Cell::Block);
                modified = true;
            }
        }
    }
    if modified {
        info!("inserted blocks at the one-third points of the most attempted slots");
        return Some(grid);
    }

    None
}

fn empty_puzzle(grid_config: GridConfig, statistics: Statistics) -> FilledPuzzle {
    FilledPuzzle {
        grid: grid_config.grid,
        filled_slots: BTreeMap::new(),
        theme_entries: BTreeMap::new(),
        slots: grid_config.slot_configs,
        statistics,
    }
}

fn build_puzzle(
    word_list: &WordList,
    grid_config: &GridConfig,
    success: FillSuccess,
    pre_assignment: Option<Choice>,
) -> FilledPuzzle {
    let mut filled_slots = BTreeMap::new();
    for choice in &success.choices {
        filled_slots.insert(
            grid_config.slot_configs[choice.slot_id].label.clone(),
            word_list.word(choice.word_id).text.clone(),
        );
    }

    let mut theme_entries = BTreeMap::new();
    if let Some(choice) = pre_assignment {
        theme_entries.insert(
            grid_config.slot_configs[choice.slot_id].label.clone(),
            word_list.word(choice.word_id).text.clone(),
        );
    }

    FilledPuzzle {
        grid: success.grid,
        filled_slots,
        theme_entries,
        slots: grid_config.slot_configs.clone(),
        statistics: success.statistics,
    }
}

#[cfg(test)]
mod tests {
    use super::{solve, solve_grid, solve_template, GridSource};
    use crate::config::SolverConfig;
    use crate::error::Error;
    use crate::grid_config::{Grid, Template};
    use crate::theme::ThemeQuery;
    use crate::types::Cell;
    use crate::word_list::WordList;
    use indoc::indoc;

    fn word_list_from(words: &[(&str, u64)]) -> WordList {
        WordList::build(
            words.iter().map(|&(word, count)| (word.to_string(), count)),
            3,
            15,
            1,
        )
    }

    fn square_corpus() -> WordList {
        word_list_from(&[
            ("sator", 50),
            ("arepo", 40),
            ("tenet", 30),
            ("opera", 20),
            ("rotas", 10),
            ("cat", 30),
            ("car", 25),
            ("arc", 20),
            ("tar", 20),
            ("art", 15),
        ])
    }

    #[test]
    fn test_solve_explicit_grid() {
        let word_list = square_corpus();
        let config = SolverConfig::default();
        let puzzle = solve_grid(&word_list, &config, Grid::new_empty(5, 5)).unwrap();

        assert_eq!(puzzle.filled_slots.len(), 10);
        assert!(puzzle
            .grid
            .cells()
            .iter()
            .all(|cell| matches!(cell, Cell::Letter(_))));
        assert!(puzzle.theme_entries.is_empty());
        // Row words and column words agree at every intersection by
        // construction; spot-check via render.
        let rendered = puzzle.grid.render();
        assert_eq!(rendered.lines().count(), 5);
    }

    #[test]
    fn test_zero_white_grid_is_trivially_solved() {
        let word_list = square_corpus();
        let config = SolverConfig::default();
        let grid = Grid::from_template_string("###\n###\n###").unwrap();
        let puzzle = solve_grid(&word_list, &config, grid).unwrap();
        assert!(puzzle.filled_slots.is_empty());
        assert!(puzzle.slots.is_empty());
    }

    #[test]
    fn test_theme_entry_is_placed_in_declared_slot() {
        let config = SolverConfig::default();
        let template = Template::from_json(
            r#"{
                "grid": [".....", ".....", ".....", ".....", "....."],
                "slots": [
                    {"id": "center", "direction": "A", "row": 2, "col": 0, "length": 5}
                ],
                "theme_slot_ids": ["center"]
            }"#,
        )
        .unwrap();

        let word_list_with_theme = word_list_from(&[
            ("sator", 50),
            ("arepo", 40),
            ("tenet", 30),
            ("opera", 20),
            ("rotas", 10),
        ]);
        let query = ThemeQuery {
            min_frequency: 1,
            threshold: 0.9,
            ..ThemeQuery::new("tenets of faith")
        };
        let puzzle = solve_template(
            &word_list_with_theme,
            &config,
            &template,
            Some(&query),
            None,
        )
        .unwrap();

        assert_eq!(puzzle.theme_entries.len(), 1);
        let (label, word) = puzzle.theme_entries.iter().next().unwrap();
        assert_eq!(label, "center");
        assert_eq!(word, "TENET");
        assert_eq!(puzzle.filled_slots.len(), 10);
        assert_eq!(puzzle.filled_slots["center"], "TENET");
    }

    #[test]
    fn test_infeasible_corpus_is_no_solution_within_budget() {
        // Only one 5-letter word: crossings can never agree.
        let word_list = word_list_from(&[("aaaab", 1)]);
        let config = SolverConfig {
            max_grid_iterations: 5,
            ..SolverConfig::default()
        };
        let result = solve_grid(&word_list, &config, Grid::new_empty(5, 5));
        match result {
            Err(Error::NoSolution(report)) => {
                assert!(report.statistics.retries <= 5);
                assert!(!report.narrative.is_empty());
            }
            other => panic!("expected NoSolution, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_zero_budget() {
        let word_list = square_corpus();
        let config = SolverConfig {
            timeout_ms: 0,
            ..SolverConfig::default()
        };
        let result = solve_grid(&word_list, &config, Grid::new_empty(5, 5));
        match result {
            Err(Error::TimeBudgetExceeded(report)) => {
                assert_eq!(report.statistics.words_tried, 0);
                assert!(report.statistics.time_ms < 1_000);
            }
            other => panic!("expected TimeBudgetExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_escape_blocks_out_zero_candidate_slots() {
        // The right-hand 4-cell across runs have no candidates (the corpus
        // has only 3-letter words), so the supervisor blocks them out,
        // re-enumerates, and fills the remaining 3x3 as a word square.
        let word_list = word_list_from(&[("bit", 30), ("ice", 25), ("ten", 20)]);
        let config = SolverConfig::default();
        let grid = Grid::from_template_string(indoc! {"
            ...#....
            ...#....
            ...#....
        "})
        .unwrap();

        let puzzle = solve_grid(&word_list, &config, grid).unwrap();
        assert!(puzzle.statistics.retries >= 1);
        // The left 3x3 is filled; the right side was surgically removed.
        for (row, line) in puzzle.grid.render().lines().enumerate() {
            let bytes = line.as_bytes();
            assert!(bytes[..3].iter().all(u8::is_ascii_uppercase), "row {row}: {line}");
            assert!(bytes[4..].iter().all(|&b| b == b'#'), "row {row}: {line}");
        }
        assert_eq!(puzzle.filled_slots.len(), 6);
    }

    #[test]
    fn test_random_source_respects_seed() {
        let word_list = square_corpus();
        let config = SolverConfig {
            grid_width: 5,
            grid_height: 5,
            black_square_ratio: 0.0,
            rng_seed: 42,
            ..SolverConfig::default()
        };
        let first = solve(&word_list, &config, GridSource::Random, None, None).unwrap();
        let second = solve(&word_list, &config, GridSource::Random, None, None).unwrap();
        assert_eq!(first.grid, second.grid);
        assert_eq!(first.filled_slots, second.filled_slots);
    }
}
