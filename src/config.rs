//! Solver configuration. Everything that used to be a module-level constant
//! or global in ad-hoc fillers lives here and travels through the search
//! explicitly.

use crate::error::Error;
use crate::types::Difficulty;

/// Hard ceiling for the adaptive per-slot candidate breadth.
pub const MAX_BACKTRACK_CEILING: usize = 10_000;

/// Hard ceiling for the parallel exploration width.
pub const BEAM_WIDTH_CEILING: usize = 3_000;

/// Cap for the black-square ratio the retry supervisor may escalate to.
pub const MAX_BLACK_SQUARE_RATIO: f64 = 0.4;

#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Words and slots shorter than this are discarded.
    pub min_word_length: usize,
    /// Corpus words longer than this are discarded.
    pub max_word_length: usize,
    /// Dimensions used when generating a random grid.
    pub grid_width: usize,
    pub grid_height: usize,
    /// Target fraction of black squares in a random grid.
    pub black_square_ratio: f64,
    /// Wall-clock budget for the whole solve, outer retries included.
    pub timeout_ms: u64,
    /// Bound on the number of candidates examined in one candidate loop.
    pub max_attempts: usize,
    /// Outer grid-mutation attempts before giving up.
    pub max_grid_iterations: usize,
    /// Bound on concurrent candidate exploration.
    pub beam_width: usize,
    /// Initial per-slot candidate breadth.
    pub max_backtrack: usize,
    /// Evaluate same-slot candidates concurrently.
    pub parallel_candidates: bool,
    pub difficulty: Difficulty,
    /// Candidate-ordering weights per difficulty: positive favors common
    /// words, negative favors rare ones.
    pub frequency_weights: [f64; 3],
    /// Frequency-count cutoffs per difficulty applied at corpus load.
    pub min_word_counts: [u64; 3],
    pub rng_seed: u64,
    /// Entry cap for the placement feasibility cache.
    pub placement_cache_size: usize,
}

impl Default for SolverConfig {
    fn default() -> SolverConfig {
        SolverConfig {
            min_word_length: 3,
            max_word_length: 15,
            grid_width: 5,
            grid_height: 5,
            black_square_ratio: 0.2,
            timeout_ms: 120_000,
            max_attempts: 1_000,
            max_grid_iterations: 20,
            beam_width: 500,
            max_backtrack: 500,
            parallel_candidates: false,
            difficulty: Difficulty::Easy,
            frequency_weights: [1.0, 0.0, -1.0],
            min_word_counts: [5, 3, 1],
            rng_seed: 0,
            placement_cache_size: 1 << 20,
        }
    }
}

impl SolverConfig {
    /// The candidate frequency weight for the configured difficulty.
    #[must_use]
    pub fn frequency_weight(&self) -> f64 {
        self.frequency_weights[self.difficulty_index()]
    }

    /// The corpus count cutoff for the configured difficulty.
    #[must_use]
    pub fn min_word_count(&self) -> u64 {
        self.min_word_counts[self.difficulty_index()]
    }

    fn difficulty_index(&self) -> usize {
        match self.difficulty {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.min_word_length == 0 {
            return Err(Error::ConfigError("min_word_length must be positive".into()));
        }
        if self.max_word_length < self.min_word_length {
            return Err(Error::ConfigError(format!(
                "max_word_length {} is below min_word_length {}",
                self.max_word_length, self.min_word_length
            )));
        }
        if self.max_word_length > crate::MAX_SLOT_LENGTH {
            return Err(Error::ConfigError(format!(
                "max_word_length {} exceeds the supported slot length {}",
                self.max_word_length,
                crate::MAX_SLOT_LENGTH
            )));
        }
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(Error::ConfigError("grid dimensions must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.black_square_ratio) {
            return Err(Error::ConfigError(format!(
                "black_square_ratio {} must be between 0.0 and 1.0",
                self.black_square_ratio
            )));
        }
        if self.max_grid_iterations == 0 {
            return Err(Error::ConfigError("max_grid_iterations must be positive".into()));
        }
        if self.max_backtrack == 0 || self.beam_width == 0 {
            return Err(Error::ConfigError(
                "max_backtrack and beam_width must be positive".into(),
            ));
        }
        if self.placement_cache_size == 0 {
            return Err(Error::ConfigError("placement_cache_size must be positive".into()));
        }
        Ok(())
    }
}
