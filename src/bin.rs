use clap::Parser;
use serde_derive::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use gridfill::backtracking_search::Statistics;
use gridfill::config::SolverConfig;
use gridfill::error::Error;
use gridfill::escape::{solve, FilledPuzzle, GridSource};
use gridfill::grid_config::Template;
use gridfill::theme::ThemeQuery;
use gridfill::types::Difficulty;
use gridfill::word_list::WordList;

/// Fill a crossword grid from a word corpus.
#[derive(Parser, Debug)]
#[command(name = "gridfill", version, about)]
struct Args {
    /// Corpus file: one word per line, optional ";count" suffix.
    #[arg(long)]
    words: PathBuf,

    /// JSON template file; omit to generate a random grid.
    #[arg(long)]
    template: Option<PathBuf>,

    /// Width of a randomly generated grid.
    #[arg(long, default_value_t = 5)]
    width: usize,

    /// Height of a randomly generated grid.
    #[arg(long, default_value_t = 5)]
    height: usize,

    /// Target fraction of black squares in a random grid.
    #[arg(long, default_value_t = 0.2)]
    black_squares: f64,

    /// Difficulty: easy, medium, or hard.
    #[arg(long, default_value = "easy")]
    difficulty: String,

    /// Wall-clock budget for the whole solve.
    #[arg(long, default_value_t = 120_000)]
    timeout_ms: u64,

    /// Outer grid-mutation attempts before giving up.
    #[arg(long, default_value_t = 20)]
    max_grid_iterations: usize,

    /// RNG seed; the same seed reproduces the same puzzle.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Theme string; the best-matching corpus word is pre-placed.
    #[arg(long)]
    theme: Option<String>,

    /// Length of the theme entry to look for.
    #[arg(long, default_value_t = 5)]
    theme_length: usize,

    /// Minimum corpus count for theme candidates.
    #[arg(long, default_value_t = 1)]
    theme_min_frequency: u64,

    /// Evaluate same-slot candidates in parallel.
    #[arg(long)]
    parallel: bool,

    /// Emit the result as JSON instead of text.
    #[arg(long)]
    json: bool,
}

/// JSON shape for `--json`: the grid as plain row strings.
#[derive(Serialize)]
struct PuzzleView<'a> {
    grid: Vec<String>,
    filled_slots: &'a BTreeMap<String, String>,
    theme_entries: &'a BTreeMap<String, String>,
    statistics: &'a Statistics,
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(statistics) = err.statistics() {
                eprintln!("{}", statistics.summary());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    let difficulty = parse_difficulty(&args.difficulty)?;

    let config = SolverConfig {
        grid_width: args.width,
        grid_height: args.height,
        black_square_ratio: args.black_squares,
        timeout_ms: args.timeout_ms,
        max_grid_iterations: args.max_grid_iterations,
        rng_seed: args.seed,
        parallel_candidates: args.parallel,
        difficulty,
        ..SolverConfig::default()
    };
    config.validate()?;

    let word_list = WordList::load_file(
        &args.words,
        config.min_word_length,
        config.max_word_length,
        config.min_word_count(),
    )?;

    let theme_query = args.theme.as_ref().map(|theme| ThemeQuery {
        min_len: args.theme_length,
        max_len: args.theme_length,
        min_frequency: args.theme_min_frequency,
        ..ThemeQuery::new(theme.clone())
    });

    let source = match &args.template {
        Some(path) => GridSource::Template(Template::load(path)?),
        None => GridSource::Random,
    };

    let puzzle = solve(&word_list, &config, source, theme_query.as_ref(), None)?;

    if args.json {
        print_json(&puzzle)?;
    } else {
        print_text(&puzzle);
    }
    Ok(())
}

fn parse_difficulty(input: &str) -> Result<Difficulty, Error> {
    match input.to_ascii_lowercase().as_str() {
        "easy" => Ok(Difficulty::Easy),
        "medium" => Ok(Difficulty::Medium),
        "hard" => Ok(Difficulty::Hard),
        other => Err(Error::ConfigError(format!(
            "unknown difficulty {other:?} (expected easy, medium, or hard)"
        ))),
    }
}

fn print_text(puzzle: &FilledPuzzle) {
    println!("{}", puzzle.grid.render());
    println!();
    for (label, word) in &puzzle.filled_slots {
        let marker = if puzzle.theme_entries.contains_key(label) {
            " (theme)"
        } else {
            ""
        };
        println!("{label}: {word}{marker}");
    }
    println!();
    println!("{}", puzzle.statistics.summary());
}

fn print_json(puzzle: &FilledPuzzle) -> Result<(), Error> {
    let view = PuzzleView {
        grid: puzzle.grid.render().lines().map(str::to_string).collect(),
        filled_slots: &puzzle.filled_slots,
        theme_entries: &puzzle.theme_entries,
        statistics: &puzzle.statistics,
    };
    let rendered = serde_json::to_string_pretty(&view)
        .map_err(|err| Error::InternalInvariant(format!("failed to serialize puzzle: {err}")))?;
    println!("{rendered}");
    Ok(())
}
