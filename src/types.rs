//! Core identifier and cell types shared across the crate.

use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// The index of a word within the `WordList` arena.
pub type WordId = usize;

/// The index of a slot within a `GridConfig`'s slot list.
pub type SlotId = usize;

/// A single cell of the grid. Geometry (`Block` vs. white) is fixed for the
/// lifetime of a solve attempt; only `Empty` ⇄ `Letter` transitions happen
/// during search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    /// A black square, excluded from word placement.
    Block,
    /// A white square with no letter assigned yet.
    Empty,
    /// A white square holding an uppercase ASCII letter.
    Letter(u8),
}

impl Cell {
    #[must_use]
    pub fn is_white(self) -> bool {
        !matches!(self, Cell::Block)
    }

    #[must_use]
    pub fn letter(self) -> Option<u8> {
        match self {
            Cell::Letter(b) => Some(b),
            _ => None,
        }
    }

    /// Parse a template character: `#` is a block, `.` is empty, and an
    /// ASCII letter is a pre-filled cell.
    #[must_use]
    pub fn from_template_char(ch: char) -> Option<Cell> {
        match ch {
            '#' => Some(Cell::Block),
            '.' => Some(Cell::Empty),
            ch if ch.is_ascii_alphabetic() => Some(Cell::Letter(ch.to_ascii_uppercase() as u8)),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_char(self) -> char {
        match self {
            Cell::Block => '#',
            Cell::Empty => '.',
            Cell::Letter(b) => b as char,
        }
    }
}

/// Orientation of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "A", alias = "across")]
    Across,
    #[serde(rename = "D", alias = "down")]
    Down,
}

impl Direction {
    /// Unit step as (row delta, col delta).
    #[must_use]
    pub fn delta(self) -> (usize, usize) {
        match self {
            Direction::Across => (0, 1),
            Direction::Down => (1, 0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Across => write!(f, "A"),
            Direction::Down => write!(f, "D"),
        }
    }
}

/// Difficulty level, selecting the corpus frequency cutoff and the candidate
/// frequency weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}
