//! The grid and slot model: cell storage, slot enumeration, crossings,
//! random grid generation, and JSON template input.
//!
//! Slot ids are assigned by a stable traversal (row-major across first, then
//! column-major down), and labels follow conventional crossword numbering
//! (`1A`, `3D`, ...) unless a template supplies explicit ids.

use log::warn;
use rand::rngs::SmallRng;
use rand::Rng;
use serde_derive::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::Error;
use crate::types::{Cell, Difficulty, Direction, SlotId};
use crate::word_list::Pattern;

/// A rectangular cell matrix. Geometry (which cells are blocks) is fixed
/// after construction; letters mutate during search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Grid {
    #[must_use]
    pub fn new_empty(width: usize, height: usize) -> Grid {
        Grid {
            width,
            height,
            cells: vec![Cell::Empty; width * height],
        }
    }

    /// Parse a grid from newline-separated rows of `#`, `.`, and optional
    /// pre-filled letters.
    pub fn from_template_string(input: &str) -> Result<Grid, Error> {
        let rows: Vec<&str> = input.trim().lines().map(str::trim).collect();
        if rows.is_empty() {
            return Err(Error::InvalidTemplate("grid has no rows".into()));
        }
        let width = rows[0].chars().count();
        if width == 0 {
            return Err(Error::InvalidTemplate("grid has empty rows".into()));
        }

        let mut cells = Vec::with_capacity(width * rows.len());
        for (row_idx, row) in rows.iter().enumerate() {
            if row.chars().count() != width {
                return Err(Error::InvalidTemplate(format!(
                    "row {row_idx} has {} cells, expected {width}",
                    row.chars().count()
                )));
            }
            for ch in row.chars() {
                let cell = Cell::from_template_char(ch).ok_or_else(|| {
                    Error::InvalidTemplate(format!("unexpected cell character {ch:?}"))
                })?;
                cells.push(cell);
            }
        }

        Ok(Grid {
            width,
            height: rows.len(),
            cells,
        })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.cells[self.index(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, cell: Cell) {
        let idx = self.index(row, col);
        self.cells[idx] = cell;
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[must_use]
    pub fn white_cell_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_white()).count()
    }

    /// Render the grid as newline-separated rows of `#`, `.`, and letters.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity((self.width + 1) * self.height);
        for row in 0..self.height {
            for col in 0..self.width {
                out.push(self.get(row, col).to_char());
            }
            if row + 1 < self.height {
                out.push('\n');
            }
        }
        out
    }

    fn in_bounds(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.height && (col as usize) < self.width
    }

    fn white_at(&self, row: isize, col: isize) -> bool {
        self.in_bounds(row, col) && self.get(row as usize, col as usize).is_white()
    }

    fn block_at(&self, row: isize, col: isize) -> bool {
        self.in_bounds(row, col) && !self.get(row as usize, col as usize).is_white()
    }

    /// Is (row, col) part of a fully black 2x2 square?
    #[must_use]
    fn in_two_by_two_block(&self, row: usize, col: usize) -> bool {
        let (row, col) = (row as isize, col as isize);
        for (dr, dc) in [(-1, -1), (-1, 1), (1, -1), (1, 1)] {
            if self.block_at(row, col)
                && self.block_at(row + dr, col)
                && self.block_at(row, col + dc)
                && self.block_at(row + dr, col + dc)
            {
                return true;
            }
        }
        false
    }

    /// A white cell with no white 4-neighbor (and at least one neighbor at
    /// all; a 1x1 grid is left alone).
    #[must_use]
    fn is_isolated_white(&self, row: usize, col: usize) -> bool {
        if !self.get(row, col).is_white() {
            return false;
        }
        let (row, col) = (row as isize, col as isize);
        let neighbors = [(row - 1, col), (row + 1, col), (row, col - 1), (row, col + 1)];
        let has_neighbor = neighbors.iter().any(|&(r, c)| self.in_bounds(r, c));
        has_neighbor && !neighbors.iter().any(|&(r, c)| self.white_at(r, c))
    }
}

/// R1 (no 2x2 block of black squares) and R2 (no isolated white cell) hold
/// everywhere, and the grid is non-empty.
#[must_use]
pub fn is_valid_grid(grid: &Grid) -> bool {
    if grid.width == 0 || grid.height == 0 {
        return false;
    }
    for row in 0..grid.height {
        for col in 0..grid.width {
            if grid.in_two_by_two_block(row, col) || grid.is_isolated_white(row, col) {
                return false;
            }
        }
    }
    true
}

/// Can an empty cell become a block without breaking R1/R2? Letter cells are
/// never eligible: they carry placed words.
#[must_use]
pub fn can_place_block(grid: &Grid, row: usize, col: usize) -> bool {
    if grid.get(row, col) != Cell::Empty {
        return false;
    }
    let mut probe = grid.clone();
    probe.set(row, col, Cell::Block);
    if probe.in_two_by_two_block(row, col) {
        return false;
    }
    let (row, col) = (row as isize, col as isize);
    for (r, c) in [(row - 1, col), (row + 1, col), (row, col - 1), (row, col + 1)] {
        if probe.in_bounds(r, c) && probe.is_isolated_white(r as usize, c as usize) {
            return false;
        }
    }
    true
}

/// Generate a random grid with roughly `ratio * width * height` black
/// squares placed with 180-degree rotational symmetry. Placement has a
/// bounded retry budget and returns whatever it achieved; an R2 cleanup runs
/// as a post-pass, reverting black pairs that isolated a white cell.
pub fn generate_random_grid(
    width: usize,
    height: usize,
    ratio: f64,
    rng: &mut SmallRng,
) -> Grid {
    let mut grid = Grid::new_empty(width, height);
    let mut target = (width as f64 * height as f64 * ratio) as usize;

    if width % 2 == 1 && height % 2 == 1 && target > 0 {
        grid.set(height / 2, width / 2, Cell::Block);
        target -= 1;
    }

    let mut placed = 0usize;
    let mut attempts = 0usize;
    let max_attempts = width * height * 5;

    while placed < target && attempts < max_attempts {
        attempts += 1;
        let row = rng.gen_range(0..height);
        let col = rng.gen_range(0..width);
        if grid.get(row, col) != Cell::Empty {
            continue;
        }

        let sym = (height - 1 - row, width - 1 - col);
        grid.set(row, col, Cell::Block);
        grid.set(sym.0, sym.1, Cell::Block);

        if grid.in_two_by_two_block(row, col) || grid.in_two_by_two_block(sym.0, sym.1) {
            grid.set(row, col, Cell::Empty);
            grid.set(sym.0, sym.1, Cell::Empty);
            continue;
        }

        placed += if (row, col) == sym { 1 } else { 2 };
    }

    if placed < target {
        warn!("placed {placed} of {target} black squares before the budget ran out");
    }

    // R2 cleanup: reverting the pair that walled a cell in can't break R1,
    // so this always terminates with a valid grid.
    for _ in 0..width * height {
        let isolated = (0..height)
            .flat_map(|r| (0..width).map(move |c| (r, c)))
            .find(|&(r, c)| grid.is_isolated_white(r, c));
        let Some((row, col)) = isolated else {
            break;
        };
        let (row, col) = (row as isize, col as isize);
        let neighbor = [(row - 1, col), (row + 1, col), (row, col - 1), (row, col + 1)]
            .into_iter()
            .find(|&(r, c)| grid.block_at(r, c));
        let Some((r, c)) = neighbor else {
            break;
        };
        let (r, c) = (r as usize, c as usize);
        grid.set(r, c, Cell::Empty);
        grid.set(height - 1 - r, width - 1 - c, Cell::Empty);
    }

    grid
}

/// An oriented run of white cells of length >= the minimum word length.
#[derive(Debug, Clone, Serialize)]
pub struct SlotConfig {
    pub id: SlotId,
    pub label: String,
    pub direction: Direction,
    pub row: usize,
    pub col: usize,
    pub length: usize,
    #[serde(skip)]
    pub cells: SmallVec<[(usize, usize); 16]>,
}

/// One decided assignment: this word goes into this slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub slot_id: SlotId,
    pub word_id: crate::types::WordId,
}

/// One shared cell between two slots, seen from one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub other_slot_id: SlotId,
    /// Index of the shared cell within this slot.
    pub pos_in_self: usize,
    /// Index of the shared cell within the other slot.
    pub pos_in_other: usize,
}

/// Undo record for one placement: the affected cell indices with their
/// pre-placement values, so undoing restores the grid exactly.
#[derive(Debug, Clone)]
pub struct PlacementUndo {
    cells: SmallVec<[(usize, Cell); 16]>,
}

/// A grid plus its enumerated slots and per-direction cell membership maps.
/// The slot set is immutable for the lifetime of a solve attempt.
#[derive(Debug, Clone)]
pub struct GridConfig {
    pub grid: Grid,
    pub slot_configs: Vec<SlotConfig>,
    across_at: Vec<Option<(SlotId, usize)>>,
    down_at: Vec<Option<(SlotId, usize)>>,
}

impl GridConfig {
    /// Enumerate slots and build the membership maps. Runs shorter than
    /// `min_word_length` are discarded.
    #[must_use]
    pub fn new(grid: Grid, min_word_length: usize) -> GridConfig {
        let mut slot_configs: Vec<SlotConfig> = Vec::new();

        for row in 0..grid.height() {
            let mut start: Option<usize> = None;
            for col in 0..=grid.width() {
                let white = col < grid.width() && grid.get(row, col).is_white();
                if white {
                    start.get_or_insert(col);
                } else if let Some(begin) = start.take() {
                    let length = col - begin;
                    if length >= min_word_length {
                        push_slot(&mut slot_configs, Direction::Across, row, begin, length);
                    }
                }
            }
        }

        for col in 0..grid.width() {
            let mut start: Option<usize> = None;
            for row in 0..=grid.height() {
                let white = row < grid.height() && grid.get(row, col).is_white();
                if white {
                    start.get_or_insert(row);
                } else if let Some(begin) = start.take() {
                    let length = row - begin;
                    if length >= min_word_length {
                        push_slot(&mut slot_configs, Direction::Down, begin, col, length);
                    }
                }
            }
        }

        assign_numbered_labels(&mut slot_configs);

        let mut across_at = vec![None; grid.width() * grid.height()];
        let mut down_at = vec![None; grid.width() * grid.height()];
        for slot in &slot_configs {
            let map = match slot.direction {
                Direction::Across => &mut across_at,
                Direction::Down => &mut down_at,
            };
            for (pos, &(row, col)) in slot.cells.iter().enumerate() {
                map[grid.index(row, col)] = Some((slot.id, pos));
            }
        }

        GridConfig {
            grid,
            slot_configs,
            across_at,
            down_at,
        }
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_configs.len()
    }

    /// The slot covering (row, col) in the given direction, with the cell's
    /// position inside it.
    #[must_use]
    pub fn slot_containing(
        &self,
        row: usize,
        col: usize,
        direction: Direction,
    ) -> Option<(SlotId, usize)> {
        let map = match direction {
            Direction::Across => &self.across_at,
            Direction::Down => &self.down_at,
        };
        map[self.grid.index(row, col)]
    }

    /// Slots intersecting the given slot, computed on demand.
    #[must_use]
    pub fn crossings(&self, slot_id: SlotId) -> Vec<Crossing> {
        let slot = &self.slot_configs[slot_id];
        let other_direction = match slot.direction {
            Direction::Across => Direction::Down,
            Direction::Down => Direction::Across,
        };
        slot.cells
            .iter()
            .enumerate()
            .filter_map(|(pos_in_self, &(row, col))| {
                self.slot_containing(row, col, other_direction).map(
                    |(other_slot_id, pos_in_other)| Crossing {
                        other_slot_id,
                        pos_in_self,
                        pos_in_other,
                    },
                )
            })
            .collect()
    }

    /// Every white cell belongs to at least one slot, so a complete
    /// assignment puts a letter in every white cell. Cells stranded in runs
    /// shorter than the minimum word length make this false.
    #[must_use]
    pub fn fully_covered(&self) -> bool {
        for row in 0..self.grid.height() {
            for col in 0..self.grid.width() {
                if self.grid.get(row, col).is_white()
                    && self.slot_containing(row, col, Direction::Across).is_none()
                    && self.slot_containing(row, col, Direction::Down).is_none()
                {
                    return false;
                }
            }
        }
        true
    }

    /// Derive a slot's constraint pattern from the given grid state.
    #[must_use]
    pub fn pattern_in(&self, grid: &Grid, slot_id: SlotId) -> Pattern {
        let slot = &self.slot_configs[slot_id];
        Pattern::from_bytes(slot.cells.iter().map(|&(row, col)| {
            grid.get(row, col).letter().unwrap_or(crate::word_list::WILDCARD)
        }))
    }

    /// Write a word into the slot's cells, returning the exact-restore undo
    /// record. The word length must equal the slot length.
    #[must_use]
    pub fn place_in(&self, grid: &mut Grid, slot_id: SlotId, word: &str) -> PlacementUndo {
        let slot = &self.slot_configs[slot_id];
        debug_assert_eq!(word.len(), slot.length);
        let mut cells = SmallVec::with_capacity(slot.length);
        for (&(row, col), &byte) in slot.cells.iter().zip(word.as_bytes()) {
            let idx = grid.index(row, col);
            cells.push((idx, grid.cells[idx]));
            grid.cells[idx] = Cell::Letter(byte);
        }
        PlacementUndo { cells }
    }

    pub fn undo_in(&self, grid: &mut Grid, undo: &PlacementUndo) {
        for &(idx, prev) in undo.cells.iter().rev() {
            grid.cells[idx] = prev;
        }
    }

    /// Find the enumerated slot with this exact geometry.
    #[must_use]
    pub fn find_slot(
        &self,
        direction: Direction,
        row: usize,
        col: usize,
        length: usize,
    ) -> Option<SlotId> {
        self.slot_configs
            .iter()
            .find(|slot| {
                slot.direction == direction
                    && slot.row == row
                    && slot.col == col
                    && slot.length == length
            })
            .map(|slot| slot.id)
    }
}

fn push_slot(
    slot_configs: &mut Vec<SlotConfig>,
    direction: Direction,
    row: usize,
    col: usize,
    length: usize,
) {
    let (dr, dc) = direction.delta();
    let cells: SmallVec<[(usize, usize); 16]> = (0..length)
        .map(|i| (row + dr * i, col + dc * i))
        .collect();
    slot_configs.push(SlotConfig {
        id: slot_configs.len(),
        label: String::new(),
        direction,
        row,
        col,
        length,
        cells,
    });
}

/// Conventional crossword numbering: scan start cells row-major, give each
/// distinct start cell the next number, and label slots `<number><A|D>`.
fn assign_numbered_labels(slot_configs: &mut [SlotConfig]) {
    let mut starts: Vec<(usize, usize)> = slot_configs
        .iter()
        .map(|slot| (slot.row, slot.col))
        .collect();
    starts.sort_unstable();
    starts.dedup();

    let numbers: HashMap<(usize, usize), usize> = starts
        .into_iter()
        .enumerate()
        .map(|(idx, cell)| (cell, idx + 1))
        .collect();

    for slot in slot_configs.iter_mut() {
        let number = numbers[&(slot.row, slot.col)];
        slot.label = format!("{number}{}", slot.direction);
    }
}

/// A declared slot in a JSON template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSlot {
    pub id: String,
    pub direction: Direction,
    pub row: usize,
    pub col: usize,
    pub length: usize,
    #[serde(default)]
    pub cells: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateMetadata {
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// External template input: the grid rows plus declared slots, optional
/// theme slot ids, and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub grid: Vec<String>,
    #[serde(default)]
    pub slots: Vec<TemplateSlot>,
    #[serde(default)]
    pub theme_slot_ids: Vec<String>,
    #[serde(default)]
    pub metadata: TemplateMetadata,
}

/// A template validated against its own grid, ready for the solver.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    pub grid_config: GridConfig,
    pub theme_slot_ids: Vec<SlotId>,
    pub difficulty: Option<Difficulty>,
}

impl Template {
    pub fn from_json(input: &str) -> Result<Template, Error> {
        serde_json::from_str(input)
            .map_err(|err| Error::InvalidTemplate(format!("malformed template JSON: {err}")))
    }

    pub fn load(path: &Path) -> Result<Template, Error> {
        let contents = fs::read_to_string(path)
            .map_err(|err| Error::InvalidTemplate(format!("{}: {err}", path.display())))?;
        Template::from_json(&contents)
    }

    /// Validate the declared slots against enumeration and resolve theme
    /// slot ids. Declared slots must exactly match enumerated geometry;
    /// enumerated slots the template doesn't declare keep their numbered
    /// labels.
    pub fn compile(&self, min_word_length: usize) -> Result<CompiledTemplate, Error> {
        let grid = Grid::from_template_string(&self.grid.join("\n"))?;
        let mut grid_config = GridConfig::new(grid, min_word_length);

        let mut label_by_slot: HashMap<SlotId, String> = HashMap::new();
        for declared in &self.slots {
            let slot_id = grid_config
                .find_slot(declared.direction, declared.row, declared.col, declared.length)
                .ok_or_else(|| {
                    Error::InvalidTemplate(format!(
                        "declared slot {:?} does not match any run of white cells",
                        declared.id
                    ))
                })?;
            if !declared.cells.is_empty()
                && declared.cells.as_slice() != grid_config.slot_configs[slot_id].cells.as_slice()
            {
                return Err(Error::InvalidTemplate(format!(
                    "declared slot {:?} lists cells inconsistent with its geometry",
                    declared.id
                )));
            }
            if label_by_slot.insert(slot_id, declared.id.clone()).is_some() {
                return Err(Error::InvalidTemplate(format!(
                    "slot {:?} is declared twice",
                    declared.id
                )));
            }
        }
        for (slot_id, label) in label_by_slot {
            grid_config.slot_configs[slot_id].label = label;
        }

        let mut theme_slot_ids = Vec::with_capacity(self.theme_slot_ids.len());
        for theme_id in &self.theme_slot_ids {
            let slot_id = grid_config
                .slot_configs
                .iter()
                .find(|slot| &slot.label == theme_id)
                .map(|slot| slot.id)
                .ok_or_else(|| {
                    Error::InvalidTemplate(format!("unknown theme slot id {theme_id:?}"))
                })?;
            theme_slot_ids.push(slot_id);
        }

        Ok(CompiledTemplate {
            grid_config,
            theme_slot_ids,
            difficulty: self.metadata.difficulty,
        })
    }
}

/// A collection of templates, typically one JSON file holding a library of
/// grids at assorted difficulties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSet {
    pub templates: Vec<Template>,
}

impl TemplateSet {
    pub fn from_json(input: &str) -> Result<TemplateSet, Error> {
        serde_json::from_str(input)
            .map_err(|err| Error::InvalidTemplate(format!("malformed template set JSON: {err}")))
    }

    pub fn load(path: &Path) -> Result<TemplateSet, Error> {
        let contents = fs::read_to_string(path)
            .map_err(|err| Error::InvalidTemplate(format!("{}: {err}", path.display())))?;
        TemplateSet::from_json(&contents)
    }

    /// Pick a template by name, or at random among those matching the
    /// difficulty filter.
    pub fn select(
        &self,
        name: Option<&str>,
        difficulty: Option<Difficulty>,
        rng: &mut SmallRng,
    ) -> Result<&Template, Error> {
        if let Some(name) = name {
            return self
                .templates
                .iter()
                .find(|template| template.metadata.name == name)
                .ok_or_else(|| Error::InvalidTemplate(format!("template {name:?} not found")));
        }

        let eligible: Vec<&Template> = self
            .templates
            .iter()
            .filter(|template| {
                difficulty.map_or(true, |wanted| template.metadata.difficulty == Some(wanted))
            })
            .collect();
        if eligible.is_empty() {
            return Err(Error::InvalidTemplate(
                "no template matches the requested difficulty".into(),
            ));
        }
        Ok(eligible[rng.gen_range(0..eligible.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::{
        can_place_block, generate_random_grid, is_valid_grid, Grid, GridConfig, Template,
        TemplateSet,
    };
    use crate::types::{Cell, Direction};
    use indoc::indoc;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn config_for(template: &str) -> GridConfig {
        GridConfig::new(Grid::from_template_string(template).unwrap(), 3)
    }

    #[test]
    fn test_template_string_round_trip() {
        let grid = Grid::from_template_string("..#\n.a.\n#..").unwrap();
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.get(1, 1), Cell::Letter(b'A'));
        assert_eq!(grid.get(0, 2), Cell::Block);
        assert_eq!(grid.render(), "..#\n.A.\n#..");
    }

    #[test]
    fn test_uneven_rows_rejected() {
        assert!(Grid::from_template_string("...\n..").is_err());
        assert!(Grid::from_template_string("..!\n...").is_err());
    }

    #[test]
    fn test_slot_enumeration_and_ids() {
        let config = config_for(indoc! {"
            ...
            .#.
            ...
        "});
        // Two across runs of 3 (rows 0 and 2), two down runs (cols 0 and 2);
        // the center row/column runs are too short.
        assert_eq!(config.slot_count(), 4);
        assert_eq!(config.slot_configs[0].direction, Direction::Across);
        assert_eq!(config.slot_configs[0].row, 0);
        assert_eq!(config.slot_configs[1].row, 2);
        assert_eq!(config.slot_configs[2].direction, Direction::Down);
        assert_eq!(config.slot_configs[2].col, 0);
        assert_eq!(config.slot_configs[3].col, 2);
    }

    #[test]
    fn test_numbered_labels() {
        let config = config_for(indoc! {"
            ...
            .#.
            ...
        "});
        let labels: Vec<&str> = config
            .slot_configs
            .iter()
            .map(|slot| slot.label.as_str())
            .collect();
        // Start cells in row-major order: (0,0) -> 1, (0,2) -> 2, (2,0) -> 3.
        assert_eq!(labels, vec!["1A", "3A", "1D", "2D"]);
    }

    #[test]
    fn test_crossings() {
        let config = config_for(indoc! {"
            ...
            .#.
            ...
        "});
        let top_across = config.find_slot(Direction::Across, 0, 0, 3).unwrap();
        let crossings = config.crossings(top_across);
        assert_eq!(crossings.len(), 2);
        assert!(crossings
            .iter()
            .all(|crossing| crossing.pos_in_other == 0 && (crossing.pos_in_self % 2 == 0)));
    }

    #[test]
    fn test_fully_covered() {
        let open = config_for("...\n...\n...");
        assert!(open.fully_covered());

        // A center block leaves the edge midpoints covered in only one
        // direction, which is still a complete cover.
        assert!(config_for("...\n.#.\n...").fully_covered());

        // The corner white at (3,3) is in no run of length >= 3.
        let stranded = config_for(indoc! {"
            ...#
            ...#
            ...#
            ###.
        "});
        assert!(!stranded.fully_covered());
    }

    #[test]
    fn test_pattern_place_undo_round_trip() {
        let config = config_for("...\n...\n...");
        let slot = config.find_slot(Direction::Across, 1, 0, 3).unwrap();
        let before = config.grid.clone();

        assert_eq!(config.pattern_in(&config.grid, slot).to_string(), "...");

        let mut grid = config.grid.clone();
        let undo = config.place_in(&mut grid, slot, "CAT");
        assert_eq!(config.pattern_in(&grid, slot).to_string(), "CAT");

        let down = config.find_slot(Direction::Down, 0, 1, 3).unwrap();
        assert_eq!(config.pattern_in(&grid, down).to_string(), ".A.");

        config.undo_in(&mut grid, &undo);
        assert_eq!(grid, before);
    }

    #[test]
    fn test_undo_preserves_letters_from_other_words() {
        let config = config_for("...\n...\n...");
        let across = config.find_slot(Direction::Across, 0, 0, 3).unwrap();
        let down = config.find_slot(Direction::Down, 0, 0, 3).unwrap();

        let mut grid = config.grid.clone();
        let _across_undo = config.place_in(&mut grid, across, "CAT");
        let down_undo = config.place_in(&mut grid, down, "CAR");
        config.undo_in(&mut grid, &down_undo);

        // The shared corner letter written by the across word survives.
        assert_eq!(grid.get(0, 0), Cell::Letter(b'C'));
        assert_eq!(grid.get(1, 0), Cell::Empty);
        assert_eq!(grid.get(2, 0), Cell::Empty);
    }

    #[test]
    fn test_random_grid_rules() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..10 {
            let grid = generate_random_grid(9, 9, 0.2, &mut rng);
            assert!(is_valid_grid(&grid), "grid violates R1/R2:\n{}", grid.render());
            // 180-degree symmetry of the black pattern.
            for row in 0..9 {
                for col in 0..9 {
                    assert_eq!(
                        grid.get(row, col).is_white(),
                        grid.get(8 - row, 8 - col).is_white()
                    );
                }
            }
        }
    }

    #[test]
    fn test_random_grid_is_deterministic_per_seed() {
        let grid_a = generate_random_grid(7, 7, 0.2, &mut SmallRng::seed_from_u64(11));
        let grid_b = generate_random_grid(7, 7, 0.2, &mut SmallRng::seed_from_u64(11));
        assert_eq!(grid_a, grid_b);
    }

    #[test]
    fn test_can_place_block() {
        let grid = Grid::from_template_string(indoc! {"
            .....
            .....
            .....
        "})
        .unwrap();
        assert!(can_place_block(&grid, 1, 2));

        let cornered = Grid::from_template_string(indoc! {"
            .#...
            .....
            .....
        "})
        .unwrap();
        // Blocking (1,0) would isolate the corner white at (0,0).
        assert!(!can_place_block(&cornered, 1, 0));

        let lettered = Grid::from_template_string("a....\n.....\n.....").unwrap();
        assert!(!can_place_block(&lettered, 0, 0));
    }

    #[test]
    fn test_template_compile_and_theme_ids() {
        let template = Template::from_json(
            r#"{
                "grid": ["...", "...", "..."],
                "slots": [
                    {"id": "top", "direction": "A", "row": 0, "col": 0, "length": 3},
                    {"id": "left", "direction": "D", "row": 0, "col": 0, "length": 3,
                     "cells": [[0, 0], [1, 0], [2, 0]]}
                ],
                "theme_slot_ids": ["top"],
                "metadata": {"difficulty": "easy", "name": "tiny"}
            }"#,
        )
        .unwrap();

        let compiled = template.compile(3).unwrap();
        assert_eq!(compiled.grid_config.slot_count(), 6);
        assert_eq!(compiled.theme_slot_ids.len(), 1);
        let theme_slot = &compiled.grid_config.slot_configs[compiled.theme_slot_ids[0]];
        assert_eq!(theme_slot.label, "top");
        assert_eq!(theme_slot.direction, Direction::Across);
    }

    #[test]
    fn test_template_set_selection() {
        let set = TemplateSet::from_json(
            r#"{
                "templates": [
                    {"grid": ["...", "...", "..."],
                     "metadata": {"difficulty": "easy", "name": "open"}},
                    {"grid": ["...", ".#.", "..."],
                     "metadata": {"difficulty": "hard", "name": "donut"}}
                ]
            }"#,
        )
        .unwrap();

        let mut rng = SmallRng::seed_from_u64(0);
        let by_name = set.select(Some("donut"), None, &mut rng).unwrap();
        assert_eq!(by_name.metadata.name, "donut");

        let by_difficulty = set
            .select(None, Some(crate::types::Difficulty::Easy), &mut rng)
            .unwrap();
        assert_eq!(by_difficulty.metadata.name, "open");

        assert!(set.select(Some("missing"), None, &mut rng).is_err());
        assert!(set
            .select(None, Some(crate::types::Difficulty::Medium), &mut rng)
            .is_err());
    }

    #[test]
    fn test_template_compile_rejects_bad_slots() {
        let bad_geometry = Template::from_json(
            r#"{
                "grid": ["..#", "...", "..."],
                "slots": [{"id": "x", "direction": "A", "row": 0, "col": 0, "length": 3}]
            }"#,
        )
        .unwrap();
        assert!(bad_geometry.compile(3).is_err());

        let bad_theme = Template::from_json(
            r#"{"grid": ["...", "...", "..."], "theme_slot_ids": ["nope"]}"#,
        )
        .unwrap();
        assert!(bad_theme.compile(3).is_err());
    }
}
