//! Sudoku board model: validated positions and digits, the 81-cell grid,
//! and the per-session [`BoardState`] holding givens, the live board and
//! the local undo history.
//!
//! [`BoardState::apply_edit`] is the single mutation entry point for every
//! source (local writes, event stream, log polling). It is value-idempotent,
//! so replaying an edit that is already reflected on the board is harmless.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const SIDE: usize = 9;
pub const CELL_COUNT: usize = SIDE * SIDE;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("position {0} is outside the board (0..=80)")]
    PositionOutOfRange(u32),
    #[error("digit {0} is outside 1..=9")]
    DigitOutOfRange(u32),
    #[error("board text must hold {CELL_COUNT} cells, found {0}")]
    WrongLength(usize),
    #[error("unexpected character {0:?} in board text")]
    InvalidCharacter(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(u8);

impl Position {
    pub fn new(index: u32) -> Result<Self, BoardError> {
        if (index as usize) < CELL_COUNT {
            Ok(Self(index as u8))
        } else {
            Err(BoardError::PositionOutOfRange(index))
        }
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn row(self) -> usize {
        self.index() / SIDE
    }

    pub fn col(self) -> usize {
        self.index() % SIDE
    }

    pub fn block(self) -> usize {
        (self.row() / 3) * 3 + self.col() / 3
    }

    pub fn all() -> impl Iterator<Item = Position> {
        (0..CELL_COUNT as u8).map(Position)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digit(u8);

impl Digit {
    pub fn new(value: u32) -> Result<Self, BoardError> {
        if (1..=9).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(BoardError::DigitOutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `None` is an empty cell.
pub type Cell = Option<Digit>;

/// Decodes the wire convention where `0` means empty.
pub fn cell_from_wire(value: u32) -> Result<Cell, BoardError> {
    if value == 0 {
        Ok(None)
    } else {
        Digit::new(value).map(Some)
    }
}

pub fn cell_to_wire(cell: Cell) -> u8 {
    cell.map(Digit::get).unwrap_or(0)
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Board {
    cells: [Cell; CELL_COUNT],
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

impl Board {
    pub fn empty() -> Self {
        Self {
            cells: [None; CELL_COUNT],
        }
    }

    /// Builds a board from `(position, digit)` pairs as published by the
    /// game service.
    pub fn from_givens(givens: &[(u8, u8)]) -> Result<Self, BoardError> {
        let mut board = Self::empty();
        for &(position, digit) in givens {
            let position = Position::new(position as u32)?;
            board.set(position, cell_from_wire(digit as u32)?);
        }
        Ok(board)
    }

    pub fn givens(&self) -> Vec<(u8, u8)> {
        Position::all()
            .filter_map(|pos| self.get(pos).map(|digit| (pos.index() as u8, digit.get())))
            .collect()
    }

    pub fn get(&self, position: Position) -> Cell {
        self.cells[position.index()]
    }

    pub fn set(&mut self, position: Position, cell: Cell) {
        self.cells[position.index()] = cell;
    }

    pub fn cells(&self) -> &[Cell; CELL_COUNT] {
        &self.cells
    }

    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Whether `digit` can go at `position` without repeating in its row,
    /// column or block. The cell itself is ignored.
    pub fn allows(&self, position: Position, digit: Digit) -> bool {
        Position::all().all(|other| {
            other == position
                || !(other.row() == position.row()
                    || other.col() == position.col()
                    || other.block() == position.block())
                || self.get(other) != Some(digit)
        })
    }

    /// Complete, and every row, column and block holds 1..=9 exactly once.
    pub fn is_valid_solution(&self) -> bool {
        if !self.is_complete() {
            return false;
        }
        let mut rows = [0u16; SIDE];
        let mut cols = [0u16; SIDE];
        let mut blocks = [0u16; SIDE];
        for position in Position::all() {
            let Some(digit) = self.get(position) else {
                return false;
            };
            let bit = 1u16 << digit.get();
            if rows[position.row()] & bit != 0
                || cols[position.col()] & bit != 0
                || blocks[position.block()] & bit != 0
            {
                return false;
            }
            rows[position.row()] |= bit;
            cols[position.col()] |= bit;
            blocks[position.block()] |= bit;
        }
        true
    }
}

impl FromStr for Board {
    type Err = BoardError;

    /// Accepts 81 cells of `1`-`9`, with `0` or `.` for empty. Whitespace is
    /// ignored so multi-line grids parse too.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let symbols: Vec<char> = text.chars().filter(|ch| !ch.is_whitespace()).collect();
        if symbols.len() != CELL_COUNT {
            return Err(BoardError::WrongLength(symbols.len()));
        }
        let mut board = Board::empty();
        for (index, symbol) in symbols.into_iter().enumerate() {
            let cell = match symbol {
                '0' | '.' => None,
                '1'..='9' => Some(Digit(symbol as u8 - b'0')),
                other => return Err(BoardError::InvalidCharacter(other)),
            };
            board.cells[index] = cell;
        }
        Ok(board)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cell in &self.cells {
            match cell {
                Some(digit) => write!(f, "{digit}")?,
                None => f.write_str(".")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEdit {
    pub position: Position,
    pub value: Cell,
    pub editor_id: String,
    pub editor_name: String,
}

impl CellEdit {
    pub fn new(
        position: Position,
        value: Cell,
        editor_id: impl Into<String>,
        editor_name: impl Into<String>,
    ) -> Self {
        Self {
            position,
            value,
            editor_id: editor_id.into(),
            editor_name: editor_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    SkippedGiven,
    SkippedEqual,
}

#[derive(Debug, Clone)]
struct Snapshot {
    board: Board,
    editors: Vec<Option<String>>,
}

/// Givens, the live board, who last wrote each cell, and the undo stack.
#[derive(Debug, Clone)]
pub struct BoardState {
    initial: Board,
    current: Board,
    editors: Vec<Option<String>>,
    history: Vec<Snapshot>,
}

impl BoardState {
    pub fn new(initial: Board) -> Self {
        Self {
            current: initial.clone(),
            initial,
            editors: vec![None; CELL_COUNT],
            history: Vec::new(),
        }
    }

    pub fn initial(&self) -> &Board {
        &self.initial
    }

    pub fn current(&self) -> &Board {
        &self.current
    }

    pub fn is_given(&self, position: Position) -> bool {
        self.initial.get(position).is_some()
    }

    pub fn editor_of(&self, position: Position) -> Option<&str> {
        self.editors[position.index()].as_deref()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn apply_edit(&mut self, edit: &CellEdit) -> WriteOutcome {
        let position = edit.position;
        if self.is_given(position) {
            return WriteOutcome::SkippedGiven;
        }
        if self.current.get(position) == edit.value {
            return WriteOutcome::SkippedEqual;
        }
        self.history.push(Snapshot {
            board: self.current.clone(),
            editors: self.editors.clone(),
        });
        self.current.set(position, edit.value);
        self.editors[position.index()] = edit.value.map(|_| edit.editor_id.clone());
        WriteOutcome::Written
    }

    /// Restores the board as it was before the latest accepted edit.
    pub fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(snapshot) => {
                self.current = snapshot.board;
                self.editors = snapshot.editors;
                true
            }
            None => false,
        }
    }

    /// Non-given filled cells per last editor.
    pub fn contributions(&self) -> BTreeMap<String, u32> {
        let mut counts = BTreeMap::new();
        for position in Position::all() {
            if self.is_given(position) || self.current.get(position).is_none() {
                continue;
            }
            if let Some(editor) = self.editor_of(position) {
                *counts.entry(editor.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Values of the non-given cells in row-major order, `0` for empty.
    pub fn answer(&self) -> Vec<u8> {
        Position::all()
            .filter(|pos| !self.is_given(*pos))
            .map(|pos| cell_to_wire(self.current.get(pos)))
            .collect()
    }
}
