//! Puzzle generation and solving for battle creators. Generated puzzles
//! always have exactly one solution, which becomes the solved reference.

use clap::ValueEnum;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::board::{Board, CELL_COUNT, Digit, Position, SIDE};

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    fn target_givens(self) -> usize {
        match self {
            Difficulty::Easy => 40,
            Difficulty::Medium => 32,
            Difficulty::Hard => 26,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Puzzle {
    pub initial: Board,
    pub solution: Board,
}

const ALL_DIGITS: u16 = 0b11_1111_1110;

struct Grid {
    cells: [u8; CELL_COUNT],
    rows: [u16; SIDE],
    cols: [u16; SIDE],
    blocks: [u16; SIDE],
}

impl Grid {
    fn empty() -> Self {
        Grid {
            cells: [0; CELL_COUNT],
            rows: [0; SIDE],
            cols: [0; SIDE],
            blocks: [0; SIDE],
        }
    }

    fn from_board(board: &Board) -> Option<Self> {
        let mut grid = Grid::empty();
        for position in Position::all() {
            if let Some(digit) = board.get(position) {
                if grid.free(position) & (1u16 << digit.get()) == 0 {
                    return None;
                }
                grid.place(position, digit.get());
            }
        }
        Some(grid)
    }

    fn free(&self, position: Position) -> u16 {
        !(self.rows[position.row()] | self.cols[position.col()] | self.blocks[position.block()])
            & ALL_DIGITS
    }

    fn place(&mut self, position: Position, digit: u8) {
        let bit = 1u16 << digit;
        self.cells[position.index()] = digit;
        self.rows[position.row()] |= bit;
        self.cols[position.col()] |= bit;
        self.blocks[position.block()] |= bit;
    }

    fn clear(&mut self, position: Position, digit: u8) {
        let bit = !(1u16 << digit);
        self.cells[position.index()] = 0;
        self.rows[position.row()] &= bit;
        self.cols[position.col()] &= bit;
        self.blocks[position.block()] &= bit;
    }

    /// Empty cell with the fewest candidates; `None` once the grid is full.
    fn most_constrained(&self) -> Option<(Position, u16)> {
        let mut best: Option<(Position, u16)> = None;
        for position in Position::all() {
            if self.cells[position.index()] != 0 {
                continue;
            }
            let free = self.free(position);
            if best.is_none_or(|(_, current)| free.count_ones() < current.count_ones()) {
                best = Some((position, free));
                if free.count_ones() <= 1 {
                    break;
                }
            }
        }
        best
    }

    fn to_board(&self) -> Board {
        let mut board = Board::empty();
        for position in Position::all() {
            let value = self.cells[position.index()];
            if value != 0 {
                board.set(position, Digit::new(value as u32).ok());
            }
        }
        board
    }

    fn count(&mut self, limit: usize, found: &mut usize, first: &mut Option<Board>) {
        let Some((position, free)) = self.most_constrained() else {
            *found += 1;
            if first.is_none() {
                *first = Some(self.to_board());
            }
            return;
        };
        for digit in 1..=9u8 {
            if free & (1u16 << digit) == 0 {
                continue;
            }
            self.place(position, digit);
            self.count(limit, found, first);
            self.clear(position, digit);
            if *found >= limit {
                return;
            }
        }
    }

    fn fill_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let Some((position, free)) = self.most_constrained() else {
            return true;
        };
        let mut digits: Vec<u8> = (1..=9).filter(|&digit| free & (1u16 << digit) != 0).collect();
        digits.shuffle(rng);
        for digit in digits {
            self.place(position, digit);
            if self.fill_random(rng) {
                return true;
            }
            self.clear(position, digit);
        }
        false
    }
}

/// Number of solutions of `board`, counting no further than `limit`.
pub fn count_solutions(board: &Board, limit: usize) -> usize {
    let Some(mut grid) = Grid::from_board(board) else {
        return 0;
    };
    let mut found = 0;
    let mut first = None;
    grid.count(limit.max(1), &mut found, &mut first);
    found
}

pub fn solve(board: &Board) -> Option<Board> {
    let mut grid = Grid::from_board(board)?;
    let mut found = 0;
    let mut first = None;
    grid.count(1, &mut found, &mut first);
    first
}

pub fn generate<R: Rng + ?Sized>(difficulty: Difficulty, rng: &mut R) -> Puzzle {
    let mut grid = Grid::empty();
    grid.fill_random(rng);
    let solution = grid.to_board();

    let mut initial = solution.clone();
    let mut order: Vec<Position> = Position::all().collect();
    order.shuffle(rng);
    let target = difficulty.target_givens();
    for position in order {
        if initial.filled() <= target {
            break;
        }
        let removed = initial.get(position);
        initial.set(position, None);
        if count_solutions(&initial, 2) != 1 {
            initial.set(position, removed);
        }
    }
    Puzzle { initial, solution }
}
