//! Tic-Tac-Toe board and opponent move selection

use crate::error::GameError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    /// The user
    X,
    /// The persona
    O,
}

impl Mark {
    pub fn opponent(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mark::X => "X",
            Mark::O => "O",
        })
    }
}

pub const USER_MARK: Mark = Mark::X;
pub const AGENT_MARK: Mark = Mark::O;

const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    InProgress,
    Won(Mark),
    Draw,
}

/// Who could complete a line with their next mark
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardAnalysis {
    pub agent_winning_cells: Vec<usize>,
    pub user_winning_cells: Vec<usize>,
}

impl BoardAnalysis {
    pub fn describe(&self) -> &'static str {
        match (self.agent_winning_cells.is_empty(), self.user_winning_cells.is_empty()) {
            (false, false) => "Both you and the user can win the game with the next move.",
            (true, false) => "The user can win the game with the next move.",
            (false, true) => "You can win the game with the next move.",
            (true, true) => "Neither you nor the user has an immediate win available.",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    cells: [Option<Mark>; 9],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(&self, index: usize) -> Option<Mark> {
        self.cells.get(index).copied().flatten()
    }

    pub fn place(&mut self, index: usize, mark: Mark) -> Result<RoundState, GameError> {
        if self.state() != RoundState::InProgress {
            return Err(GameError::GameOver);
        }
        match self.cells.get(index) {
            Some(None) => {
                self.cells[index] = Some(mark);
                Ok(self.state())
            }
            _ => Err(GameError::IllegalMove(index)),
        }
    }

    pub fn winner(&self) -> Option<Mark> {
        WINNING_LINES.iter().find_map(|[a, b, c]| match (self.cells[*a], self.cells[*b], self.cells[*c]) {
            (Some(x), Some(y), Some(z)) if x == y && y == z => Some(x),
            _ => None,
        })
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub fn state(&self) -> RoundState {
        match self.winner() {
            Some(mark) => RoundState::Won(mark),
            None if self.is_full() => RoundState::Draw,
            None => RoundState::InProgress,
        }
    }

    pub fn available_moves(&self) -> Vec<usize> {
        (0..9).filter(|&i| self.cells[i].is_none()).collect()
    }

    /// Cells where `mark` would complete a line
    pub fn winning_cells(&self, mark: Mark) -> Vec<usize> {
        self.available_moves()
            .into_iter()
            .filter(|&i| {
                let mut probe = self.clone();
                probe.cells[i] = Some(mark);
                probe.winner() == Some(mark)
            })
            .collect()
    }

    pub fn analyze(&self) -> BoardAnalysis {
        BoardAnalysis {
            agent_winning_cells: self.winning_cells(AGENT_MARK),
            user_winning_cells: self.winning_cells(USER_MARK),
        }
    }

    /// Plain-text rows, `.` for empty cells
    pub fn render(&self) -> String {
        self.cells
            .chunks(3)
            .map(|row| {
                row.iter()
                    .map(|c| c.map_or_else(|| ".".to_string(), |m| m.to_string()))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub trait MoveStrategy: Send + Sync {
    fn choose_move(&self, board: &Board, mark: Mark) -> Option<usize>;
}

/// Win if possible, block if needed, then centre, corners, edges
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyStrategy;

impl MoveStrategy for GreedyStrategy {
    fn choose_move(&self, board: &Board, mark: Mark) -> Option<usize> {
        if let Some(&cell) = board.winning_cells(mark).first() {
            return Some(cell);
        }
        if let Some(&cell) = board.winning_cells(mark.opponent()).first() {
            return Some(cell);
        }
        [4, 0, 2, 6, 8, 1, 3, 5, 7]
            .into_iter()
            .find(|&i| board.cell(i).is_none())
    }
}
