//! The Tic-Tac-Toe rule engine. Out of scope per spec.md §1 beyond its
//! interface, but still has to exist and be correct for the host binary to
//! run a match; behavior (including the exact board rendering) follows
//! `examples/original_source/game.py`.

use std::fmt;

use rand::Rng;

/// A player mark. `X` always moves first unless the starting turn says
/// otherwise (see [`Game::new`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    fn other(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    fn sign(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("the game has already finished")]
    AlreadyFinished,
    #[error("coordinate ({0}, {1}) is out of range")]
    InvalidCoord(i32, i32),
    #[error("cell ({0}, {1}) is already filled")]
    CellOccupied(usize, usize),
}

/// A single 3x3 board. `turn` tracks whose [`Mark`] moves next.
#[derive(Debug, Clone)]
pub struct Game {
    board: [[Option<Mark>; 3]; 3],
    turn: Mark,
}

impl Game {
    /// `first_turn` picks who moves first: 1 for X, 2 for O, matching the
    /// original `TicTacToeGame.__init__(first_turn_number)` convention so a
    /// host can seed it directly with `rand::thread_rng().gen_range(1..=2)`.
    pub fn new(first_turn: u8) -> Self {
        assert!(first_turn == 1 || first_turn == 2, "first_turn must be 1 or 2");
        Self {
            board: [[None; 3]; 3],
            turn: if first_turn == 1 { Mark::X } else { Mark::O },
        }
    }

    pub fn turn(&self) -> Mark {
        self.turn
    }

    pub fn is_coord_valid(x: i32, y: i32) -> bool {
        (0..3).contains(&x) && (0..3).contains(&y)
    }

    pub fn is_cell_empty(&self, x: usize, y: usize) -> bool {
        self.board[x][y].is_none()
    }

    /// Places the current player's mark at `(x, y)` and advances the turn.
    pub fn put(&mut self, x: i32, y: i32) -> Result<(), MoveError> {
        if self.is_finished() {
            return Err(MoveError::AlreadyFinished);
        }
        if !Self::is_coord_valid(x, y) {
            return Err(MoveError::InvalidCoord(x, y));
        }
        let (x, y) = (x as usize, y as usize);
        if !self.is_cell_empty(x, y) {
            return Err(MoveError::CellOccupied(x, y));
        }
        self.board[x][y] = Some(self.turn);
        self.turn = self.turn.other();
        Ok(())
    }

    pub fn winner(&self) -> Option<Mark> {
        let b = &self.board;
        for i in 0..3 {
            if let Some(m) = b[i][0] {
                if b[i][1] == Some(m) && b[i][2] == Some(m) {
                    return Some(m);
                }
            }
            if let Some(m) = b[0][i] {
                if b[1][i] == Some(m) && b[2][i] == Some(m) {
                    return Some(m);
                }
            }
        }
        if let Some(m) = b[0][0] {
            if b[1][1] == Some(m) && b[2][2] == Some(m) {
                return Some(m);
            }
        }
        if let Some(m) = b[0][2] {
            if b[1][1] == Some(m) && b[2][0] == Some(m) {
                return Some(m);
            }
        }
        None
    }

    pub fn is_draw(&self) -> bool {
        self.winner().is_none() && self.board.iter().flatten().all(Option::is_some)
    }

    pub fn is_finished(&self) -> bool {
        self.winner().is_some() || self.is_draw()
    }

    /// Plays a uniformly random empty cell for the side to move. Used by the
    /// host for the computer opponent in solo matches.
    pub fn random_play(&mut self) -> (usize, usize) {
        assert!(!self.is_finished(), "the game has already finished");
        let mut choices = Vec::with_capacity(9);
        for x in 0..3 {
            for y in 0..3 {
                if self.board[x][y].is_none() {
                    choices.push((x, y));
                }
            }
        }
        let idx = rand::thread_rng().gen_range(0..choices.len());
        let (x, y) = choices[idx];
        self.put(x as i32, y as i32).expect("chosen cell is empty");
        (x, y)
    }

    fn sign_at(&self, x: usize, y: usize) -> char {
        self.board[x][y].map(Mark::sign).unwrap_or(' ')
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\u{250f}\u{2501}\u{2501}\u{2501}\u{2533}\u{2501}\u{2501}\u{2501}\u{2533}\u{2501}\u{2501}\u{2501}\u{2513}")?;
        for row in 0..3 {
            writeln!(
                f,
                "\u{2503} {} \u{2503} {} \u{2503} {} \u{2503}",
                self.sign_at(row, 0),
                self.sign_at(row, 1),
                self.sign_at(row, 2)
            )?;
            if row < 2 {
                writeln!(f, "\u{2523}\u{2501}\u{2501}\u{2501}\u{254b}\u{2501}\u{2501}\u{2501}\u{254b}\u{2501}\u{2501}\u{2501}\u{252b}")?;
            }
        }
        write!(f, "\u{2517}\u{2501}\u{2501}\u{2501}\u{253b}\u{2501}\u{2501}\u{2501}\u{253b}\u{2501}\u{2501}\u{2501}\u{251b}")
    }
}

/// Coordinate legend shown to clients via `/help`; recovered from
/// `original_source/game.py::get_help_board_as_string`.
pub const HELP_BOARD: &str = "\
\u{250f}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2533}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2533}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2513}
\u{2503}        \u{2503}        \u{2503}        \u{2503}
\u{2503} (0, 0) \u{2503} (0, 1) \u{2503} (0, 2) \u{2503}
\u{2503}        \u{2503}        \u{2503}        \u{2503}
\u{2523}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{254b}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{254b}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{252b}
\u{2503}        \u{2503}        \u{2503}        \u{2503}
\u{2503} (1, 0) \u{2503} (1, 1) \u{2503} (1, 2) \u{2503}
\u{2503}        \u{2503}        \u{2503}        \u{2503}
\u{2523}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{254b}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{254b}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{252b}
\u{2503}        \u{2503}        \u{2503}        \u{2503}
\u{2503} (2, 0) \u{2503} (2, 1) \u{2503} (2, 2) \u{2503}
\u{2503}        \u{2503}        \u{2503}        \u{2503}
\u{2517}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{253b}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{253b}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{251b}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_win_is_detected() {
        let mut g = Game::new(1);
        g.put(0, 0).unwrap(); // X
        g.put(1, 0).unwrap(); // O
        g.put(0, 1).unwrap(); // X
        g.put(1, 1).unwrap(); // O
        g.put(0, 2).unwrap(); // X wins row 0
        assert_eq!(g.winner(), Some(Mark::X));
        assert!(g.is_finished());
        assert!(!g.is_draw());
    }

    #[test]
    fn diagonal_win_is_detected() {
        let mut g = Game::new(1);
        g.put(0, 0).unwrap(); // X
        g.put(0, 1).unwrap(); // O
        g.put(1, 1).unwrap(); // X
        g.put(0, 2).unwrap(); // O
        g.put(2, 2).unwrap(); // X wins diagonal
        assert_eq!(g.winner(), Some(Mark::X));
    }

    #[test]
    fn anti_diagonal_win_is_detected() {
        let mut g = Game::new(1);
        g.put(0, 2).unwrap(); // X
        g.put(0, 0).unwrap(); // O
        g.put(1, 1).unwrap(); // X
        g.put(0, 1).unwrap(); // O
        g.put(2, 0).unwrap(); // X wins anti-diagonal
        assert_eq!(g.winner(), Some(Mark::X));
    }

    #[test]
    fn full_board_without_winner_is_a_draw() {
        // X O X
        // X O O
        // O X X
        let mut g = Game::new(1);
        for (x, y) in [
            (0, 0), // X
            (0, 1), // O
            (0, 2), // X
            (1, 1), // O
            (1, 0), // X
            (1, 2), // O
            (2, 1), // X
            (2, 0), // O
            (2, 2), // X
        ] {
            g.put(x, y).unwrap();
        }
        assert!(g.is_draw());
        assert!(g.winner().is_none());
    }

    #[test]
    fn rejects_occupied_and_out_of_range_cells() {
        let mut g = Game::new(1);
        g.put(0, 0).unwrap();
        assert_eq!(g.put(0, 0), Err(MoveError::CellOccupied(0, 0)));
        assert_eq!(g.put(3, 0), Err(MoveError::InvalidCoord(3, 0)));
        assert_eq!(g.put(-1, 0), Err(MoveError::InvalidCoord(-1, 0)));
    }

    #[test]
    fn random_play_fills_an_empty_cell_and_advances_turn() {
        let mut g = Game::new(1);
        let turn_before = g.turn();
        let (x, y) = g.random_play();
        assert!(!g.is_cell_empty(x, y));
        assert_ne!(g.turn(), turn_before);
    }

    #[test]
    fn rejects_moves_after_game_finished() {
        let mut g = Game::new(1);
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)] {
            g.put(x, y).unwrap();
        }
        assert!(g.is_finished());
        assert_eq!(g.put(2, 2), Err(MoveError::AlreadyFinished));
    }
}
