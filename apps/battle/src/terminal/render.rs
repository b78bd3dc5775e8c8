use std::fmt::Write as _;

use crate::board::{Position, SIDE};
use crate::game::{GameEvent, GameState};
use crate::sync::EditResult;

/// Plain-text board: givens bare, player digits marked with `*`.
pub fn board(state: &GameState) -> String {
    let board = state.board();
    let mut out = String::new();
    for row in 0..SIDE {
        if row > 0 && row % 3 == 0 {
            out.push_str("------+-------+------\n");
        }
        for col in 0..SIDE {
            if col > 0 && col % 3 == 0 {
                out.push_str("| ");
            }
            let index = (row * SIDE + col) as u32;
            let Ok(position) = Position::new(index) else {
                continue;
            };
            match board.current().get(position) {
                None => out.push('.'),
                Some(digit) => {
                    let _ = write!(out, "{digit}");
                }
            }
            let marker = if board.current().get(position).is_some() && !board.is_given(position) {
                '*'
            } else {
                ' '
            };
            out.push(marker);
        }
        // Trailing marker column is noise.
        while out.ends_with(' ') {
            out.pop();
        }
        out.push('\n');
    }
    let _ = writeln!(out, "[{}] {} filled", state.phase(), board.current().filled());
    out
}

pub fn edit_result(result: &EditResult) -> &'static str {
    match result {
        EditResult::Given => "that cell is part of the puzzle",
        EditResult::Unchanged => "cell already holds that value",
        EditResult::Written(outcome) if outcome.changed_board() => "ok",
        EditResult::Written(_) => "ok (already applied)",
    }
}

/// One-line notice for changes the player did not make here.
pub fn notice(event: &GameEvent) -> Option<String> {
    match event {
        GameEvent::CellChanged { origin, .. } if *origin == crate::game::EditOrigin::Local => None,
        GameEvent::CellChanged {
            position,
            value,
            origin,
        } => Some(match value {
            Some(digit) => format!("r{}c{} = {digit} ({origin:?})", position.row() + 1, position.col() + 1),
            None => format!("r{}c{} cleared ({origin:?})", position.row() + 1, position.col() + 1),
        }),
        GameEvent::Solved { .. } => Some("puzzle solved!".to_string()),
        GameEvent::PhaseChanged(phase) => Some(format!("battle is now {phase}")),
        GameEvent::Started | GameEvent::Undone => None,
    }
}
