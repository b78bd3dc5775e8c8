//! Shared wire definitions for the sudoku battle client.
//! The node application speaks these shapes over JSON-RPC and the event
//! feed; the game service speaks the REST shapes in [`service`].
//! Keeping them in a dedicated crate lets tooling reuse them without
//! pulling in the runtime.

pub mod node;
pub mod service;

pub use node::{
    CellEventPayload, LogEntry, RemoveCellArgs, RemovedEntry, RemovedLog, SetCellArgs,
    SolutionEntry, SolutionLog, VoteArgs, VoteTally,
};
pub use service::{BattleInfo, PlayerContribution, StartGameRequest, SubmitSolutionRequest};

/// Procedure names exposed by the battle application on the node.
pub mod procedures {
    pub const SET_CELL: &str = "set_cell";
    pub const REMOVE_CELL: &str = "remove_cell";
    pub const GET_CURRENT_SOLUTION: &str = "get_current_solution";
    pub const GET_REMOVED_CELLS: &str = "get_removed_cells";
    pub const VOTE_SOLUTION: &str = "vote_solution";
    pub const GET_VOTE_SOLUTION: &str = "get_vote_solution";
}

/// Wire value used for an empty cell.
pub const EMPTY_CELL: u32 = 0;
