use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::board::{Board, BoardState, Cell, CellEdit, Position, WriteOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GamePhase {
    NotStarted,
    InProgress,
    Solved,
    ProofPending,
    ProofSubmitted,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GamePhase::NotStarted => "not started",
            GamePhase::InProgress => "in progress",
            GamePhase::Solved => "solved",
            GamePhase::ProofPending => "proof pending",
            GamePhase::ProofSubmitted => "proof submitted",
        };
        f.write_str(label)
    }
}

/// Where an edit was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    Local,
    EventStream,
    SolutionLog,
    RemovedLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Written,
    /// Written, and this edit completed the puzzle.
    Solved,
    SkippedGiven,
    SkippedEqual,
}

impl ApplyOutcome {
    pub fn changed_board(self) -> bool {
        matches!(self, ApplyOutcome::Written | ApplyOutcome::Solved)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("game has not started")]
    NotStarted,
    #[error("game already started")]
    AlreadyStarted,
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: GamePhase, to: GamePhase },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Started,
    CellChanged {
        position: Position,
        value: Cell,
        origin: EditOrigin,
    },
    Solved {
        origin: EditOrigin,
    },
    Undone,
    PhaseChanged(GamePhase),
}

/// Board plus the battle state machine. `reference` is the solved board
/// when known (battle creator); otherwise any complete valid board wins.
#[derive(Debug, Clone)]
pub struct GameState {
    board: BoardState,
    phase: GamePhase,
    reference: Option<Board>,
    solved_board: Option<BoardState>,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self {
            board: BoardState::new(Board::empty()),
            phase: GamePhase::NotStarted,
            reference: None,
            solved_board: None,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn reference(&self) -> Option<&Board> {
        self.reference.as_ref()
    }

    /// Board as it stood when the puzzle was first completed.
    pub fn solved_board(&self) -> Option<&BoardState> {
        self.solved_board.as_ref()
    }

    pub fn start(&mut self, initial: Board, reference: Option<Board>) -> Result<(), GameError> {
        if self.phase != GamePhase::NotStarted {
            return Err(GameError::AlreadyStarted);
        }
        self.board = BoardState::new(initial);
        self.reference = reference;
        self.phase = GamePhase::InProgress;
        Ok(())
    }

    pub fn is_won(&self) -> bool {
        let current = self.board.current();
        match &self.reference {
            Some(reference) => current == reference,
            None => current.is_valid_solution(),
        }
    }

    pub fn apply(&mut self, edit: &CellEdit) -> Result<ApplyOutcome, GameError> {
        if self.phase == GamePhase::NotStarted {
            return Err(GameError::NotStarted);
        }
        let outcome = match self.board.apply_edit(edit) {
            WriteOutcome::SkippedGiven => return Ok(ApplyOutcome::SkippedGiven),
            WriteOutcome::SkippedEqual => return Ok(ApplyOutcome::SkippedEqual),
            WriteOutcome::Written => ApplyOutcome::Written,
        };
        if self.phase == GamePhase::InProgress && self.is_won() {
            self.phase = GamePhase::Solved;
            self.solved_board = Some(self.board.clone());
            return Ok(ApplyOutcome::Solved);
        }
        Ok(outcome)
    }

    pub fn undo(&mut self) -> Result<bool, GameError> {
        if self.phase == GamePhase::NotStarted {
            return Err(GameError::NotStarted);
        }
        Ok(self.board.undo())
    }

    /// `Solved -> ProofPending`.
    pub fn begin_submission(&mut self) -> Result<(), GameError> {
        self.transition(GamePhase::Solved, GamePhase::ProofPending)
    }

    /// `ProofPending -> ProofSubmitted`.
    pub fn complete_submission(&mut self) -> Result<(), GameError> {
        self.transition(GamePhase::ProofPending, GamePhase::ProofSubmitted)
    }

    /// A failed submission leaves the battle solved so it can be retried.
    pub fn abort_submission(&mut self) -> Result<(), GameError> {
        self.transition(GamePhase::ProofPending, GamePhase::Solved)
    }

    fn transition(&mut self, from: GamePhase, to: GamePhase) -> Result<(), GameError> {
        if self.phase != from {
            return Err(GameError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }
}

/// Shared handle to the session's game. The lock is held only for the
/// duration of a synchronous mutation; observers are notified after it is
/// released.
#[derive(Clone)]
pub struct GameHandle {
    state: Arc<Mutex<GameState>>,
    events: broadcast::Sender<GameEvent>,
}

impl Default for GameHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl GameHandle {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Arc::new(Mutex::new(GameState::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub fn read<R>(&self, f: impl FnOnce(&GameState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn phase(&self) -> GamePhase {
        self.state.lock().phase()
    }

    pub fn current(&self) -> Board {
        self.state.lock().board().current().clone()
    }

    pub fn value_at(&self, position: Position) -> Cell {
        self.state.lock().board().current().get(position)
    }

    pub fn is_given(&self, position: Position) -> bool {
        self.state.lock().board().is_given(position)
    }

    pub fn start(&self, initial: Board, reference: Option<Board>) -> Result<(), GameError> {
        let givens = initial.filled();
        self.state.lock().start(initial, reference)?;
        info!(target: "battle::game", givens, "game started");
        self.notify(GameEvent::Started);
        Ok(())
    }

    pub fn apply(&self, edit: &CellEdit, origin: EditOrigin) -> Result<ApplyOutcome, GameError> {
        let outcome = self.state.lock().apply(edit)?;
        debug!(
            target: "battle::game",
            position = edit.position.index(),
            value = crate::board::cell_to_wire(edit.value),
            editor = %edit.editor_id,
            ?origin,
            ?outcome,
            "edit applied"
        );
        if outcome.changed_board() {
            self.notify(GameEvent::CellChanged {
                position: edit.position,
                value: edit.value,
                origin,
            });
        }
        if outcome == ApplyOutcome::Solved {
            info!(target: "battle::game", ?origin, editor = %edit.editor_id, "puzzle solved");
            self.notify(GameEvent::Solved { origin });
        }
        Ok(outcome)
    }

    pub fn undo(&self) -> Result<bool, GameError> {
        let undone = self.state.lock().undo()?;
        if undone {
            self.notify(GameEvent::Undone);
        }
        Ok(undone)
    }

    pub fn begin_submission(&self) -> Result<(), GameError> {
        self.state.lock().begin_submission()?;
        self.notify(GameEvent::PhaseChanged(GamePhase::ProofPending));
        Ok(())
    }

    pub fn complete_submission(&self) -> Result<(), GameError> {
        self.state.lock().complete_submission()?;
        self.notify(GameEvent::PhaseChanged(GamePhase::ProofSubmitted));
        Ok(())
    }

    pub fn abort_submission(&self) -> Result<(), GameError> {
        self.state.lock().abort_submission()?;
        self.notify(GameEvent::PhaseChanged(GamePhase::Solved));
        Ok(())
    }

    fn notify(&self, event: GameEvent) {
        // No receivers is fine; nobody is watching yet.
        let _ = self.events.send(event);
    }
}
