use tracing::{info, warn};

use crate::board::{Cell, CellEdit, Position, cell_to_wire};
use crate::game::{ApplyOutcome, EditOrigin, GameError, GameHandle, GamePhase};
use crate::session::PlayerIdentity;

use super::{BattleNode, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditResult {
    /// Given cell; nothing was sent.
    Given,
    /// The cell already holds the value; nothing was sent.
    Unchanged,
    /// The node accepted the write and it was applied locally.
    Written(ApplyOutcome),
}

/// Turns user intent into node writes, then applies them locally.
#[derive(Clone)]
pub struct Dispatcher {
    node: BattleNode,
    game: GameHandle,
    identity: Option<PlayerIdentity>,
}

impl Dispatcher {
    pub fn new(node: BattleNode, game: GameHandle, identity: Option<PlayerIdentity>) -> Self {
        Self {
            node,
            game,
            identity,
        }
    }

    fn identity(&self) -> Result<&PlayerIdentity, SyncError> {
        self.identity.as_ref().ok_or(SyncError::NotAuthenticated)
    }

    /// Writes `value` at `position`. The board is only touched after the node
    /// accepted the write, so a failed call leaves it unchanged. Writes are
    /// never retried: a transport failure leaves the outcome unknown.
    pub async fn user_edit(&self, position: Position, value: Cell) -> Result<EditResult, SyncError> {
        let identity = self.identity()?;
        if self.game.phase() == GamePhase::NotStarted {
            return Err(GameError::NotStarted.into());
        }
        if self.game.is_given(position) {
            return Ok(EditResult::Given);
        }
        if self.game.value_at(position) == value {
            return Ok(EditResult::Unchanged);
        }

        let edit = CellEdit::new(
            position,
            value,
            &identity.principal,
            &identity.display_name,
        );
        if let Err(err) = self.node.write_cell(&edit).await {
            warn!(
                target: "battle::dispatch",
                position = position.index(),
                value = cell_to_wire(value),
                error = %err,
                "cell write failed"
            );
            return Err(err.into());
        }
        let outcome = self.game.apply(&edit, EditOrigin::Local)?;
        Ok(EditResult::Written(outcome))
    }

    /// Casts this player's proof visibility vote. A player already present in
    /// the node's tally cannot vote again.
    pub async fn cast_vote(&self, public: bool) -> Result<(), SyncError> {
        let identity = self.identity()?;
        let tally = self.node.vote_tally().await?;
        if tally.has_voted(&identity.principal) {
            return Err(SyncError::AlreadyVoted);
        }
        self.node.vote_solution(public, &identity.principal).await?;
        info!(target: "battle::dispatch", public, "vote cast");
        Ok(())
    }
}
