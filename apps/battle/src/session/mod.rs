//! Battle session runtime: loads or publishes the puzzle, wires the event
//! stream and the pollers into the reconciler, and triggers the solution
//! submission when the board is solved.

mod context;

use std::sync::Arc;

use battle_proto::{PlayerContribution, StartGameRequest, SubmitSolutionRequest, VoteTally};
use node_client::{EventStreamClient, NodeError, NodeRpc};
use rand::thread_rng;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::board::{Board, BoardError, Cell, Digit, Position};
use crate::config::SyncConfig;
use crate::game::{GameError, GameEvent, GameHandle, GamePhase};
use crate::puzzle::{self, Difficulty};
use crate::service::{GameService, ServiceError};
use crate::sync::{
    BattleNode, Dispatcher, EditResult, PollingReader, Reconciler, SyncError,
};

pub use context::{BattleContext, PlayerIdentity, SessionContext};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("game service: {0}")]
    Service(#[from] ServiceError),
    #[error("node: {0}")]
    Node(#[from] NodeError),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("battle {0} has no puzzle yet; waiting for the creator to start it")]
    NoPuzzle(u64),
    #[error("puzzle has no solution")]
    Unsolvable,
}

/// Where the creator's puzzle comes from.
#[derive(Debug, Clone)]
pub enum PuzzleSource {
    Generate(Difficulty),
    Given(Board),
}

impl Default for PuzzleSource {
    fn default() -> Self {
        PuzzleSource::Generate(Difficulty::default())
    }
}

/// Builds and hands over the final solution. Shared by the automatic
/// trigger and manual retries.
#[derive(Clone)]
struct Submitter {
    game: GameHandle,
    service: Arc<dyn GameService>,
    battle_id: u64,
}

impl Submitter {
    async fn submit(&self, public: bool) -> Result<String, SessionError> {
        self.game.begin_submission()?;
        let request = self.game.read(|state| {
            let board = state.solved_board().unwrap_or(state.board());
            SubmitSolutionRequest {
                battle_id: self.battle_id,
                solution: board.answer(),
                public,
                player_contributions: board
                    .contributions()
                    .into_iter()
                    .map(|(player, cells)| PlayerContribution { player, cells })
                    .collect(),
            }
        });
        match self.service.submit_solution(&request).await {
            Ok(tx_hash) => {
                self.game.complete_submission()?;
                info!(target: "battle::session", battle = self.battle_id, public, %tx_hash, "solution submitted");
                Ok(tx_hash)
            }
            Err(err) => {
                warn!(target: "battle::session", battle = self.battle_id, error = %err, "solution submission failed");
                self.game.abort_submission()?;
                Err(err.into())
            }
        }
    }
}

pub struct BattleSession {
    context: SessionContext,
    config: SyncConfig,
    game: GameHandle,
    reconciler: Arc<Reconciler>,
    dispatcher: Dispatcher,
    poller: Arc<PollingReader>,
    events: Option<Arc<EventStreamClient>>,
    submitter: Submitter,
    players: Vec<String>,
    prefer_public: bool,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl BattleSession {
    pub fn new(
        context: SessionContext,
        config: SyncConfig,
        rpc: Arc<dyn NodeRpc>,
        events: Option<Arc<EventStreamClient>>,
        service: Arc<dyn GameService>,
    ) -> Self {
        let game = GameHandle::new();
        let node = BattleNode::new(rpc, context.call_context());
        let reconciler = Arc::new(Reconciler::new(game.clone(), &context));
        let dispatcher = Dispatcher::new(node.clone(), game.clone(), context.identity.clone());
        let poller = Arc::new(PollingReader::new(node, Arc::clone(&reconciler), &config));
        let submitter = Submitter {
            game: game.clone(),
            service,
            battle_id: context.battle.battle_id,
        };
        Self {
            context,
            config,
            game,
            reconciler,
            dispatcher,
            poller,
            events,
            submitter,
            players: Vec::new(),
            prefer_public: false,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Visibility used when the players have not all voted in time.
    pub fn with_default_visibility(mut self, public: bool) -> Self {
        self.prefer_public = public;
        self
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn game(&self) -> &GameHandle {
        &self.game
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn tally(&self) -> watch::Receiver<VoteTally> {
        self.poller.tally()
    }

    /// Starts the local game. The creator publishes the givens when the
    /// battle has none yet; everyone else loads them from the battle.
    pub async fn prepare(&mut self, source: PuzzleSource) -> Result<(), SessionError> {
        let battle_id = self.context.battle.battle_id;
        let info = self.submitter.service.battle_info(battle_id).await?;
        self.players = info.players.clone();

        let (initial, reference) = match (&info.initial_state, self.context.is_creator()) {
            (Some(givens), true) => {
                let initial = Board::from_givens(givens)?;
                let reference = puzzle::solve(&initial).ok_or(SessionError::Unsolvable)?;
                (initial, Some(reference))
            }
            (Some(givens), false) => (Board::from_givens(givens)?, None),
            (None, false) => return Err(SessionError::NoPuzzle(battle_id)),
            (None, true) => {
                let (initial, reference) = match source {
                    PuzzleSource::Generate(difficulty) => {
                        let generated = puzzle::generate(difficulty, &mut thread_rng());
                        (generated.initial, generated.solution)
                    }
                    PuzzleSource::Given(board) => {
                        let solution = puzzle::solve(&board).ok_or(SessionError::Unsolvable)?;
                        (board, solution)
                    }
                };
                let request = StartGameRequest {
                    room_id: battle_id,
                    initial_state: initial.givens(),
                };
                let tx_hash = self.submitter.service.start_game(&request).await?;
                info!(target: "battle::session", battle = battle_id, givens = request.initial_state.len(), %tx_hash, "puzzle published");
                (initial, Some(reference))
            }
        };
        self.game.start(initial, reference)?;
        Ok(())
    }

    /// Spawns the pollers and, for the creator, the submission trigger, then
    /// connects the event stream. A failed connect is logged and the session
    /// continues on polling alone.
    pub async fn start_sync(&mut self) -> Result<(), SessionError> {
        if self.game.phase() == GamePhase::NotStarted {
            return Err(GameError::NotStarted.into());
        }
        self.tasks.extend(self.poller.spawn(&self.cancel));
        if self.context.is_creator() {
            self.tasks.push(self.spawn_submission_trigger());
        }

        if let Some(events) = &self.events {
            events.add_callback(self.reconciler.event_callback());
            let connected = match events.connect().await {
                Ok(()) => events.subscribe(&[self.context.battle.context_id.clone()]),
                Err(err) => Err(err),
            };
            if let Err(err) = connected {
                warn!(target: "battle::session", error = %err, "event stream unavailable; relying on polling");
            }
        }
        info!(target: "battle::session", battle = self.context.battle.battle_id, creator = self.context.is_creator(), "sync started");
        Ok(())
    }

    pub async fn edit(&self, position: Position, value: Cell) -> Result<EditResult, SessionError> {
        Ok(self.dispatcher.user_edit(position, value).await?)
    }

    pub fn undo(&self) -> Result<bool, SessionError> {
        Ok(self.game.undo()?)
    }

    pub async fn vote(&self, public: bool) -> Result<(), SessionError> {
        Ok(self.dispatcher.cast_vote(public).await?)
    }

    /// Next cell to fill or correct, with its solved value.
    pub fn hint(&self) -> Option<(Position, Digit)> {
        let (initial, current, reference) = self.game.read(|state| {
            (
                state.board().initial().clone(),
                state.board().current().clone(),
                state.reference().cloned(),
            )
        });
        let solution = reference.or_else(|| puzzle::solve(&initial))?;
        Position::all().find_map(|position| {
            let wanted = solution.get(position)?;
            (current.get(position) != Some(wanted)).then_some((position, wanted))
        })
    }

    /// Submits the solved board now. Used to retry after a failed automatic
    /// submission.
    pub async fn submit_solution(&self, public: bool) -> Result<String, SessionError> {
        self.submitter.submit(public).await
    }

    /// Stops the pollers and the trigger and closes the event stream.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(events) = &self.events {
            events.disconnect();
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        debug!(target: "battle::session", "session stopped");
    }

    fn spawn_submission_trigger(&self) -> JoinHandle<()> {
        let submitter = self.submitter.clone();
        let events = self.game.subscribe();
        let tally = self.poller.tally();
        let players = self.players.len();
        let vote_wait = self.config.vote_wait;
        let fallback = self.prefer_public;
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = submission_trigger(submitter, events, tally, players, vote_wait, fallback) => {}
            }
        })
    }
}

impl Drop for BattleSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(events) = &self.events {
            events.disconnect();
        }
    }
}

async fn submission_trigger(
    submitter: Submitter,
    mut events: broadcast::Receiver<GameEvent>,
    tally: watch::Receiver<VoteTally>,
    players: usize,
    vote_wait: std::time::Duration,
    fallback: bool,
) {
    loop {
        let solved = match events.recv().await {
            Ok(GameEvent::Solved { origin }) => {
                info!(target: "battle::session", ?origin, "board solved; collecting visibility votes");
                true
            }
            Ok(_) => false,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(target: "battle::session", skipped, "submission trigger lagged");
                submitter.game.phase() == GamePhase::Solved
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };
        if solved {
            let public = await_decision(tally, players, vote_wait, fallback).await;
            // Failures are logged by the submitter and can be retried by hand.
            let _ = submitter.submit(public).await;
            return;
        }
    }
}

/// Visibility the players agreed on, or `fallback` once `wait` has passed.
async fn await_decision(
    mut tally: watch::Receiver<VoteTally>,
    players: usize,
    wait: std::time::Duration,
    fallback: bool,
) -> bool {
    let decided = async {
        loop {
            let decision = tally.borrow_and_update().decision(players);
            if let Some(public) = decision {
                return public;
            }
            if tally.changed().await.is_err() {
                return fallback;
            }
        }
    };
    match timeout(wait, decided).await {
        Ok(public) => public,
        Err(_) => {
            info!(target: "battle::session", players, public = fallback, "vote window elapsed");
            fallback
        }
    }
}
