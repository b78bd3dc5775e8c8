#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use battle_client_core::board::{Board, Position};
use battle_client_core::service::{GameService, ServiceError};
use battle_client_core::session::{BattleContext, PlayerIdentity, SessionContext};
use battle_client_core::wallet::WalletType;
use battle_proto::{
    BattleInfo, RemoveCellArgs, RemovedEntry, SetCellArgs, SolutionEntry, StartGameRequest,
    SubmitSolutionRequest, VoteArgs, procedures,
};
use node_client::{CallContext, ExecutionError, ExecutionEventPayload, NodeError, NodeEvent, NodeRpc};
use parking_lot::Mutex;
use serde_json::{Value, json};

pub const CONTEXT_ID: &str = "ctx-battle";
pub const CREATOR: &str = "creator-principal";

pub const PUZZLE: &str =
    "53..7....6..195....98....6.8...6...34..8.3..17...2...6.6....28....419..5....8..79";
pub const SOLUTION: &str =
    "534678912672195348198342567859761423426853791713924856961537284287419635345286179";

pub fn pos(index: u32) -> Position {
    Position::new(index).unwrap()
}

/// `(position, digit)` for every cell the puzzle leaves open, row-major.
pub fn missing_cells() -> Vec<(u32, u32)> {
    PUZZLE
        .chars()
        .zip(SOLUTION.chars())
        .enumerate()
        .filter(|(_, (given, _))| *given == '.')
        .map(|(index, (_, digit))| (index as u32, digit.to_digit(10).unwrap()))
        .collect()
}

pub fn puzzle() -> Board {
    PUZZLE.parse().unwrap()
}

pub fn solution() -> Board {
    SOLUTION.parse().unwrap()
}

pub fn session_for(principal: Option<&str>) -> SessionContext {
    SessionContext::new(
        BattleContext {
            battle_id: 11,
            context_id: CONTEXT_ID.into(),
            context_identity: format!("exec-{}", principal.unwrap_or("watcher")),
            creator_identity: CREATOR.into(),
        },
        principal.map(|principal| PlayerIdentity::new(principal, WalletType::default())),
    )
}

/// In-memory stand-in for the battle application: both logs grow on every
/// accepted write, exactly as the node appends them.
#[derive(Default)]
pub struct FakeNode {
    pub solution: Mutex<Vec<SolutionEntry>>,
    pub removed: Mutex<Vec<RemovedEntry>>,
    pub votes: Mutex<(Vec<String>, Vec<String>)>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn write_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|method| {
                method.as_str() == procedures::SET_CELL || method.as_str() == procedures::REMOVE_CELL
            })
            .count()
    }

    /// Appends to the solution log as if another client had written.
    pub fn remote_set(&self, position: u32, value: u32, editor: &str) -> SolutionEntry {
        let entry = SolutionEntry {
            position,
            value,
            editor_address: editor.into(),
            editor_name: editor.into(),
        };
        self.solution.lock().push(entry.clone());
        entry
    }

    pub fn remote_remove(&self, position: u32, editor: &str) {
        self.removed.lock().push(RemovedEntry {
            position,
            editor_address: editor.into(),
            editor_name: editor.into(),
        });
    }
}

fn decode<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, NodeError> {
    serde_json::from_value(args).map_err(|err| {
        NodeError::Execution(ExecutionError {
            kind: "InvalidArgs".into(),
            data: Some(json!(err.to_string())),
        })
    })
}

#[async_trait]
impl NodeRpc for FakeNode {
    async fn execute_raw(
        &self,
        ctx: &CallContext,
        method: &str,
        args: Value,
    ) -> Result<Value, NodeError> {
        assert_eq!(ctx.context_id, CONTEXT_ID);
        self.calls.lock().push(method.to_string());
        match method {
            procedures::SET_CELL => {
                let args: SetCellArgs = decode(args)?;
                self.remote_set(
                    args.position as u32,
                    args.value as u32,
                    &args.editor_address,
                );
                Ok(Value::Null)
            }
            procedures::REMOVE_CELL => {
                let args: RemoveCellArgs = decode(args)?;
                self.remote_remove(args.position as u32, &args.editor_address);
                Ok(Value::Null)
            }
            procedures::GET_CURRENT_SOLUTION => Ok(json!(*self.solution.lock())),
            procedures::GET_REMOVED_CELLS => Ok(json!(*self.removed.lock())),
            procedures::VOTE_SOLUTION => {
                let args: VoteArgs = decode(args)?;
                let mut votes = self.votes.lock();
                if args.public {
                    votes.0.push(args.caller);
                } else {
                    votes.1.push(args.caller);
                }
                Ok(Value::Null)
            }
            procedures::GET_VOTE_SOLUTION => Ok(json!(*self.votes.lock())),
            other => Err(NodeError::Execution(ExecutionError {
                kind: "MethodNotFound".into(),
                data: Some(json!(other)),
            })),
        }
    }
}

/// Execution event carrying one cell payload per `(position, value, editor)`.
pub fn cell_event(cells: &[(u32, u32, &str)]) -> NodeEvent {
    NodeEvent::ExecutionEvent {
        context_id: CONTEXT_ID.into(),
        events: cells
            .iter()
            .map(|(position, value, editor)| ExecutionEventPayload {
                kind: None,
                data: serde_json::to_vec(
                    &json!({"position": position, "value": value, "editor": editor}),
                )
                .unwrap(),
            })
            .collect(),
    }
}

pub struct MockGameService {
    pub info: Mutex<BattleInfo>,
    pub started: Mutex<Vec<StartGameRequest>>,
    pub submitted: Mutex<Vec<SubmitSolutionRequest>>,
    pub fail_submissions: Mutex<usize>,
}

impl MockGameService {
    pub fn new(players: &[&str], initial_state: Option<Vec<(u8, u8)>>) -> Arc<Self> {
        Arc::new(Self {
            info: Mutex::new(BattleInfo {
                creator: CREATOR.into(),
                deposit_price: 1_000_000,
                service_fee: 50_000,
                players: players.iter().map(|player| player.to_string()).collect(),
                initial_state,
            }),
            started: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            fail_submissions: Mutex::new(0),
        })
    }
}

#[async_trait]
impl GameService for MockGameService {
    async fn battle_info(&self, _battle_id: u64) -> Result<BattleInfo, ServiceError> {
        Ok(self.info.lock().clone())
    }

    async fn start_game(&self, request: &StartGameRequest) -> Result<String, ServiceError> {
        self.info.lock().initial_state = Some(request.initial_state.clone());
        self.started.lock().push(request.clone());
        Ok("0xstart".into())
    }

    async fn submit_solution(
        &self,
        request: &SubmitSolutionRequest,
    ) -> Result<String, ServiceError> {
        let mut failures = self.fail_submissions.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(ServiceError::BattleNotFound(request.battle_id));
        }
        drop(failures);
        self.submitted.lock().push(request.clone());
        Ok("0xsubmit".into())
    }
}
