use std::sync::Arc;

use battle_proto::{
    RemoveCellArgs, RemovedLog, SetCellArgs, SolutionLog, VoteArgs, VoteTally, procedures,
};
use node_client::{CallContext, NodeError, NodeRpc, execute};
use serde_json::{Map, Value};

use crate::board::CellEdit;

/// The battle application's procedures, bound to one node context.
#[derive(Clone)]
pub struct BattleNode {
    rpc: Arc<dyn NodeRpc>,
    ctx: CallContext,
}

impl BattleNode {
    pub fn new(rpc: Arc<dyn NodeRpc>, ctx: CallContext) -> Self {
        Self { rpc, ctx }
    }

    pub fn call_context(&self) -> &CallContext {
        &self.ctx
    }

    /// `set_cell` for a digit, `remove_cell` for an empty value.
    pub async fn write_cell(&self, edit: &CellEdit) -> Result<(), NodeError> {
        match edit.value {
            Some(digit) => {
                let args = SetCellArgs {
                    position: edit.position.index() as u8,
                    value: digit.get(),
                    editor_address: edit.editor_id.clone(),
                    editor_name: edit.editor_name.clone(),
                };
                self.call::<_, Value>(procedures::SET_CELL, &args).await?;
            }
            None => {
                let args = RemoveCellArgs {
                    position: edit.position.index() as u8,
                    editor_address: edit.editor_id.clone(),
                    editor_name: edit.editor_name.clone(),
                };
                self.call::<_, Value>(procedures::REMOVE_CELL, &args).await?;
            }
        }
        Ok(())
    }

    /// Entries are decoded one by one; a malformed entry does not fail the read.
    pub async fn current_solution(&self) -> Result<SolutionLog, NodeError> {
        self.call_nullable(procedures::GET_CURRENT_SOLUTION).await
    }

    pub async fn removed_cells(&self) -> Result<RemovedLog, NodeError> {
        self.call_nullable(procedures::GET_REMOVED_CELLS).await
    }

    pub async fn vote_solution(&self, public: bool, caller: &str) -> Result<(), NodeError> {
        let args = VoteArgs {
            public,
            caller: caller.to_string(),
        };
        self.call::<_, Value>(procedures::VOTE_SOLUTION, &args).await?;
        Ok(())
    }

    pub async fn vote_tally(&self) -> Result<VoteTally, NodeError> {
        self.call_nullable(procedures::GET_VOTE_SOLUTION).await
    }

    async fn call<A, T>(&self, method: &str, args: &A) -> Result<T, NodeError>
    where
        A: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        execute(self.rpc.as_ref(), &self.ctx, method, args).await
    }

    /// Empty logs come back as `null` before the first write.
    async fn call_nullable<T>(&self, method: &str) -> Result<T, NodeError>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        let output: Option<T> = self.call(method, &Map::new()).await?;
        Ok(output.unwrap_or_default())
    }
}
