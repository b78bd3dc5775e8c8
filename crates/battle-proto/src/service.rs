use serde::{Deserialize, Serialize};

/// Battle metadata served by the game service. Only the fields the client
/// consumes are modelled; everything else in the payload is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleInfo {
    pub creator: String,
    #[serde(default)]
    pub deposit_price: u128,
    #[serde(default)]
    pub service_fee: u128,
    #[serde(default)]
    pub players: Vec<String>,
    /// Givens as `(position, digit)` pairs once the creator started the game.
    #[serde(default)]
    pub initial_state: Option<Vec<(u8, u8)>>,
}

impl BattleInfo {
    pub fn prize_pool(&self) -> u128 {
        self.deposit_price.saturating_mul(self.players.len() as u128)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartGameRequest {
    pub room_id: u64,
    pub initial_state: Vec<(u8, u8)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerContribution {
    pub player: String,
    pub cells: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSolutionRequest {
    pub battle_id: u64,
    /// Values of the non-given cells in row-major order.
    pub solution: Vec<u8>,
    pub public: bool,
    pub player_contributions: Vec<PlayerContribution>,
}
