use crate::games::round::RoundParams;
use crate::games::types::{DieTriple, GameId, OutcomeCategory, PlayerId, RequestId, RoundId};
use serde::{Deserialize, Serialize};

/// Round lifecycle events broadcast by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    RoundCreated {
        round_id: RoundId,
        game_id: GameId,
        round_number: u32,
        params: RoundParams,
    },
    PlayerJoined {
        round_id: RoundId,
        player: PlayerId,
    },
    BankClaimed {
        round_id: RoundId,
        bank: PlayerId,
    },
    BetPlaced {
        round_id: RoundId,
        player: PlayerId,
        amount: u64,
    },
    BankRollRequested {
        round_id: RoundId,
        request_id: RequestId,
    },
    BankRollResolved {
        round_id: RoundId,
        triple: DieTriple,
        category: OutcomeCategory,
    },
    PlayerRollRequested {
        round_id: RoundId,
        player: PlayerId,
        request_id: RequestId,
    },
    PlayerRollResolved {
        round_id: RoundId,
        player: PlayerId,
        triple: DieTriple,
        category: OutcomeCategory,
    },
    RoundSettled {
        round_id: RoundId,
        bank_delta: i64,
        winners: Vec<PlayerId>,
    },
}

impl GameEvent {
    pub fn round_id(&self) -> RoundId {
        match self {
            GameEvent::RoundCreated { round_id, .. }
            | GameEvent::PlayerJoined { round_id, .. }
            | GameEvent::BankClaimed { round_id, .. }
            | GameEvent::BetPlaced { round_id, .. }
            | GameEvent::BankRollRequested { round_id, .. }
            | GameEvent::BankRollResolved { round_id, .. }
            | GameEvent::PlayerRollRequested { round_id, .. }
            | GameEvent::PlayerRollResolved { round_id, .. }
            | GameEvent::RoundSettled { round_id, .. } => *round_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::RoundCreated { .. } => "round_created",
            GameEvent::PlayerJoined { .. } => "player_joined",
            GameEvent::BankClaimed { .. } => "bank_claimed",
            GameEvent::BetPlaced { .. } => "bet_placed",
            GameEvent::BankRollRequested { .. } => "bank_roll_requested",
            GameEvent::BankRollResolved { .. } => "bank_roll_resolved",
            GameEvent::PlayerRollRequested { .. } => "player_roll_requested",
            GameEvent::PlayerRollResolved { .. } => "player_roll_resolved",
            GameEvent::RoundSettled { .. } => "round_settled",
        }
    }
}
