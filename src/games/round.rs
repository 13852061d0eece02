//! Round state machine
//!
//! [`GameRound`] holds one round's participants, bets and rolls and owns
//! every transition check. It performs no I/O; the engine drives it on a
//! working copy and commits the copy once the step is fully applied.

use crate::errors::RoundError;
use crate::games::settlement::SettlementSummary;
use crate::games::types::{DieTriple, GameId, OutcomeCategory, PlayerId, RequestId, RoundId, VariantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Joining,
    Betting,
    BankRolling,
    BankResolved,
    PlayerRolling,
    Settling,
    Settled,
}

impl RoundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundState::Joining => "joining",
            RoundState::Betting => "betting",
            RoundState::BankRolling => "bank_rolling",
            RoundState::BankResolved => "bank_resolved",
            RoundState::PlayerRolling => "player_rolling",
            RoundState::Settling => "settling",
            RoundState::Settled => "settled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundState::Settled)
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table parameters fixed when a game is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundParams {
    pub variant: VariantId,
    pub min_bet: u64,
    pub max_bet: u64,
    pub min_players: usize,
    pub max_players: usize,
    pub max_rounds: u32,
}

impl Default for RoundParams {
    fn default() -> Self {
        Self {
            variant: VariantId(1),
            min_bet: 100,
            max_bet: 1000,
            min_players: 4,
            max_players: 4,
            max_rounds: 12,
        }
    }
}

impl RoundParams {
    pub fn validate(&self) -> Result<(), RoundError> {
        if self.min_bet == 0 || self.min_bet > self.max_bet {
            return Err(RoundError::InvalidParams(format!(
                "bet bounds [{}, {}] are not a valid range",
                self.min_bet, self.max_bet
            )));
        }
        // Settlement deltas are signed and a winner is paid twice the bet
        if self.max_bet > i64::MAX as u64 {
            return Err(RoundError::InvalidParams(format!(
                "max_bet {} exceeds {}",
                self.max_bet,
                i64::MAX
            )));
        }
        // The bank plus at least one player
        if self.min_players < 2 || self.min_players > self.max_players {
            return Err(RoundError::InvalidParams(format!(
                "player bounds [{}, {}] are not a valid range",
                self.min_players, self.max_players
            )));
        }
        if self.max_rounds == 0 {
            return Err(RoundError::InvalidParams("max_rounds must be > 0".to_string()));
        }
        Ok(())
    }
}

/// A roll that has been fulfilled and classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRoll {
    pub request_id: RequestId,
    pub triple: DieTriple,
    pub category: OutcomeCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub player: PlayerId,
    pub bet: Option<u64>,
    pub roll_request: Option<RequestId>,
    pub roll: Option<ResolvedRoll>,
}

impl Participant {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            bet: None,
            roll_request: None,
            roll: None,
        }
    }

    pub fn has_bet(&self) -> bool {
        self.bet.is_some()
    }

    pub fn has_rolled(&self) -> bool {
        self.roll.is_some()
    }
}

/// Who a roll request belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollOwner {
    Bank(PlayerId),
    Player(PlayerId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRound {
    pub id: RoundId,
    pub game_id: GameId,
    pub round_number: u32,
    pub params: RoundParams,
    /// Join order
    pub participants: Vec<Participant>,
    pub bank: Option<PlayerId>,
    pub state: RoundState,
    pub bank_request: Option<RequestId>,
    pub bank_roll: Option<ResolvedRoll>,
    pub settlement: Option<SettlementSummary>,
    pub created_at: DateTime<Utc>,
}

impl GameRound {
    pub fn new(id: RoundId, game_id: GameId, round_number: u32, params: RoundParams) -> Self {
        Self {
            id,
            game_id,
            round_number,
            params,
            participants: Vec::new(),
            bank: None,
            state: RoundState::Joining,
            bank_request: None,
            bank_roll: None,
            settlement: None,
            created_at: Utc::now(),
        }
    }

    /// The following round of the same game, seated with the same participants
    pub fn successor(&self, id: RoundId) -> Self {
        let mut next = Self::new(id, self.game_id, self.round_number + 1, self.params.clone());
        next.participants = self
            .participants
            .iter()
            .map(|p| Participant::new(p.player.clone()))
            .collect();
        next
    }

    fn expect_state(&self, operation: &'static str, allowed: &[RoundState]) -> Result<(), RoundError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RoundError::InvalidStateTransition {
                operation,
                state: self.state,
            })
        }
    }

    pub fn is_participant(&self, player: &PlayerId) -> bool {
        self.participants.iter().any(|p| &p.player == player)
    }

    pub fn is_bank(&self, player: &PlayerId) -> bool {
        self.bank.as_ref() == Some(player)
    }

    pub fn participant(&self, player: &PlayerId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.player == player)
    }

    fn participant_mut(&mut self, player: &PlayerId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| &p.player == player)
    }

    /// Participants other than the bank, in join order
    pub fn players(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .iter()
            .filter(move |p| self.bank.as_ref() != Some(&p.player))
    }

    pub fn join(&mut self, player: PlayerId) -> Result<(), RoundError> {
        self.expect_state("join", &[RoundState::Joining])?;
        if self.is_participant(&player) {
            return Err(RoundError::AlreadyJoined(player));
        }
        if self.participants.len() >= self.params.max_players {
            return Err(RoundError::CapacityExceeded {
                max: self.params.max_players,
            });
        }
        self.participants.push(Participant::new(player));
        Ok(())
    }

    pub fn claim_bank(&mut self, player: &PlayerId) -> Result<(), RoundError> {
        self.expect_state("claim the bank", &[RoundState::Joining])?;
        if !self.is_participant(player) {
            return Err(RoundError::NotAPlayer(player.clone()));
        }
        if self.participants.len() < self.params.min_players {
            return Err(RoundError::NotEnoughPlayers {
                joined: self.participants.len(),
                min: self.params.min_players,
            });
        }
        self.bank = Some(player.clone());
        self.state = RoundState::Betting;
        Ok(())
    }

    /// Checks everything about a bet except the player's balance
    pub fn check_bet(&self, player: &PlayerId, amount: u64) -> Result<(), RoundError> {
        self.expect_state("place a bet", &[RoundState::Betting])?;
        if self.is_bank(player) {
            return Err(RoundError::BankCannotBet);
        }
        let participant = self
            .participant(player)
            .ok_or_else(|| RoundError::NotAPlayer(player.clone()))?;
        if amount < self.params.min_bet || amount > self.params.max_bet {
            return Err(RoundError::BetOutOfRange {
                amount,
                min: self.params.min_bet,
                max: self.params.max_bet,
            });
        }
        if participant.has_bet() {
            return Err(RoundError::AlreadyBet(player.clone()));
        }
        Ok(())
    }

    pub fn place_bet(&mut self, player: &PlayerId, amount: u64) -> Result<(), RoundError> {
        self.check_bet(player, amount)?;
        if let Some(participant) = self.participant_mut(player) {
            participant.bet = Some(amount);
        }
        Ok(())
    }

    /// Bets placed so far, in join order
    pub fn bets(&self) -> impl Iterator<Item = u64> + '_ {
        self.players().filter_map(|p| p.bet)
    }

    pub fn missing_bets(&self) -> usize {
        self.players().filter(|p| !p.has_bet()).count()
    }

    pub fn check_start(&self, caller: &PlayerId) -> Result<(), RoundError> {
        self.expect_state("start the round", &[RoundState::Betting])?;
        if !self.is_bank(caller) {
            return Err(RoundError::NotBank(caller.clone()));
        }
        match self.missing_bets() {
            0 => Ok(()),
            missing => Err(RoundError::IncompletePlaying { missing }),
        }
    }

    pub fn begin_bank_roll(&mut self, request_id: RequestId) {
        self.bank_request = Some(request_id);
        self.state = RoundState::BankRolling;
    }

    pub fn resolve_bank(&mut self, roll: ResolvedRoll) -> Result<(), RoundError> {
        self.expect_state("resolve the bank roll", &[RoundState::BankRolling])?;
        if self.bank_request != Some(roll.request_id) {
            return Err(RoundError::UnknownRequest(roll.request_id));
        }
        self.bank_roll = Some(roll);
        self.state = RoundState::BankResolved;
        Ok(())
    }

    pub fn check_player_roll(&self, player: &PlayerId) -> Result<(), RoundError> {
        self.expect_state(
            "roll for a player",
            &[RoundState::BankResolved, RoundState::PlayerRolling],
        )?;
        if self.is_bank(player) {
            return Err(RoundError::BankCannotRoll);
        }
        let participant = self
            .participant(player)
            .ok_or_else(|| RoundError::NotAPlayer(player.clone()))?;
        if participant.roll_request.is_some() {
            return Err(RoundError::AlreadyRolled(player.clone()));
        }
        Ok(())
    }

    pub fn begin_player_roll(&mut self, player: &PlayerId, request_id: RequestId) {
        if let Some(participant) = self.participant_mut(player) {
            participant.roll_request = Some(request_id);
        }
        self.state = RoundState::PlayerRolling;
    }

    pub fn resolve_player(&mut self, player: &PlayerId, roll: ResolvedRoll) -> Result<(), RoundError> {
        self.expect_state("resolve a player roll", &[RoundState::PlayerRolling])?;
        let participant = self
            .participant_mut(player)
            .ok_or_else(|| RoundError::NotAPlayer(player.clone()))?;
        if participant.roll_request != Some(roll.request_id) || participant.has_rolled() {
            return Err(RoundError::UnknownRequest(roll.request_id));
        }
        participant.roll = Some(roll);

        if self.unresolved_rolls() == 0 {
            self.state = RoundState::Settling;
        }
        Ok(())
    }

    /// The participant a pending request was issued for
    pub fn owner_of(&self, request_id: RequestId) -> Option<RollOwner> {
        if self.bank_request == Some(request_id) {
            return self.bank.clone().map(RollOwner::Bank);
        }
        self.participants
            .iter()
            .find(|p| p.roll_request == Some(request_id))
            .map(|p| RollOwner::Player(p.player.clone()))
    }

    /// Bank and player rolls not yet resolved
    pub fn unresolved_rolls(&self) -> usize {
        let bank = usize::from(self.bank_roll.is_none());
        bank + self.players().filter(|p| !p.has_rolled()).count()
    }

    pub fn check_settle(&self, caller: &PlayerId) -> Result<(), RoundError> {
        if !self.is_participant(caller) {
            return Err(RoundError::NotAPlayer(caller.clone()));
        }
        match self.state {
            RoundState::Settling => Ok(()),
            RoundState::BankRolling | RoundState::BankResolved | RoundState::PlayerRolling => {
                Err(RoundError::RollsIncomplete {
                    missing: self.unresolved_rolls(),
                })
            }
            state => Err(RoundError::InvalidStateTransition {
                operation: "settle",
                state,
            }),
        }
    }

    pub fn finish(&mut self, summary: SettlementSummary) {
        self.settlement = Some(summary);
        self.state = RoundState::Settled;
    }
}

/// A game: a sequence of rounds sharing parameters and participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    pub params: RoundParams,
    pub rounds: Vec<RoundId>,
    pub created_at: DateTime<Utc>,
}

impl GameRecord {
    pub fn rounds_played(&self) -> u32 {
        self.rounds.len() as u32
    }
}

/// Persisted unit: a round plus participant balances when it was taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round: GameRound,
    pub balances: BTreeMap<PlayerId, u64>,
    pub taken_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_with(players: &[&str]) -> GameRound {
        let mut round = GameRound::new(RoundId(1), GameId(1), 1, RoundParams::default());
        for p in players {
            round.join(PlayerId::from(*p)).unwrap();
        }
        round
    }

    fn roll(request: u64, faces: [u8; 3], category: OutcomeCategory) -> ResolvedRoll {
        ResolvedRoll {
            request_id: RequestId(request),
            triple: DieTriple::try_from(faces).unwrap(),
            category,
        }
    }

    #[test]
    fn test_params_validation() {
        assert!(RoundParams::default().validate().is_ok());
        assert!(RoundParams { max_bet: i64::MAX as u64, ..Default::default() }.validate().is_ok());
        let bad = [
            RoundParams { min_bet: 0, ..Default::default() },
            RoundParams { min_bet: 2000, ..Default::default() },
            RoundParams { min_players: 1, max_players: 1, ..Default::default() },
            RoundParams { min_players: 5, ..Default::default() },
            RoundParams { max_rounds: 0, ..Default::default() },
            RoundParams { max_bet: u64::MAX, ..Default::default() },
            RoundParams { max_bet: 1 << 63, ..Default::default() },
        ];
        for params in bad {
            assert!(matches!(params.validate(), Err(RoundError::InvalidParams(_))));
        }
    }

    #[test]
    fn test_join_limits() {
        let mut round = round_with(&["a", "b", "c"]);
        assert!(matches!(round.join("a".into()), Err(RoundError::AlreadyJoined(_))));
        round.join("d".into()).unwrap();
        assert!(matches!(
            round.join("e".into()),
            Err(RoundError::CapacityExceeded { max: 4 })
        ));
    }

    #[test]
    fn test_claim_bank_needs_min_players() {
        let mut round = round_with(&["a", "b", "c"]);
        assert!(matches!(
            round.claim_bank(&"a".into()),
            Err(RoundError::NotEnoughPlayers { joined: 3, min: 4 })
        ));
        round.join("d".into()).unwrap();
        assert!(matches!(round.claim_bank(&"z".into()), Err(RoundError::NotAPlayer(_))));
        round.claim_bank(&"a".into()).unwrap();
        assert_eq!(round.state, RoundState::Betting);
        assert!(matches!(
            round.join("e".into()),
            Err(RoundError::InvalidStateTransition { state: RoundState::Betting, .. })
        ));
    }

    #[test]
    fn test_betting_rules() {
        let mut round = round_with(&["bank", "b", "c", "d"]);
        round.claim_bank(&"bank".into()).unwrap();

        assert!(matches!(round.place_bet(&"bank".into(), 100), Err(RoundError::BankCannotBet)));
        assert!(matches!(round.place_bet(&"x".into(), 100), Err(RoundError::NotAPlayer(_))));
        assert!(matches!(
            round.place_bet(&"b".into(), 99),
            Err(RoundError::BetOutOfRange { amount: 99, .. })
        ));
        round.place_bet(&"b".into(), 1000).unwrap();
        assert!(matches!(round.place_bet(&"b".into(), 100), Err(RoundError::AlreadyBet(_))));

        assert!(matches!(round.check_start(&"b".into()), Err(RoundError::NotBank(_))));
        assert!(matches!(
            round.check_start(&"bank".into()),
            Err(RoundError::IncompletePlaying { missing: 2 })
        ));
    }

    #[test]
    fn test_roll_sequence_reaches_settling() {
        let mut round = round_with(&["bank", "b", "c", "d"]);
        round.claim_bank(&"bank".into()).unwrap();
        for p in ["b", "c", "d"] {
            round.place_bet(&p.into(), 100).unwrap();
        }
        round.check_start(&"bank".into()).unwrap();
        assert!(matches!(round.check_player_roll(&"b".into()), Err(RoundError::InvalidStateTransition { .. })));

        round.begin_bank_roll(RequestId(1));
        assert_eq!(round.owner_of(RequestId(1)), Some(RollOwner::Bank("bank".into())));
        assert!(matches!(
            round.check_settle(&"b".into()),
            Err(RoundError::RollsIncomplete { missing: 4 })
        ));
        round.resolve_bank(roll(1, [5, 5, 3], OutcomeCategory::PointThree)).unwrap();

        assert!(matches!(round.check_player_roll(&"bank".into()), Err(RoundError::BankCannotRoll)));
        for (i, p) in ["b", "c", "d"].iter().enumerate() {
            round.check_player_roll(&(*p).into()).unwrap();
            round.begin_player_roll(&(*p).into(), RequestId(10 + i as u64));
        }
        assert!(matches!(round.check_player_roll(&"b".into()), Err(RoundError::AlreadyRolled(_))));
        assert_eq!(round.owner_of(RequestId(11)), Some(RollOwner::Player("c".into())));

        // fulfilled out of order
        round.resolve_player(&"d".into(), roll(12, [2, 6, 6], OutcomeCategory::PointTwo)).unwrap();
        round.resolve_player(&"b".into(), roll(10, [1, 5, 1], OutcomeCategory::PointFive)).unwrap();
        assert_eq!(round.state, RoundState::PlayerRolling);
        assert!(round.resolve_player(&"c".into(), roll(99, [6, 4, 5], OutcomeCategory::Shigoro)).is_err());
        round.resolve_player(&"c".into(), roll(11, [6, 4, 5], OutcomeCategory::Shigoro)).unwrap();
        assert_eq!(round.state, RoundState::Settling);

        assert!(matches!(round.check_settle(&"x".into()), Err(RoundError::NotAPlayer(_))));
        round.check_settle(&"bank".into()).unwrap();
    }

    #[test]
    fn test_successor_keeps_seats_only() {
        let mut round = round_with(&["a", "b", "c", "d"]);
        round.claim_bank(&"a".into()).unwrap();
        round.place_bet(&"b".into(), 100).unwrap();

        let next = round.successor(RoundId(2));
        assert_eq!(next.round_number, 2);
        assert_eq!(next.state, RoundState::Joining);
        assert_eq!(next.bank, None);
        assert_eq!(next.participants.len(), 4);
        assert!(next.participants.iter().all(|p| !p.has_bet() && p.roll_request.is_none()));
    }
}
