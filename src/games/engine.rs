//! Round engine
//!
//! Drives [`GameRound`] state machines: validates each step on a working
//! copy under the round's map-entry lock, persists the copy when a store is
//! attached, then commits it. Bets and the bank's cover are held in the
//! round's escrow account from the moment they are committed, so settlement
//! only ever pays out funds already set aside. Roll fulfillments arrive
//! through the roll service's observer channel in any order and are matched
//! to rounds by request id.

use crate::auth::{Authority, Capability};
use crate::errors::{ChinchiroResult, RoundError, RulesetError};
use crate::games::events::GameEvent;
use crate::games::ledger::{LedgerAccount, Transfer};
use crate::games::roll_service::{RollFulfilled, RollService};
use crate::games::round::{
    GameRecord, GameRound, ResolvedRoll, RollOwner, RoundParams, RoundSnapshot, RoundState,
};
use crate::games::ruleset::OutcomeRuleset;
use crate::games::settlement::{
    bank_cover, escrow_account, escrow_payouts, settle, SettlementEntry, SettlementSummary,
};
use crate::games::types::{ConsumerId, GameId, PlayerId, RequestId, RoundId, VariantId, VariantRules};
use crate::round_store::RoundStore;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct RoundEngine {
    consumer: ConsumerId,
    rolls: Arc<RollService>,
    ruleset: Arc<OutcomeRuleset>,
    ledger: Arc<dyn LedgerAccount>,
    store: Option<Arc<dyn RoundStore>>,
    authority: Authority,
    batched_rolls: bool,
    log_events: bool,

    variants: DashMap<VariantId, VariantRules>,
    games: DashMap<GameId, GameRecord>,
    rounds: DashMap<RoundId, GameRound>,
    /// request id -> round awaiting it
    pending_rolls: DashMap<RequestId, RoundId>,
    next_game_id: AtomicU64,
    next_round_id: AtomicU64,

    events: broadcast::Sender<GameEvent>,
    fulfillments: Mutex<Option<mpsc::UnboundedReceiver<RollFulfilled>>>,
}

impl RoundEngine {
    /// Create a new engine that requests rolls as `consumer`.
    ///
    /// The consumer must be registered with the roll service before rounds
    /// can start. The returned capability registers variants.
    pub fn new(
        consumer: ConsumerId,
        rolls: Arc<RollService>,
        ruleset: Arc<OutcomeRuleset>,
        ledger: Arc<dyn LedgerAccount>,
    ) -> (Self, Capability) {
        let (authority, capability) = Authority::new();
        let receiver = rolls.register_observer(consumer.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let engine = Self {
            consumer,
            rolls,
            ruleset,
            ledger,
            store: None,
            authority,
            batched_rolls: false,
            log_events: true,
            variants: DashMap::new(),
            games: DashMap::new(),
            rounds: DashMap::new(),
            pending_rolls: DashMap::new(),
            next_game_id: AtomicU64::new(1),
            next_round_id: AtomicU64::new(1),
            events,
            fulfillments: Mutex::new(Some(receiver)),
        };
        (engine, capability)
    }

    pub fn with_store(mut self, store: Arc<dyn RoundStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_batched_rolls(mut self, batched: bool) -> Self {
        self.batched_rolls = batched;
        self
    }

    pub fn with_event_logging(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    pub fn add_variant(&self, capability: &Capability, rules: VariantRules) -> ChinchiroResult<()> {
        if !self.authority.permits(capability) {
            return Err(RulesetError::Unauthorized.into());
        }
        tracing::info!(variant = %rules.id, name = %rules.name, tie_rule = ?rules.tie_rule, "variant registered");
        self.variants.insert(rules.id, rules);
        Ok(())
    }

    pub fn variant(&self, id: VariantId) -> Option<VariantRules> {
        self.variants.get(&id).map(|v| v.value().clone())
    }

    // ---- persistence and events ----

    fn snapshot_of(&self, round: &GameRound) -> RoundSnapshot {
        let balances: BTreeMap<PlayerId, u64> = round
            .participants
            .iter()
            .map(|p| (p.player.clone(), self.ledger.balance_of(&p.player)))
            .collect();
        RoundSnapshot {
            round: round.clone(),
            balances,
            taken_at: Utc::now(),
        }
    }

    fn persist_round(&self, round: &GameRound) -> ChinchiroResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let game = self
            .games
            .get(&round.game_id)
            .map(|g| g.value().clone())
            .ok_or_else(|| {
                RoundError::IntegrityFault(format!("round {} has no game record", round.id))
            })?;
        store.persist(&game, &self.snapshot_of(round))
    }

    /// Apply `op` to a copy of the round and commit it once persisted
    fn mutate_round<T>(
        &self,
        round_id: RoundId,
        op: impl FnOnce(&mut GameRound) -> ChinchiroResult<T>,
    ) -> ChinchiroResult<T> {
        let mut entry = self
            .rounds
            .get_mut(&round_id)
            .ok_or(RoundError::UnknownRound(round_id))?;
        let mut draft = entry.value().clone();
        let output = op(&mut draft)?;
        self.persist_round(&draft)?;
        *entry = draft;
        Ok(output)
    }

    /// Like [`mutate_round`](Self::mutate_round), but first moves the
    /// transfers `deposits` computes into escrow. They are returned if the
    /// step or its persist fails.
    fn mutate_funded_round<T>(
        &self,
        round_id: RoundId,
        deposits: impl FnOnce(&GameRound) -> ChinchiroResult<Vec<Transfer>>,
        op: impl FnOnce(&mut GameRound) -> ChinchiroResult<T>,
    ) -> ChinchiroResult<T> {
        let mut entry = self
            .rounds
            .get_mut(&round_id)
            .ok_or(RoundError::UnknownRound(round_id))?;
        let mut draft = entry.value().clone();
        let deposits = deposits(&draft)?;
        self.ledger.apply_transfers(&deposits)?;

        let applied = op(&mut draft).and_then(|output| {
            self.persist_round(&draft)?;
            Ok(output)
        });
        match applied {
            Ok(output) => {
                *entry = draft;
                Ok(output)
            }
            Err(e) => {
                let refunds: Vec<Transfer> = deposits.iter().rev().map(Transfer::reversed).collect();
                if let Err(refund_error) = self.ledger.apply_transfers(&refunds) {
                    tracing::error!(%round_id, error = %refund_error, "failed to return escrowed funds");
                }
                Err(e)
            }
        }
    }

    fn emit(&self, event: GameEvent) {
        if self.log_events {
            tracing::info!(event = event.name(), round_id = %event.round_id(), "game event");
        }
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    // ---- lifecycle ----

    /// Start a new game and its first round
    pub fn create_round(&self, params: RoundParams) -> ChinchiroResult<RoundId> {
        params.validate()?;
        if !self.variants.contains_key(&params.variant) {
            return Err(RoundError::UnknownVariant(params.variant).into());
        }
        self.ruleset.verify_partition(params.variant)?;

        let game_id = GameId(self.next_game_id.fetch_add(1, Ordering::SeqCst));
        let round_id = RoundId(self.next_round_id.fetch_add(1, Ordering::SeqCst));
        let game = GameRecord {
            id: game_id,
            params: params.clone(),
            rounds: vec![round_id],
            created_at: Utc::now(),
        };
        let round = GameRound::new(round_id, game_id, 1, params.clone());

        if let Some(store) = &self.store {
            store.persist(&game, &self.snapshot_of(&round))?;
        }
        self.games.insert(game_id, game);
        self.rounds.insert(round_id, round);

        self.emit(GameEvent::RoundCreated {
            round_id,
            game_id,
            round_number: 1,
            params,
        });
        Ok(round_id)
    }

    /// Open the next round of the same game with the same participants
    pub fn next_round(&self, previous_id: RoundId, caller: &PlayerId) -> ChinchiroResult<RoundId> {
        let previous = self.round(previous_id)?;
        if !previous.state.is_terminal() {
            return Err(RoundError::InvalidStateTransition {
                operation: "open the next round",
                state: previous.state,
            }
            .into());
        }
        if !previous.is_participant(caller) {
            return Err(RoundError::NotAPlayer(caller.clone()).into());
        }

        let (round, game_id) = {
            let mut game = self.games.get_mut(&previous.game_id).ok_or_else(|| {
                RoundError::IntegrityFault(format!("round {} has no game record", previous_id))
            })?;
            if game.rounds.last() != Some(&previous_id) {
                return Err(RoundError::NotLatestRound(previous_id).into());
            }
            if game.rounds_played() >= game.params.max_rounds {
                return Err(RoundError::MaxRoundsReached {
                    max: game.params.max_rounds,
                }
                .into());
            }

            let round_id = RoundId(self.next_round_id.fetch_add(1, Ordering::SeqCst));
            let round = previous.successor(round_id);
            let mut draft = game.value().clone();
            draft.rounds.push(round_id);

            if let Some(store) = &self.store {
                store.persist(&draft, &self.snapshot_of(&round))?;
            }
            *game = draft;
            (round, game.id)
        };

        let round_id = round.id;
        let round_number = round.round_number;
        let params = round.params.clone();
        self.rounds.insert(round_id, round);

        self.emit(GameEvent::RoundCreated {
            round_id,
            game_id,
            round_number,
            params,
        });
        Ok(round_id)
    }

    pub fn join(&self, round_id: RoundId, player: PlayerId) -> ChinchiroResult<()> {
        self.mutate_round(round_id, |round| Ok(round.join(player.clone())?))?;
        self.emit(GameEvent::PlayerJoined { round_id, player });
        Ok(())
    }

    pub fn claim_bank(&self, round_id: RoundId, player: &PlayerId) -> ChinchiroResult<()> {
        self.mutate_round(round_id, |round| Ok(round.claim_bank(player)?))?;
        self.emit(GameEvent::BankClaimed {
            round_id,
            bank: player.clone(),
        });
        Ok(())
    }

    pub fn place_bet(&self, round_id: RoundId, player: &PlayerId, amount: u64) -> ChinchiroResult<()> {
        self.mutate_funded_round(
            round_id,
            |round| {
                round.check_bet(player, amount)?;
                Ok(vec![Transfer {
                    from: player.clone(),
                    to: escrow_account(round_id),
                    amount,
                }])
            },
            |round| Ok(round.place_bet(player, amount)?),
        )?;

        self.emit(GameEvent::BetPlaced {
            round_id,
            player: player.clone(),
            amount,
        });
        Ok(())
    }

    /// Bank starts the round once every player has bet.
    ///
    /// The bank escrows cover for every bet, then the bank roll is requested.
    pub fn start_round(&self, round_id: RoundId, caller: &PlayerId) -> ChinchiroResult<RequestId> {
        let request_id = self.mutate_funded_round(
            round_id,
            |round| {
                round.check_start(caller)?;
                let cover = bank_cover(round.bets()).ok_or_else(|| {
                    RoundError::IntegrityFault(format!("round {} bets overflow the bank cover", round_id))
                })?;
                Ok(vec![Transfer {
                    from: caller.clone(),
                    to: escrow_account(round_id),
                    amount: cover,
                }])
            },
            |round| {
                let request_id = self.rolls.request_roll(&self.consumer, 1, self.batched_rolls)?;
                round.begin_bank_roll(request_id);
                // Indexed before commit so an early fulfillment waits on the entry lock
                self.pending_rolls.insert(request_id, round_id);
                Ok(request_id)
            },
        )?;

        tracing::debug!(%round_id, %request_id, bank = %caller, "bank roll requested");
        self.emit(GameEvent::BankRollRequested {
            round_id,
            request_id,
        });
        Ok(request_id)
    }

    pub fn roll_for_player(&self, round_id: RoundId, player: &PlayerId) -> ChinchiroResult<RequestId> {
        let request_id = self.mutate_round(round_id, |round| {
            round.check_player_roll(player)?;
            let request_id = self.rolls.request_roll(&self.consumer, 1, self.batched_rolls)?;
            round.begin_player_roll(player, request_id);
            self.pending_rolls.insert(request_id, round_id);
            Ok(request_id)
        })?;

        tracing::debug!(%round_id, %request_id, %player, "player roll requested");
        self.emit(GameEvent::PlayerRollRequested {
            round_id,
            player: player.clone(),
            request_id,
        });
        Ok(request_id)
    }

    /// Classify a fulfilled roll and record it on the round that asked for it
    pub fn handle_fulfillment(&self, fulfilled: &RollFulfilled) -> ChinchiroResult<()> {
        let request_id = fulfilled.request_id;
        let round_id = self
            .pending_rolls
            .get(&request_id)
            .map(|e| *e.value())
            .ok_or(RoundError::UnknownRequest(request_id))?;
        let triple = *fulfilled.triples.first().ok_or_else(|| {
            RoundError::IntegrityFault(format!("request {} delivered no triple", request_id))
        })?;

        let event = self.mutate_round(round_id, |round| {
            let variant = round.params.variant;
            let category = self.ruleset.classify(variant, &triple).ok_or_else(|| {
                tracing::error!(%round_id, %request_id, %triple, "roll has no classification");
                RoundError::IntegrityFault(format!(
                    "triple {} has no category in variant {}",
                    triple, variant
                ))
            })?;
            let roll = ResolvedRoll {
                request_id,
                triple,
                category,
            };

            match round.owner_of(request_id) {
                Some(RollOwner::Bank(_)) => {
                    round.resolve_bank(roll)?;
                    Ok(GameEvent::BankRollResolved {
                        round_id,
                        triple,
                        category,
                    })
                }
                Some(RollOwner::Player(player)) => {
                    round.resolve_player(&player, roll)?;
                    Ok(GameEvent::PlayerRollResolved {
                        round_id,
                        player,
                        triple,
                        category,
                    })
                }
                None => Err(RoundError::UnknownRequest(request_id).into()),
            }
        })?;

        self.pending_rolls.remove(&request_id);
        self.emit(event);
        Ok(())
    }

    /// Settle every player against the bank and move the funds
    pub fn settle_round(&self, round_id: RoundId, caller: &PlayerId) -> ChinchiroResult<SettlementSummary> {
        let (summary, committed) = {
            let mut entry = self
                .rounds
                .get_mut(&round_id)
                .ok_or(RoundError::UnknownRound(round_id))?;
            let round = entry.value_mut();
            round.check_settle(caller)?;

            let tie_rule = self
                .variants
                .get(&round.params.variant)
                .map(|v| v.tie_rule)
                .ok_or(RoundError::UnknownVariant(round.params.variant))?;
            let (bank, bank_roll) = match (&round.bank, &round.bank_roll) {
                (Some(bank), Some(roll)) => (bank.clone(), roll.clone()),
                _ => {
                    return Err(RoundError::IntegrityFault(format!(
                        "round {} is settling without a bank roll",
                        round_id
                    ))
                    .into())
                }
            };

            let entries = round
                .players()
                .map(|p| {
                    Some(SettlementEntry {
                        player: p.player.clone(),
                        bet: p.bet?,
                        category: p.roll.as_ref()?.category,
                    })
                })
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    RoundError::IntegrityFault(format!("round {} has an unresolved player", round_id))
                })?;

            let summary = settle(round_id, &bank, bank_roll.category, &entries, tie_rule)
                .ok_or_else(|| {
                    RoundError::IntegrityFault(format!("round {} has an unrankable roll", round_id))
                })?;

            self.ledger
                .apply_transfers(&escrow_payouts(&summary, &escrow_account(round_id)))?;
            round.finish(summary.clone());
            (summary, round.clone())
        };

        // Funds have moved, so the settled state stands even if the write fails
        if let Err(e) = self.persist_round(&committed) {
            tracing::error!(%round_id, error = %e, "failed to persist settled round");
            return Err(e);
        }

        tracing::info!(
            %round_id,
            bank = %summary.bank,
            bank_delta = summary.bank_delta,
            "round settled"
        );
        self.emit(GameEvent::RoundSettled {
            round_id,
            bank_delta: summary.bank_delta,
            winners: summary.winners().map(|p| p.player.clone()).collect(),
        });
        Ok(summary)
    }

    // ---- fulfillment delivery ----

    /// Drain queued fulfillments and apply them; returns how many applied
    pub fn process_fulfillments(&self) -> usize {
        let queued: Vec<RollFulfilled> = {
            let mut guard = self
                .fulfillments
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let Some(receiver) = guard.as_mut() else {
                return 0;
            };
            let mut queued = Vec::new();
            while let Ok(fulfilled) = receiver.try_recv() {
                queued.push(fulfilled);
            }
            queued
        };

        queued
            .iter()
            .filter(|fulfilled| match self.handle_fulfillment(fulfilled) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(request_id = %fulfilled.request_id, error = %e, "fulfillment rejected");
                    false
                }
            })
            .count()
    }

    /// Consume fulfillments on a background task.
    ///
    /// Returns `None` if the channel was already taken by an earlier call.
    pub fn spawn_fulfillment_listener(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut receiver = self
            .fulfillments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()?;
        let engine = Arc::clone(self);

        Some(tokio::spawn(async move {
            tracing::debug!("fulfillment listener started");
            while let Some(fulfilled) = receiver.recv().await {
                if let Err(e) = engine.handle_fulfillment(&fulfilled) {
                    tracing::warn!(request_id = %fulfilled.request_id, error = %e, "fulfillment rejected");
                }
            }
            tracing::debug!("fulfillment listener stopped");
        }))
    }

    // ---- reads ----

    pub fn round(&self, round_id: RoundId) -> ChinchiroResult<GameRound> {
        self.rounds
            .get(&round_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| RoundError::UnknownRound(round_id).into())
    }

    pub fn state(&self, round_id: RoundId) -> ChinchiroResult<RoundState> {
        self.rounds
            .get(&round_id)
            .map(|r| r.state)
            .ok_or_else(|| RoundError::UnknownRound(round_id).into())
    }

    /// All participants in join order, bank included
    pub fn players(&self, round_id: RoundId) -> ChinchiroResult<Vec<PlayerId>> {
        Ok(self
            .round(round_id)?
            .participants
            .into_iter()
            .map(|p| p.player)
            .collect())
    }

    /// Each non-bank player's resolved roll, if any
    pub fn player_rolls(&self, round_id: RoundId) -> ChinchiroResult<Vec<(PlayerId, Option<ResolvedRoll>)>> {
        let round = self.round(round_id)?;
        Ok(round
            .players()
            .map(|p| (p.player.clone(), p.roll.clone()))
            .collect())
    }

    pub fn player_balances(&self, round_id: RoundId) -> ChinchiroResult<Vec<(PlayerId, u64)>> {
        Ok(self
            .players(round_id)?
            .into_iter()
            .map(|player| {
                let balance = self.ledger.balance_of(&player);
                (player, balance)
            })
            .collect())
    }

    pub fn snapshot(&self, round_id: RoundId) -> ChinchiroResult<RoundSnapshot> {
        Ok(self.snapshot_of(&self.round(round_id)?))
    }

    pub fn game(&self, game_id: GameId) -> Option<GameRecord> {
        self.games.get(&game_id).map(|g| g.value().clone())
    }

    pub fn pending_roll_count(&self) -> usize {
        self.pending_rolls.len()
    }

    pub fn consumer(&self) -> &ConsumerId {
        &self.consumer
    }
}
