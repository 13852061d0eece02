pub mod types;
pub mod classifier;
pub mod ruleset;
pub mod vrf_engine;
pub mod oracle;
pub mod pending_pool;
pub mod roll_service;
pub mod ledger;
pub mod settlement;
pub mod round;
pub mod events;
pub mod engine;

pub use types::*;
pub use classifier::{ClassifierOutput, PermutationClassifier, RuleEntry, RuleTable};
pub use ruleset::OutcomeRuleset;
pub use vrf_engine::{RandomnessProof, VRFRollEngine};
pub use oracle::{OracleRequest, RandomnessOracle, VrfCoordinator};
pub use pending_pool::PendingRollsPool;
pub use roll_service::{RollFulfilled, RollService, RollServiceConfig};
pub use ledger::{InMemoryLedger, LedgerAccount, Transfer};
pub use settlement::{escrow_account, SettlementSummary, Verdict};
pub use round::{GameRecord, GameRound, RoundParams, RoundSnapshot, RoundState};
pub use events::GameEvent;
pub use engine::RoundEngine;
