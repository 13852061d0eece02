//! Error types for the Chinchiro settlement engine
//!
//! Every failing operation aborts as a whole; nothing here is retried by the
//! core. Each layer owns its own error enum and the root error wraps them.

use crate::games::types::{ConsumerId, OutcomeCategory, PlayerId, RequestId, RoundId, VariantId};
use crate::games::round::RoundState;

/// Root error type for all Chinchiro operations
#[derive(Debug, thiserror::Error)]
pub enum ChinchiroError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Roll error: {0}")]
    Roll(#[from] RollError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Ruleset error: {0}")]
    Ruleset(#[from] RulesetError),

    #[error("Round error: {0}")]
    Round(#[from] RoundError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),
}

/// Configuration and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Die and raw-word errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiceError {
    #[error("Die face {0} is outside 1..=6")]
    FaceOutOfRange(u8),

    #[error("Invalid random word: {0}")]
    InvalidWord(String),
}

/// Randomness-layer errors raised by the roll service
#[derive(Debug, thiserror::Error)]
pub enum RollError {
    #[error("Consumer {0} is not registered for rolls")]
    Unauthorized(ConsumerId),

    #[error("Caller lacks the roll service admin capability")]
    AdminRequired,

    #[error("Triple count must be greater than zero")]
    InvalidTripleCount,

    #[error("Request {0} has not been fulfilled")]
    NotFulfilled(RequestId),

    #[error("Unknown request {0}")]
    UnknownRequest(RequestId),

    #[error("Request {0} was already fulfilled")]
    AlreadyFulfilled(RequestId),

    #[error("Fulfillment for request {0} carried no words")]
    EmptyFulfillment(RequestId),

    #[error("Request {request_id} expected {expected} words, got {actual}")]
    WordCountMismatch {
        request_id: RequestId,
        expected: usize,
        actual: usize,
    },

    #[error("Oracle rejected the request: {0}")]
    Oracle(#[from] OracleError),
}

/// Errors raised by a randomness oracle implementation
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("Request rejected: {0}")]
    RequestRejected(String),

    #[error("Unknown oracle request {0}")]
    UnknownRequest(RequestId),

    #[error("VRF failure: {0}")]
    Vrf(String),
}

/// Outcome ruleset errors
#[derive(Debug, thiserror::Error)]
pub enum RulesetError {
    #[error("Caller lacks the ruleset admin capability")]
    Unauthorized,

    #[error("Category {0} compares two rolls and has no static fingerprints")]
    MetaCategory(OutcomeCategory),

    #[error("Unknown outcome category '{0}'")]
    UnknownCategory(String),

    #[error("Variant {variant} covers {covered} of 216 ordered triples")]
    IncompletePartition { variant: VariantId, covered: usize },

    #[error("Variant {variant} classifies {triple} into more than one category")]
    OverlappingPartition { variant: VariantId, triple: String },

    #[error("Invalid rule table: {0}")]
    InvalidRuleTable(String),
}

/// Round state machine errors
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error("Round already has the maximum of {max} players")]
    CapacityExceeded { max: usize },

    #[error("Player {0} already joined")]
    AlreadyJoined(PlayerId),

    #[error("{0} is not a player in this round")]
    NotAPlayer(PlayerId),

    #[error("Round needs {min} players, only {joined} joined")]
    NotEnoughPlayers { joined: usize, min: usize },

    #[error("{0} is not the bank")]
    NotBank(PlayerId),

    #[error("The bank cannot place a bet")]
    BankCannotBet,

    #[error("The bank cannot roll as a player")]
    BankCannotRoll,

    #[error("Bet {amount} outside [{min}, {max}]")]
    BetOutOfRange { amount: u64, min: u64, max: u64 },

    #[error("Player {0} already bet this round")]
    AlreadyBet(PlayerId),

    #[error("Player {0} already rolled this round")]
    AlreadyRolled(PlayerId),

    #[error("{missing} player(s) have not bet yet")]
    IncompletePlaying { missing: usize },

    #[error("{missing} roll(s) are still unresolved")]
    RollsIncomplete { missing: usize },

    #[error("Cannot {operation} while round is {state}")]
    InvalidStateTransition {
        operation: &'static str,
        state: RoundState,
    },

    #[error("Game already played its {max} rounds")]
    MaxRoundsReached { max: u32 },

    #[error("Unknown round {0}")]
    UnknownRound(RoundId),

    #[error("Round {0} is not the latest round of its game")]
    NotLatestRound(RoundId),

    #[error("Unknown variant {0}")]
    UnknownVariant(VariantId),

    #[error("Invalid round parameters: {0}")]
    InvalidParams(String),

    #[error("Request {0} does not belong to any round")]
    UnknownRequest(RequestId),

    #[error("Integrity fault: {0}")]
    IntegrityFault(String),
}

/// Ledger collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient funds for {account}: balance {balance}, required {required}")]
    InsufficientFunds {
        account: PlayerId,
        balance: u64,
        required: u64,
    },

    #[error("Balance overflow for {account}")]
    BalanceOverflow { account: PlayerId },
}

/// Storage system errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

impl From<rocksdb::Error> for ChinchiroError {
    fn from(e: rocksdb::Error) -> Self {
        ChinchiroError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<std::io::Error> for ChinchiroError {
    fn from(e: std::io::Error) -> Self {
        ChinchiroError::Storage(StorageError::ReadFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for ChinchiroError {
    fn from(e: serde_json::Error) -> Self {
        ChinchiroError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

// Convenience type alias for Results
pub type ChinchiroResult<T> = Result<T, ChinchiroError>;
