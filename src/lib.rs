//! Chinchiro - verifiable dice-wagering rounds
//!
//! Three parts cooperate:
//! - [`games::RollService`] asks a randomness oracle for words and turns
//!   them into die triples, delivering results asynchronously.
//! - [`games::PermutationClassifier`] expands a rule table into per-category
//!   fingerprint sets that seed the [`games::OutcomeRuleset`].
//! - [`games::RoundEngine`] runs each round from joining to a zero-sum
//!   settlement applied through a [`games::LedgerAccount`].

pub mod auth;
pub mod config;
pub mod errors;
pub mod factory;
pub mod games;
pub mod logging;
pub mod round_store;
pub mod storage;

pub use config::{ChinchiroConfig, ConfigLoader};
pub use errors::{ChinchiroError, ChinchiroResult};
pub use factory::{ChinchiroTable, TableFactory};
pub use round_store::{InMemoryRoundStore, RocksRoundStore, RoundStore};
pub use storage::OptimizedStorage;
