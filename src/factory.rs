//! Table assembly
//!
//! Centralizes the wiring shared by the binaries and integration tests:
//! oracle, roll service, seeded ruleset, ledger, optional round store and
//! the engine on top.

use crate::{
    auth::Capability,
    config::{ChinchiroConfig, StorageBackend},
    errors::{ChinchiroResult, ConfigurationError, StorageError},
    games::{
        classifier::{PermutationClassifier, RuleTable},
        engine::RoundEngine,
        ledger::InMemoryLedger,
        oracle::VrfCoordinator,
        roll_service::RollService,
        ruleset::OutcomeRuleset,
        types::{ConsumerId, PlayerId, VariantRules},
        vrf_engine::VRFRollEngine,
    },
    round_store::{InMemoryRoundStore, RocksRoundStore, RoundStore},
    storage::OptimizedStorage,
};
use std::{fs, sync::Arc};

/// Consumer id the engine registers with the roll service
pub const TABLE_CONSUMER: &str = "chinchiro-table";

/// Every handle of an assembled table
pub struct ChinchiroTable {
    pub config: ChinchiroConfig,
    pub coordinator: Arc<VrfCoordinator>,
    pub rolls: Arc<RollService>,
    pub roll_admin: Capability,
    pub ruleset: Arc<OutcomeRuleset>,
    pub ruleset_admin: Capability,
    pub ledger: Arc<InMemoryLedger>,
    pub store: Arc<dyn RoundStore>,
    pub engine: Arc<RoundEngine>,
    pub engine_admin: Capability,
}

impl ChinchiroTable {
    /// Credit each player the configured starting balance
    pub fn fund_players(&self, players: &[PlayerId]) -> ChinchiroResult<()> {
        for player in players {
            self.ledger.credit(player, self.config.ledger.starting_balance)?;
        }
        Ok(())
    }
}

pub struct TableFactory;

impl TableFactory {
    /// Create a fully wired table from a validated config
    pub fn create_table(config: ChinchiroConfig) -> ChinchiroResult<ChinchiroTable> {
        Self::create_table_with_engine(config, VRFRollEngine::new_random())
    }

    /// Same as [`create_table`](Self::create_table) with a caller-supplied VRF key
    pub fn create_table_with_engine(
        config: ChinchiroConfig,
        vrf: VRFRollEngine,
    ) -> ChinchiroResult<ChinchiroTable> {
        config.validate()?;

        let coordinator = Arc::new(VrfCoordinator::new(vrf));
        let (rolls, roll_admin) =
            RollService::new(coordinator.clone(), config.oracle.roll_service_config());
        let consumer = ConsumerId::new(TABLE_CONSUMER);
        rolls.add_consumer(&roll_admin, consumer.clone())?;
        let rolls = Arc::new(rolls);

        let rules = VariantRules::dragon();
        if rules.id.0 != config.table.variant {
            return Err(ConfigurationError::InvalidValue {
                field: "table.variant".to_string(),
                value: config.table.variant.to_string(),
                reason: format!("only variant {} is built in", rules.id),
            }
            .into());
        }

        let (ruleset, ruleset_admin) = OutcomeRuleset::new();
        let output = PermutationClassifier::new(RuleTable::chinchiro()).build();
        ruleset.seed(&ruleset_admin, rules.id, &output)?;
        let ruleset = Arc::new(ruleset);
        tracing::info!(
            variant = %rules.id,
            fingerprints = output.fingerprint_count(),
            "ruleset seeded"
        );

        let ledger = Arc::new(InMemoryLedger::new());
        let store = Self::create_store(&config)?;

        let (engine, engine_admin) =
            RoundEngine::new(consumer, rolls.clone(), ruleset.clone(), ledger.clone());
        let engine = engine
            .with_store(store.clone())
            .with_batched_rolls(config.oracle.batched_rolls)
            .with_event_logging(config.monitoring.log_events);
        engine.add_variant(&engine_admin, rules)?;

        Ok(ChinchiroTable {
            config,
            coordinator,
            rolls,
            roll_admin,
            ruleset,
            ruleset_admin,
            ledger,
            store,
            engine: Arc::new(engine),
            engine_admin,
        })
    }

    fn create_store(config: &ChinchiroConfig) -> ChinchiroResult<Arc<dyn RoundStore>> {
        let storage = &config.storage;
        match storage.backend {
            StorageBackend::Memory => Ok(Arc::new(InMemoryRoundStore::new())),
            StorageBackend::RocksDb => {
                if storage.clear_on_start {
                    tracing::warn!(path = %storage.data_directory, "clearing round store on start");
                    let _ = fs::remove_dir_all(&storage.data_directory);
                }
                fs::create_dir_all(&storage.data_directory)?;
                let db = OptimizedStorage::with_config(&storage.data_directory, storage)
                    .map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
                tracing::info!(path = %storage.data_directory, "round store opened");
                Ok(Arc::new(RocksRoundStore::new(db)))
            }
        }
    }
}
