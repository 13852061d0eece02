//! Persistent game records and round snapshots.

use crate::{
    errors::{ChinchiroError, ChinchiroResult, StorageError},
    games::round::{GameRecord, RoundSnapshot},
    games::types::{GameId, RoundId},
    storage::OptimizedStorage,
};
use dashmap::DashMap;
use serde::de::DeserializeOwned;

const GAME_PREFIX: &str = "game:record:";
const ROUND_PREFIX: &str = "round:snapshot:";
const ROUND_INDEX_PREFIX: &[u8] = b"round:index:";

/// Where the engine keeps committed state
pub trait RoundStore: Send + Sync {
    /// Write the game record and round snapshot together
    fn persist(&self, game: &GameRecord, snapshot: &RoundSnapshot) -> ChinchiroResult<()>;

    fn load_game(&self, id: GameId) -> ChinchiroResult<Option<GameRecord>>;

    fn load_round(&self, id: RoundId) -> ChinchiroResult<Option<RoundSnapshot>>;

    /// Round ids in ascending order, paged by an opaque cursor
    fn list_rounds(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> ChinchiroResult<(Vec<RoundId>, Option<String>)>;
}

#[derive(Default)]
pub struct InMemoryRoundStore {
    games: DashMap<GameId, GameRecord>,
    rounds: DashMap<RoundId, RoundSnapshot>,
}

impl InMemoryRoundStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoundStore for InMemoryRoundStore {
    fn persist(&self, game: &GameRecord, snapshot: &RoundSnapshot) -> ChinchiroResult<()> {
        self.games.insert(game.id, game.clone());
        self.rounds.insert(snapshot.round.id, snapshot.clone());
        Ok(())
    }

    fn load_game(&self, id: GameId) -> ChinchiroResult<Option<GameRecord>> {
        Ok(self.games.get(&id).map(|g| g.value().clone()))
    }

    fn load_round(&self, id: RoundId) -> ChinchiroResult<Option<RoundSnapshot>> {
        Ok(self.rounds.get(&id).map(|r| r.value().clone()))
    }

    fn list_rounds(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> ChinchiroResult<(Vec<RoundId>, Option<String>)> {
        let after = match cursor {
            Some(c) => Some(c.parse::<u64>().map_err(|e| {
                StorageError::CorruptedData(format!("Invalid cursor {}: {}", c, e))
            })?),
            None => None,
        };

        let mut ids: Vec<RoundId> = self
            .rounds
            .iter()
            .map(|r| *r.key())
            .filter(|id| after.map_or(true, |a| id.0 > a))
            .collect();
        ids.sort();
        ids.truncate(limit.max(1));

        let next = ids.last().map(|id| id.0.to_string());
        Ok((ids, next))
    }
}

fn game_key(id: GameId) -> Vec<u8> {
    format!("{}{}", GAME_PREFIX, id).into_bytes()
}

fn round_key(id: RoundId) -> Vec<u8> {
    format!("{}{}", ROUND_PREFIX, id).into_bytes()
}

fn round_index_key(id: RoundId) -> Vec<u8> {
    // Big-endian so the index scans in numeric order
    let mut key = Vec::with_capacity(ROUND_INDEX_PREFIX.len() + 8);
    key.extend_from_slice(ROUND_INDEX_PREFIX);
    key.extend_from_slice(&id.0.to_be_bytes());
    key
}

/// RocksDB-backed store with JSON values
#[derive(Clone)]
pub struct RocksRoundStore {
    storage: OptimizedStorage,
}

impl RocksRoundStore {
    pub fn new(storage: OptimizedStorage) -> Self {
        Self { storage }
    }

    fn read<T: DeserializeOwned>(&self, key: &[u8], what: &str) -> ChinchiroResult<Option<T>> {
        let Some(bytes) = self
            .storage
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?
        else {
            return Ok(None);
        };

        let value = serde_json::from_slice(&bytes).map_err(|e| {
            ChinchiroError::Storage(StorageError::CorruptedData(format!(
                "Failed to decode {}: {}",
                what, e
            )))
        })?;
        Ok(Some(value))
    }
}

impl RoundStore for RocksRoundStore {
    fn persist(&self, game: &GameRecord, snapshot: &RoundSnapshot) -> ChinchiroResult<()> {
        let round_id = snapshot.round.id;
        let game_bytes = serde_json::to_vec(game).map_err(|e| {
            StorageError::WriteFailed(format!("Failed to encode game {}: {}", game.id, e))
        })?;
        let round_bytes = serde_json::to_vec(snapshot).map_err(|e| {
            StorageError::WriteFailed(format!("Failed to encode round {}: {}", round_id, e))
        })?;

        let items: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (game_key(game.id), game_bytes),
            (round_key(round_id), round_bytes),
            (round_index_key(round_id), Vec::new()),
        ];
        self.storage
            .batch_write(&items)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        tracing::trace!(%round_id, state = %snapshot.round.state, "round snapshot persisted");
        Ok(())
    }

    fn load_game(&self, id: GameId) -> ChinchiroResult<Option<GameRecord>> {
        self.read(&game_key(id), &format!("game {}", id))
    }

    fn load_round(&self, id: RoundId) -> ChinchiroResult<Option<RoundSnapshot>> {
        self.read(&round_key(id), &format!("round {}", id))
    }

    fn list_rounds(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> ChinchiroResult<(Vec<RoundId>, Option<String>)> {
        let cursor_bytes = match cursor {
            Some(c) => Some(hex::decode(c).map_err(|e| {
                StorageError::CorruptedData(format!("Invalid cursor hex: {}", e))
            })?),
            None => None,
        };

        let rows = self
            .storage
            .scan_prefix(ROUND_INDEX_PREFIX, cursor_bytes.as_deref(), limit.max(1))
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        let mut next_cursor = None;
        for (key, _value) in rows {
            let Some(id_bytes) = key
                .get(ROUND_INDEX_PREFIX.len()..)
                .and_then(|b| <[u8; 8]>::try_from(b).ok())
            else {
                tracing::warn!(key = %hex::encode(&key), "skipping malformed round index key");
                continue;
            };
            ids.push(RoundId(u64::from_be_bytes(id_bytes)));
            next_cursor = Some(hex::encode(&key));
        }

        Ok((ids, next_cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::round::{GameRound, RoundParams};
    use crate::games::types::PlayerId;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample(round: u64) -> (GameRecord, RoundSnapshot) {
        let game = GameRecord {
            id: GameId(1),
            params: RoundParams::default(),
            rounds: (1..=round).map(RoundId).collect(),
            created_at: Utc::now(),
        };
        let mut balances: BTreeMap<PlayerId, u64> = BTreeMap::new();
        balances.insert("alice".into(), 10_000);
        let snapshot = RoundSnapshot {
            round: GameRound::new(RoundId(round), GameId(1), round as u32, RoundParams::default()),
            balances,
            taken_at: Utc::now(),
        };
        (game, snapshot)
    }

    #[test]
    fn test_memory_store_paging() {
        let store = InMemoryRoundStore::new();
        for i in 1..=5 {
            let (game, snapshot) = sample(i);
            store.persist(&game, &snapshot).unwrap();
        }

        let (first, cursor) = store.list_rounds(None, 3).unwrap();
        assert_eq!(first, vec![RoundId(1), RoundId(2), RoundId(3)]);
        let (rest, _) = store.list_rounds(cursor.as_deref(), 3).unwrap();
        assert_eq!(rest, vec![RoundId(4), RoundId(5)]);

        assert_eq!(store.load_game(GameId(1)).unwrap().unwrap().rounds.len(), 5);
        assert!(store.list_rounds(Some("nope"), 1).is_err());
    }

    #[test]
    fn test_rocks_store_roundtrip_and_index_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RocksRoundStore::new(OptimizedStorage::new(dir.path()).unwrap());

        for i in [2u64, 300, 1] {
            let (game, snapshot) = sample(i);
            store.persist(&game, &snapshot).unwrap();
        }

        let (ids, cursor) = store.list_rounds(None, 2).unwrap();
        assert_eq!(ids, vec![RoundId(1), RoundId(2)]);
        let (ids, _) = store.list_rounds(cursor.as_deref(), 10).unwrap();
        assert_eq!(ids, vec![RoundId(300)]);

        let loaded = store.load_round(RoundId(300)).unwrap().expect("persisted");
        assert_eq!(loaded.round.round_number, 300);
        assert_eq!(loaded.balances.get(&PlayerId::from("alice")), Some(&10_000));
        assert!(store.load_round(RoundId(4)).unwrap().is_none());
        assert_eq!(store.load_game(GameId(1)).unwrap().unwrap().rounds.len(), 1);
    }
}
