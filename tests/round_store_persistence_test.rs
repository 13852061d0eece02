//! Rounds written through a RocksDB-backed table survive reopening the database

use chinchiro::{
    config::{ChinchiroConfig, StorageBackend},
    factory::TableFactory,
    games::{OutcomeCategory, PlayerId, RandomWord, RoundState},
    OptimizedStorage, RocksRoundStore, RoundStore,
};
use tempfile::TempDir;

#[test]
fn test_round_snapshots_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("rounds");

    let mut config = ChinchiroConfig::testing();
    config.storage.backend = StorageBackend::RocksDb;
    config.storage.data_directory = data_dir.to_string_lossy().to_string();
    config.storage.clear_on_start = false;
    config.table.min_players = 2;
    config.table.max_players = 2;

    let (round_id, game_id) = {
        let table = TableFactory::create_table(config).unwrap();
        let engine = &table.engine;
        table.fund_players(&["bank".into(), "p1".into()]).unwrap();

        let round_id = engine.create_round(table.config.table.round_params()).unwrap();
        engine.join(round_id, "bank".into()).unwrap();
        engine.join(round_id, "p1".into()).unwrap();
        engine.claim_bank(round_id, &"bank".into()).unwrap();
        engine.place_bet(round_id, &"p1".into(), 250).unwrap();

        let bank_req = engine.start_round(round_id, &"bank".into()).unwrap();
        let mid_round = table.store.load_round(round_id).unwrap().unwrap();
        assert_eq!(mid_round.round.state, RoundState::BankRolling);
        assert_eq!(mid_round.round.bank_request, Some(bank_req));

        // 6-6-6 against 1-2-3
        let bank_words = vec![RandomWord::from(5); 3];
        table
            .coordinator
            .fulfill_random_words_with_override(bank_req, &table.rolls, bank_words)
            .unwrap();
        engine.process_fulfillments();
        let req = engine.roll_for_player(round_id, &"p1".into()).unwrap();
        let player_words = (0..3u64).map(RandomWord::from).collect();
        table
            .coordinator
            .fulfill_random_words_with_override(req, &table.rolls, player_words)
            .unwrap();
        engine.process_fulfillments();
        engine.settle_round(round_id, &"bank".into()).unwrap();

        (round_id, engine.round(round_id).unwrap().game_id)
    };

    let store = RocksRoundStore::new(OptimizedStorage::new(&data_dir).unwrap());
    let snapshot = store.load_round(round_id).unwrap().expect("round persisted");
    assert_eq!(snapshot.round.state, RoundState::Settled);
    assert_eq!(snapshot.balances[&PlayerId::from("bank")], 10_250);
    assert_eq!(snapshot.balances[&PlayerId::from("p1")], 9_750);

    let settlement = snapshot.round.settlement.expect("settlement recorded");
    assert_eq!(settlement.bank_category, OutcomeCategory::Zorome);
    assert_eq!(settlement.players[0].category, OutcomeCategory::Hifumi);
    assert_eq!(settlement.bank_delta, 250);

    let game = store.load_game(game_id).unwrap().expect("game persisted");
    assert_eq!(game.rounds, vec![round_id]);
    let (ids, _) = store.list_rounds(None, 10).unwrap();
    assert_eq!(ids, vec![round_id]);
}
