//! Chinchiro table simulator
//!
//! Runs a game of several rounds against the in-process VRF oracle, rotating
//! the bank each round and fulfilling roll requests out of order.

use chinchiro::{
    config::{generate_sample_config, ChinchiroConfig, ConfigLoader, StorageBackend},
    errors::{ChinchiroResult, RoundError},
    factory::{ChinchiroTable, TableFactory},
    games::{GameEvent, LedgerAccount, PlayerId, RoundId, RoundState},
    logging::init_tracing,
};
use clap::{Parser, Subcommand};
use rand::seq::SliceRandom;
use std::{path::PathBuf, time::Duration};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "chinchiro")]
#[command(about = "Verifiable dice-wagering table")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Persist rounds to RocksDB in this directory
    #[arg(short, long)]
    data_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a simulated game
    Simulate {
        /// Seats at the table, bank included
        #[arg(short, long, default_value = "4")]
        players: usize,

        /// Rounds to play
        #[arg(short, long, default_value = "4")]
        rounds: u32,

        /// Bet placed by every player each round
        #[arg(short, long, default_value = "100")]
        bet: u64,
    },

    /// Write a sample configuration file
    GenerateConfig {
        #[arg(short, long, default_value = "chinchiro.toml")]
        output: String,
    },
}

const ROLL_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ChinchiroResult<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if cli.verbose {
        config.monitoring.log_level = "debug".parse()?;
    }
    if let Some(dir) = cli.data_dir {
        config.storage.backend = StorageBackend::RocksDb;
        config.storage.data_directory = dir;
    }
    init_tracing(&config.monitoring);

    match cli.command {
        Commands::Simulate {
            players,
            rounds,
            bet,
        } => run_simulation(config, players, rounds, bet).await,
        Commands::GenerateConfig { output } => {
            generate_sample_config(&output)?;
            println!("📝 Sample configuration written to {}", output);
            Ok(())
        }
    }
}

async fn run_simulation(
    mut config: ChinchiroConfig,
    seats: usize,
    rounds: u32,
    bet: u64,
) -> ChinchiroResult<()> {
    config.table.min_players = seats;
    config.table.max_players = seats;
    config.table.max_rounds = rounds;
    config.table.min_bet = config.table.min_bet.min(bet);
    config.table.max_bet = config.table.max_bet.max(bet);

    println!("🎲 Chinchiro table simulation");
    println!("=============================");
    println!("   Seats: {}  Rounds: {}  Bet: {}", seats, rounds, bet);

    let table = TableFactory::create_table(config)?;
    let players: Vec<PlayerId> = (1..=seats).map(|i| PlayerId::new(format!("player-{}", i))).collect();
    table.fund_players(&players)?;
    let supply = table.ledger.total_supply();

    let mut events = table.engine.subscribe_events();
    let listener = table.engine.spawn_fulfillment_listener();

    let mut previous: Option<RoundId> = None;
    for number in 0..rounds as usize {
        let round_id = match previous {
            None => {
                let id = table.engine.create_round(table.config.table.round_params())?;
                for player in &players {
                    table.engine.join(id, player.clone())?;
                }
                id
            }
            Some(prev) => table.engine.next_round(prev, &players[0])?,
        };

        let bank = &players[number % players.len()];
        play_round(&table, &mut events, round_id, bank, bet).await?;
        previous = Some(round_id);
    }

    println!("\n💰 Final balances");
    let mut total = 0;
    for player in &players {
        let balance = table.ledger.balance_of(player);
        total += balance;
        println!("   {:<10} {:>8}", player.to_string(), balance);
    }
    println!("   supply before {} / after {}", supply, total);

    if let Some(handle) = listener {
        handle.abort();
    }
    Ok(())
}

async fn play_round(
    table: &ChinchiroTable,
    events: &mut broadcast::Receiver<GameEvent>,
    round_id: RoundId,
    bank: &PlayerId,
    bet: u64,
) -> ChinchiroResult<()> {
    let engine = &table.engine;
    println!("\n🎯 Round {} (bank: {})", round_id, bank);

    engine.claim_bank(round_id, bank)?;
    let players: Vec<PlayerId> = engine
        .players(round_id)?
        .into_iter()
        .filter(|p| p != bank)
        .collect();
    for player in &players {
        engine.place_bet(round_id, player, bet)?;
    }

    let bank_request = engine.start_round(round_id, bank)?;
    table.coordinator.fulfill_random_words(bank_request, &table.rolls)?;
    wait_for_state(table, events, round_id, RoundState::BankResolved).await?;

    let mut requests = Vec::with_capacity(players.len());
    for player in &players {
        requests.push(engine.roll_for_player(round_id, player)?);
    }
    requests.shuffle(&mut rand::thread_rng());
    for request_id in requests {
        table.coordinator.fulfill_random_words(request_id, &table.rolls)?;
    }
    wait_for_state(table, events, round_id, RoundState::Settling).await?;

    let summary = engine.settle_round(round_id, bank)?;
    println!("   bank rolled {}", summary.bank_category);
    for entry in &summary.players {
        let marker = if entry.delta > 0 { "✅" } else if entry.delta < 0 { "❌" } else { "➖" };
        println!(
            "   {} {:<10} {:<12} {:+}",
            marker,
            entry.player.to_string(),
            entry.category.to_string(),
            entry.delta
        );
    }
    println!("   bank delta {:+}", summary.bank_delta);
    Ok(())
}

/// Block until the round reaches `target`, driven by engine events
async fn wait_for_state(
    table: &ChinchiroTable,
    events: &mut broadcast::Receiver<GameEvent>,
    round_id: RoundId,
    target: RoundState,
) -> ChinchiroResult<()> {
    loop {
        if table.engine.state(round_id)? == target {
            return Ok(());
        }
        match tokio::time::timeout(ROLL_TIMEOUT, events.recv()).await {
            Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {
                let missing = table.engine.round(round_id)?.unresolved_rolls();
                return Err(RoundError::RollsIncomplete { missing }.into());
            }
        }
    }
}
