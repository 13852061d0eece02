use chinchiro::{
    errors::ChinchiroResult,
    games::RoundId,
    OptimizedStorage, RocksRoundStore, RoundStore,
};
use std::path::Path;

const PAGE_SIZE: usize = 50;

/// Usage: inspect_rounds [db_path] [round_id]
fn main() -> ChinchiroResult<()> {
    let mut args = std::env::args().skip(1);
    let db_path = args.next().unwrap_or_else(|| "./DB/chinchiro_data".to_string());
    let round = args.next().and_then(|s| s.parse::<u64>().ok()).map(RoundId);

    if !Path::new(&db_path).exists() {
        println!("❌ No round data found at {}", db_path);
        return Ok(());
    }
    let store = RocksRoundStore::new(OptimizedStorage::new(&db_path)?);

    println!("🔍 Round Inspector");
    println!("==================");

    if let Some(id) = round {
        match store.load_round(id)? {
            Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
            None => println!("❌ Round {} not found", id),
        }
        return Ok(());
    }

    let mut cursor: Option<String> = None;
    let mut total = 0;
    loop {
        let (ids, next) = store.list_rounds(cursor.as_deref(), PAGE_SIZE)?;
        if ids.is_empty() {
            break;
        }
        for id in &ids {
            let Some(snapshot) = store.load_round(*id)? else {
                println!("   round {:>6}  (index entry without snapshot)", id);
                continue;
            };
            let r = &snapshot.round;
            let bank_delta = r
                .settlement
                .as_ref()
                .map(|s| format!("{:+}", s.bank_delta))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "   round {:>6}  game {:>4}  #{:<3} {:<14} players {}  bank delta {}",
                id,
                r.game_id,
                r.round_number,
                r.state.as_str(),
                r.participants.len(),
                bank_delta
            );
        }
        total += ids.len();
        cursor = next;
    }
    println!("\n📊 {} rounds", total);
    Ok(())
}
