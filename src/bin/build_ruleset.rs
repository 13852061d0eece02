//! Offline classifier run: expands a rule table into per-category
//! fingerprint sets and writes them as JSON for seeding a ruleset.

use chinchiro::{
    errors::ChinchiroResult,
    games::{OutcomeRuleset, PermutationClassifier, RuleTable, VariantId},
};
use clap::Parser;
use std::{fs, path::PathBuf};

#[derive(Parser)]
#[command(name = "build_ruleset")]
#[command(about = "Generate outcome fingerprint sets from a rule table")]
struct Args {
    /// Rule table JSON; the built-in chinchiro table when omitted
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed a scratch ruleset and check the sets partition every roll
    #[arg(long)]
    verify: bool,
}

fn main() -> ChinchiroResult<()> {
    let args = Args::parse();

    let rules = match &args.rules {
        Some(path) => RuleTable::from_json(&fs::read_to_string(path)?)?,
        None => RuleTable::chinchiro(),
    };
    eprintln!("📖 {} rule entries loaded", rules.len());

    let output = PermutationClassifier::new(rules).build();
    for (category, fingerprints) in &output.outcomes {
        eprintln!("   {:<12} {:>3}", category.to_string(), fingerprints.len());
    }
    if !output.dropped.is_empty() {
        eprintln!("⚠️  {} rolls matched no rule", output.dropped.len());
    }

    if args.verify {
        let (ruleset, admin) = OutcomeRuleset::new();
        let variant = VariantId(1);
        ruleset.seed(&admin, variant, &output)?;
        ruleset.verify_partition(variant)?;
        eprintln!("✅ Partition verified");
    }

    let json = serde_json::to_string_pretty(&output)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json)?;
            eprintln!("💾 Written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
