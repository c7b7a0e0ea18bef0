//! Offline draw statistics
//!
//! Runs many draws against one case and compares the observed item
//! frequencies with the configured weights.

use clap::Parser;
use lootcase::cases::random::{DrawContext, OsRandomSource, RandomSource, SeededRandomSource};
use lootcase::cases::{AccountId, CaseCatalog, CaseId, DrawEngine, ItemId};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "lootcase-draw-stats")]
#[command(about = "Compare empirical draw frequencies with catalog weights", long_about = None)]
struct Args {
    /// Case to draw from
    #[arg(long, default_value = "1")]
    case: u32,

    /// Number of draws
    #[arg(long, default_value = "100000")]
    draws: usize,

    /// Catalog TOML file; the built-in catalog is used when omitted
    #[arg(long)]
    catalog: Option<String>,

    /// Seed for a reproducible run instead of the OS generator
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    if args.draws == 0 {
        return Err("--draws must be positive".into());
    }

    let catalog = match &args.catalog {
        Some(path) => CaseCatalog::load(path)?,
        None => CaseCatalog::builtin(),
    };
    let case = catalog
        .get_case(CaseId(args.case))
        .ok_or_else(|| format!("case {} is not in the catalog", args.case))?;

    let source: Box<dyn RandomSource> = match args.seed {
        Some(seed) => Box::new(SeededRandomSource::new(seed)),
        None => Box::new(OsRandomSource),
    };

    println!(
        "{} (case {}): {} draws, {} source, total weight {}",
        case.name,
        case.id,
        args.draws,
        source.name(),
        case.total_weight()
    );

    let account = AccountId::new("draw-stats");
    let started = Instant::now();
    let mut counts: HashMap<ItemId, usize> = HashMap::new();
    let mut paid_out: u64 = 0;
    for _ in 0..args.draws {
        let context = DrawContext::new(Uuid::new_v4(), case.id, account.clone());
        let draw = DrawEngine::draw(case, source.as_ref(), &context);
        *counts.entry(draw.item.id).or_default() += 1;
        paid_out = paid_out.saturating_add(draw.item.value);
    }
    let elapsed = started.elapsed();

    println!();
    println!(
        "{:<20} {:<10} {:>8} {:>10} {:>10} {:>8}",
        "item", "rarity", "weight", "expected", "observed", "sigma"
    );
    let draws = args.draws as f64;
    for (item, expected) in DrawEngine::expected_frequencies(case) {
        let observed = counts.get(&item.id).copied().unwrap_or(0) as f64 / draws;
        let std_dev = (expected * (1.0 - expected) / draws).sqrt();
        let sigma = if std_dev > 0.0 {
            (observed - expected) / std_dev
        } else {
            0.0
        };
        println!(
            "{:<20} {:<10} {:>8} {:>9.4}% {:>9.4}% {:>+8.2}",
            item.name,
            item.rarity.to_string(),
            item.weight,
            expected * 100.0,
            observed * 100.0,
            sigma
        );
    }

    let spent = case.price as f64 * draws;
    println!();
    println!("Return to player: {:.2}%", paid_out as f64 / spent * 100.0);
    println!(
        "Elapsed: {:.2?} ({:.0} draws/s)",
        elapsed,
        draws / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    Ok(())
}
