use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use entity_canon::{
    load_entities_csv, CanonConfig, Canonicalizer, DetectionSummary, EntityStore, EntityType,
    MergeError, MergeStrategy, SqliteStore,
};

const USAGE: &str = "\
Usage: entity-canon <command> [args]

Commands:
  import <file.csv>                               Load entity snapshots into the database
  scan <type>                                     List duplicate pairs (destination|attraction|hotel|article)
  merge <source-id> <target-id> [strategy] [actor] Merge source into target (keep_target|keep_source|merge_content)
  undo <redirect-id> [actor]                      Reverse a merge
  resolve <id>                                    Follow redirects to the canonical id
  history <id>                                    Show redirects touching an entity
  dismiss <id-a> <id-b> [actor]                   Mark a pair as not a duplicate
";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,entity_canon=debug")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprint!("{}", USAGE);
        std::process::exit(2);
    };

    let config = CanonConfig::from_env()?;
    let store = Arc::new(
        SqliteStore::open(&config.db_path)
            .with_context(|| format!("Failed to open {}", config.db_path.display()))?,
    );

    if command == "import" {
        return run_import(&store, arg(&args, 1, "csv path")?);
    }

    let canon = Canonicalizer::from_config(store as Arc<dyn EntityStore>, &config)?;

    match command.as_str() {
        "scan" => run_scan(&canon, arg(&args, 1, "entity type")?),
        "merge" => run_merge(
            &canon,
            arg(&args, 1, "source id")?,
            arg(&args, 2, "target id")?,
            args.get(3).map(String::as_str).unwrap_or("keep_target"),
            actor(&args, 4),
        ),
        "undo" => run_undo(&canon, arg(&args, 1, "redirect id")?, actor(&args, 2)),
        "resolve" => run_resolve(&canon, arg(&args, 1, "entity id")?),
        "history" => run_history(&canon, arg(&args, 1, "entity id")?),
        "dismiss" => {
            let (a, b) = (arg(&args, 1, "first id")?, arg(&args, 2, "second id")?);
            canon.dismiss(a, b, actor(&args, 3))?;
            println!("✓ Dismissed {} / {}", a, b);
            Ok(())
        }
        other => {
            eprint!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

fn arg<'a>(args: &'a [String], idx: usize, name: &str) -> Result<&'a str> {
    match args.get(idx) {
        Some(value) => Ok(value.as_str()),
        None => bail!("Missing argument: {}\n\n{}", name, USAGE),
    }
}

fn actor(args: &[String], idx: usize) -> &str {
    args.get(idx).map(String::as_str).unwrap_or("cli")
}

fn run_import(store: &SqliteStore, csv_path: &str) -> Result<()> {
    println!("🗄️  Entity Import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading CSV...");
    let entries = load_entities_csv(Path::new(csv_path))?;
    println!("✓ Loaded {} entities from CSV", entries.len());

    println!("\n💾 Inserting entities...");
    let inserted = store.insert_entities(&entries)?;
    let count = store.count_entities()?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ New entities: {}", inserted);
    println!("✓ Already present: {}", entries.len() - inserted);
    println!("✓ Database contains {} entities", count);

    Ok(())
}

fn run_scan(canon: &Canonicalizer, raw_type: &str) -> Result<()> {
    let entity_type: EntityType = raw_type.parse()?;
    let pairs = canon.scan(entity_type)?;

    println!("🔍 Duplicate scan: {}", entity_type);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for pair in &pairs {
        println!(
            "{:<7} {:<7} {:.3}  {:<18} {} \"{}\"  ↔  {} \"{}\"",
            format!("{:?}", pair.suggested_action).to_lowercase(),
            format!("{:?}", pair.confidence).to_lowercase(),
            pair.similarity,
            pair.match_type.as_str(),
            pair.entity_a.id,
            pair.entity_a.name,
            pair.entity_b.id,
            pair.entity_b.name,
        );
        for reason in &pair.reasons {
            println!("        - {}", reason);
        }
    }

    println!("\n{}", DetectionSummary::from_pairs(&pairs).summary());
    Ok(())
}

fn run_merge(canon: &Canonicalizer, source: &str, target: &str, raw_strategy: &str, actor: &str) -> Result<()> {
    let strategy: MergeStrategy = raw_strategy.parse()?;

    match canon.merge(source, target, strategy, actor) {
        Ok(result) => {
            println!("✅ Merged {} → {} ({})", source, result.target.id, strategy);
            if result.requested_target_id != result.target.id {
                println!("   {} was already merged; used its canonical target", result.requested_target_id);
            }
            println!("   Redirect: {}", result.redirect_id);
            println!("   Target now has {} content blocks", result.blocks.len());
            Ok(())
        }
        Err(e @ MergeError::Store(_)) => Err(e.into()),
        Err(e) => {
            eprintln!("❌ {} [{}]", e, e.code());
            std::process::exit(1);
        }
    }
}

fn run_undo(canon: &Canonicalizer, redirect_id: &str, actor: &str) -> Result<()> {
    if canon.undo(redirect_id, actor)? {
        println!("✅ Undid redirect {}", redirect_id);
    } else {
        println!("Nothing to undo: {} is missing or already inactive", redirect_id);
    }
    Ok(())
}

fn run_resolve(canon: &Canonicalizer, id: &str) -> Result<()> {
    let chain = canon.resolve_chain(id);
    println!("{}", chain.join(" → "));
    Ok(())
}

fn run_history(canon: &Canonicalizer, id: &str) -> Result<()> {
    let redirects = canon.history().history_for(id)?;
    if redirects.is_empty() {
        println!("No merges involve {}", id);
        return Ok(());
    }

    for r in redirects {
        println!(
            "{}  {} → {}  {:<8}  by {} at {}",
            r.id,
            r.from_id,
            r.to_id,
            r.status.as_str(),
            r.merged_by,
            r.merged_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}
