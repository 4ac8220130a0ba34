use anyhow::{Context, Result};
use rowscript::config::parse_duration;
use rowscript::model::{RecordId, StockQuote};
use rowscript::repository::{
    MemoryRecordRepository, MemoryResultRepository, ResultRepository, ScriptRepository,
};
use rowscript::{Script, ScriptHost};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::load_config;
use crate::cli::EvaluateArgs;

pub async fn run(args: EvaluateArgs) -> Result<()> {
    let mut config = load_config(&args.common)?;
    if let Some(timeout) = args.timeout {
        parse_duration(&timeout).context("Invalid --timeout")?;
        config.evaluation.timeout = timeout;
    }

    let source = fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read script: {}", args.script))?;
    let quotes = read_quotes(&args.records)?;

    let host = ScriptHost::start(config)?;
    let outcome = evaluate(&host, &args.script, source, quotes).await;
    host.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&outcome?)?);
    Ok(())
}

async fn evaluate(
    host: &ScriptHost,
    name: &str,
    source: String,
    quotes: Vec<StockQuote>,
) -> Result<BTreeMap<RecordId, serde_json::Value>> {
    let scripts = host.script_repository::<StockQuote>();
    let id = scripts.add(Script::new(name, source))?;
    let script = scripts
        .get_by_id(id, true)?
        .context("Stored script disappeared")?;

    let records = Arc::new(MemoryRecordRepository::with_records(quotes)?);
    let results = Arc::new(MemoryResultRepository::new());
    let service = host.evaluation_service::<StockQuote, _, _>(records, Arc::clone(&results));

    let values = service.evaluate(&script).await?;
    tracing::info!(
        "Stored {} results for script {}",
        results.get_all(script.id)?.len(),
        script.id
    );
    Ok(values)
}

/// Quotes from a JSON array
fn read_quotes(path: &str) -> Result<Vec<StockQuote>> {
    let content = fs::read_to_string(Path::new(path))
        .with_context(|| format!("Failed to read records: {}", path))?;
    let mut quotes: Vec<StockQuote> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records: {}", path))?;

    number_quotes(&mut quotes);
    Ok(quotes)
}

/// Give quotes without an id the lowest ids no other quote uses
fn number_quotes(quotes: &mut [StockQuote]) {
    let mut taken: BTreeSet<RecordId> = quotes
        .iter()
        .map(|quote| quote.id)
        .filter(|id| *id != 0)
        .collect();

    let mut next: RecordId = 1;
    for quote in quotes.iter_mut().filter(|quote| quote.id == 0) {
        while taken.contains(&next) {
            next += 1;
        }
        quote.id = next;
        taken.insert(next);
    }
}
