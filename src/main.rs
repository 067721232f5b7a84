use std::{
    io::Read,
    sync::{Arc, Mutex, PoisonError},
};

use clap::Parser;
use kdam::{Bar, BarExt, tqdm};
use keyrank::{
    DataDir,
    Error,
    IndexConfig,
    Indexer,
    Projection,
    Record,
    RecordDb,
    RecordId,
    RecordStore,
    Result,
    SearchOptions,
    store::Filter,
};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("KEYRANK_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Init(args) => cmd_init(&data_dir, args)?,
        Command::Add(args) => {
            let (indexer, db) = open(&data_dir)?;
            cmd_add(&indexer, &db, &args)?;
        }
        Command::Get(args) => {
            let (indexer, db) = open(&data_dir)?;
            cmd_get(&indexer, &db, &args)?;
        }
        Command::Search(args) => {
            let (indexer, db) = open(&data_dir)?;
            cmd_search(&indexer, &db, &args)?;
        }
        Command::Reindex(args) => {
            let (indexer, db) = open(&data_dir)?;
            cmd_reindex(&indexer, &db, &args)?;
        }
        Command::Status(args) => cmd_status(&data_dir, args.json)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

/// Load the configuration and open the record database with the indexer
/// registered as its pre-commit hook.
fn open(data_dir: &DataDir) -> Result<(Arc<Indexer>, RecordDb)> {
    let config = IndexConfig::load(&data_dir.config_file()).map_err(|e| {
        match e {
            Error::NotFound { .. } => Error::Config(format!(
                "no index configured in {}; run `keyrank init` first",
                data_dir.root().display()
            )),
            other => other,
        }
    })?;
    let indexer = Arc::new(Indexer::new(config)?);
    let db = RecordDb::open(&data_dir.records_db(), indexer.binding().clone())?
        .with_hook(indexer.clone());
    Ok((indexer, db))
}

fn cmd_init(data_dir: &DataDir, args: cli::InitArgs) -> Result<()> {
    if data_dir.is_initialized() && !args.force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            data_dir.config_file().display()
        )));
    }

    let mut config = IndexConfig::new(args.fields);
    config.stemmer = args.stemmer;
    config.distance = args.distance;
    config.keywords_field = args.keywords_field;
    config.relevance_field = args.relevance_field;
    config.save(&data_dir.config_file())?;

    println!("Initialized index in {}", data_dir.root().display());
    for field in &config.fields {
        println!("  {}: {}", field.name, field.weight);
    }
    Ok(())
}

fn read_documents(path: &std::path::Path) -> Result<Vec<Value>> {
    let mut contents = String::new();
    if path.as_os_str() == "-" {
        std::io::stdin().read_to_string(&mut contents)?;
    } else {
        contents = std::fs::read_to_string(path)?;
    }

    if contents.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(&contents)?);
    }
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Error::from))
        .collect()
}

fn cmd_add(indexer: &Indexer, db: &RecordDb, args: &cli::AddArgs) -> Result<()> {
    let documents = read_documents(&args.file)?;
    let mut added = 0;
    let mut replaced = 0;

    for doc in documents {
        let mut record = indexer.binding().new_record(doc)?;
        if db.get(record.id())?.is_some() {
            replaced += 1;
        } else {
            added += 1;
        }
        db.save(&mut record)?;
    }

    println!("Added {added} record(s), replaced {replaced}");
    Ok(())
}

/// Look a record up by `#hex` or decimal id, then by the string key it was
/// added with.
fn lookup_record(db: &RecordDb, reference: &str) -> Result<Option<Record>> {
    if let Some(id) = RecordId::parse(reference)
        && let Some(record) = db.get(id)?
    {
        return Ok(Some(record));
    }
    db.get(RecordId::from_key(reference))
}

fn cmd_get(indexer: &Indexer, db: &RecordDb, args: &cli::GetArgs) -> Result<()> {
    let record = lookup_record(db, &args.id)?.ok_or_else(|| Error::NotFound {
        kind: "record",
        name: args.id.clone(),
    })?;
    let record = if args.keywords {
        record
    } else {
        record.project(&Projection::all_fields())
    };

    let doc = indexer.binding().to_output(&record)?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn cmd_search(
    indexer: &Indexer,
    db: &RecordDb,
    args: &cli::SearchArgs,
) -> Result<()> {
    let projection = if args.fields.is_empty() {
        Projection::all_fields()
    } else {
        Projection::fields(args.fields.iter().cloned())
    };
    let options = SearchOptions {
        conditions: args.conditions.clone(),
        sort: (!args.sort.is_empty()).then(|| args.sort.clone()),
        limit: (!args.all).then_some(args.limit),
        skip: Some(args.skip),
        ..SearchOptions::default()
    };

    let found = indexer.search(db, &args.query, &projection, &options)?;

    if args.json {
        let results = found
            .results
            .iter()
            .map(|r| indexer.binding().to_output(r))
            .collect::<Result<Vec<_>>>()?;
        let doc = serde_json::json!({
            "query": args.query,
            "totalCount": found.total_count,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if found.results.is_empty() {
        println!("No results for '{}'", args.query);
        return Ok(());
    }

    let label_field = indexer.fields().first().map(|f| f.name.as_str());
    for (i, record) in found.results.iter().enumerate() {
        let label = label_field
            .and_then(|name| record.get(name))
            .and_then(Value::as_str)
            .unwrap_or("");
        println!(
            "{:>3}. #{} {:>8.3}  {label}",
            args.skip + i + 1,
            record.id().short(8),
            record.relevance().unwrap_or(0.0),
        );
    }
    println!(
        "\n{} of {} result(s)",
        found.results.len(),
        found.total_count
    );
    Ok(())
}

/// Progress bar fed by acknowledgements that can arrive out of order from
/// rayon workers. It never moves backwards.
struct ForwardProgress {
    bar: Bar,
    shown: usize,
}

impl ForwardProgress {
    fn new(bar: Bar) -> Self {
        Self { bar, shown: 0 }
    }

    /// Returns whether the bar moved.
    fn advance(&mut self, done: usize) -> bool {
        if done <= self.shown {
            return false;
        }
        self.shown = done;
        if let Err(err) = self.bar.update_to(done) {
            debug!(error = %err, "progress bar update failed");
        }
        true
    }
}

fn cmd_reindex(
    indexer: &Indexer,
    db: &RecordDb,
    args: &cli::ReindexArgs,
) -> Result<()> {
    let total = db.count(&Filter::all())?;
    let progress = Mutex::new(ForwardProgress::new(tqdm!(
        total = total,
        desc = "Reindexing",
        disable = args.no_progress
    )));

    let report =
        indexer.reindex_all_with_progress(db, args.batch_size, |done, _| {
            progress
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .advance(done);
        })?;
    if !args.no_progress {
        eprintln!();
    }

    println!(
        "Reindexed {} of {} record(s)",
        report.saved(),
        report.total
    );
    for failure in &report.failures {
        eprintln!("  failed {}: {}", failure.id, failure.reason);
    }
    if let Some(failure) = report.failures.into_iter().next() {
        return Err(failure.into());
    }
    Ok(())
}

fn cmd_status(data_dir: &DataDir, json: bool) -> Result<()> {
    if !data_dir.is_initialized() {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "dataDir": data_dir.root(),
                    "initialized": false,
                })
            );
        } else {
            println!("Data directory: {}", data_dir.root().display());
            println!("Not initialized (run `keyrank init`)");
        }
        return Ok(());
    }

    let config = IndexConfig::load(&data_dir.config_file())?;
    let db = RecordDb::open(&data_dir.records_db(), config.binding())?;
    let records = db.len()?;

    if json {
        let doc = serde_json::json!({
            "dataDir": data_dir.root(),
            "initialized": true,
            "config": config,
            "records": records,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Stemmer: {:?}", config.stemmer);
        println!("Distance: {:?}", config.distance);
        println!("Fields:");
        for field in &config.fields {
            println!("  {}: {}", field.name, field.weight);
        }
        println!("Records: {records}");
    }
    Ok(())
}
