use std::{
    fs,
    io::{self, BufRead, Write},
    process,
};

use jernih_app::cli::{
    CleanseFileArgs, CleanseTextArgs, Cli, Commands, HistoryArgs, HistoryFormat,
};
use jernih_app::config::{self, AppConfig};
use jernih_app::error::AppError;
use jernih_app::lexicon::Lexicon;
use jernih_app::paths::AppPaths;
use jernih_app::pipeline::{CleansePipeline, Table};
use jernih_app::server;
use jernih_app::services::{HistoryStore, ProcessingRecord, RecordKind};
use serde::Serialize;
use tracing_subscriber::{filter::LevelFilter, fmt};

const HISTORY_PREVIEW_CHARS: usize = 60;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    // Standard output carries command results; logs go to stderr.
    let subscriber = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Serve(_)) => {
            let config = config::load()?;
            server::serve(config).await?;
        }
        Some(Commands::CleanseText(args)) => {
            run_cleanse_text(args)?;
        }
        Some(Commands::CleanseFile(args)) => {
            run_cleanse_file(args)?;
        }
        Some(Commands::History(args)) => {
            run_history(args)?;
        }
        None => {
            Cli::print_help();
        }
    }

    Ok(())
}

fn load_pipeline(config: &AppConfig) -> Result<CleansePipeline, AppError> {
    let lexicon = Lexicon::load(&config.lexicon)?;
    Ok(CleansePipeline::new(lexicon))
}

fn run_cleanse_text(args: CleanseTextArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let pipeline = load_pipeline(&config)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.text {
        Some(text) => {
            writeln!(out, "{}", pipeline.cleanse(&text)).map_err(AppError::Stdout)?;
        }
        None => {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = line.map_err(AppError::Stdin)?;
                writeln!(out, "{}", pipeline.cleanse(&line)).map_err(AppError::Stdout)?;
            }
        }
    }
    Ok(())
}

fn run_cleanse_file(args: CleanseFileArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let pipeline = load_pipeline(&config)?;
    let column = args
        .column
        .unwrap_or_else(|| config.pipeline.target_field.clone());

    let bytes = fs::read(&args.input).map_err(|source| AppError::Io {
        path: args.input.clone(),
        source,
    })?;
    let table = Table::from_csv(&bytes)?;
    let cleansed = pipeline.cleanse_table(&table, &column)?;
    let csv = cleansed.to_csv()?;

    tracing::info!(
        input = %args.input.display(),
        %column,
        rows = cleansed.len(),
        "csv cleansed"
    );

    match args.output {
        Some(path) => {
            fs::write(&path, csv.as_bytes()).map_err(|source| AppError::Write {
                path: path.clone(),
                source,
            })?;
            tracing::info!(output = %path.display(), "wrote cleansed csv");
        }
        None => {
            io::stdout()
                .lock()
                .write_all(csv.as_bytes())
                .map_err(AppError::Stdout)?;
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    id: &'a str,
    kind: RecordKind,
    created_at_ms: i64,
    input: String,
    output: &'a str,
}

impl<'a> HistoryRow<'a> {
    fn from_record(record: &'a ProcessingRecord) -> Self {
        Self {
            id: &record.id,
            kind: record.kind,
            created_at_ms: record.created_at_ms,
            input: record.input_lossy(),
            output: &record.output,
        }
    }
}

fn run_history(args: HistoryArgs) -> Result<(), AppError> {
    let config = config::load()?;
    if !config.storage.history {
        return Err(AppError::Config(
            "processing history is disabled (storage.history = false)".to_string(),
        ));
    }

    let paths = AppPaths::new(&config.storage.path)?;
    let store = HistoryStore::open(&paths)?;
    let total = store.count()?;
    let records = store.recent(args.limit)?;
    tracing::info!(total, shown = records.len(), "read processing history");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in &records {
        let row = HistoryRow::from_record(record);
        let line = match args.format {
            HistoryFormat::Json => serde_json::to_string(&row)?,
            HistoryFormat::Text => format!(
                "{}  {:<4}  {}  {}  ->  {}",
                row.id,
                format!("{:?}", row.kind).to_lowercase(),
                row.created_at_ms,
                preview(&row.input),
                preview(row.output),
            ),
        };
        writeln!(out, "{line}").map_err(AppError::Stdout)?;
    }
    Ok(())
}

fn preview(text: &str) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() <= HISTORY_PREVIEW_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(HISTORY_PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.command.as_ref() {
        Some(Commands::Serve(_)) => match cli.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        Some(Commands::CleanseText(_))
        | Some(Commands::CleanseFile(_))
        | Some(Commands::History(_)) => match cli.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        None => match cli.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            _ => LevelFilter::DEBUG,
        },
    }
}
