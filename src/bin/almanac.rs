//! almanac CLI - extract typed fields from almanac entity documents

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use almanac::{
    EngineConfig, EntityParser, JsonArrayWriter, NdjsonWriter, OutputFormat, RecordWriter,
    RunSummary, SplitOptions, ValueOptions,
};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "ALMANAC_CONFIG";
const DEFAULT_CONFIG: &str = "almanac.yaml";

#[derive(Parser)]
#[command(name = "almanac")]
#[command(version, about = "Normalize and extract typed fields from almanac entity documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the field plan over entity documents
    Extract {
        /// Field plan (YAML). Falls back to $ALMANAC_CONFIG, then almanac.yaml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Entity document, or directory of *.json documents
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (ndjson, json)
        #[arg(short, long, default_value = "ndjson")]
        format: String,

        /// Exit non-zero when any handler failed
        #[arg(long)]
        strict: bool,
    },

    /// Validate a field plan against the built-in handlers
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Parse a single value string and print the result
    ParseValue {
        text: String,

        /// Report FYxx/yy start years as the value's year
        #[arg(long)]
        fiscal_year: bool,
    },

    /// Split a list string and print one item per line
    Split {
        text: String,

        /// Candidate delimiters in priority order, e.g. ";,"
        #[arg(short, long)]
        delimiters: Option<String>,

        /// Split inside parentheses too
        #[arg(long)]
        ignore_parens: bool,
    },

    /// Normalize a text leaf and print it
    Normalize { text: String },
}

fn main() {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            config,
            input,
            output,
            format,
            strict,
        } => run_extract(config, input, output, &format, strict),
        Commands::Validate { config } => validate_config(config),
        Commands::ParseValue { text, fiscal_year } => parse_value_cmd(&text, fiscal_year),
        Commands::Split {
            text,
            delimiters,
            ignore_parens,
        } => split_cmd(&text, delimiters, ignore_parens),
        Commands::Normalize { text } => {
            println!("{}", almanac::normalize(&text));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn config_path(cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

fn load_parser(config: Option<PathBuf>) -> Result<EntityParser, String> {
    let path = config_path(config);
    let config = EngineConfig::load_from_file(&path)
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    tracing::info!(config = %path.display(), fields = config.fields.len(), "loaded field plan");
    EntityParser::with_builtins(config).map_err(|e| format!("{}: {}", path.display(), e))
}

fn validate_config(config: Option<PathBuf>) -> Result<(), String> {
    let parser = load_parser(config)?;
    println!(
        "✓ {} fields, handlers: {}",
        parser.config().fields.len(),
        parser.registry().list_handlers().join(", ")
    );
    Ok(())
}

/// Entity documents under `input`, sorted by path. The entity id is the
/// file stem.
fn collect_documents(input: &Path) -> Result<Vec<(String, PathBuf)>, String> {
    let mut paths = if input.is_dir() {
        let entries = fs::read_dir(input)
            .map_err(|e| format!("Failed to read {}: {}", input.display(), e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| e.to_string())?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths
    } else {
        vec![input.to_path_buf()]
    };
    paths.sort();

    Ok(paths
        .into_iter()
        .filter_map(|path| {
            let id = path.file_stem()?.to_string_lossy().into_owned();
            Some((id, path))
        })
        .collect())
}

fn run_extract(
    config: Option<PathBuf>,
    input: PathBuf,
    output: Option<PathBuf>,
    format: &str,
    strict: bool,
) -> Result<(), String> {
    let parser = load_parser(config)?;
    let format: OutputFormat = format.parse()?;
    let documents = collect_documents(&input)?;

    let sink: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            fs::File::create(path).map_err(|e| format!("Failed to create {}: {}", path.display(), e))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let summary = match format {
        OutputFormat::Ndjson => write_records(&parser, &documents, NdjsonWriter::new(sink))?,
        OutputFormat::JsonArray => write_records(
            &parser,
            &documents,
            JsonArrayWriter::new(sink).map_err(|e| e.to_string())?,
        )?,
    };

    summary.log();
    if strict && summary.total_failures() > 0 {
        return Err(format!("{} field(s) failed", summary.total_failures()));
    }
    Ok(())
}

fn write_records<W: RecordWriter>(
    parser: &EntityParser,
    documents: &[(String, PathBuf)],
    mut writer: W,
) -> Result<RunSummary, String> {
    let mut summary = RunSummary::new();

    for (entity_id, path) in documents {
        let document = match read_document(path) {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(entity = %entity_id, "{}", e);
                continue;
            }
        };

        let record = parser.parse_json(entity_id, &document);
        summary.absorb(&record.report);
        writer.write_record(&record).map_err(|e| e.to_string())?;
    }

    writer.finish().map_err(|e| e.to_string())?;
    tracing::info!(records = writer.records_written(), "records written");
    Ok(summary)
}

fn read_document(path: &Path) -> Result<serde_json::Value, String> {
    let contents =
        fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&contents).map_err(|e| format!("Invalid JSON in {}: {}", path.display(), e))
}

fn parse_value_cmd(text: &str, fiscal_year: bool) -> Result<(), String> {
    let options = ValueOptions {
        fiscal_year_as_year: fiscal_year,
    };
    let parsed = almanac::parse_value_with(text, &options);
    let json = serde_json::to_string_pretty(&parsed).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn split_cmd(text: &str, delimiters: Option<String>, ignore_parens: bool) -> Result<(), String> {
    let mut options = SplitOptions::default().respect_parens(!ignore_parens);
    if let Some(delimiters) = delimiters {
        let chars: Vec<char> = delimiters.chars().collect();
        if chars.is_empty() {
            return Err("--delimiters must not be empty".to_string());
        }
        options = options.with_delimiters(&chars);
    }

    for item in almanac::split(text, &options) {
        println!("{}", item);
    }
    Ok(())
}
