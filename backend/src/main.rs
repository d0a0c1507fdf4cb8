//! Webinput CLI - convert CSV/JSON rows into event records
//!
//! # Main Commands
//!
//! ```bash
//! webinput serve                        # Start HTTP server (port 8000)
//! webinput process events.csv           # Process a batch, print the report
//! webinput process events.csv --submit  # ... and send accepted records
//! ```
//!
//! # Lookup Commands
//!
//! ```bash
//! webinput fields                  # Known fields and their types
//! webinput taxonomy                # Classification taxonomy
//! webinput parse events.csv        # Just parse input rows to JSON
//! webinput check-config cfg.json   # Validate a configuration file
//! ```

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use webinput::parser::InputFormat;
use webinput::server::{start_server, AppState};
use webinput::validation::taxonomy;
use webinput::{
    preview, queue, read_rows_file, run_batch, AppConfig, BatchContext, BatchRequest, StageRegistry,
};

#[derive(Parser)]
#[command(name = "webinput")]
#[command(about = "Convert tabular rows into validated event records", long_about = None)]
struct Cli {
    /// Configuration file (default: $WEBINPUT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// Process a batch and print the report as JSON
    Process {
        /// Input file (CSV, or JSON array of objects)
        input: PathBuf,

        /// Force JSON input
        #[arg(long, conflicts_with = "csv")]
        json: bool,

        /// Force CSV input
        #[arg(long)]
        csv: bool,

        /// Validate only: force test classification, never send, roll back
        #[arg(long)]
        dryrun: bool,

        /// Send accepted records to the destination
        #[arg(long)]
        submit: bool,

        /// Run the configured stages
        #[arg(long)]
        bots: bool,

        /// Only run builder and stages, print the produced records
        #[arg(long, conflicts_with_all = ["submit", "dryrun"])]
        preview: bool,

        /// Offset for timestamps without one, e.g. +02:00
        #[arg(long)]
        timezone: Option<String>,

        /// Custom field override, e.g. --custom classification.identifier=abc
        #[arg(long, value_parser = parse_custom)]
        custom: Vec<(String, String)>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse an input file and output its rows as JSON
    Parse {
        /// Input file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show known fields and their types
    Fields,

    /// Show the classification taxonomy
    Taxonomy,

    /// Validate a configuration file
    CheckConfig {
        /// Configuration file
        file: PathBuf,
    },
}

/// `field=value` with the `custom_` prefix added.
fn parse_custom(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{}'", raw))?;
    let field = field.trim();
    let key = if field.starts_with("custom_") {
        field.to_string()
    } else {
        format!("custom_{}", field)
    };
    Ok((key, value.to_string()))
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Serve { port } => cmd_serve(config_path, port).await,

        Commands::Process {
            input,
            json,
            csv,
            dryrun,
            submit,
            bots,
            preview,
            timezone,
            custom,
            output,
        } => {
            let format = match (json, csv) {
                (true, _) => Some(InputFormat::Json),
                (_, true) => Some(InputFormat::Csv),
                _ => None,
            };
            let request = ProcessArgs {
                dryrun,
                submit,
                bots,
                preview,
                timezone,
                custom: custom.into_iter().collect(),
            };
            // The HTTP destination uses a blocking client
            tokio::task::block_in_place(|| {
                cmd_process(config_path, &input, format, request, output.as_deref())
            })
        }

        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Fields => cmd_fields(config_path),

        Commands::Taxonomy => cmd_taxonomy(),

        Commands::CheckConfig { file } => cmd_check_config(&file),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

struct ProcessArgs {
    dryrun: bool,
    submit: bool,
    bots: bool,
    preview: bool,
    timezone: Option<String>,
    custom: BTreeMap<String, String>,
}

async fn cmd_serve(config_path: Option<&Path>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env(config_path)?;
    let schema = config.harmonization()?;
    eprintln!(
        "⚙️  {} known fields, {} stages configured",
        schema.fields().count(),
        config.stages.len()
    );
    start_server(port, AppState::new(config, schema, StageRegistry::new())).await
}

fn cmd_process(
    config_path: Option<&Path>,
    input: &Path,
    format: Option<InputFormat>,
    args: ProcessArgs,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let config = AppConfig::from_env(config_path)?;
    let schema = config.harmonization()?;
    let registry = StageRegistry::new();
    let context = BatchContext::new(&config, &schema, &registry);

    let rows = read_rows_file(input, format)?;
    eprintln!("   Rows: {}", rows.len());

    let request = BatchRequest {
        rows,
        dryrun: args.dryrun,
        submit: args.submit,
        timezone: args.timezone,
        custom: args.custom,
        validate_with_bots: args.bots,
    };

    if args.preview {
        let result = preview(&context, &request);
        eprintln!("\n🔍 Preview: {} ({} records)", result.status, result.messages.len());
        let json = serde_json::to_string_pretty(&result)?;
        write_output(&json, output)?;
        return Ok(());
    }

    if request.submit && !request.dryrun && !config.destination.is_persistent() {
        eprintln!("⚠️  Destination is the in-memory queue: submitted records are not kept");
    }
    let mut destination = queue::connect(&config.destination)?;
    let report = run_batch(&context, &request, destination.as_mut())?;

    eprintln!("\n📊 Results:");
    eprintln!("   Input lines:    {} ({} invalid)", report.input_lines, report.input_lines_invalid);
    eprintln!("   Output records: {} ({} stage failures)", report.output_lines, report.output_lines_invalid);
    for (line, errors) in report.errors.iter().take(5) {
        eprintln!("\n   Line {}:", line);
        for (field, messages) in errors {
            for message in messages.iter().take(3) {
                eprintln!("     - {}: {}", field, message);
            }
        }
    }

    let json = serde_json::to_string_pretty(&report)?;
    write_output(&json, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let rows = read_rows_file(input, None)?;
    eprintln!("✅ Parsed {} rows", rows.len());

    let json = serde_json::to_string_pretty(&rows)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_fields(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env(config_path)?;
    let schema = config.harmonization()?;
    for (name, spec) in schema.fields() {
        let marker = if schema.is_valid_key(name) { " " } else { "-" };
        println!("{} {:<40} {}", marker, name, spec.field_type.name());
    }
    Ok(())
}

fn cmd_taxonomy() -> Result<(), Box<dyn std::error::Error>> {
    for (taxonomy, types) in taxonomy::taxonomy_map() {
        println!("{}", taxonomy);
        for classification_type in types {
            println!("  {}", classification_type);
        }
    }
    Ok(())
}

fn cmd_check_config(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Checking: {}", file.display());

    let config = AppConfig::load(file)?;
    let schema = config.harmonization()?;

    let unknown: Vec<&String> = config
        .required_fields
        .iter()
        .chain(config.constant_fields.keys())
        .chain(config.custom_input_fields.keys())
        .filter(|field| !schema.knows(field))
        .collect();
    if !unknown.is_empty() {
        for field in &unknown {
            eprintln!("   ❌ Unknown field: {}", field);
        }
        return Err(format!("{} unknown fields", unknown.len()).into());
    }

    let registry = StageRegistry::new();
    for stage in &config.stages {
        if !registry.contains(&stage.kind) {
            return Err(format!("stage '{}' has unknown kind '{}'", stage.id, stage.kind).into());
        }
    }

    eprintln!("✅ Configuration valid ({} stages)", config.stages.len());
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
