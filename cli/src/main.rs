use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dynform_core::{
    build_field_path_map, build_validator, parse_form_schema, AutoFillOutcome, AutoFillTransport,
    FormSession, MemoryStore, MockTransport, SubmitOutcome,
};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "dynform")]
#[command(about = "Validate declarative JSON form schemas and run submissions against them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and structurally validate a form schema
    Check {
        /// Schema JSON file
        schema: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// Run a data file through the compiled validator
    Validate {
        /// Schema JSON file
        schema: PathBuf,

        /// Data JSON file (nested record)
        #[arg(short, long)]
        data: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// Full submission cycle: apply data, resolve auto-fill via the mock
    /// transport, validate, and print the output document
    Submit {
        /// Schema JSON file
        schema: PathBuf,

        /// Data JSON file (nested record)
        #[arg(short, long)]
        data: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    Pretty,
    Compact,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for JSON.
    let log_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check { schema, format } => check(&schema, format),
        Commands::Validate {
            schema,
            data,
            format,
        } => validate(&schema, &data, format),
        Commands::Submit {
            schema,
            data,
            format,
        } => submit(&schema, &data, format),
    }
}

fn check(schema_path: &PathBuf, format: OutputFormat) -> Result<()> {
    let schema = load_schema(schema_path)?;
    let paths = build_field_path_map(&schema.fields);
    print_json(
        &json!({
            "title": schema.title,
            "fieldCount": paths.len(),
            "paths": paths,
        }),
        format,
    )
}

fn validate(schema_path: &PathBuf, data_path: &PathBuf, format: OutputFormat) -> Result<()> {
    let schema = load_schema(schema_path)?;
    let validator = build_validator(&schema.fields).context("failed to compile validator")?;
    let data = load_data(data_path)?;

    let report = validator.validate(&data);
    print_json(&report, format)?;
    if !report.valid {
        std::process::exit(1);
    }
    Ok(())
}

fn submit(schema_path: &PathBuf, data_path: &PathBuf, format: OutputFormat) -> Result<()> {
    let schema = load_schema(schema_path)?;
    let data = load_data(data_path)?;

    let mut session =
        FormSession::new(schema, MemoryStore::new()).context("failed to mount form")?;
    let transport = MockTransport::new();
    let now = Instant::now();

    for (path, value) in flatten(&data) {
        session.set_value(&path, value, now);
    }
    settle_autofill(&mut session, &transport, now);

    match session.submit() {
        SubmitOutcome::Submitted(output) => print_json(&output, format),
        SubmitOutcome::Rejected(errors) => {
            print_json(&json!({ "valid": false, "errors": errors }), format)?;
            std::process::exit(1);
        }
    }
}

/// Drive pending auto-fill requests through the transport until quiescent.
fn settle_autofill(
    session: &mut FormSession<MemoryStore>,
    transport: &MockTransport,
    now: Instant,
) {
    for _ in 0..8 {
        let requests = session.take_pending_requests();
        if requests.is_empty() {
            break;
        }
        for request in requests {
            let outcome = match transport.request(&request.endpoint, &request.params) {
                Ok(response) => AutoFillOutcome::Response(response),
                Err(err) => AutoFillOutcome::Rejected(err.to_string()),
            };
            session.complete_request(&request, outcome, now);
        }
    }
}

fn load_schema(path: &PathBuf) -> Result<dynform_core::FormSchema> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    parse_form_schema(&text).with_context(|| format!("invalid schema in {}", path.display()))
}

fn load_data(path: &PathBuf) -> Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read data file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Flatten a nested record into dot-path leaves for session application.
fn flatten(data: &Value) -> Vec<(String, Value)> {
    let mut leaves = Vec::new();
    collect_leaves(data, "", &mut leaves);
    leaves
}

fn collect_leaves(value: &Value, prefix: &str, leaves: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_leaves(child, &path, leaves);
            }
        }
        leaf => {
            if !prefix.is_empty() {
                leaves.push((prefix.to_string(), leaf.clone()));
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Compact => serde_json::to_string(value)?,
    };
    println!("{rendered}");
    Ok(())
}
