//! distiller CLI - run notifications through a set of event definitions
//!
//! Prints the event produced for each notification, or notes that it was
//! dropped, so event definitions can be checked against sample data.

use anyhow::{Context, Result};
use clap::Parser;
use distiller::runtime::{load_config, load_notifications, split_notifications};
use distiller::{Condenser, Distiller, EventWriter, OutputFormat, PluginRegistry, TraitCondenser};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "distiller")]
#[command(version, about = "Test event definitions against notifications", long_about = None)]
struct Cli {
    /// Name of event definitions file to test
    #[arg(short, long, default_value = "event_definitions.yaml")]
    config: PathBuf,

    /// Data files contain a JSON list of notifications instead of a single one
    #[arg(short, long)]
    list: bool,

    /// Add a default definition so unmatched notifications still produce events
    #[arg(short = 'd', long = "add-default-definition")]
    add_default_definition: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "text", value_parser = parse_format)]
    format: OutputFormat,

    /// Notifications in JSON format (default: stdin)
    #[arg(value_name = "JSON_FILE")]
    test_data: Vec<PathBuf>,
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    s.parse()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let configs = load_config(&cli.config)?;
    let plugins = PluginRegistry::builtin();
    let distiller = Distiller::from_config(&configs, &plugins, cli.add_default_definition)
        .context("Failed to build event definitions")?;

    let notifications = read_notifications(&cli.test_data, cli.list)?;

    let output: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut writer = EventWriter::new(cli.format, output)?;

    let mut condenser = TraitCondenser::new();
    let mut dropped = 0;
    for notification in &notifications {
        condenser.clear();
        match distiller.process(notification, &mut condenser)? {
            Some(event) => writer.write(&*event)?,
            None => {
                dropped += 1;
                let id = match notification.get("message_id") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                let line = format!("Dropped notification: {}", id);
                if !writer.note(&line)? {
                    eprintln!("{}", line);
                }
            }
        }
    }

    let summary = format!("Notifications tested: {} ({} dropped)", notifications.len(), dropped);
    if !writer.note(&summary)? {
        eprintln!("{}", summary);
    }
    writer.finish()?;
    Ok(())
}

fn read_notifications(files: &[PathBuf], list: bool) -> Result<Vec<Value>> {
    if files.is_empty() {
        let mut contents = String::new();
        io::stdin()
            .read_to_string(&mut contents)
            .context("Failed to read notifications from stdin")?;
        let value: Value = serde_json::from_str(&contents).context("Invalid JSON on stdin")?;
        return split_notifications(value, list)
            .context("stdin must contain a JSON list of notifications");
    }

    let mut notifications = Vec::new();
    for path in files {
        notifications.extend(load_notifications(path, list)?);
    }
    Ok(notifications)
}
