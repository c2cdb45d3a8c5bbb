use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use rusty_records::Params;
use rusty_records::ServiceConfig;
use rusty_records::SpreadsheetService;
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rusty-records")]
#[command(about = "Extract spreadsheet worksheets as field-keyed JSON records")]
#[command(version)]
struct Args {
    /// Directory spreadsheets are read from
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Storage container inside the root
    #[arg(long, default_value = "/")]
    container: String,

    /// Extract only this worksheet
    #[arg(long)]
    sheet: Option<String>,

    /// List the worksheet names instead of extracting records
    #[arg(long)]
    list: bool,

    /// Extraction option, e.g. `--param formatted_values=false`
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Spreadsheet to read; lists the container when omitted
    spreadsheet: Option<String>,
}

fn parse_param(value: &str) -> Result<(String, String), String> {
    let (key, value) = value
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{value}'"))?;
    Ok((key.trim().to_owned(), value.to_owned()))
}

fn print(value: &Value, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = ServiceConfig {
        root: args.root,
        container: args.container,
    };
    let service = SpreadsheetService::from_config(&config);
    let params: Params = args.params.into_iter().collect();

    let output = match (&args.spreadsheet, &args.sheet) {
        (None, _) => Value::from(service.list_spreadsheets().context("Failed to list spreadsheets")?),
        (Some(name), _) if args.list => Value::from(
            service
                .list_worksheets(name)
                .with_context(|| format!("Failed to list worksheets of '{name}'"))?,
        ),
        (Some(name), Some(sheet)) => service
            .get_one(name, sheet, &params)
            .with_context(|| format!("Failed to extract '{sheet}' from '{name}'"))?,
        (Some(name), None) => service
            .get_all(name, &params)
            .with_context(|| format!("Failed to extract '{name}'"))?,
    };
    print(&output, args.pretty)
}
