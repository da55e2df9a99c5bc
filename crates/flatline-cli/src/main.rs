//! flatline - flatten OpenAlex snapshot entities into csv.gz tables
//!
//! Streams compressed JSONL through parallel transform workers and writes one
//! gzip CSV file per projected table.

use anyhow::Result;
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "flatline")]
#[command(about = "Flatten OpenAlex snapshot entities into compressed CSV tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./flatline.toml or ~/.config/flatline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Flatten one entity of a snapshot
    Run(cmd::run::RunArgs),
    /// List the output streams of an entity
    Streams(cmd::streams::StreamsArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = flatline_core::ProgressContext::new();

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = is_tty && !cli.debug;
    flatline_core::init_logging(quiet, cli.debug, multi);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, &progress),
        Command::Streams(args) => cmd::streams::run(args),
        Command::Config => {
            eprintln!("\n{}", config_table(&config));
            Ok(())
        }
    }
}

fn config_table(config: &Config) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        "Snapshot directory",
        &config
            .input
            .snapshot_dir
            .as_ref()
            .map_or_else(|| "not set".to_string(), |p| p.display().to_string()),
    ]);
    table.add_row(vec!["Input pattern", &config.input.pattern]);
    table.add_row(vec![
        "Output directory",
        &config.output.default_dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Compression level",
        &config.output.compression_level.to_string(),
    ]);
    table.add_row(vec!["Delimiter", &format!("{:?}", config.output.delimiter)]);
    table.add_row(vec![
        "Line terminator",
        if config.output.crlf { "CRLF" } else { "LF" },
    ]);
    table.add_row(vec!["Workers", &config.pipeline.workers.to_string()]);
    table.add_row(vec!["Batch size", &config.pipeline.batch_size.to_string()]);
    table.add_row(vec!["Channel capacity", &config.pipeline.capacity.to_string()]);
    table
}
