//! Run subcommand - flatten one entity of an OpenAlex snapshot

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, CellAlignment, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use signal_hook::consts::{SIGINT, SIGTERM};

use flatline_core::{CancelToken, CsvFormat, ProgressContext, RunSummary, Terminator, fmt_num};
use flatline_openalex::Entity;

use super::EntityArg;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Entity type to flatten
    #[arg(value_enum)]
    pub entity: EntityArg,

    /// Input directory (default: <snapshot>/data/<entity>)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// OpenAlex snapshot root
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Glob for input files, relative to the input directory
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Number of transform workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Lines per batch
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Channel capacity in messages
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Gzip compression level (0-9)
    #[arg(short = 'z', long)]
    pub compression_level: Option<u32>,

    /// Field delimiter (single ASCII character)
    #[arg(short, long)]
    pub delimiter: Option<char>,

    /// Terminate lines with CRLF instead of LF
    #[arg(long)]
    pub crlf: bool,
}

/// Merge CLI flags over config file values
pub fn openalex_config(args: &RunArgs, config: &Config) -> Result<flatline_openalex::Config> {
    let defaults = flatline_openalex::Config::default();
    let delimiter = args.delimiter.unwrap_or(config.output.delimiter);
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| format!("Delimiter must be a single ASCII character, got {delimiter:?}"))?;

    Ok(flatline_openalex::Config {
        entity: args.entity.into(),
        snapshot_dir: args
            .snapshot
            .clone()
            .or_else(|| config.input.snapshot_dir.clone())
            .unwrap_or(defaults.snapshot_dir),
        input_dir: args.input.clone(),
        output_dir: args
            .output
            .clone()
            .unwrap_or_else(|| config.output.default_dir.clone()),
        pattern: args
            .pattern
            .clone()
            .unwrap_or_else(|| config.input.pattern.clone()),
        workers: args.workers.unwrap_or(config.pipeline.workers),
        batch_size: args.batch_size.unwrap_or(config.pipeline.batch_size),
        capacity: args.capacity.unwrap_or(config.pipeline.capacity),
        format: CsvFormat {
            delimiter,
            terminator: if args.crlf || config.output.crlf {
                Terminator::CrLf
            } else {
                Terminator::Lf
            },
            level: args
                .compression_level
                .unwrap_or(config.output.compression_level),
        },
    })
}

/// SIGINT/SIGTERM raise the cancel token; a second signal exits immediately
fn install_signal_handlers(cancel: &CancelToken) -> Result<()> {
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register_conditional_shutdown(sig, 130, cancel.flag())
            .context("Failed to install signal handler")?;
        signal_hook::flag::register(sig, cancel.flag())
            .context("Failed to install signal handler")?;
    }
    Ok(())
}

pub fn run(args: RunArgs, config: &Config, progress: &ProgressContext) -> Result<()> {
    let oa_config = openalex_config(&args, config)?;

    let cancel = CancelToken::new();
    install_signal_handlers(&cancel)?;

    log::info!("Flattening OpenAlex {}", oa_config.entity);
    log::info!("  Input: {}", oa_config.input_dir().display());
    log::info!("  Output: {}", oa_config.output_dir.display());
    log::info!(
        "  Workers: {}, batch size: {}, capacity: {}",
        oa_config.workers,
        oa_config.batch_size,
        oa_config.capacity
    );

    let summary = match flatline_openalex::run(&oa_config, cancel.clone(), progress) {
        Ok(summary) => summary,
        Err(e) if cancel.is_cancelled() && e.chain().any(is_cancelled) => {
            anyhow::bail!("Interrupted; no output files were written")
        }
        Err(e) => return Err(e),
    };

    print_summary(oa_config.entity, &summary);
    Ok(())
}

fn is_cancelled(e: &(dyn std::error::Error + 'static)) -> bool {
    e.downcast_ref::<flatline_core::PipelineError>()
        .is_some_and(|e| e.is_cancelled())
}

/// Print the run totals and per-stream row counts on stderr
fn print_summary(entity: Entity, summary: &RunSummary) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(format!("OpenAlex {entity}")).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    table.add_row(vec![
        Cell::new("Input"),
        Cell::new(format!(
            "{} files, {} lines",
            fmt_num(summary.reader.files),
            fmt_num(summary.reader.lines)
        )),
    ]);
    table.add_row(vec![
        Cell::new("Records"),
        Cell::new(fmt_num(summary.transform.records)),
    ]);
    table.add_row(vec![
        Cell::new("Rows"),
        Cell::new(fmt_num(summary.rows_written())),
    ]);
    table.add_row(vec![
        Cell::new("Time"),
        Cell::new(format!("{:.1}s", summary.elapsed.as_secs_f64())),
    ]);
    eprintln!("\n{table}");

    let mut streams = Table::new();
    streams
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("File").fg(Color::Cyan),
            Cell::new("Rows").fg(Color::Cyan),
        ]);
    for sink in &summary.sinks {
        let file = sink
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| sink.stream.clone());
        streams.add_row(vec![
            Cell::new(file),
            Cell::new(fmt_num(sink.rows)).set_alignment(CellAlignment::Right),
        ]);
    }
    eprintln!("{streams}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RunArgs,
    }

    fn args(argv: &[&str]) -> RunArgs {
        Harness::parse_from(std::iter::once("run").chain(argv.iter().copied())).args
    }

    #[test]
    fn config_file_values_used_when_flags_absent() {
        let mut config = Config::default();
        config.input.snapshot_dir = Some(PathBuf::from("/snap"));
        config.output.default_dir = PathBuf::from("/csv");
        config.output.crlf = true;
        config.pipeline.workers = 6;

        let oa = openalex_config(&args(&["authors"]), &config).unwrap();
        assert_eq!(oa.entity, Entity::Authors);
        assert_eq!(oa.input_dir(), PathBuf::from("/snap/data/authors"));
        assert_eq!(oa.output_dir, PathBuf::from("/csv"));
        assert_eq!(oa.workers, 6);
        assert_eq!(oa.format.terminator, Terminator::CrLf);
        assert_eq!(oa.format.delimiter, b',');
    }

    #[test]
    fn flags_override_config_file() {
        let mut config = Config::default();
        config.pipeline.workers = 6;
        config.output.compression_level = 9;

        let oa = openalex_config(
            &args(&[
                "works", "-i", "/in", "-o", "/out", "-w", "3", "-b", "100", "-z", "1", "-d", "|",
            ]),
            &config,
        )
        .unwrap();
        assert_eq!(oa.input_dir(), PathBuf::from("/in"));
        assert_eq!(oa.output_dir, PathBuf::from("/out"));
        assert_eq!(oa.workers, 3);
        assert_eq!(oa.batch_size, 100);
        assert_eq!(oa.format.level, 1);
        assert_eq!(oa.format.delimiter, b'|');
        assert_eq!(oa.format.terminator, Terminator::Lf);
    }

    #[test]
    fn non_ascii_delimiter_rejected() {
        let err = openalex_config(&args(&["funders", "-d", "§"]), &Config::default()).unwrap_err();
        assert!(err.to_string().contains("ASCII"), "{err}");
    }
}
