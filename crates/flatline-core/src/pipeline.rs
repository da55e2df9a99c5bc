//! Pipeline assembly: validate config, wire channels, spawn one thread per
//! unit, and collect the results.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use rustc_hash::FxHashSet;

use crate::channel::{bounded, Receiver, Sender};
use crate::coordinator::{
    CompletionGuard, Coordinator, CoordinatorReport, EventSender, Role, UnitCounts,
};
use crate::error::PipelineError;
use crate::progress::fmt_num;
use crate::projection::Projection;
use crate::reader::{discover_inputs, Batch, ReaderStats, SourceReader};
use crate::shutdown::CancelToken;
use crate::sink::{CsvFormat, SinkStats, SinkWriter, StreamSpec};
use crate::transform::{RowBatch, TransformStats, TransformWorker};

pub const DEFAULT_PATTERN: &str = "**/*.gz";
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_CAPACITY: usize = 256;
pub const DEFAULT_ID_FIELD: &str = "id";

/// Everything the pipeline needs, passed explicitly at construction
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root of the input tree
    pub input_dir: PathBuf,
    /// Glob relative to `input_dir`
    pub pattern: String,
    pub ingest_channels: usize,
    /// Must equal `ingest_channels`: each worker owns one ingestion channel
    pub transform_workers: usize,
    /// Lines per batch
    pub batch_size: usize,
    /// Messages each channel holds before its producer blocks
    pub capacity: usize,
    /// Records without this identifier are dropped before projection.
    /// Projections that key rows on their own field must use the same one.
    pub id_field: String,
    pub streams: Vec<StreamSpec>,
    pub format: CsvFormat,
}

impl PipelineConfig {
    /// Config with defaults for everything but input and streams
    pub fn new(input_dir: impl Into<PathBuf>, streams: Vec<StreamSpec>) -> Self {
        Self {
            input_dir: input_dir.into(),
            pattern: DEFAULT_PATTERN.to_string(),
            ingest_channels: DEFAULT_WORKERS,
            transform_workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            capacity: DEFAULT_CAPACITY,
            id_field: DEFAULT_ID_FIELD.to_string(),
            streams,
            format: CsvFormat::default(),
        }
    }

    /// Set both worker and channel counts
    pub fn with_workers(mut self, n: usize) -> Self {
        self.ingest_channels = n;
        self.transform_workers = n;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let err = |msg: String| Err(PipelineError::Config(msg));

        if self.ingest_channels == 0 {
            return err("ingest_channels must be at least 1".into());
        }
        if self.transform_workers != self.ingest_channels {
            return err(format!(
                "transform_workers ({}) must equal ingest_channels ({})",
                self.transform_workers, self.ingest_channels
            ));
        }
        if self.batch_size == 0 {
            return err("batch_size must be at least 1".into());
        }
        if self.capacity == 0 {
            return err("capacity must be at least 1".into());
        }
        if self.id_field.is_empty() {
            return err("id_field must not be empty".into());
        }
        if self.format.level > 9 {
            return err(format!("compression level {} out of range 0-9", self.format.level));
        }
        if self.streams.is_empty() {
            return err("no output streams".into());
        }

        let mut names = FxHashSet::default();
        let mut paths = FxHashSet::default();
        for s in &self.streams {
            if !names.insert(s.name.as_str()) {
                return err(format!("duplicate stream '{}'", s.name));
            }
            if !paths.insert(s.path.as_path()) {
                return err(format!(
                    "streams share output path {}",
                    s.path.display()
                ));
            }
            if s.columns.is_empty() {
                return err(format!("stream '{}' has no columns", s.name));
            }
        }
        Ok(())
    }
}

/// A configured, not yet started pipeline
pub struct Pipeline {
    config: PipelineConfig,
    projections: Arc<[Projection]>,
    cancel: CancelToken,
    pb: ProgressBar,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, projections: impl Into<Arc<[Projection]>>) -> Self {
        Self {
            config,
            projections: projections.into(),
            cancel: CancelToken::new(),
            pb: ProgressBar::hidden(),
        }
    }

    /// Share a cancel token with the caller (e.g. a signal handler)
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Show reader progress on `pb`
    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    /// Spawn and wait
    pub fn run(self) -> Result<RunSummary, PipelineError> {
        self.spawn()?.wait()
    }

    /// Validate, discover inputs, and start every unit.
    ///
    /// Config and discovery errors are returned before any thread starts.
    pub fn spawn(self) -> Result<PipelineHandle, PipelineError> {
        let config = self.config;
        config.validate()?;
        let files = discover_inputs(&config.input_dir, &config.pattern)?;
        log::info!(
            "{} input files under {}, {} workers",
            fmt_num(files.len()),
            config.input_dir.display(),
            config.transform_workers
        );

        let cancel = self.cancel;
        let (ev_tx, ev_rx) = mpsc::channel();

        let (ingest_tx, ingest_rx): (Vec<Sender<Batch>>, Vec<Receiver<Batch>>) =
            (0..config.ingest_channels)
                .map(|_| bounded(config.capacity))
                .unzip();

        let mut outputs: Vec<(String, Sender<RowBatch>)> = Vec::with_capacity(config.streams.len());
        let mut output_rx = Vec::with_capacity(config.streams.len());
        for spec in &config.streams {
            let (tx, rx) = bounded(config.capacity);
            outputs.push((spec.name.clone(), tx));
            output_rx.push(rx);
        }

        let counts = UnitCounts {
            readers: 1,
            transforms: config.transform_workers,
            writers: config.streams.len(),
        };

        let spawned = (|| -> Result<PipelineHandle, PipelineError> {
            let mut writers = Vec::with_capacity(counts.writers);
            for (i, (spec, rx)) in config.streams.iter().zip(output_rx).enumerate() {
                let writer = SinkWriter::new(spec.clone(), config.format, rx, cancel.clone());
                writers.push(spawn_unit(
                    format!("writer-{}", spec.name),
                    Role::Writer,
                    i,
                    &ev_tx,
                    move || writer.run(),
                )?);
            }

            let id_field: Arc<str> = config.id_field.as_str().into();
            let mut transforms = Vec::with_capacity(counts.transforms);
            for (i, rx) in ingest_rx.into_iter().enumerate() {
                let worker = TransformWorker::new(
                    i,
                    rx,
                    outputs.clone(),
                    self.projections.clone(),
                    id_field.clone(),
                    cancel.clone(),
                );
                transforms.push(spawn_unit(
                    format!("transform-{i}"),
                    Role::Transform,
                    i,
                    &ev_tx,
                    move || worker.run(),
                )?);
            }

            let coordinator = Coordinator::new(ev_rx, outputs, counts, cancel.clone());
            let coordinator = std::thread::Builder::new()
                .name("coordinator".into())
                .spawn(move || coordinator.run())
                .map_err(|e| PipelineError::io("spawn coordinator", e))?;

            let reader = SourceReader::new(files, config.batch_size, ingest_tx, cancel.clone())
                .with_progress(self.pb);
            let reader = spawn_unit("reader".into(), Role::Reader, 0, &ev_tx, move || reader.run())?;

            Ok(PipelineHandle {
                reader,
                transforms,
                writers,
                coordinator,
                cancel: cancel.clone(),
                start: Instant::now(),
            })
        })();

        if spawned.is_err() {
            // Units already started see their channels disconnect and exit
            cancel.cancel();
        }
        spawned
    }
}

type UnitHandle<T> = JoinHandle<Result<T, PipelineError>>;

/// Run `body` on a named thread that reports exactly one completion event
fn spawn_unit<T, F>(
    name: String,
    role: Role,
    index: usize,
    events: &EventSender,
    body: F,
) -> Result<UnitHandle<T>, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    let events = events.clone();
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let guard = CompletionGuard::new(events, role, index);
            let result = body();
            guard.report(&result);
            result
        })
        .map_err(|e| PipelineError::io(format!("spawn {name}"), e))
}

/// A running pipeline
pub struct PipelineHandle {
    reader: UnitHandle<ReaderStats>,
    transforms: Vec<UnitHandle<TransformStats>>,
    writers: Vec<UnitHandle<SinkStats>>,
    coordinator: JoinHandle<CoordinatorReport>,
    cancel: CancelToken,
    start: Instant,
}

impl PipelineHandle {
    /// Ask every unit to stop; partial outputs are discarded
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Join every unit.
    ///
    /// Returns the first unit failure if there was one, `Cancelled` if the
    /// run was stopped, and the run summary otherwise.
    pub fn wait(self) -> Result<RunSummary, PipelineError> {
        let report = self.coordinator.join();
        if report.is_err() {
            self.cancel.cancel();
        }
        let reader = join(self.reader);
        let transforms: Vec<_> = self.transforms.into_iter().map(join).collect();
        let writers: Vec<_> = self.writers.into_iter().map(join).collect();

        let report = report.map_err(|_| PipelineError::Panicked("coordinator".into()))?;
        if let Some(failure) = report.failure {
            return Err(failure);
        }

        let reader = reader?;
        let mut transform = TransformStats::default();
        for stats in transforms {
            transform.merge(&stats?);
        }
        let sinks = writers.into_iter().collect::<Result<Vec<_>, _>>()?;

        Ok(RunSummary {
            reader,
            transform,
            sinks,
            markers_sent: report.markers_sent,
            elapsed: self.start.elapsed(),
        })
    }
}

fn join<T>(handle: UnitHandle<T>) -> Result<T, PipelineError> {
    let name = handle.thread().name().unwrap_or("unit").to_string();
    handle.join().map_err(|_| PipelineError::Panicked(name))?
}

/// Totals for a finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reader: ReaderStats,
    pub transform: TransformStats,
    /// One entry per stream, in config order
    pub sinks: Vec<SinkStats>,
    pub markers_sent: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn rows_written(&self) -> usize {
        self.sinks.iter().map(|s| s.rows).sum()
    }

    pub fn log(&self) {
        log::info!("=== Pipeline Summary ===");
        log::info!(
            "Input: {} files, {} lines, {} records",
            fmt_num(self.reader.files),
            fmt_num(self.reader.lines),
            fmt_num(self.transform.records)
        );
        log::info!(
            "Output: {} rows across {} streams",
            fmt_num(self.rows_written()),
            self.sinks.len()
        );
        for sink in &self.sinks {
            log::debug!("  {:<20} {:>12}", sink.stream, fmt_num(sink.rows));
        }
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.reader.lines > 0 {
            let per_sec = self.reader.lines as f64 / self.elapsed.as_secs_f64().max(1e-9);
            log::info!("Throughput: {per_sec:.0} lines/sec");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::new(
            "/data",
            vec![
                StreamSpec::new("works", &["id"], "/out/works.csv.gz"),
                StreamSpec::new("topics", &["work_id", "topic_id"], "/out/works_topics.csv.gz"),
            ],
        )
    }

    fn rejected(cfg: &PipelineConfig) -> String {
        match cfg.validate() {
            Err(PipelineError::Config(msg)) => msg,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pattern, "**/*.gz");
        assert_eq!(cfg.ingest_channels, cfg.transform_workers);
    }

    #[test]
    fn mismatched_workers_rejected() {
        let mut cfg = config();
        cfg.transform_workers = 3;
        assert!(rejected(&cfg).contains("must equal"));
    }

    #[test]
    fn zero_sizes_rejected() {
        let edits: [fn(&mut PipelineConfig); 3] = [
            |c| c.batch_size = 0,
            |c| c.capacity = 0,
            |c| {
                c.ingest_channels = 0;
                c.transform_workers = 0;
            },
        ];
        for f in edits {
            let mut cfg = config();
            f(&mut cfg);
            rejected(&cfg);
        }
    }

    #[test]
    fn duplicate_stream_rejected() {
        let mut cfg = config();
        cfg.streams.push(StreamSpec::new("works", &["id"], "/out/other.csv.gz"));
        assert!(rejected(&cfg).contains("duplicate stream 'works'"));
    }

    #[test]
    fn shared_path_rejected() {
        let mut cfg = config();
        cfg.streams.push(StreamSpec::new("ids", &["id"], "/out/works.csv.gz"));
        assert!(rejected(&cfg).contains("share output path"));
    }

    #[test]
    fn empty_columns_rejected() {
        let mut cfg = config();
        cfg.streams.push(StreamSpec::new("ids", &[], "/out/ids.csv.gz"));
        assert!(rejected(&cfg).contains("no columns"));
    }

    #[test]
    fn bad_level_rejected() {
        let mut cfg = config();
        cfg.format.level = 12;
        assert!(rejected(&cfg).contains("compression level"));
    }

    #[test]
    fn with_workers_sets_both() {
        let cfg = config().with_workers(5);
        assert_eq!(cfg.ingest_channels, 5);
        assert_eq!(cfg.transform_workers, 5);
    }

    #[test]
    fn summary_rows_written() {
        let summary = RunSummary {
            reader: ReaderStats::default(),
            transform: TransformStats::default(),
            sinks: vec![
                SinkStats {
                    stream: "works".into(),
                    path: "/out/works.csv.gz".into(),
                    rows: 3,
                },
                SinkStats {
                    stream: "ids".into(),
                    path: "/out/works_ids.csv.gz".into(),
                    rows: 4,
                },
            ],
            markers_sent: 2,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(summary.rows_written(), 7);
    }
}
