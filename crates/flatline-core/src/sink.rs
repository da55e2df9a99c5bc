//! Output sinks: gzip CSV writer with atomic tmp→rename, and the per-stream
//! writer loop that drives it

use std::borrow::Cow;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::channel::{Message, Receiver};
use crate::error::PipelineError;
use crate::progress::fmt_num;
use crate::record::Row;
use crate::shutdown::CancelToken;
use crate::transform::RowBatch;

/// Buffer between the gzip encoder and the file (256KB)
const FILE_BUF_SIZE: usize = 256 * 1024;

/// Line terminator for output rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Terminator {
    #[default]
    Lf,
    CrLf,
}

/// Delimited-text encoding options shared by every stream of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvFormat {
    pub delimiter: u8,
    pub terminator: Terminator,
    /// gzip level, 0-9
    pub level: u32,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            terminator: Terminator::Lf,
            level: 6,
        }
    }
}

/// One output stream: name, ordered columns, final file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub path: PathBuf,
}

impl StreamSpec {
    pub fn new(name: impl Into<String>, columns: &[&str], path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            path: path.into(),
        }
    }
}

type GzCsvWriter = csv::Writer<GzEncoder<BufWriter<File>>>;

/// Buffered gzip CSV writer with atomic tmp→rename
pub struct CsvGzSink {
    writer: GzCsvWriter,
    columns: Vec<String>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for CsvGzSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvGzSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl CsvGzSink {
    /// Create the sink's temporary file and write the header row
    pub fn create(spec: &StreamSpec, format: &CsvFormat) -> Result<Self, PipelineError> {
        let final_path = spec.path.clone();
        let tmp_path = tmp_path_for(&final_path);

        if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| PipelineError::io(format!("create {}", parent.display()), e))?;
        }

        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)
                .map_err(|e| PipelineError::io(format!("remove {}", tmp_path.display()), e))?;
        }

        let file = File::create(&tmp_path)
            .map_err(|e| PipelineError::io(format!("create {}", tmp_path.display()), e))?;
        let gz = GzEncoder::new(
            BufWriter::with_capacity(FILE_BUF_SIZE, file),
            Compression::new(format.level.min(9)),
        );
        let terminator = match format.terminator {
            Terminator::Lf => csv::Terminator::Any(b'\n'),
            Terminator::CrLf => csv::Terminator::CRLF,
        };
        let writer = csv::WriterBuilder::new()
            .delimiter(format.delimiter)
            .terminator(terminator)
            .from_writer(gz);

        let mut sink = Self {
            writer,
            columns: spec.columns.clone(),
            tmp_path,
            final_path,
            row_count: 0,
        };
        let header = sink.writer.write_record(&sink.columns);
        if let Err(e) = header {
            sink.abandon();
            return Err(PipelineError::io(
                format!("write header {}", spec.path.display()),
                e.into(),
            ));
        }
        Ok(sink)
    }

    /// Append one row projected onto the declared columns
    pub fn write_row(&mut self, row: &Row) -> Result<(), PipelineError> {
        let cells: Vec<Cow<'_, str>> = self.columns.iter().map(|c| row.cell(c)).collect();
        self.writer
            .write_record(cells.iter().map(|c| c.as_bytes()))
            .map_err(|e| PipelineError::io(format!("write {}", self.tmp_path.display()), e.into()))?;
        self.row_count += 1;
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Finalize: flush csv and gzip trailer, then atomically rename tmp → final
    pub fn finalize(self) -> Result<usize, PipelineError> {
        let tmp_path = self.tmp_path.clone();
        let result = self.finish();
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    fn finish(self) -> Result<usize, PipelineError> {
        let ctx = || format!("finalize {}", self.tmp_path.display());
        let gz = self
            .writer
            .into_inner()
            .map_err(|e| PipelineError::io(ctx(), e.into_error()))?;
        let buf = gz.finish().map_err(|e| PipelineError::io(ctx(), e))?;
        buf.into_inner()
            .map_err(|e| PipelineError::io(ctx(), e.into_error()))?;
        fs::rename(&self.tmp_path, &self.final_path).map_err(|e| {
            PipelineError::io(
                format!(
                    "rename {} -> {}",
                    self.tmp_path.display(),
                    self.final_path.display()
                ),
                e,
            )
        })?;
        Ok(self.row_count)
    }

    /// Discard partial output: nothing appears under the final name
    pub fn abandon(self) {
        let Self { writer, tmp_path, .. } = self;
        drop(writer);
        match fs::remove_file(&tmp_path) {
            Ok(()) => log::debug!("abandoned {}", tmp_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("failed to remove {}: {e}", tmp_path.display()),
        }
    }
}

/// `<path>.tmp`, next to the final file
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Remove the stale `.tmp` files of these streams.
///
/// Only the streams' own temporaries are touched; other runs may be writing
/// into the same directory.
pub fn cleanup_tmp_files(streams: &[StreamSpec]) -> io::Result<usize> {
    let mut removed = 0;
    for spec in streams {
        let tmp_path = tmp_path_for(&spec.path);
        match fs::remove_file(&tmp_path) {
            Ok(()) => {
                log::warn!("Removing stale tmp file: {}", tmp_path.display());
                removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(removed)
}

/// Result of one writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkStats {
    pub stream: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// Owns one stream's file; consumes that stream's output channel
pub struct SinkWriter {
    spec: StreamSpec,
    format: CsvFormat,
    input: Receiver<RowBatch>,
    cancel: CancelToken,
}

impl SinkWriter {
    pub fn new(
        spec: StreamSpec,
        format: CsvFormat,
        input: Receiver<RowBatch>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            spec,
            format,
            input,
            cancel,
        }
    }

    /// Write rows until the end marker, then finalize.
    ///
    /// Anything else (cancellation, a disconnect without marker, a write
    /// error) abandons the file.
    pub fn run(self) -> Result<SinkStats, PipelineError> {
        let result = self.write_all();
        if let Err(e) = &result {
            if !e.is_cancelled() {
                self.cancel.cancel();
            }
        }
        result
    }

    fn write_all(&self) -> Result<SinkStats, PipelineError> {
        let start = Instant::now();
        let mut sink = CsvGzSink::create(&self.spec, &self.format)?;

        if let Err(e) = self.drain(&mut sink) {
            sink.abandon();
            return Err(e);
        }

        let rows = sink.finalize()?;
        log::info!(
            "{}: {} rows → {} ({:.1}s)",
            self.spec.name,
            fmt_num(rows),
            self.spec.path.display(),
            start.elapsed().as_secs_f64()
        );
        Ok(SinkStats {
            stream: self.spec.name.clone(),
            path: self.spec.path.clone(),
            rows,
        })
    }

    /// Ok once the end marker arrives
    fn drain(&self, sink: &mut CsvGzSink) -> Result<(), PipelineError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            match self.input.recv() {
                Ok(Message::Item(rows)) => {
                    for row in &rows {
                        sink.write_row(row)?;
                    }
                }
                Ok(Message::End) => return Ok(()),
                Err(_) if self.cancel.is_cancelled() => return Err(PipelineError::Cancelled),
                Err(_) => {
                    return Err(PipelineError::ChannelClosed(format!(
                        "output '{}'",
                        self.spec.name
                    )));
                }
            }
        }
    }
}
