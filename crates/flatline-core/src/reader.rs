//! Source reader: local gzip JSONL files → round-robined line batches

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use flate2::read::MultiGzDecoder;
use indicatif::ProgressBar;

use crate::channel::Sender;
use crate::error::PipelineError;
use crate::progress::{fmt_num, upgrade_to_bar};
use crate::shutdown::CancelToken;

/// Buffer size for the decompressed line reader (256KB)
const GZIP_BUF_SIZE: usize = 256 * 1024;

/// Initial line buffer capacity (most records fit without reallocating)
const LINE_BUF_CAPACITY: usize = 64 * 1024;

/// Progress bar update interval, in lines
const UPDATE_INTERVAL: usize = 10_000;

/// An ordered group of raw lines from a single input file.
///
/// Lines are kept as bytes; decoding happens per line in the transform
/// worker, so a badly encoded line is skipped there like any other
/// malformed line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub lines: Vec<Vec<u8>>,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl<S: Into<Vec<u8>>> FromIterator<S> for Batch {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            lines: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Shared byte counter for progress tracking
pub type ByteCounter = Arc<AtomicU64>;

/// Reader wrapper that tracks compressed bytes read
pub struct CountingReader<R> {
    inner: R,
    count: ByteCounter,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, count: ByteCounter) -> Self {
        Self { inner, count }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Buffered reader over a gzipped local file with byte counting
pub type GzipFileReader = BufReader<MultiGzDecoder<CountingReader<File>>>;

/// Open a gzip file for line reading.
///
/// Multi-member archives (concatenated gzip streams) are read to the end.
pub fn open_gzip_file(path: &Path, counter: ByteCounter) -> Result<GzipFileReader, PipelineError> {
    let file =
        File::open(path).map_err(|e| PipelineError::io(format!("open {}", path.display()), e))?;
    let gz = MultiGzDecoder::new(CountingReader::new(file, counter));
    Ok(BufReader::with_capacity(GZIP_BUF_SIZE, gz))
}

/// List input files under `root` matching `pattern`, in lexicographic order.
///
/// The pattern is relative to `root` (e.g. `**/*.gz`). Directories that match
/// are ignored. No match is not an error.
pub fn discover_inputs(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, PipelineError> {
    if !root.is_dir() {
        return Err(PipelineError::io(
            format!("input directory {}", root.display()),
            io::Error::new(io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let full = root.join(pattern);
    let full = full
        .to_str()
        .ok_or_else(|| PipelineError::Config(format!("non-UTF-8 input path: {}", full.display())))?;

    let mut files = Vec::new();
    for entry in glob::glob(full)? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Totals for one reader run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub files: usize,
    pub lines: usize,
    pub batches: usize,
    /// Compressed bytes consumed
    pub bytes: u64,
}

/// Streams every input file and deals batches across the ingestion channels.
///
/// Batches go to channel `0, 1, .., n-1, 0, ..` in push order. After the last
/// file, one end marker is pushed onto every channel.
pub struct SourceReader {
    files: Vec<PathBuf>,
    batch_size: usize,
    outputs: Vec<Sender<Batch>>,
    cancel: CancelToken,
    pb: ProgressBar,
}

impl SourceReader {
    pub fn new(
        files: Vec<PathBuf>,
        batch_size: usize,
        outputs: Vec<Sender<Batch>>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            files,
            batch_size,
            outputs,
            cancel,
            pb: ProgressBar::hidden(),
        }
    }

    /// Report compressed bytes read to `pb`
    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    /// Read every file, then mark every ingestion channel finished.
    ///
    /// On failure the cancel token is raised before the channels are
    /// released, so downstream units stop quietly instead of reporting the
    /// disconnect as their own failure.
    pub fn run(mut self) -> Result<ReaderStats, PipelineError> {
        let result = self.read_all();
        if let Err(e) = &result {
            if !e.is_cancelled() {
                self.cancel.cancel();
            }
        }
        result
    }

    fn read_all(&mut self) -> Result<ReaderStats, PipelineError> {
        if self.outputs.is_empty() {
            return Err(PipelineError::Config("reader has no ingestion channels".into()));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch size must be at least 1".into()));
        }

        let start = Instant::now();
        let counter: ByteCounter = Arc::new(AtomicU64::new(0));
        let total: u64 = self
            .files
            .iter()
            .filter_map(|p| p.metadata().ok())
            .map(|m| m.len())
            .sum();
        upgrade_to_bar(&self.pb, total);

        let mut stats = ReaderStats::default();
        let mut next = 0usize;
        let mut buf: Vec<u8> = Vec::with_capacity(LINE_BUF_CAPACITY);

        for path in &self.files {
            log::debug!("reading {}", path.display());
            let mut reader = open_gzip_file(path, counter.clone())?;
            let mut batch = Batch::with_capacity(self.batch_size);

            loop {
                buf.clear();
                let n = reader
                    .read_until(b'\n', &mut buf)
                    .map_err(|e| PipelineError::io(format!("read {}", path.display()), e))?;
                if n == 0 {
                    break;
                }
                batch.lines.push(strip_newline(&buf).to_vec());
                stats.lines += 1;

                if batch.len() == self.batch_size {
                    let full = std::mem::replace(&mut batch, Batch::with_capacity(self.batch_size));
                    self.push(&mut next, full, &mut stats)?;
                }

                if stats.lines.is_multiple_of(UPDATE_INTERVAL) {
                    self.pb.set_position(counter.load(Ordering::Relaxed));
                    self.pb.set_message(format!("{} lines", fmt_num(stats.lines)));
                }
            }

            // Batches never span files
            if !batch.is_empty() {
                self.push(&mut next, batch, &mut stats)?;
            }
            stats.files += 1;
        }

        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        for (i, tx) in std::mem::take(&mut self.outputs).into_iter().enumerate() {
            tx.finish()
                .map_err(|_| PipelineError::ChannelClosed(format!("ingestion[{i}]")))?;
        }

        stats.bytes = counter.load(Ordering::Relaxed);
        self.pb.set_position(stats.bytes);
        self.pb.finish_and_clear();
        log::info!(
            "read {} files, {} lines in {} batches ({:.1}s)",
            fmt_num(stats.files),
            fmt_num(stats.lines),
            fmt_num(stats.batches),
            start.elapsed().as_secs_f64(),
        );
        Ok(stats)
    }

    fn push(&self, next: &mut usize, batch: Batch, stats: &mut ReaderStats) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if self.outputs[*next].send(batch).is_err() {
            return Err(if self.cancel.is_cancelled() {
                PipelineError::Cancelled
            } else {
                PipelineError::ChannelClosed(format!("ingestion[{next}]"))
            });
        }
        *next = (*next + 1) % self.outputs.len();
        stats.batches += 1;
        Ok(())
    }
}

fn strip_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
