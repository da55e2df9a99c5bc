//! Flatline Core - parallel streaming pipeline for compressed JSONL corpora
//!
//! One reader deals line batches across bounded ingestion channels, transform
//! workers project each record into rows for named output streams, and one
//! writer per stream appends those rows to a gzip CSV file. A coordinator
//! tracks completion and marks every output channel finished exactly once.

pub mod channel;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod projection;
pub mod reader;
pub mod record;
pub mod shutdown;
pub mod sink;
pub mod transform;

// Re-exports for convenience
pub use channel::{Disconnected, Message, bounded};
pub use coordinator::{CompletionEvent, Coordinator, CoordinatorReport, Phase, Role, Status};
pub use error::PipelineError;
pub use logging::{IndicatifLogger, init_logging};
pub use pipeline::{Pipeline, PipelineConfig, PipelineHandle, RunSummary};
pub use progress::{ProgressContext, fmt_num};
pub use projection::{Output, ProjectFn, Projection, StreamDef, project_all};
pub use reader::{Batch, ReaderStats, SourceReader, discover_inputs};
pub use record::{Record, Row, render_value};
pub use shutdown::CancelToken;
pub use sink::{
    CsvFormat, CsvGzSink, SinkStats, SinkWriter, StreamSpec, Terminator, cleanup_tmp_files,
};
pub use transform::{RowBatch, TransformStats, TransformWorker};
