//! Transform worker: line batches → projected rows, routed per stream

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::channel::{Message, Receiver, Sender};
use crate::error::PipelineError;
use crate::projection::{project_all, Output, Projection};
use crate::reader::Batch;
use crate::record::{Record, Row};
use crate::shutdown::CancelToken;

/// Rows one worker produced for one stream from one input batch
pub type RowBatch = Vec<Row>;

/// Per-worker counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub batches: usize,
    pub lines: usize,
    /// Lines that parsed and carried an identifier
    pub records: usize,
    pub rows: FxHashMap<String, usize>,
}

impl TransformStats {
    pub fn rows_total(&self) -> usize {
        self.rows.values().sum()
    }

    /// Fold another worker's counters into these
    pub fn merge(&mut self, other: &TransformStats) {
        self.batches += other.batches;
        self.lines += other.lines;
        self.records += other.records;
        for (stream, n) in &other.rows {
            *self.rows.entry(stream.clone()).or_default() += n;
        }
    }
}

/// Owns one ingestion channel; shares every output channel with the other
/// workers.
pub struct TransformWorker {
    index: usize,
    input: Receiver<Batch>,
    outputs: Vec<(String, Sender<RowBatch>)>,
    slots: FxHashMap<String, usize>,
    projections: Arc<[Projection]>,
    id_field: Arc<str>,
    cancel: CancelToken,
}

impl TransformWorker {
    pub fn new(
        index: usize,
        input: Receiver<Batch>,
        outputs: Vec<(String, Sender<RowBatch>)>,
        projections: Arc<[Projection]>,
        id_field: Arc<str>,
        cancel: CancelToken,
    ) -> Self {
        let slots = outputs
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        Self {
            index,
            input,
            outputs,
            slots,
            projections,
            id_field,
            cancel,
        }
    }

    /// Consume batches until the channel's end marker.
    pub fn run(self) -> Result<TransformStats, PipelineError> {
        let result = self.consume();
        if let Err(e) = &result {
            if !e.is_cancelled() {
                self.cancel.cancel();
            }
        }
        result
    }

    fn consume(&self) -> Result<TransformStats, PipelineError> {
        let mut stats = TransformStats::default();
        let mut pending: Vec<RowBatch> = vec![Vec::new(); self.outputs.len()];
        let mut out: Vec<Output> = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            match self.input.recv() {
                Ok(Message::Item(batch)) => {
                    stats.batches += 1;
                    self.process(&batch, &mut pending, &mut out, &mut stats)?;
                    self.flush(&mut pending, &mut stats)?;
                }
                Ok(Message::End) => break,
                Err(_) => {
                    return Err(if self.cancel.is_cancelled() {
                        PipelineError::Cancelled
                    } else {
                        PipelineError::ChannelClosed(format!("ingestion[{}]", self.index))
                    });
                }
            }
        }

        log::debug!(
            "transform[{}]: {} batches, {} lines, {} records, {} rows",
            self.index,
            stats.batches,
            stats.lines,
            stats.records,
            stats.rows_total()
        );
        Ok(stats)
    }

    fn process(
        &self,
        batch: &Batch,
        pending: &mut [RowBatch],
        out: &mut Vec<Output>,
        stats: &mut TransformStats,
    ) -> Result<(), PipelineError> {
        for line in &batch.lines {
            stats.lines += 1;
            let Some(record) = Record::parse_bytes(line) else {
                log::trace!("transform[{}]: skipping unparseable line", self.index);
                continue;
            };
            if record.identifier(&self.id_field).is_none() {
                continue;
            }
            stats.records += 1;

            out.clear();
            project_all(&self.projections, &record, out);
            for output in out.drain(..) {
                let slot = *self
                    .slots
                    .get(output.stream)
                    .ok_or_else(|| PipelineError::UnknownStream(output.stream.to_string()))?;
                pending[slot].push(output.row);
            }
        }
        Ok(())
    }

    /// Send every non-empty per-stream row batch
    fn flush(&self, pending: &mut [RowBatch], stats: &mut TransformStats) -> Result<(), PipelineError> {
        for (rows, (name, tx)) in pending.iter_mut().zip(&self.outputs) {
            if rows.is_empty() {
                continue;
            }
            let n = rows.len();
            if tx.send(std::mem::take(rows)).is_err() {
                return Err(if self.cancel.is_cancelled() {
                    PipelineError::Cancelled
                } else {
                    PipelineError::ChannelClosed(format!("output '{name}'"))
                });
            }
            *stats.rows.entry(name.clone()).or_default() += n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::bounded;

    fn topics(record: &Record, out: &mut Vec<Output>) {
        let Some(work_id) = record.get("id") else {
            return;
        };
        for topic in record.array("topics") {
            if let Some(topic_id) = topic.get("id") {
                out.push(Output::new(
                    "topics",
                    Row::new()
                        .with("work_id", work_id.clone())
                        .with("topic_id", topic_id.clone())
                        .with("score", topic.get("score").cloned()),
                ));
            }
        }
    }

    fn works(record: &Record, out: &mut Vec<Output>) {
        if let Some(id) = record.get("id") {
            out.push(Output::new("works", Row::new().with("id", id.clone())));
        }
    }

    fn rogue(_: &Record, out: &mut Vec<Output>) {
        out.push(Output::new("nowhere", Row::new()));
    }

    struct Harness {
        input: Sender<Batch>,
        outputs: Vec<(String, Receiver<RowBatch>)>,
        worker: TransformWorker,
    }

    fn harness(streams: &[&str], projections: Vec<Projection>, cancel: CancelToken) -> Harness {
        let (in_tx, in_rx) = bounded(16);
        let mut senders = Vec::new();
        let mut receivers = Vec::new();
        for s in streams {
            let (tx, rx) = bounded(16);
            senders.push((s.to_string(), tx));
            receivers.push((s.to_string(), rx));
        }
        Harness {
            input: in_tx,
            outputs: receivers,
            worker: TransformWorker::new(0, in_rx, senders, projections.into(), "id".into(), cancel),
        }
    }

    fn collect(rx: &Receiver<RowBatch>) -> Vec<RowBatch> {
        let mut got = Vec::new();
        while let Ok(Message::Item(rows)) = rx.recv() {
            got.push(rows);
        }
        got
    }

    #[test]
    fn projects_and_skips() {
        let h = harness(
            &["topics"],
            vec![Projection::new("topics", topics)],
            CancelToken::new(),
        );
        h.input
            .send(Batch::from_iter([
                r#"{"id":"W1","topics":[{"id":"T1","score":0.9}]}"#,
                r#"{"notid":"X"}"#,
                "",
                "{broken",
            ]))
            .unwrap();
        h.input.finish().unwrap();

        let stats = h.worker.run().unwrap();
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.lines, 4);
        assert_eq!(stats.records, 1);
        assert_eq!(stats.rows["topics"], 1);

        let batches = collect(&h.outputs[0].1);
        assert_eq!(batches.len(), 1);
        let row = &batches[0][0];
        assert_eq!(row.cell("work_id"), "W1");
        assert_eq!(row.cell("topic_id"), "T1");
        assert_eq!(row.cell("score"), "0.9");
    }

    #[test]
    fn invalid_utf8_line_is_skipped() {
        let h = harness(&["works"], vec![Projection::new("works", works)], CancelToken::new());
        h.input
            .send(Batch {
                lines: vec![
                    br#"{"id":"W1"}"#.to_vec(),
                    b"{\"id\":\"W\xff\xfe\"}".to_vec(),
                    br#"{"id":"W3"}"#.to_vec(),
                ],
            })
            .unwrap();
        h.input.finish().unwrap();

        let stats = h.worker.run().unwrap();
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.records, 2);
        let ids: Vec<String> = collect(&h.outputs[0].1)
            .concat()
            .iter()
            .map(|r| r.cell("id").into_owned())
            .collect();
        assert_eq!(ids, ["W1", "W3"]);
    }

    #[test]
    fn empty_row_batches_are_not_sent() {
        let h = harness(
            &["works", "topics"],
            vec![Projection::new("works", works), Projection::new("topics", topics)],
            CancelToken::new(),
        );
        h.input.send(Batch::from_iter([r#"{"id":"W1"}"#])).unwrap();
        h.input.send(Batch::from_iter([r#"{"id":""}"#])).unwrap();
        h.input.finish().unwrap();

        let stats = h.worker.run().unwrap();
        assert_eq!(stats.rows.get("topics"), None);
        assert_eq!(collect(&h.outputs[0].1).len(), 1);
        assert!(collect(&h.outputs[1].1).is_empty());
    }

    #[test]
    fn rows_keep_record_then_projection_order() {
        let h = harness(
            &["topics"],
            vec![Projection::new("topics", topics)],
            CancelToken::new(),
        );
        h.input
            .send(Batch::from_iter([
                r#"{"id":"W1","topics":[{"id":"T1"},{"id":"T2"}]}"#,
                r#"{"id":"W2","topics":[{"id":"T3"}]}"#,
            ]))
            .unwrap();
        h.input.finish().unwrap();
        h.worker.run().unwrap();

        let rows: Vec<String> = collect(&h.outputs[0].1)
            .concat()
            .iter()
            .map(|r| format!("{}/{}", r.cell("work_id"), r.cell("topic_id")))
            .collect();
        assert_eq!(rows, ["W1/T1", "W1/T2", "W2/T3"]);
    }

    #[test]
    fn unknown_stream_fails_worker() {
        let h = harness(&["works"], vec![Projection::new("rogue", rogue)], CancelToken::new());
        h.input.send(Batch::from_iter([r#"{"id":"W1"}"#])).unwrap();
        h.input.finish().unwrap();
        let err = h.worker.run().unwrap_err();
        assert!(matches!(err, PipelineError::UnknownStream(ref s) if s == "nowhere"));
    }

    #[test]
    fn input_disconnect_without_marker_is_an_error() {
        let h = harness(&["works"], vec![Projection::new("works", works)], CancelToken::new());
        drop(h.input);
        let err = h.worker.run().unwrap_err();
        assert!(matches!(err, PipelineError::ChannelClosed(_)));
    }

    #[test]
    fn closed_output_fails_worker() {
        let mut h = harness(&["works"], vec![Projection::new("works", works)], CancelToken::new());
        h.outputs.clear();
        h.input.send(Batch::from_iter([r#"{"id":"W1"}"#])).unwrap();
        h.input.finish().unwrap();
        let err = h.worker.run().unwrap_err();
        assert!(err.to_string().contains("works"));
    }

    #[test]
    fn cancelled_worker_stops() {
        let cancel = CancelToken::new();
        let h = harness(&["works"], vec![Projection::new("works", works)], cancel.clone());
        cancel.cancel();
        h.input.send(Batch::from_iter([r#"{"id":"W1"}"#])).unwrap();
        let err = h.worker.run().unwrap_err();
        assert!(err.is_cancelled());
        assert!(collect(&h.outputs[0].1).is_empty());
    }

    #[test]
    fn stats_merge() {
        let mut a = TransformStats {
            batches: 1,
            lines: 10,
            records: 8,
            rows: [("works".to_string(), 8)].into_iter().collect(),
        };
        let b = TransformStats {
            batches: 2,
            lines: 5,
            records: 5,
            rows: [("works".to_string(), 5), ("ids".to_string(), 5)]
                .into_iter()
                .collect(),
        };
        a.merge(&b);
        assert_eq!(a.batches, 3);
        assert_eq!(a.records, 13);
        assert_eq!(a.rows["works"], 13);
        assert_eq!(a.rows_total(), 18);
    }
}
