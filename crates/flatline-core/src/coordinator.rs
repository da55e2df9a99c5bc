//! Completion tracking and the output shutdown protocol
//!
//! Every unit (reader, transform worker, sink writer) reports exactly one
//! [`CompletionEvent`] when it exits. The coordinator counts them down and is
//! the only place that marks output channels finished: once the last
//! transform worker has reported, nothing can produce rows any more, and a
//! marker pushed onto each output channel is queued behind every row those
//! workers sent.

use std::fmt;
use std::sync::mpsc;

use crate::channel::Sender;
use crate::error::PipelineError;
use crate::shutdown::CancelToken;

/// Kind of pipeline unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Reader,
    Transform,
    Writer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reader => "reader",
            Self::Transform => "transform",
            Self::Writer => "writer",
        })
    }
}

/// How a unit exited
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Done,
    /// Stopped early because the run was cancelled
    Cancelled,
    Failed(String),
}

/// Sent once per unit, right before the unit's thread ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub role: Role,
    pub index: usize,
    pub status: Status,
}

impl CompletionEvent {
    pub fn unit(&self) -> String {
        format!("{}[{}]", self.role, self.index)
    }
}

pub type EventSender = mpsc::Sender<CompletionEvent>;
pub type EventReceiver = mpsc::Receiver<CompletionEvent>;

/// Sends a unit's completion event exactly once.
///
/// If the guard is dropped without [`done`](Self::done),
/// [`cancelled`](Self::cancelled) or [`failed`](Self::failed) having been
/// called (an early return or a panic unwinding through the unit), it reports
/// `Failed`. The coordinator therefore never waits on a unit that died.
pub struct CompletionGuard {
    tx: EventSender,
    role: Role,
    index: usize,
    status: Option<Status>,
}

impl CompletionGuard {
    pub fn new(tx: EventSender, role: Role, index: usize) -> Self {
        Self {
            tx,
            role,
            index,
            status: None,
        }
    }

    pub fn done(mut self) {
        self.status = Some(Status::Done);
    }

    pub fn cancelled(mut self) {
        self.status = Some(Status::Cancelled);
    }

    pub fn failed(mut self, reason: impl Into<String>) {
        self.status = Some(Status::Failed(reason.into()));
    }

    /// Report the outcome of a unit body
    pub fn report<T>(self, result: &Result<T, PipelineError>) {
        match result {
            Ok(_) => self.done(),
            Err(e) if e.is_cancelled() => self.cancelled(),
            Err(e) => self.failed(e.to_string()),
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let status = self.status.take().unwrap_or_else(|| {
            if std::thread::panicking() {
                Status::Failed("panicked".to_string())
            } else {
                Status::Failed("exited without reporting".to_string())
            }
        });
        // Coordinator may already be gone after a failure; nothing to do then
        let _ = self.tx.send(CompletionEvent {
            role: self.role,
            index: self.index,
            status,
        });
    }
}

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Transform workers still producing rows
    Running,
    /// Output channels marked; writers finishing their backlog
    Draining,
    /// Every writer has reported
    Done,
}

/// Outcome of a coordinator run
#[derive(Debug)]
pub struct CoordinatorReport {
    pub phase: Phase,
    pub markers_sent: usize,
    /// First unit failure, or a coordinator-level error
    pub failure: Option<PipelineError>,
}

/// Unit counts the coordinator waits for
#[derive(Debug, Clone, Copy)]
pub struct UnitCounts {
    pub readers: usize,
    pub transforms: usize,
    pub writers: usize,
}

pub struct Coordinator<T> {
    events: EventReceiver,
    outputs: Vec<(String, Sender<T>)>,
    readers_remaining: usize,
    transforms_remaining: usize,
    writers_remaining: usize,
    phase: Phase,
    cancel: CancelToken,
    markers_sent: usize,
    failure: Option<PipelineError>,
}

impl<T> Coordinator<T> {
    /// `outputs` holds the coordinator's own sender for every output stream;
    /// they are consumed when the streams are marked finished.
    pub fn new(
        events: EventReceiver,
        outputs: Vec<(String, Sender<T>)>,
        counts: UnitCounts,
        cancel: CancelToken,
    ) -> Self {
        Self {
            events,
            outputs,
            readers_remaining: counts.readers,
            transforms_remaining: counts.transforms,
            writers_remaining: counts.writers,
            phase: Phase::Running,
            cancel,
            markers_sent: 0,
            failure: None,
        }
    }

    /// Consume completion events until every writer has reported.
    pub fn run(mut self) -> CoordinatorReport {
        // Degenerate pipelines: nothing will ever report
        if self.transforms_remaining == 0 {
            self.shutdown_outputs();
        }
        if self.writers_remaining == 0 {
            self.phase = Phase::Done;
        }

        while self.phase != Phase::Done {
            match self.events.recv() {
                Ok(event) => self.handle(event),
                Err(_) => {
                    let msg = format!(
                        "event channel closed with {} readers, {} transforms, {} writers outstanding",
                        self.readers_remaining, self.transforms_remaining, self.writers_remaining
                    );
                    log::error!("{msg}");
                    self.cancel.cancel();
                    self.failure.get_or_insert(PipelineError::Coordinator(msg));
                    break;
                }
            }
        }

        CoordinatorReport {
            phase: self.phase,
            markers_sent: self.markers_sent,
            failure: self.failure,
        }
    }

    fn handle(&mut self, event: CompletionEvent) {
        match &event.status {
            Status::Done => log::debug!("{} done", event.unit()),
            Status::Cancelled => log::debug!("{} cancelled", event.unit()),
            Status::Failed(reason) => {
                log::error!("{} failed: {reason}", event.unit());
                self.cancel.cancel();
                if self.failure.is_none() {
                    self.failure = Some(PipelineError::UnitFailed {
                        unit: event.unit(),
                        reason: reason.clone(),
                    });
                }
            }
        }

        match event.role {
            Role::Reader => {
                self.readers_remaining = countdown(self.readers_remaining, &event);
            }
            Role::Transform => {
                self.transforms_remaining = countdown(self.transforms_remaining, &event);
                if self.transforms_remaining == 0 && self.phase == Phase::Running {
                    self.shutdown_outputs();
                }
            }
            Role::Writer => {
                self.writers_remaining = countdown(self.writers_remaining, &event);
                if self.writers_remaining == 0 {
                    log::debug!("all writers done");
                    self.phase = Phase::Done;
                }
            }
        }
    }

    /// Mark every output channel finished, once.
    ///
    /// On a cancelled run the senders are dropped instead, which disconnects
    /// the channels and makes the writers abandon their partial output.
    fn shutdown_outputs(&mut self) {
        let outputs = std::mem::take(&mut self.outputs);
        self.phase = Phase::Draining;

        if self.cancel.is_cancelled() {
            log::warn!("run cancelled, abandoning {} output streams", outputs.len());
            return;
        }

        log::debug!("all transforms done, finishing {} output streams", outputs.len());
        for (name, tx) in outputs {
            match tx.finish() {
                Ok(()) => self.markers_sent += 1,
                Err(_) => log::warn!("{name}: writer exited before end marker"),
            }
        }
    }
}

fn countdown(remaining: usize, event: &CompletionEvent) -> usize {
    if remaining == 0 {
        log::warn!("unexpected completion from {}", event.unit());
    }
    remaining.saturating_sub(1)
}
