//! Conflict detector actor
//!
//! A [`ConflictDetector`] owned by a dedicated thread. Executions send their
//! operations into one unbounded inbox through [`Recorder`]s; the thread
//! processes them in arrival order and raises the per-transaction conflict
//! flag of every author it marks. Executions poll their flag to cancel
//! themselves cooperatively.

use crate::detector::ConflictDetector;
use crate::error::{SchedulerError, SchedulerResult};
use crate::key::{Author, ConflictKey, OpKind, Operation};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use strata_evm::{Control, InstructionHook};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

enum Message {
    Record(Operation),
    Reset(oneshot::Sender<BTreeSet<Author>>),
    Stop,
}

/// Handle to a running detector thread
pub struct DetectorHandle {
    sender: mpsc::UnboundedSender<Message>,
    flags: Arc<[AtomicBool]>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DetectorHandle {
    /// Start a detector with one conflict flag per transaction
    pub fn spawn(tx_count: usize) -> SchedulerResult<Self> {
        let (sender, inbox) = mpsc::unbounded_channel();
        let flags: Arc<[AtomicBool]> = (0..tx_count).map(|_| AtomicBool::new(false)).collect();
        let worker_flags = Arc::clone(&flags);
        let worker = thread::Builder::new()
            .name("conflict-detector".into())
            .spawn(move || run(inbox, worker_flags))?;

        Ok(Self {
            sender,
            flags,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Operation sink for `author`
    pub fn recorder(&self, author: Author) -> Recorder {
        Recorder {
            author,
            sender: self.sender.clone(),
            seen: HashSet::new(),
            operations: Vec::new(),
            disconnected: false,
        }
    }

    /// Submit an already attributed operation
    pub fn record(&self, op: Operation) -> SchedulerResult<()> {
        self.sender
            .send(Message::Record(op))
            .map_err(|_| SchedulerError::DetectorStopped)
    }

    /// Whether transaction `index` has been marked in this round
    pub fn is_conflicted(&self, index: usize) -> bool {
        self.flags
            .get(index)
            .map_or(false, |flag| flag.load(Ordering::Acquire))
    }

    /// Cancellation hook for transaction `index`
    pub fn hook(&self, index: usize) -> ConflictFlag<'_> {
        ConflictFlag(self.flags.get(index))
    }

    /// Wait until everything sent so far is processed, then drain the
    /// conflicted set and clear all tracking and flags
    pub fn reset(&self) -> SchedulerResult<BTreeSet<Author>> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Message::Reset(reply))
            .map_err(|_| SchedulerError::DetectorStopped)?;
        response
            .blocking_recv()
            .map_err(|_| SchedulerError::DetectorStopped)
    }

    /// Stop the thread and wait for it
    pub fn shutdown(&self) {
        let _ = self.sender.send(Message::Stop);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("conflict detector thread panicked");
            }
        }
    }
}

impl Drop for DetectorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(mut inbox: mpsc::UnboundedReceiver<Message>, flags: Arc<[AtomicBool]>) {
    let mut detector = ConflictDetector::new();
    let mut processed = 0u64;
    while let Some(message) = inbox.blocking_recv() {
        match message {
            Message::Record(op) => {
                processed += 1;
                for author in detector.process(op) {
                    trace!(%author, "marked conflicting");
                    if let Some(flag) = author.tx_index().and_then(|index| flags.get(index)) {
                        flag.store(true, Ordering::Release);
                    }
                }
            }
            Message::Reset(reply) => {
                let conflicted = detector.reset();
                for flag in flags.iter() {
                    flag.store(false, Ordering::Release);
                }
                debug!(processed, conflicted = conflicted.len(), "detector round closed");
                processed = 0;
                // 请求方可能已放弃等待
                let _ = reply.send(conflicted);
            }
            Message::Stop => break,
        }
    }
}

/// Instruction hook aborting an execution once its transaction is marked
pub struct ConflictFlag<'a>(Option<&'a AtomicBool>);

impl InstructionHook for ConflictFlag<'_> {
    fn on_instruction(&self, _pc: u64) -> Control {
        match self.0 {
            Some(flag) if flag.load(Ordering::Acquire) => Control::Abort,
            _ => Control::Continue,
        }
    }
}

/// Per-author operation sink.
///
/// Each distinct (kind, key) pair is forwarded to the detector once and
/// kept locally so it can be fed again in a later round.
pub struct Recorder {
    author: Author,
    sender: mpsc::UnboundedSender<Message>,
    seen: HashSet<(OpKind, ConflictKey)>,
    operations: Vec<Operation>,
    disconnected: bool,
}

impl Recorder {
    /// Author of everything recorded here
    pub fn author(&self) -> Author {
        self.author
    }

    /// Record one access
    pub fn record(&mut self, kind: OpKind, key: ConflictKey) {
        if !self.seen.insert((kind, key)) {
            return;
        }
        let op = Operation::new(self.author, kind, key);
        if self.sender.send(Message::Record(op.clone())).is_err() {
            self.disconnected = true;
        }
        self.operations.push(op);
    }

    /// Distinct operations recorded so far
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Close the recorder, returning its operations in first-seen order
    pub fn finish(self) -> SchedulerResult<Vec<Operation>> {
        if self.disconnected {
            return Err(SchedulerError::DetectorStopped);
        }
        Ok(self.operations)
    }
}
