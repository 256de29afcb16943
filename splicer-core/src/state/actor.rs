// ============================================================================
// splicer-core/src/state/actor.rs
// ============================================================================
//
// STATE ACTOR: Single Writer for the Job Ledger
//
// Encode workers run concurrently but must never read-modify-write the
// state documents themselves. Instead a dedicated thread owns the
// `StateStore` and the in-memory `JobLedger`, and workers send it commands
// over an mpsc channel through cloneable `StateHandle`s. Commands are
// applied and persisted strictly in arrival order.
//
// KEY COMPONENTS:
// - StateActor: owns the thread; shut down to get the final ledger back
// - StateHandle: cheap sender used by the pipeline and the workers
// - StateCommand: the message protocol

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, error};

use super::model::{JobLedger, JobStatus, Segment, SegmentEvent};
use super::store::StateStore;
use crate::error::{CoreError, CoreResult};
use crate::processing::classify::EncodeStrategy;

/// Messages accepted by the state actor.
#[derive(Debug)]
pub enum StateCommand {
    /// Replaces the segment list (after segmentation).
    RegisterSegments(Vec<Segment>),
    SegmentEvent { index: usize, event: SegmentEvent },
    JobStatus(JobStatus),
    JobStrategy(EncodeStrategy),
    Snapshot(Sender<JobLedger>),
    /// Replies with the first error seen so far, if any.
    Flush(Sender<CoreResult<()>>),
    Shutdown,
}

/// Cloneable sender side of the actor.
#[derive(Debug, Clone)]
pub struct StateHandle {
    tx: Sender<StateCommand>,
}

impl StateHandle {
    fn send(&self, command: StateCommand) -> CoreResult<()> {
        self.tx
            .send(command)
            .map_err(|_| CoreError::StateStore("state actor is no longer running".to_string()))
    }

    pub fn register_segments(&self, segments: Vec<Segment>) -> CoreResult<()> {
        self.send(StateCommand::RegisterSegments(segments))
    }

    pub fn segment_event(&self, index: usize, event: SegmentEvent) -> CoreResult<()> {
        self.send(StateCommand::SegmentEvent { index, event })
    }

    pub fn set_job_status(&self, status: JobStatus) -> CoreResult<()> {
        self.send(StateCommand::JobStatus(status))
    }

    pub fn set_strategy(&self, strategy: EncodeStrategy) -> CoreResult<()> {
        self.send(StateCommand::JobStrategy(strategy))
    }

    /// Returns a copy of the ledger after all previously sent commands.
    pub fn snapshot(&self) -> CoreResult<JobLedger> {
        let (tx, rx) = mpsc::channel();
        self.send(StateCommand::Snapshot(tx))?;
        rx.recv()
            .map_err(|_| CoreError::StateStore("state actor stopped before replying".to_string()))
    }

    /// Waits until all previously sent commands are persisted and reports
    /// any persistence failure.
    pub fn flush(&self) -> CoreResult<()> {
        let (tx, rx) = mpsc::channel();
        self.send(StateCommand::Flush(tx))?;
        rx.recv()
            .map_err(|_| CoreError::StateStore("state actor stopped before replying".to_string()))?
    }
}

/// Owner of the state thread.
#[derive(Debug)]
pub struct StateActor {
    handle: StateHandle,
    thread: Option<JoinHandle<CoreResult<JobLedger>>>,
}

impl StateActor {
    /// Persists `ledger` and starts the actor thread.
    pub fn spawn(store: StateStore, ledger: JobLedger, max_attempts: usize) -> CoreResult<Self> {
        store.save_all(&ledger)?;

        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("splicer-state".to_string())
            .spawn(move || run(store, ledger, max_attempts, rx))?;

        Ok(Self {
            handle: StateHandle { tx },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> StateHandle {
        self.handle.clone()
    }

    /// Stops the actor after it drains pending commands and returns the
    /// final ledger.
    pub fn shutdown(mut self) -> CoreResult<JobLedger> {
        self.stop()
    }

    fn stop(&mut self) -> CoreResult<JobLedger> {
        let Some(thread) = self.thread.take() else {
            return Err(CoreError::StateStore("state actor already stopped".to_string()));
        };
        // The thread may already be gone if it hit a panic; join reports that.
        let _ = self.handle.tx.send(StateCommand::Shutdown);
        thread
            .join()
            .map_err(|_| CoreError::StateStore("state actor panicked".to_string()))?
    }
}

impl Drop for StateActor {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.stop() {
                error!("State actor stopped with error: {e}");
            }
        }
    }
}

fn run(
    store: StateStore,
    mut ledger: JobLedger,
    max_attempts: usize,
    rx: Receiver<StateCommand>,
) -> CoreResult<JobLedger> {
    let mut failure: Option<String> = None;

    // Ends on Shutdown or once every handle is dropped.
    while let Ok(command) = rx.recv() {
        let result = match command {
            StateCommand::RegisterSegments(mut segments) => {
                segments.sort_by_key(|s| s.index);
                debug!("Registering {} segments", segments.len());
                ledger.segments = segments;
                ledger.job.touch();
                store
                    .save_segment_manifest(&ledger)
                    .and_then(|()| store.save_status(&ledger))
                    .and_then(|()| store.save_progress(&ledger.summary()))
            }
            StateCommand::SegmentEvent { index, event } => ledger
                .apply(index, event, max_attempts)
                .and_then(|()| store.save_status(&ledger))
                .and_then(|()| store.save_progress(&ledger.summary())),
            StateCommand::JobStatus(status) => {
                ledger.job.status = status;
                ledger.job.touch();
                store
                    .save_job(&ledger.job)
                    .and_then(|()| store.save_progress(&ledger.summary()))
            }
            StateCommand::JobStrategy(strategy) => {
                ledger.job.strategy = Some(strategy);
                ledger.job.touch();
                store.save_job(&ledger.job)
            }
            StateCommand::Snapshot(reply) => {
                let _ = reply.send(ledger.clone());
                Ok(())
            }
            StateCommand::Flush(reply) => {
                let status = match &failure {
                    Some(msg) => Err(CoreError::StateStore(msg.clone())),
                    None => Ok(()),
                };
                let _ = reply.send(status);
                Ok(())
            }
            StateCommand::Shutdown => break,
        };

        if let Err(e) = result {
            error!("State update failed: {e}");
            failure.get_or_insert_with(|| e.to_string());
        }
    }

    // A failed write is retried here once more with the final state.
    let saved = store.save_all(&ledger);
    if let Some(msg) = failure {
        match saved {
            Ok(()) => debug!("Final state saved after earlier failure"),
            Err(e) => error!("Final state save failed: {e}"),
        }
        return Err(CoreError::StateStore(msg));
    }
    saved?;
    Ok(ledger)
}
