//! Durable per-job state.
//!
//! [`model`] holds the job and segment types and the segment state machine,
//! [`store`] persists them as JSON documents with atomic writes, and
//! [`actor`] serializes every mutation through a single writer thread.

pub mod actor;
pub mod model;
pub mod store;

pub use actor::{StateActor, StateCommand, StateHandle};
pub use model::{
    AttemptOutcome, AttemptRecord, Job, JobLedger, JobStage, JobStatus, ProgressSummary, Segment,
    SegmentEvent, SegmentStatus,
};
pub use store::StateStore;
