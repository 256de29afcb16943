//! Encoding stages of a job.
//!
//! Segmenting, the parallel encode scheduler with its retry ladder,
//! segment joining, final muxing and the pipeline that ties them together.

pub mod ladder;
pub mod merger;
pub mod muxer;
pub mod parallel;
pub mod pipeline;
pub mod segmentation;
pub mod video;

pub use ladder::{RetryLadder, RetryStrategy, SampleSettings, StrategyKind};
pub use parallel::{EncodeSummary, ParallelEncoder};
pub use pipeline::{JobReport, Pipeline};
pub use video::{AbAv1Encoder, EncodeRequest, QualityEncoder};
