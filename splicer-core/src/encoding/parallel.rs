// ============================================================================
// splicer-core/src/encoding/parallel.rs
// ============================================================================
//
// PARALLEL ENCODE SCHEDULER
//
// Segments are fanned out over a bounded rayon pool. Each worker walks its
// segment up the retry ladder, one external encoder process per attempt,
// and reports every transition to the state actor. A segment that exhausts
// the whole ladder trips a shared cancellation token: no further attempts
// are dispatched and in-flight encoder processes are killed. A single
// failed rung never stops the batch.
//
// Attempts write to `NNNN.attempt.mkv` and are renamed into place only once
// the encoder succeeded, so an existing non-empty `NNNN.mkv` always means a
// finished segment. Resume relies on this.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::CoreConfig;
use crate::encoding::ladder::RetryLadder;
use crate::encoding::video::{EncodeRequest, QualityEncoder};
use crate::error::{CoreError, CoreResult};
use crate::external::{CancellationToken, ProcessControl};
use crate::processing::AnalysisResult;
use crate::state::{Segment, SegmentEvent, SegmentStatus, StateHandle};
use crate::utils::non_empty_file_size;
use crate::workspace::JobWorkspace;

/// How one segment ended up after a scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentOutcome {
    Completed,
    Resumed,
    Failed,
    Cancelled,
}

/// Per-segment results of one scheduler run, as segment indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Encoded during this run.
    pub completed: Vec<usize>,
    /// Skipped because the encoded output was already on disk.
    pub resumed: Vec<usize>,
    /// Exhausted the retry ladder.
    pub failed: Vec<usize>,
    /// Never finished because the batch was cancelled.
    pub cancelled: Vec<usize>,
}

impl EncodeSummary {
    pub fn finished(&self) -> usize {
        self.completed.len() + self.resumed.len()
    }
}

/// Runs segment encodes concurrently under the retry ladder.
pub struct ParallelEncoder<'a, E: QualityEncoder> {
    encoder: &'a E,
    config: &'a CoreConfig,
    analysis: &'a AnalysisResult,
    workspace: &'a JobWorkspace,
    state: StateHandle,
    ladder: RetryLadder,
    workers: usize,
}

impl<'a, E: QualityEncoder> ParallelEncoder<'a, E> {
    pub fn new(
        encoder: &'a E,
        config: &'a CoreConfig,
        analysis: &'a AnalysisResult,
        workspace: &'a JobWorkspace,
        state: StateHandle,
    ) -> Self {
        Self {
            encoder,
            config,
            analysis,
            workspace,
            state,
            ladder: RetryLadder::standard(),
            workers: config.workers(),
        }
    }

    pub fn with_ladder(mut self, ladder: RetryLadder) -> Self {
        self.ladder = ladder;
        self
    }

    /// Encodes every segment that is not already finished.
    ///
    /// Returns `SegmentsFailed` if any segment exhausted its ladder. State
    /// updates are flushed before returning either way.
    pub fn encode_segments(&self, segments: &[Segment]) -> CoreResult<EncodeSummary> {
        if segments.is_empty() {
            return Ok(EncodeSummary::default());
        }
        fs::create_dir_all(self.workspace.encoded_dir())?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("splicer-encode-{i}"))
            .build()
            .map_err(|e| CoreError::Io(std::io::Error::other(e.to_string())))?;

        info!(
            "Encoding {} segments with {} workers (ladder: {})",
            segments.len(),
            self.workers,
            self.ladder.iter().map(|r| r.name()).collect::<Vec<_>>().join(" -> ")
        );

        let token = CancellationToken::new();
        let finished = AtomicUsize::new(0);
        let total = segments.len();

        let results: Vec<(usize, CoreResult<SegmentOutcome>)> = pool.install(|| {
            segments
                .par_iter()
                .map(|segment| {
                    let result = self.encode_segment(segment, &token);
                    match &result {
                        Ok(SegmentOutcome::Completed | SegmentOutcome::Resumed) => {
                            let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                            info!("Segment {} done ({done}/{total})", segment.index);
                        }
                        Ok(_) => {}
                        // Losing contact with the state actor ends the batch.
                        Err(_) => token.cancel(),
                    }
                    (segment.index, result)
                })
                .collect()
        });

        self.state.flush()?;

        let mut summary = EncodeSummary::default();
        for (index, result) in results {
            match result? {
                SegmentOutcome::Completed => summary.completed.push(index),
                SegmentOutcome::Resumed => summary.resumed.push(index),
                SegmentOutcome::Failed => summary.failed.push(index),
                SegmentOutcome::Cancelled => summary.cancelled.push(index),
            }
        }
        for list in [
            &mut summary.completed,
            &mut summary.resumed,
            &mut summary.failed,
            &mut summary.cancelled,
        ] {
            list.sort_unstable();
        }

        info!(
            "Encode pass finished: {} encoded, {} resumed, {} failed, {} cancelled",
            summary.completed.len(),
            summary.resumed.len(),
            summary.failed.len(),
            summary.cancelled.len()
        );

        if let Some(&first_index) = summary.failed.first() {
            return Err(CoreError::SegmentsFailed {
                first_index,
                count: summary.failed.len(),
            });
        }
        Ok(summary)
    }

    /// Walks one segment up the ladder until it succeeds, exhausts the
    /// ladder, or the batch is cancelled.
    fn encode_segment(&self, segment: &Segment, token: &CancellationToken) -> CoreResult<SegmentOutcome> {
        let index = segment.index;
        let encoded = self.workspace.encoded_path(index);
        let attempt_path = self.workspace.attempt_path(index);

        if non_empty_file_size(&encoded).is_some() {
            debug!("Segment {index} already encoded, skipping");
            self.state.segment_event(index, SegmentEvent::Resumed)?;
            return Ok(SegmentOutcome::Resumed);
        }
        if segment.status == SegmentStatus::Failed {
            warn!("Segment {index} has no attempts left");
            token.cancel();
            return Ok(SegmentOutcome::Failed);
        }

        let control = ProcessControl::new(self.config.encode_timeout(), token.clone());
        let mut attempts = segment.attempts as usize;

        loop {
            if token.is_cancelled() {
                return Ok(SegmentOutcome::Cancelled);
            }
            let Some(rung) = self.ladder.rung(attempts) else {
                warn!("Segment {index} has no attempts left");
                token.cancel();
                return Ok(SegmentOutcome::Failed);
            };

            self.state
                .segment_event(index, SegmentEvent::AttemptStarted(rung.kind))?;
            attempts += 1;

            let samples = rung.resolve(self.config);
            debug!(
                "Segment {index} attempt {attempts} ({}): min VMAF {}, {} x {}s samples",
                rung.name(),
                samples.min_vmaf,
                samples.sample_count,
                samples.sample_duration_secs
            );
            let request = EncodeRequest::new(
                self.config,
                self.analysis,
                &segment.path,
                &attempt_path,
                samples,
            );

            discard(&attempt_path);
            let result = self
                .encoder
                .encode(&request, &control)
                .and_then(|()| promote_attempt(&attempt_path, &encoded));

            match result {
                Ok(()) => {
                    self.state.segment_event(index, SegmentEvent::AttemptSucceeded)?;
                    if attempts > 1 {
                        info!("Segment {index} succeeded with strategy {}", rung.name());
                    }
                    return Ok(SegmentOutcome::Completed);
                }
                Err(CoreError::Cancelled(_)) => {
                    discard(&attempt_path);
                    self.state.segment_event(index, SegmentEvent::AttemptCancelled)?;
                    return Ok(SegmentOutcome::Cancelled);
                }
                Err(e) => {
                    discard(&attempt_path);
                    warn!("Segment {index} failed with strategy {}: {e}", rung.name());
                    self.state
                        .segment_event(index, SegmentEvent::AttemptFailed(e.to_string()))?;
                    if attempts >= self.ladder.rung_count() {
                        warn!("Segment {index} exhausted all {} strategies, cancelling batch", self.ladder.rung_count());
                        token.cancel();
                        return Ok(SegmentOutcome::Failed);
                    }
                }
            }
        }
    }
}

/// Moves a finished attempt into its final place.
pub(crate) fn promote_attempt(attempt: &Path, encoded: &Path) -> CoreResult<()> {
    if non_empty_file_size(attempt).is_none() {
        return Err(CoreError::SegmentValidation {
            path: attempt.to_path_buf(),
            reason: "encoder reported success but produced no output".to_string(),
        });
    }
    fs::rename(attempt, encoded)?;
    Ok(())
}

pub(crate) fn discard(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Could not remove {}: {e}", path.display());
        }
    }
}
