//! Job pipeline.
//!
//! [`Pipeline::run_job`] drives one input file from probing to a validated
//! output container. The Dolby Vision path encodes the whole file in one
//! encoder run; every other source is segmented, encoded in parallel and
//! joined again. Audio transcoding and the final mux are shared by both
//! paths.
//!
//! Job state lives in the job workspace and is updated through the state
//! actor only. Any fatal error marks the job failed and is handed to the
//! [`RecoveryManager`] once before it is returned to the caller.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::config::CoreConfig;
use crate::encoding::ladder::RetryLadder;
use crate::encoding::merger::concatenate_segments;
use crate::encoding::muxer::{MuxInputs, mux_tracks};
use crate::encoding::parallel::{EncodeSummary, ParallelEncoder, discard, promote_attempt};
use crate::encoding::segmentation::{MIN_SEGMENT_BYTES, segment_video};
use crate::encoding::video::{EncodeRequest, QualityEncoder};
use crate::error::{CoreError, CoreResult};
use crate::external::{CancellationToken, FfmpegSpawner, FrameSampler, MediaProber, ProcessControl};
use crate::processing::audio::encode_audio_tracks;
use crate::processing::{AnalysisResult, EncodeStrategy, analyze};
use crate::recovery::{FailureContext, RecoveryManager};
use crate::state::store::write_atomic;
use crate::state::{
    Job, JobLedger, JobStage, JobStatus, Segment, SegmentStatus, StateActor, StateHandle,
    StateStore,
};
use crate::utils::{format_bytes, format_duration, non_empty_file_size};
use crate::workspace::{JobWorkspace, archive_dir, canonical_input};

/// Outcome of a successful job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: String,
    pub strategy: EncodeStrategy,
    pub output_path: PathBuf,
    /// Zero on the Dolby Vision path.
    pub segment_count: usize,
    /// Segments found already encoded from an earlier run.
    pub resumed_segments: usize,
    pub input_size: u64,
    pub output_size: u64,
    pub output_duration_secs: f64,
    pub elapsed: Duration,
}

/// Ledger prepared for a run, plus whether it came from an earlier run.
struct PreparedLedger {
    ledger: JobLedger,
    resumed: bool,
}

/// Drives jobs through the external tool seams.
pub struct Pipeline<'a, S, P, F, E>
where
    S: FfmpegSpawner,
    P: MediaProber,
    F: FrameSampler,
    E: QualityEncoder,
{
    config: &'a CoreConfig,
    spawner: &'a S,
    prober: &'a P,
    sampler: &'a F,
    encoder: &'a E,
    ladder: RetryLadder,
    recovery: RecoveryManager,
}

impl<'a, S, P, F, E> Pipeline<'a, S, P, F, E>
where
    S: FfmpegSpawner,
    P: MediaProber,
    F: FrameSampler,
    E: QualityEncoder,
{
    pub fn new(config: &'a CoreConfig, spawner: &'a S, prober: &'a P, sampler: &'a F, encoder: &'a E) -> Self {
        Self {
            config,
            spawner,
            prober,
            sampler,
            encoder,
            ladder: RetryLadder::standard(),
            recovery: RecoveryManager::new(&config.work_dir),
        }
    }

    pub fn recovery(&self) -> &RecoveryManager {
        &self.recovery
    }

    /// Transcodes `input` into `output`.
    ///
    /// Path validation errors are returned before any job exists. Every
    /// later error goes through the recovery manager first.
    pub fn run_job(&mut self, input: &Path, output: &Path) -> CoreResult<JobReport> {
        let started = Instant::now();
        self.config.validate()?;
        validate_paths(input, output)?;

        let workspace = JobWorkspace::for_input(&self.config.work_dir, input);
        let prepared = prepare_ledger(&workspace, input, output)?;
        let job_id = prepared.ledger.job.id.clone();
        if prepared.resumed {
            info!("Resuming job {job_id} from {}", workspace.root().display());
        } else {
            info!("Starting job {job_id} in {}", workspace.root().display());
        }

        let store = StateStore::open(&workspace.data_dir())?;
        let actor = StateActor::spawn(store, prepared.ledger.clone(), self.ladder.rung_count())?;
        let state = actor.handle();

        let mut stage = JobStage::Validation;
        let result = self.execute(input, output, &workspace, &prepared.ledger, &state, &mut stage);

        match result {
            Ok(mut report) => {
                drop(state);
                if let Err(e) = actor.shutdown() {
                    warn!("State actor stopped with error after completion: {e}");
                }
                if !self.config.keep_workspace {
                    if let Err(e) = workspace.remove() {
                        warn!("Could not remove workspace {}: {e}", workspace.root().display());
                    }
                }
                report.elapsed = started.elapsed();
                info!(
                    "Job {} completed in {}",
                    report.job_id,
                    format_duration(report.elapsed.as_secs_f64())
                );
                Ok(report)
            }
            Err(e) => {
                let stage = failure_stage(stage, &e);
                error!("Job {job_id} failed during {stage}: {e}");
                if let Err(state_err) = state.set_job_status(JobStatus::Failed) {
                    warn!("Could not mark job failed: {state_err}");
                }
                match state.snapshot() {
                    Ok(failed) => {
                        if let Err(archive_err) = archive_job(&self.config.work_dir, &failed.job) {
                            warn!("Could not archive failed job {job_id}: {archive_err}");
                        }
                    }
                    Err(state_err) => warn!("Could not read failed job {job_id}: {state_err}"),
                }
                drop(state);
                if let Err(state_err) = actor.shutdown() {
                    warn!("State actor stopped with error: {state_err}");
                }

                let partial_output = matches!(stage, JobStage::Mux | JobStage::Finalize)
                    .then_some(output);
                let context = FailureContext {
                    job_id: &job_id,
                    stage,
                    error: &e,
                    partial_output,
                };
                if let Err(recovery_err) = self.recovery.handle_failure(&context, &workspace) {
                    error!("Recovery for job {job_id} failed: {recovery_err}");
                }
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        input: &Path,
        output: &Path,
        workspace: &JobWorkspace,
        ledger: &JobLedger,
        state: &StateHandle,
        stage: &mut JobStage,
    ) -> CoreResult<JobReport> {
        state.set_job_status(JobStatus::Running)?;

        *stage = JobStage::Analysis;
        let analysis = analyze(self.prober, self.sampler, input, self.config.disable_crop)?;
        state.set_strategy(analysis.strategy)?;
        info!("Encode strategy: {}", analysis.strategy);

        let (video, segment_count, resumed_segments) = match analysis.strategy {
            EncodeStrategy::DolbyVision => {
                *stage = JobStage::Encode;
                let video = self.encode_single_pass(input, workspace, &analysis)?;
                (video, 0, 0)
            }
            EncodeStrategy::Chunked => {
                *stage = JobStage::Segmentation;
                let segments = self.prepare_segments(input, workspace, ledger, state, &analysis)?;

                *stage = JobStage::Encode;
                let summary: EncodeSummary =
                    ParallelEncoder::new(self.encoder, self.config, &analysis, workspace, state.clone())
                        .with_ladder(self.ladder.clone())
                        .encode_segments(&segments)?;

                *stage = JobStage::Concatenation;
                let snapshot = state.snapshot()?;
                let video = concatenate_segments(self.spawner, self.prober, &snapshot.segments, workspace)?;
                (video, segments.len(), summary.resumed.len())
            }
        };

        *stage = JobStage::Audio;
        let tracks = encode_audio_tracks(
            self.spawner,
            input,
            &analysis.media.audio_streams,
            &workspace.audio_dir(),
        )?;

        *stage = JobStage::Mux;
        let inputs = MuxInputs {
            video: &video,
            audio_tracks: &tracks,
            source: input,
        };
        let output_info = mux_tracks(self.spawner, self.prober, &inputs, output, &analysis.media)?;

        *stage = JobStage::Finalize;
        state.set_job_status(JobStatus::Completed)?;
        state.flush()?;
        let finished = state.snapshot()?;
        archive_job(&self.config.work_dir, &finished.job)?;

        let input_size = fs::metadata(input)?.len();
        let output_size = fs::metadata(output)?.len();
        info!(
            "Output {}: {} -> {}",
            output.display(),
            format_bytes(input_size),
            format_bytes(output_size)
        );

        Ok(JobReport {
            job_id: finished.job.id,
            strategy: analysis.strategy,
            output_path: output.to_path_buf(),
            segment_count,
            resumed_segments,
            input_size,
            output_size,
            output_duration_secs: output_info.duration_secs,
            elapsed: Duration::ZERO,
        })
    }

    /// Dolby Vision path: one encoder run over the whole file on the first
    /// ladder rung.
    fn encode_single_pass(
        &self,
        input: &Path,
        workspace: &JobWorkspace,
        analysis: &AnalysisResult,
    ) -> CoreResult<PathBuf> {
        let video = workspace.video_output();
        if non_empty_file_size(&video).is_some() {
            info!("Encoded video already present, skipping encode");
            return Ok(video);
        }

        let rung = self
            .ladder
            .rung(0)
            .ok_or_else(|| CoreError::Config("retry ladder is empty".to_string()))?;
        let attempt = workspace.video_attempt();
        discard(&attempt);
        let request = EncodeRequest::new(self.config, analysis, input, &attempt, rung.resolve(self.config));

        info!("Encoding Dolby Vision source in a single pass");
        // The per-attempt timeout is sized for segments, not whole films.
        let control = ProcessControl::new(None, CancellationToken::new());
        self.encoder
            .encode(&request, &control)
            .and_then(|()| promote_attempt(&attempt, &video))?;
        Ok(video)
    }

    /// Reuses the segments of an earlier run when they are all still on
    /// disk, and segments the input otherwise.
    fn prepare_segments(
        &self,
        input: &Path,
        workspace: &JobWorkspace,
        ledger: &JobLedger,
        state: &StateHandle,
        analysis: &AnalysisResult,
    ) -> CoreResult<Vec<Segment>> {
        let reusable = !ledger.segments.is_empty()
            && ledger.segments.iter().all(|s| {
                fs::metadata(&s.path).is_ok_and(|m| m.len() >= MIN_SEGMENT_BYTES)
            });
        if reusable {
            let done = ledger.segments.iter().filter(|s| s.is_completed()).count();
            info!(
                "Reusing {} segments from the previous run ({done} already encoded)",
                ledger.segments.len()
            );
            return Ok(ledger.segments.clone());
        }

        // Encodes of a different split must never be joined with this one.
        for dir in [workspace.segments_dir(), workspace.encoded_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            fs::create_dir_all(&dir)?;
        }

        let segments = segment_video(
            self.spawner,
            self.prober,
            input,
            workspace,
            self.config.segment_length_secs,
            analysis.media.duration_secs,
        )?;
        state.register_segments(segments.clone())?;
        Ok(segments)
    }
}

/// Rejects inputs and outputs no job could succeed with.
pub fn validate_paths(input: &Path, output: &Path) -> CoreResult<()> {
    if !input.is_file() {
        return Err(CoreError::InvalidInput(format!(
            "input {} does not exist or is not a file",
            input.display()
        )));
    }
    if output.is_dir() {
        return Err(CoreError::InvalidInput(format!(
            "output {} is a directory",
            output.display()
        )));
    }
    let same_file = fs::canonicalize(input)
        .ok()
        .zip(fs::canonicalize(output).ok())
        .is_some_and(|(a, b)| a == b);
    if same_file || input == output {
        return Err(CoreError::InvalidInput(
            "output must not overwrite the input".to_string(),
        ));
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            CoreError::InvalidInput(format!(
                "cannot create output directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

/// Loads the ledger of an unfinished earlier run for the same input, or
/// starts a fresh job in a clean workspace.
fn prepare_ledger(workspace: &JobWorkspace, input: &Path, output: &Path) -> CoreResult<PreparedLedger> {
    if workspace.exists() {
        let store = StateStore::open(&workspace.data_dir())?;
        match store.load() {
            Ok(Some(mut ledger))
                if canonical_input(&ledger.job.input_path) == canonical_input(input)
                    && ledger.job.status != JobStatus::Completed =>
            {
                ledger.job.output_path = output.to_path_buf();
                ledger.job.status = JobStatus::Pending;
                ledger.job.touch();
                reset_for_resume(&mut ledger, workspace);
                workspace.create()?;
                return Ok(PreparedLedger {
                    ledger,
                    resumed: true,
                });
            }
            Ok(_) => {}
            Err(e) => warn!("Discarding unreadable state in {}: {e}", workspace.root().display()),
        }
        workspace.remove()?;
    }

    workspace.create()?;
    Ok(PreparedLedger {
        ledger: JobLedger::new(Job::new(input, output)),
        resumed: false,
    })
}

/// Gives every unfinished segment a fresh ladder. A segment recorded as
/// completed whose encoded file is gone is encoded again.
fn reset_for_resume(ledger: &mut JobLedger, workspace: &JobWorkspace) {
    for segment in &mut ledger.segments {
        if segment.is_completed() && non_empty_file_size(&workspace.encoded_path(segment.index)).is_none() {
            segment.status = SegmentStatus::Pending;
        }
        segment.reset_for_resume();
    }
}

/// Stage recorded for a failed job. The error's own stage wins unless it
/// is not tied to one, in which case the stage the pipeline was in is used.
fn failure_stage(current: JobStage, error: &CoreError) -> JobStage {
    match error.stage() {
        JobStage::Unknown | JobStage::State => current,
        stage => stage,
    }
}

/// Copies the final job manifest to `<work_dir>/jobs/<id>.json`.
fn archive_job(work_dir: &Path, job: &Job) -> CoreResult<PathBuf> {
    let dir = archive_dir(work_dir);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.json", job.id));
    write_atomic(&path, &serde_json::to_vec_pretty(job)?)?;
    Ok(path)
}
