// splicer-core/tests/common/mod.rs
//
// Scripted stand-ins for ffmpeg, ffprobe, the frame sampler and ab-av1.
// They write plausible output files so the pipeline's own file checks run
// for real, and they record what they were asked to do.

#![allow(dead_code)]

use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use splicer_core::encoding::{EncodeRequest, QualityEncoder};
use splicer_core::error::{CoreError, CoreResult};
use splicer_core::external::{
    AudioStreamInfo, FfmpegProcess, FfmpegSpawner, FrameSampler, FrameTags, MediaInfo,
    MediaProber, ProcessControl,
};
use splicer_core::processing::VideoProperties;
use std::collections::HashMap;
use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Bytes written for every fake media file; above the segment minimum.
pub const FAKE_MEDIA_BYTES: usize = 2048;

// ---- ffmpeg ----

pub struct ScriptedProcess {
    exit_status: ExitStatus,
}

impl FfmpegProcess for ScriptedProcess {
    fn handle_events<F>(&mut self, _handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>,
    {
        Ok(())
    }

    fn wait(&mut self) -> CoreResult<ExitStatus> {
        Ok(self.exit_status)
    }
}

/// Creates the files a real ffmpeg run would create.
///
/// A segment-muxer run produces `segment_count` pieces; every other run
/// writes its last argument.
#[derive(Default)]
pub struct ScriptedSpawner {
    pub segment_count: usize,
    /// Any call with an argument containing this fails with exit code 1.
    pub fail_on: Option<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedSpawner {
    pub fn new(segment_count: usize) -> Self {
        Self {
            segment_count,
            ..Default::default()
        }
    }

    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.fail_on = Some(pattern.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_containing(&self, pattern: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|args| args.iter().any(|a| a.contains(pattern)))
            .collect()
    }
}

impl FfmpegSpawner for ScriptedSpawner {
    type Process = ScriptedProcess;

    fn spawn(&self, cmd: FfmpegCommand) -> CoreResult<Self::Process> {
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        self.calls.lock().unwrap().push(args.clone());

        if let Some(pattern) = &self.fail_on {
            if args.iter().any(|a| a.contains(pattern.as_str())) {
                return Ok(ScriptedProcess {
                    exit_status: ExitStatus::from_raw(1 << 8),
                });
            }
        }

        let output = PathBuf::from(args.last().expect("ffmpeg call without output"));
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        if args.iter().any(|a| a == "segment") {
            let pattern = output.to_string_lossy().into_owned();
            for index in 0..self.segment_count {
                let path = pattern.replace("%04d", &format!("{index:04}"));
                fs::write(path, vec![0u8; FAKE_MEDIA_BYTES])?;
            }
        } else {
            fs::write(&output, vec![0u8; FAKE_MEDIA_BYTES])?;
        }

        Ok(ScriptedProcess {
            exit_status: ExitStatus::from_raw(0),
        })
    }
}

// ---- ffprobe ----

pub fn media_info(duration_secs: f64, video_codec: &str, audio_codecs: &[&str], subtitles: usize) -> MediaInfo {
    MediaInfo {
        duration_secs,
        format_name: "matroska,webm".to_string(),
        size_bytes: None,
        video: VideoProperties {
            width: 1920,
            height: 1080,
            codec_name: video_codec.to_string(),
            color_transfer: Some("bt709".to_string()),
            color_primaries: Some("bt709".to_string()),
            color_space: Some("bt709".to_string()),
            frame_rate: Some(24.0),
            dolby_vision: false,
        },
        audio_streams: audio_codecs
            .iter()
            .enumerate()
            .map(|(i, codec)| AudioStreamInfo {
                index: i + 1,
                codec_name: codec.to_string(),
                channels: 2,
            })
            .collect(),
        subtitle_count: subtitles,
        attachment_count: 0,
        chapter_count: 0,
    }
}

type ProbeFn = dyn Fn(&Path) -> CoreResult<MediaInfo> + Send + Sync;

/// Answers probes from a closure over the probed path.
pub struct ScriptedProber {
    answer: Box<ProbeFn>,
    probed: Mutex<Vec<PathBuf>>,
}

impl ScriptedProber {
    pub fn new<F>(answer: F) -> Self
    where
        F: Fn(&Path) -> CoreResult<MediaInfo> + Send + Sync + 'static,
    {
        Self {
            answer: Box::new(answer),
            probed: Mutex::new(Vec::new()),
        }
    }

    pub fn probed(&self) -> Vec<PathBuf> {
        self.probed.lock().unwrap().clone()
    }
}

impl MediaProber for ScriptedProber {
    fn probe(&self, path: &Path) -> CoreResult<MediaInfo> {
        self.probed.lock().unwrap().push(path.to_path_buf());
        (self.answer)(path)
    }
}

/// Prober for a whole chunked job over a `total_secs` source split into
/// `segment_secs` pieces, muxed into `output`.
pub fn job_prober(total_secs: f64, segment_secs: f64, output: PathBuf) -> ScriptedProber {
    ScriptedProber::new(move |path| {
        let in_dir = |name: &str| {
            path.parent()
                .and_then(|p| p.file_name())
                .is_some_and(|n| n == name)
        };
        if path == output {
            Ok(media_info(total_secs, "av1", &["opus"], 1))
        } else if in_dir("segments") {
            let index: usize = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let remaining = total_secs - index as f64 * segment_secs;
            Ok(media_info(remaining.min(segment_secs), "h264", &[], 0))
        } else if path.file_name().is_some_and(|n| n == "video.mkv") {
            Ok(media_info(total_secs, "av1", &[], 0))
        } else {
            Ok(media_info(total_secs, "h264", &["ac3"], 1))
        }
    })
}

// ---- frame sampler ----

/// Returns the same frames for every crop-detection pass and nothing for
/// black-level passes unless configured.
#[derive(Default)]
pub struct ScriptedSampler {
    pub crop_frames: Vec<FrameTags>,
    pub black_level_frames: Vec<FrameTags>,
    pub fail: bool,
    pub filters: Mutex<Vec<String>>,
}

impl ScriptedSampler {
    pub fn with_crop_frames(frames: Vec<FrameTags>) -> Self {
        Self {
            crop_frames: frames,
            ..Default::default()
        }
    }

    pub fn filters(&self) -> Vec<String> {
        self.filters.lock().unwrap().clone()
    }
}

impl FrameSampler for ScriptedSampler {
    fn sample_frames(&self, _input: &Path, filter_chain: &str, _max_frames: Option<u32>) -> CoreResult<Vec<FrameTags>> {
        self.filters.lock().unwrap().push(filter_chain.to_string());
        if self.fail {
            return Err(CoreError::FfprobeParse("scripted sampler failure".to_string()));
        }
        if filter_chain.contains("cropdetect") {
            Ok(self.crop_frames.clone())
        } else {
            Ok(self.black_level_frames.clone())
        }
    }
}

/// Cropdetect tags for `count` frames showing `width`x`height` content.
pub fn cropdetect_frames(width: u32, height: u32, count: usize) -> Vec<FrameTags> {
    (0..count)
        .map(|_| {
            let y = (1080 - height) / 2;
            HashMap::from([
                ("lavfi.cropdetect.w".to_string(), width.to_string()),
                ("lavfi.cropdetect.h".to_string(), height.to_string()),
                ("lavfi.cropdetect.x".to_string(), "0".to_string()),
                ("lavfi.cropdetect.y".to_string(), y.to_string()),
            ])
        })
        .collect()
}

// ---- ab-av1 ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    Fail,
    /// Blocks until the attempt is cancelled.
    WaitForCancel,
    /// Leaves a partial attempt file and reports the attempt timeout.
    Timeout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeCall {
    pub segment: Option<usize>,
    pub min_vmaf: f32,
    pub sample_count: u32,
    pub sample_duration_secs: u32,
}

/// Encoder whose result is scripted per segment and attempt number.
/// Unscripted attempts succeed.
#[derive(Default)]
pub struct ScriptedEncoder {
    script: HashMap<(usize, usize), Outcome>,
    calls: Mutex<Vec<EncodeCall>>,
}

impl ScriptedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `attempt` is 1-based.
    pub fn on(mut self, segment: usize, attempt: usize, outcome: Outcome) -> Self {
        self.script.insert((segment, attempt), outcome);
        self
    }

    pub fn failing(mut self, segment: usize, attempts: usize) -> Self {
        for attempt in 1..=attempts {
            self.script.insert((segment, attempt), Outcome::Fail);
        }
        self
    }

    pub fn calls(&self) -> Vec<EncodeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, segment: usize) -> Vec<EncodeCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.segment == Some(segment))
            .collect()
    }
}

fn segment_of(request: &EncodeRequest) -> Option<usize> {
    request.input.file_stem()?.to_str()?.parse().ok()
}

impl QualityEncoder for ScriptedEncoder {
    fn encode(&self, request: &EncodeRequest, control: &ProcessControl) -> CoreResult<()> {
        let segment = segment_of(request);
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(EncodeCall {
                segment,
                min_vmaf: request.min_vmaf,
                sample_count: request.sample_count,
                sample_duration_secs: request.sample_duration_secs,
            });
            calls.iter().filter(|c| c.segment == segment).count()
        };

        let outcome = segment
            .and_then(|s| self.script.get(&(s, attempt)).copied())
            .unwrap_or(Outcome::Succeed);
        match outcome {
            Outcome::Succeed => {
                fs::write(&request.output, vec![1u8; FAKE_MEDIA_BYTES])?;
                Ok(())
            }
            Outcome::Fail => Err(CoreError::CommandFailed(
                "ab-av1".to_string(),
                ExitStatus::from_raw(1 << 8),
                "Failed to find a suitable crf".to_string(),
            )),
            Outcome::Timeout => {
                fs::write(&request.output, b"partial")?;
                Err(CoreError::Timeout {
                    command: "ab-av1".to_string(),
                    after: control.timeout.unwrap_or(Duration::from_secs(7200)),
                })
            }
            Outcome::WaitForCancel => {
                for _ in 0..500 {
                    if control.cancel.is_cancelled() {
                        return Err(CoreError::Cancelled("ab-av1".to_string()));
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                panic!("attempt for segment {segment:?} was never cancelled");
            }
        }
    }
}
