//! Quality-targeted video encoding through ab-av1.
//!
//! ab-av1 performs its own CRF search against a VMAF floor; from our side an
//! encode is a single process that either produces the output file or fails.
//! [`QualityEncoder`] is the seam the scheduler and the single-pass path
//! call through.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

use crate::config::CoreConfig;
use crate::encoding::ladder::SampleSettings;
use crate::error::CoreResult;
use crate::external::{ProcessControl, run_controlled};
use crate::processing::AnalysisResult;

/// Everything one encode attempt needs.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub encoder: String,
    pub min_vmaf: f32,
    pub preset: u8,
    pub svt_params: String,
    pub keyint: String,
    pub vmaf_options: String,
    pub pixel_format: String,
    pub crop_filter: Option<String>,
    pub sample_count: u32,
    pub sample_duration_secs: u32,
    pub dolby_vision: bool,
}

impl EncodeRequest {
    /// Builds a request from the job configuration, the source analysis and
    /// the sampling settings of the current rung.
    pub fn new(
        config: &CoreConfig,
        analysis: &AnalysisResult,
        input: &Path,
        output: &Path,
        samples: SampleSettings,
    ) -> Self {
        Self {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            encoder: "libsvtav1".to_string(),
            min_vmaf: samples.min_vmaf,
            preset: config.preset,
            svt_params: config.svt_params.clone(),
            keyint: config.keyint.clone(),
            vmaf_options: config.vmaf_options.clone(),
            pixel_format: config.pixel_format.clone(),
            crop_filter: analysis.crop_filter(),
            sample_count: samples.sample_count,
            sample_duration_secs: samples.sample_duration_secs,
            dolby_vision: analysis.is_dolby_vision(),
        }
    }
}

/// An external encoder that searches for the smallest output meeting a
/// quality floor.
pub trait QualityEncoder: Send + Sync {
    fn encode(&self, request: &EncodeRequest, control: &ProcessControl) -> CoreResult<()>;
}

/// Ab-AV1 encoder
#[derive(Debug, Clone)]
pub struct AbAv1Encoder {
    binary: PathBuf,
}

impl Default for AbAv1Encoder {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ab-av1"),
        }
    }
}

impl AbAv1Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Build an ab-av1 encode command for a request
    pub fn build_command(&self, request: &EncodeRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("auto-encode")
            .arg("--input").arg(&request.input)
            .arg("--output").arg(&request.output)
            .arg("--encoder").arg(&request.encoder)
            .arg("--min-vmaf").arg(request.min_vmaf.to_string())
            .arg("--preset").arg(request.preset.to_string())
            .arg("--svt").arg(&request.svt_params)
            .arg("--keyint").arg(&request.keyint)
            .arg("--samples").arg(request.sample_count.to_string())
            .arg("--sample-duration").arg(format!("{}s", request.sample_duration_secs))
            .arg("--vmaf").arg(&request.vmaf_options)
            .arg("--pix-format").arg(&request.pixel_format);

        if let Some(filter) = &request.crop_filter {
            cmd.arg("--vfilter").arg(filter);
        }

        if request.dolby_vision {
            cmd.arg("--enc").arg("dolbyvision=true");
        }

        cmd
    }
}

impl QualityEncoder for AbAv1Encoder {
    fn encode(&self, request: &EncodeRequest, control: &ProcessControl) -> CoreResult<()> {
        info!(
            "Encoding {} (min VMAF {}, {} x {}s samples)",
            request.input.display(),
            request.min_vmaf,
            request.sample_count,
            request.sample_duration_secs
        );
        let mut cmd = self.build_command(request);
        run_controlled(&mut cmd, control)?;
        debug!("Encoded {}", request.output.display());
        Ok(())
    }
}
