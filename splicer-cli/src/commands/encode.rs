//! Implementation of the 'encode' subcommand.
//!
//! Checks the input and the external tools, builds a [`CoreConfig`] from the
//! arguments and runs one job through the splicer-core pipeline.

use crate::cli::EncodeArgs;

use anyhow::{Context, Result, bail};
use log::info;
use splicer_core::encoding::AbAv1Encoder;
use splicer_core::external::{FfprobeCli, FfprobeFrameSampler, SidecarSpawner};
use splicer_core::{
    CoreConfig, CoreConfigBuilder, JobReport, Pipeline, calculate_size_reduction,
    check_required_tools, format_bytes, format_duration,
};

/// Creates and validates a CoreConfig from CLI arguments.
pub fn create_core_config(args: &EncodeArgs) -> Result<CoreConfig> {
    let mut builder = CoreConfigBuilder::new()
        .disable_crop(args.disable_crop)
        .keep_workspace(args.keep_workspace);

    if let Some(dir) = &args.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(vmaf) = args.target_vmaf {
        builder = builder.target_vmaf(vmaf);
    }
    if let Some(preset) = args.preset {
        builder = builder.preset(preset);
    }
    if let Some(secs) = args.segment_length {
        builder = builder.segment_length_secs(secs);
    }
    if let Some(count) = args.sample_count {
        builder = builder.sample_count(count);
    }
    if let Some(secs) = args.sample_duration {
        builder = builder.sample_duration_secs(secs);
    }
    if let Some(jobs) = args.jobs {
        builder = builder.max_workers(jobs);
    }
    if let Some(secs) = args.encode_timeout {
        builder = builder.encode_timeout_secs(Some(secs));
    }

    let config = builder.build();
    config.validate()?;
    Ok(config)
}

/// Main entry point for the encode command.
pub fn run_encode(args: EncodeArgs) -> Result<JobReport> {
    if !args.input_path.is_file() {
        bail!("Invalid input path '{}': not a file", args.input_path.display());
    }

    let config = create_core_config(&args)?;
    check_required_tools().context("Missing external tools")?;

    info!("Input: {}", args.input_path.display());
    info!("Output: {}", args.output_path.display());
    info!(
        "Target VMAF {}, preset {}, {}s segments, {} worker(s)",
        config.target_vmaf,
        config.preset,
        config.segment_length_secs,
        config.workers()
    );

    let spawner = SidecarSpawner;
    let prober = FfprobeCli::new();
    let sampler = FfprobeFrameSampler::new();
    let encoder = AbAv1Encoder::new();
    let report = Pipeline::new(&config, &spawner, &prober, &sampler, &encoder)
        .run_job(&args.input_path, &args.output_path)
        .with_context(|| format!("Encoding {} failed", args.input_path.display()))?;

    print_summary(&report);
    Ok(report)
}

fn print_summary(report: &JobReport) {
    info!("Job {} finished ({})", report.job_id, report.strategy);
    if report.segment_count > 0 {
        info!(
            "  Segments:    {} ({} resumed)",
            report.segment_count, report.resumed_segments
        );
    }
    info!("  Encode time: {}", format_duration(report.elapsed.as_secs_f64()));
    info!("  Input size:  {}", format_bytes(report.input_size));
    info!("  Output size: {}", format_bytes(report.output_size));
    info!(
        "  Reduced by:  {}%",
        calculate_size_reduction(report.input_size, report.output_size)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn encode_args(extra: &[&str]) -> EncodeArgs {
        let mut argv = vec!["splicer", "encode", "-i", "in.mkv", "-o", "out.mkv"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Encode(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_defaults_come_from_core() {
        let config = create_core_config(&encode_args(&[])).unwrap();
        let defaults = CoreConfig::default();
        assert_eq!(config.target_vmaf, defaults.target_vmaf);
        assert_eq!(config.segment_length_secs, defaults.segment_length_secs);
        assert_eq!(config.max_workers, None);
    }

    #[test]
    fn test_overrides_reach_config() {
        let config = create_core_config(&encode_args(&[
            "--target-vmaf",
            "95",
            "--jobs",
            "2",
            "--encode-timeout",
            "90",
            "--work-dir",
            "/tmp/splicer",
        ]))
        .unwrap();
        assert_eq!(config.target_vmaf, 95.0);
        assert_eq!(config.max_workers, Some(2));
        assert_eq!(config.encode_timeout_secs, Some(90));
        assert_eq!(config.work_dir, std::path::PathBuf::from("/tmp/splicer"));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        assert!(create_core_config(&encode_args(&["--target-vmaf", "0"])).is_err());
        assert!(create_core_config(&encode_args(&["--segment-length", "0"])).is_err());
        assert!(create_core_config(&encode_args(&["--jobs", "0"])).is_err());
    }
}
