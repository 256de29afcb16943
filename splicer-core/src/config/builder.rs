// ============================================================================
// splicer-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for CoreConfig
//
// Fluent API for creating CoreConfig instances. Every setter is optional;
// unset fields keep the DEFAULT_* values from the parent module.

// ---- Standard library imports ----
use std::path::PathBuf;

// ---- Internal crate imports ----
use super::CoreConfig;

/// Builder for creating CoreConfig instances.
#[derive(Debug, Clone, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = work_dir.into();
        self
    }

    pub fn target_vmaf(mut self, target_vmaf: f32) -> Self {
        self.config.target_vmaf = target_vmaf;
        self
    }

    pub fn preset(mut self, preset: u8) -> Self {
        self.config.preset = preset;
        self
    }

    pub fn svt_params(mut self, params: impl Into<String>) -> Self {
        self.config.svt_params = params.into();
        self
    }

    pub fn vmaf_options(mut self, options: impl Into<String>) -> Self {
        self.config.vmaf_options = options.into();
        self
    }

    pub fn sample_count(mut self, count: u32) -> Self {
        self.config.sample_count = count;
        self
    }

    pub fn sample_duration_secs(mut self, secs: u32) -> Self {
        self.config.sample_duration_secs = secs;
        self
    }

    pub fn segment_length_secs(mut self, secs: f64) -> Self {
        self.config.segment_length_secs = secs;
        self
    }

    pub fn disable_crop(mut self, disable: bool) -> Self {
        self.config.disable_crop = disable;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = Some(workers);
        self
    }

    /// Sets the per-attempt timeout. `None` lets attempts run unbounded.
    pub fn encode_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.encode_timeout_secs = secs;
        self
    }

    pub fn keep_workspace(mut self, keep: bool) -> Self {
        self.config.keep_workspace = keep;
        self
    }

    pub fn build(self) -> CoreConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = CoreConfigBuilder::new()
            .work_dir("/tmp/jobs")
            .target_vmaf(95.5)
            .preset(4)
            .segment_length_secs(10.0)
            .max_workers(2)
            .encode_timeout_secs(None)
            .disable_crop(true)
            .build();

        assert_eq!(config.work_dir, PathBuf::from("/tmp/jobs"));
        assert_eq!(config.target_vmaf, 95.5);
        assert_eq!(config.preset, 4);
        assert_eq!(config.segment_length_secs, 10.0);
        assert_eq!(config.workers(), 2);
        assert_eq!(config.encode_timeout(), None);
        assert!(config.disable_crop);
        assert_eq!(config.sample_count, super::super::DEFAULT_SAMPLE_COUNT);
    }
}
