//! The retry ladder for segment encodes.
//!
//! Each rung is plain data; the scheduler walks the rungs in order with a
//! single loop and stops at the first one whose encode succeeds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;

/// How far the `lower_vmaf` rung drops the quality floor.
pub const LOWER_VMAF_DELTA: f32 = 2.0;

/// Sample count used once the first rung has failed.
pub const ESCALATED_SAMPLE_COUNT: u32 = 6;

/// Sample duration (seconds) used once the first rung has failed.
pub const ESCALATED_SAMPLE_DURATION_SECS: u32 = 2;

/// Name of a rung, persisted in segment status and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Default,
    MoreSamples,
    LowerVmaf,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Default => "default",
            StrategyKind::MoreSamples => "more_samples",
            StrategyKind::LowerVmaf => "lower_vmaf",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rung of the ladder. `None` sample settings mean "use the configured value".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryStrategy {
    pub kind: StrategyKind,
    pub sample_count: Option<u32>,
    pub sample_duration_secs: Option<u32>,
    /// Amount subtracted from the configured VMAF floor.
    pub vmaf_delta: f32,
}

/// Concrete sampling parameters for one attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSettings {
    pub sample_count: u32,
    pub sample_duration_secs: u32,
    pub min_vmaf: f32,
}

impl RetryStrategy {
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Resolves this rung against the job configuration.
    pub fn resolve(&self, config: &CoreConfig) -> SampleSettings {
        SampleSettings {
            sample_count: self.sample_count.unwrap_or(config.sample_count),
            sample_duration_secs: self
                .sample_duration_secs
                .unwrap_or(config.sample_duration_secs),
            min_vmaf: config.target_vmaf - self.vmaf_delta,
        }
    }
}

/// Ordered, immutable list of strategies tried for every segment.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryLadder {
    rungs: Vec<RetryStrategy>,
}

impl RetryLadder {
    /// `default` -> `more_samples` -> `lower_vmaf`.
    pub fn standard() -> Self {
        Self {
            rungs: vec![
                RetryStrategy {
                    kind: StrategyKind::Default,
                    sample_count: None,
                    sample_duration_secs: None,
                    vmaf_delta: 0.0,
                },
                RetryStrategy {
                    kind: StrategyKind::MoreSamples,
                    sample_count: Some(ESCALATED_SAMPLE_COUNT),
                    sample_duration_secs: Some(ESCALATED_SAMPLE_DURATION_SECS),
                    vmaf_delta: 0.0,
                },
                RetryStrategy {
                    kind: StrategyKind::LowerVmaf,
                    sample_count: Some(ESCALATED_SAMPLE_COUNT),
                    sample_duration_secs: Some(ESCALATED_SAMPLE_DURATION_SECS),
                    vmaf_delta: LOWER_VMAF_DELTA,
                },
            ],
        }
    }

    /// Attempts a segment gets before it is failed.
    pub fn rung_count(&self) -> usize {
        self.rungs.len()
    }

    /// Rung used for the attempt after `attempts_made` earlier attempts.
    /// `None` once the ladder is exhausted.
    pub fn rung(&self, attempts_made: usize) -> Option<&RetryStrategy> {
        self.rungs.get(attempts_made)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetryStrategy> {
        self.rungs.iter()
    }
}

impl Default for RetryLadder {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_ladder_order() {
        let ladder = RetryLadder::standard();
        let names: Vec<&str> = ladder.iter().map(RetryStrategy::name).collect();
        assert_eq!(names, ["default", "more_samples", "lower_vmaf"]);
        assert_eq!(ladder.rung_count(), 3);
        assert!(ladder.rung(3).is_none());
    }

    #[test]
    fn test_rungs_resolve_against_config() {
        let config = CoreConfig::default();
        let ladder = RetryLadder::standard();

        let first = ladder.rung(0).unwrap().resolve(&config);
        assert_eq!(first.sample_count, config.sample_count);
        assert_eq!(first.sample_duration_secs, config.sample_duration_secs);
        assert_eq!(first.min_vmaf, config.target_vmaf);

        let second = ladder.rung(1).unwrap().resolve(&config);
        assert_eq!((second.sample_count, second.sample_duration_secs), (6, 2));
        assert_eq!(second.min_vmaf, config.target_vmaf);

        let third = ladder.rung(2).unwrap().resolve(&config);
        assert_eq!((third.sample_count, third.sample_duration_secs), (6, 2));
        assert_eq!(third.min_vmaf, config.target_vmaf - 2.0);
    }

    #[test]
    fn test_strategy_kind_serializes_snake_case() {
        let json = serde_json::to_string(&StrategyKind::MoreSamples).unwrap();
        assert_eq!(json, "\"more_samples\"");
    }
}
