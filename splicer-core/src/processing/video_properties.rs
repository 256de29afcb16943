//! Video stream properties extracted by the prober.

use serde::{Deserialize, Serialize};

/// Transfer characteristics that mark a stream as HDR.
const HDR_TRANSFERS: &[&str] = &["smpte2084", "arib-std-b67", "bt2020-10", "bt2020-12"];
const HDR_PRIMARIES: &[&str] = &["bt2020"];
const HDR_SPACES: &[&str] = &["bt2020nc", "bt2020c"];

/// Properties of the primary video stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub codec_name: String,
    pub color_transfer: Option<String>,
    pub color_primaries: Option<String>,
    pub color_space: Option<String>,
    pub frame_rate: Option<f64>,
    /// Dolby Vision configuration record or DV codec tag present.
    pub dolby_vision: bool,
}

impl VideoProperties {
    /// True if any colour property falls in the HDR set.
    pub fn is_hdr(&self) -> bool {
        let matches = |value: &Option<String>, set: &[&str]| {
            value
                .as_deref()
                .is_some_and(|v| set.iter().any(|s| v.eq_ignore_ascii_case(s)))
        };
        matches(&self.color_transfer, HDR_TRANSFERS)
            || matches(&self.color_primaries, HDR_PRIMARIES)
            || matches(&self.color_space, HDR_SPACES)
    }
}
