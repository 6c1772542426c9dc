use serde::{Deserialize, Serialize};

use crate::env::env_flag;
use crate::error::ConfigError;

/// Parameters which control the beam search.
///
/// This can be deserialized from JSON. Missing fields take their default
/// values.
///
/// ```
/// use hwr_decode::DecoderConfig;
///
/// let config: DecoderConfig = serde_json::from_str(r#"{"beam_width": 10}"#).unwrap();
/// assert_eq!(config.beam_width, 10);
/// assert_eq!(config.top_paths, 5);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Maximum number of beams kept after each timestep. Higher values may
    /// produce more accurate results but make decoding slower.
    pub beam_width: usize,

    /// Number of hypotheses to return for each sequence.
    pub top_paths: usize,

    /// Maximum number of labels considered when extending each beam at each
    /// timestep. Only the most probable labels at that timestep are kept.
    pub candidate_cap: usize,

    /// Exponent applied to language model weights when ranking beams. Zero
    /// disables the language model.
    pub gamma: f64,

    /// Order of the language model. Each query passes up to `lm_order - 1`
    /// characters of context. Ignored if there is no language model.
    pub lm_order: usize,

    /// Whether to expand the beams within each timestep in parallel.
    ///
    /// Defaults to the value of the `HWR_PARALLEL_BEAMS` environment variable,
    /// or false if unset. This is mostly useful with large beam widths when
    /// decoding single sequences. Batches are already decoded in parallel.
    pub parallel_beams: bool,
}

impl DecoderConfig {
    /// Check that the configuration is usable. `has_lm` indicates whether a
    /// language model will be used.
    pub fn validate(&self, has_lm: bool) -> Result<(), ConfigError> {
        if self.beam_width == 0 {
            return Err(ConfigError::ZeroBeamWidth);
        }
        if self.top_paths == 0 {
            return Err(ConfigError::ZeroTopPaths);
        }
        if self.candidate_cap == 0 {
            return Err(ConfigError::ZeroCandidateCap);
        }
        if !(self.gamma.is_finite() && self.gamma >= 0.) {
            return Err(ConfigError::InvalidGamma(self.gamma));
        }
        if has_lm && self.lm_order < 1 {
            return Err(ConfigError::InvalidLmOrder(self.lm_order));
        }
        Ok(())
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            beam_width: 25,
            top_paths: 5,
            candidate_cap: 100,
            gamma: 1.,
            lm_order: 5,
            parallel_beams: env_flag("HWR_PARALLEL_BEAMS", false),
        }
    }
}

#[cfg(test)]
mod tests {
    use hwr_testing::TestCases;

    use super::DecoderConfig;
    use crate::error::ConfigError;

    #[test]
    fn test_validate() {
        #[derive(Debug)]
        struct Case {
            config: DecoderConfig,
            has_lm: bool,
            expected: Result<(), ConfigError>,
        }

        let base = DecoderConfig::default();
        let cases = [
            Case {
                config: base.clone(),
                has_lm: true,
                expected: Ok(()),
            },
            Case {
                config: DecoderConfig {
                    beam_width: 0,
                    ..base.clone()
                },
                has_lm: false,
                expected: Err(ConfigError::ZeroBeamWidth),
            },
            Case {
                config: DecoderConfig {
                    top_paths: 0,
                    ..base.clone()
                },
                has_lm: false,
                expected: Err(ConfigError::ZeroTopPaths),
            },
            Case {
                config: DecoderConfig {
                    candidate_cap: 0,
                    ..base.clone()
                },
                has_lm: false,
                expected: Err(ConfigError::ZeroCandidateCap),
            },
            Case {
                config: DecoderConfig {
                    gamma: -0.5,
                    ..base.clone()
                },
                has_lm: false,
                expected: Err(ConfigError::InvalidGamma(-0.5)),
            },
            // The order only matters when there is a language model.
            Case {
                config: DecoderConfig {
                    lm_order: 0,
                    ..base.clone()
                },
                has_lm: false,
                expected: Ok(()),
            },
            Case {
                config: DecoderConfig {
                    lm_order: 0,
                    ..base.clone()
                },
                has_lm: true,
                expected: Err(ConfigError::InvalidLmOrder(0)),
            },
        ];

        cases.test_each(|case| {
            assert_eq!(case.config.validate(case.has_lm), case.expected);
        })
    }

    #[test]
    fn test_deserialize_partial() {
        let config: DecoderConfig =
            serde_json::from_str(r#"{"candidate_cap": 7, "gamma": 0.5}"#).unwrap();
        assert_eq!(config.candidate_cap, 7);
        assert_eq!(config.gamma, 0.5);
        assert_eq!(config.beam_width, 25);
        assert_eq!(config.lm_order, 5);
    }
}
