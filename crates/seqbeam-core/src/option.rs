use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::error::{BeamError, Result};

#[derive(Debug, Derivative, Clone, Serialize, Deserialize, PartialEq)]
#[derivative(Default)]
#[serde(default)]
pub struct BeamOption {
    /// Number of hypotheses kept after each expansion step.
    #[derivative(Default(value = "3"))]
    #[serde(alias = "beam_size")]
    pub width: usize,
    /// Upper bound on hypothesis length, counting the start token.
    #[derivative(Default(value = "32"))]
    pub max_length: usize,
    /// Stop once this many hypotheses are completed. Must not be smaller than `width`.
    pub max_completed: Option<usize>,
    /// How completed hypotheses are normalized before being compared.
    pub length_penalty: LengthPenalty,
    /// Score the hypotheses of a step on the rayon thread pool.
    pub parallel: bool,
}

impl BeamOption {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 {
            return Err(BeamError::ZeroWidth);
        }
        if self.max_length == 0 {
            return Err(BeamError::ZeroMaxLength);
        }
        match self.max_completed {
            Some(max_completed) if max_completed < self.width => {
                Err(BeamError::MaxCompletedBelowWidth {
                    max_completed,
                    width: self.width,
                })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum LengthPenalty {
    /// Mean log-probability per token.
    #[default]
    Mean,
    /// Raw cumulative log-probability.
    None,
    /// GNMT penalty: `score / ((5 + len) / 6) ^ alpha`.
    Wu { alpha: f32 },
}

impl LengthPenalty {
    pub fn apply(&self, score: f32, len: usize) -> f32 {
        let len = len.max(1) as f32;
        match *self {
            LengthPenalty::Mean => score / len,
            LengthPenalty::None => score,
            LengthPenalty::Wu { alpha } => score / ((5.0 + len) / 6.0).powf(alpha),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(BeamOption::default().validate().is_ok());
    }

    #[test]
    fn rejects_small_completion_cap() {
        let option = BeamOption {
            width: 4,
            max_completed: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            option.validate(),
            Err(BeamError::MaxCompletedBelowWidth {
                max_completed: 2,
                width: 4
            })
        ));
    }

    #[test]
    fn rejects_zero_bounds() {
        let option = BeamOption {
            width: 0,
            ..Default::default()
        };
        assert!(matches!(option.validate(), Err(BeamError::ZeroWidth)));
        let option = BeamOption {
            max_length: 0,
            ..Default::default()
        };
        assert!(matches!(option.validate(), Err(BeamError::ZeroMaxLength)));
    }

    #[test]
    fn penalties() {
        assert_relative_eq!(LengthPenalty::Mean.apply(-3.0, 3), -1.0);
        assert_relative_eq!(LengthPenalty::None.apply(-3.0, 3), -3.0);
        assert_relative_eq!(LengthPenalty::Wu { alpha: 1.0 }.apply(-3.0, 1), -3.0);
    }

    #[test]
    fn parse_from_toml() {
        let option: BeamOption = toml::from_str(
            r#"
            beam_size = 5
            max_length = 12
            max_completed = 8
            length_penalty = { Wu = { alpha = 0.6 } }
            "#,
        )
        .unwrap();
        assert_eq!(option.width, 5);
        assert_eq!(option.max_length, 12);
        assert_eq!(option.max_completed, Some(8));
        assert_eq!(option.length_penalty, LengthPenalty::Wu { alpha: 0.6 });
        assert!(!option.parallel);
    }
}
