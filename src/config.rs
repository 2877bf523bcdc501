use crate::error::HmmError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_N_STATES: usize = 10;
pub const DEFAULT_N_MIXTURE_COMPONENTS: usize = 1;
pub const DEFAULT_COVARIANCE_OFFSET: f64 = 0.01;
pub const DEFAULT_ESTIMATE_MEANS: bool = true;
/// Exit mass placed on the last state of a hierarchical model by default.
pub const DEFAULT_EXIT_PROBABILITY_LAST_STATE: f64 = 0.1;
pub const DEFAULT_LIKELIHOOD_WINDOW: usize = 1;

/// State-transition topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionMode {
    Ergodic,
    #[default]
    LeftRight,
}

impl TransitionMode {
    /// Integer code used in model documents.
    pub fn code(self) -> u8 {
        match self {
            TransitionMode::Ergodic => 0,
            TransitionMode::LeftRight => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TransitionMode::Ergodic),
            1 => Some(TransitionMode::LeftRight),
            _ => None,
        }
    }
}

impl fmt::Display for TransitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionMode::Ergodic => write!(f, "ergodic"),
            TransitionMode::LeftRight => write!(f, "left-right"),
        }
    }
}

impl FromStr for TransitionMode {
    type Err = HmmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ergodic" => Ok(TransitionMode::Ergodic),
            "left-right" => Ok(TransitionMode::LeftRight),
            other => Err(HmmError::InvalidTransitionMode(other.to_string())),
        }
    }
}

/// When to stop iterating Baum-Welch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StopCriterion {
    pub min_steps: usize,
    /// 0 means no upper bound.
    pub max_steps: usize,
    /// Relative log-likelihood change (in percent) under which training stops.
    pub percent_chg: f64,
}

impl Default for StopCriterion {
    fn default() -> Self {
        Self {
            min_steps: 10,
            max_steps: 0,
            percent_chg: 0.01,
        }
    }
}

impl StopCriterion {
    /// Returns true once `step` iterations have run and the criterion is met.
    pub fn should_stop(&self, step: usize, log_likelihood: f64, previous: f64) -> bool {
        if self.max_steps > 0 && step >= self.max_steps {
            return true;
        }
        if step < self.min_steps.max(1) {
            return false;
        }
        if !previous.is_finite() {
            return false;
        }
        let change = if log_likelihood == 0.0 {
            (log_likelihood - previous).abs()
        } else {
            100.0 * ((log_likelihood - previous) / log_likelihood).abs()
        };
        change <= self.percent_chg
    }
}

/// Structural configuration of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HmmConfig {
    pub n_states: usize,
    pub n_mixture_components: usize,
    pub covariance_offset: f64,
    pub transition_mode: TransitionMode,
    pub estimate_means: bool,
    pub hierarchical: bool,
    /// Total observation width.
    pub dimension: usize,
    /// Width of the input segment; `None` for a unimodal model.
    pub dimension_input: Option<usize>,
    /// Number of frames averaged into the smoothed playback log-likelihood.
    pub likelihood_window: usize,
    pub stop_criterion: StopCriterion,
}

impl Default for HmmConfig {
    fn default() -> Self {
        Self {
            n_states: DEFAULT_N_STATES,
            n_mixture_components: DEFAULT_N_MIXTURE_COMPONENTS,
            covariance_offset: DEFAULT_COVARIANCE_OFFSET,
            transition_mode: TransitionMode::default(),
            estimate_means: DEFAULT_ESTIMATE_MEANS,
            hierarchical: false,
            dimension: 1,
            dimension_input: None,
            likelihood_window: DEFAULT_LIKELIHOOD_WINDOW,
            stop_criterion: StopCriterion::default(),
        }
    }
}

impl HmmConfig {
    pub fn new(n_states: usize, n_mixture_components: usize, dimension: usize) -> Self {
        Self {
            n_states,
            n_mixture_components,
            dimension,
            ..Self::default()
        }
    }

    /// Parses a configuration document; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, HmmError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_bimodal(&self) -> bool {
        self.dimension_input.is_some()
    }

    /// Width of the output segment (0 when unimodal).
    pub fn dimension_output(&self) -> usize {
        self.dimension_input
            .map_or(0, |input| self.dimension - input)
    }

    pub fn validate(&self) -> Result<(), HmmError> {
        if self.n_states == 0 {
            return Err(HmmError::InvalidStateCount(self.n_states));
        }
        if self.n_mixture_components == 0 {
            return Err(HmmError::InvalidMixtureCount(self.n_mixture_components));
        }
        if self.dimension == 0 {
            return Err(HmmError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if let Some(input) = self.dimension_input {
            if input == 0 || input >= self.dimension {
                return Err(HmmError::InvalidInputDimension {
                    input,
                    total: self.dimension,
                });
            }
        }
        if !self.covariance_offset.is_finite() || self.covariance_offset < 0.0 {
            return Err(HmmError::InvalidCovarianceOffset(self.covariance_offset));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_mode_parsing() {
        assert_eq!(
            "ergodic".parse::<TransitionMode>().unwrap(),
            TransitionMode::Ergodic
        );
        assert_eq!(
            "left-right".parse::<TransitionMode>().unwrap(),
            TransitionMode::LeftRight
        );
        assert!(matches!(
            "circular".parse::<TransitionMode>(),
            Err(HmmError::InvalidTransitionMode(_))
        ));
        assert_eq!(TransitionMode::LeftRight.to_string(), "left-right");
        assert_eq!(TransitionMode::from_code(0), Some(TransitionMode::Ergodic));
        assert_eq!(TransitionMode::from_code(7), None);
    }

    #[test]
    fn test_validate_rejects_bad_dimensions() {
        let mut config = HmmConfig::new(3, 1, 2);
        config.dimension_input = Some(2);
        assert!(matches!(
            config.validate(),
            Err(HmmError::InvalidInputDimension { input: 2, total: 2 })
        ));

        let config = HmmConfig::new(0, 1, 2);
        assert!(matches!(
            config.validate(),
            Err(HmmError::InvalidStateCount(0))
        ));

        let config = HmmConfig::new(2, 0, 2);
        assert!(matches!(
            config.validate(),
            Err(HmmError::InvalidMixtureCount(0))
        ));
    }

    #[test]
    fn test_config_from_json_uses_defaults() {
        let config = HmmConfig::from_json_str(
            r#"{"nStates": 4, "transitionMode": "ergodic", "dimension": 3, "dimensionInput": 1, "stopCriterion": {"maxSteps": 7}}"#,
        )
        .unwrap();
        assert_eq!(config.n_states, 4);
        assert_eq!(config.transition_mode, TransitionMode::Ergodic);
        assert_eq!(config.n_mixture_components, DEFAULT_N_MIXTURE_COMPONENTS);
        assert_eq!(config.dimension_output(), 2);
        assert!(config.is_bimodal());
        assert_eq!(config.stop_criterion.max_steps, 7);
        assert_eq!(config.stop_criterion.min_steps, StopCriterion::default().min_steps);

        // field names follow the model document
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["covarianceOffset"], DEFAULT_COVARIANCE_OFFSET);
        assert!(value.get("n_states").is_none());
    }

    #[test]
    fn test_stop_criterion() {
        let stop = StopCriterion {
            min_steps: 2,
            max_steps: 5,
            percent_chg: 1.0,
        };
        assert!(!stop.should_stop(1, -100.0, -100.0));
        assert!(stop.should_stop(2, -100.0, -100.5));
        assert!(!stop.should_stop(2, -100.0, -150.0));
        assert!(stop.should_stop(5, -100.0, -150.0));
    }
}
