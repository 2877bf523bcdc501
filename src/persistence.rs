//! JSON model documents.
//!
//! A document holds everything needed to resume decoding without
//! retraining. Emission models are nested as their own serde documents and
//! their derived caches are rebuilt on load.

use crate::baum_welch::BaumWelch;
use crate::config::{HmmConfig, StopCriterion, TransitionMode, DEFAULT_LIKELIHOOD_WINDOW};
use crate::emission::EmissionModel;
use crate::error::HmmError;
use crate::model::{check_emission, decoder_for, Hmm};
use crate::transition::TransitionModel;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HmmDocument<E> {
    pub is_hierarchical: bool,
    pub estimate_means: bool,
    pub dimension: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_input: Option<usize>,
    pub nb_states: usize,
    pub nb_mixture_components: usize,
    pub covariance_offset: f64,
    /// 0 = ergodic, 1 = left-right.
    pub transition_mode: u8,
    pub prior: Vec<f64>,
    /// Row-major `nbStates × nbStates`.
    pub transition: Vec<f64>,
    /// Present exactly when `isHierarchical`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_probabilities: Option<Vec<f64>>,
    pub states: Vec<E>,
    #[serde(default)]
    pub stop_criterion: StopCriterion,
    #[serde(default = "default_likelihood_window")]
    pub likelihood_window: usize,
}

fn default_likelihood_window() -> usize {
    DEFAULT_LIKELIHOOD_WINDOW
}

fn hierarchy_label(hierarchical: bool) -> &'static str {
    if hierarchical {
        "hierarchical"
    } else {
        "non-hierarchical"
    }
}

fn invalid(field: &'static str, reason: String) -> HmmError {
    HmmError::InvalidModelFormat { field, reason }
}

fn check_length(field: &'static str, expected: usize, actual: usize) -> Result<(), HmmError> {
    if expected != actual {
        return Err(invalid(
            field,
            format!("expected {expected} values, found {actual}"),
        ));
    }
    Ok(())
}

fn check_probabilities(field: &'static str, values: &[f64]) -> Result<(), HmmError> {
    match values.iter().position(|v| !v.is_finite() || *v < 0.0) {
        Some(index) => Err(invalid(
            field,
            format!("value {} at index {index} is not a probability", values[index]),
        )),
        None => Ok(()),
    }
}

impl<E> Hmm<E>
where
    E: EmissionModel + Serialize + DeserializeOwned,
{
    pub fn to_document(&self) -> HmmDocument<E> {
        HmmDocument {
            is_hierarchical: self.is_hierarchical(),
            estimate_means: self.config.estimate_means,
            dimension: self.config.dimension,
            dimension_input: self.config.dimension_input,
            nb_states: self.config.n_states,
            nb_mixture_components: self.config.n_mixture_components,
            covariance_offset: self.config.covariance_offset,
            transition_mode: self.transitions.mode().code(),
            prior: self.transitions.prior().to_vec(),
            transition: self.transitions.transition().to_vec(),
            exit_probabilities: self.transitions.exit_probabilities().map(<[f64]>::to_vec),
            states: self.states.clone(),
            stop_criterion: self.config.stop_criterion,
            likelihood_window: self.config.likelihood_window,
        }
    }

    /// Rebuilds a trained model from a document, checking every array
    /// against `nbStates`.
    pub fn from_document(document: HmmDocument<E>) -> Result<Self, HmmError> {
        let HmmDocument {
            is_hierarchical,
            estimate_means,
            dimension,
            dimension_input,
            nb_states,
            nb_mixture_components,
            covariance_offset,
            transition_mode,
            prior,
            transition,
            exit_probabilities,
            mut states,
            stop_criterion,
            likelihood_window,
        } = document;

        let mode = TransitionMode::from_code(transition_mode).ok_or_else(|| {
            invalid(
                "transitionMode",
                format!("unknown code {transition_mode}, expected 0 or 1"),
            )
        })?;
        let config = HmmConfig {
            n_states: nb_states,
            n_mixture_components: nb_mixture_components,
            covariance_offset,
            transition_mode: mode,
            estimate_means,
            hierarchical: is_hierarchical,
            dimension,
            dimension_input,
            likelihood_window,
            stop_criterion,
        };
        config.validate()?;

        check_length("prior", nb_states, prior.len())?;
        check_length("transition", nb_states * nb_states, transition.len())?;
        check_length("states", nb_states, states.len())?;
        check_probabilities("prior", &prior)?;
        check_probabilities("transition", &transition)?;
        let exit_probabilities = match (is_hierarchical, exit_probabilities) {
            (true, Some(exit)) => {
                check_length("exitProbabilities", nb_states, exit.len())?;
                check_probabilities("exitProbabilities", &exit)?;
                Some(exit)
            }
            (true, None) => {
                return Err(invalid(
                    "exitProbabilities",
                    "missing on a hierarchical model".to_string(),
                ))
            }
            (false, Some(_)) => {
                return Err(invalid(
                    "exitProbabilities",
                    "present on a non-hierarchical model".to_string(),
                ))
            }
            (false, None) => None,
        };

        for state in &mut states {
            check_emission(&config, state)
                .map_err(|e| invalid("states", e.to_string()))?;
            state.refresh_caches()?;
        }

        let transitions =
            TransitionModel::from_parameters(mode, prior, transition, exit_probabilities)?;
        let decoder = decoder_for(&config);
        debug!(
            n_states = config.n_states,
            hierarchical = is_hierarchical,
            "model document loaded"
        );
        Ok(Self {
            config,
            transitions,
            states,
            trainer: BaumWelch::new(),
            decoder,
            trained: true,
        })
    }

    /// Replaces this model with the document's content. The hierarchical
    /// flag of the document must match this model's.
    pub fn load_document(&mut self, document: HmmDocument<E>) -> Result<(), HmmError> {
        if document.is_hierarchical != self.is_hierarchical() {
            return Err(HmmError::HierarchyMismatch {
                expected: hierarchy_label(self.is_hierarchical()),
                found: hierarchy_label(document.is_hierarchical),
            });
        }
        *self = Self::from_document(document)?;
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, HmmError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, HmmError> {
        let document: HmmDocument<E> = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    pub fn save_to_json<P: AsRef<Path>>(&self, path: P) -> Result<(), HmmError> {
        let json = self.to_json_string()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<Self, HmmError> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HmmError::ModelFileNotFound(path_ref.display().to_string())
            } else {
                HmmError::IoError(e)
            }
        })?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmm::GaussianMixture;
    use crate::training_set::{Phrase, TrainingSet};

    fn trained_model(hierarchical: bool) -> Hmm {
        let config = HmmConfig {
            n_states: 3,
            hierarchical,
            stop_criterion: StopCriterion {
                min_steps: 2,
                max_steps: 2,
                percent_chg: 0.01,
            },
            ..HmmConfig::default()
        };
        let mut set = TrainingSet::new(1);
        for offset in [0.0, 0.3] {
            let frames: Vec<Vec<f64>> = (0..9).map(|t| vec![t as f64 * 0.5 + offset]).collect();
            set.push(Phrase::from_frames(1, &frames).unwrap()).unwrap();
        }
        let mut hmm = Hmm::new(config).unwrap();
        hmm.train(&set).unwrap();
        hmm
    }

    #[test]
    fn test_document_field_names() {
        let hmm = trained_model(true);
        let value: serde_json::Value = serde_json::from_str(&hmm.to_json_string().unwrap()).unwrap();
        for field in [
            "isHierarchical",
            "estimateMeans",
            "dimension",
            "nbStates",
            "nbMixtureComponents",
            "covarianceOffset",
            "transitionMode",
            "prior",
            "transition",
            "exitProbabilities",
            "states",
        ] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["transitionMode"], 1);
        assert_eq!(value["nbStates"], 3);

        let flat = trained_model(false);
        let value: serde_json::Value = serde_json::from_str(&flat.to_json_string().unwrap()).unwrap();
        assert!(value.get("exitProbabilities").is_none());
    }

    #[test]
    fn test_save_and_load() {
        let hmm = trained_model(true);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        hmm.save_to_json(&path).unwrap();

        let loaded: Hmm = Hmm::load_from_json(&path).unwrap();
        assert!(loaded.is_trained());
        assert_eq!(loaded.transitions(), hmm.transitions());
        for (a, b) in loaded.states().iter().zip(hmm.states()) {
            assert_eq!(a.mixture_coeffs(), b.mixture_coeffs());
            for (ca, cb) in a.components().iter().zip(b.components()) {
                assert_eq!(ca.mean, cb.mean);
                assert_eq!(ca.covariance, cb.covariance);
            }
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<Hmm, _> = Hmm::load_from_json(dir.path().join("absent.json"));
        assert!(matches!(result, Err(HmmError::ModelFileNotFound(_))));
    }

    #[test]
    fn test_size_errors_name_the_field() {
        let hmm = trained_model(false);
        let mut document = hmm.to_document();
        document.prior.pop();
        assert!(matches!(
            Hmm::from_document(document),
            Err(HmmError::InvalidModelFormat { field: "prior", .. })
        ));

        let mut document = hmm.to_document();
        document.transition.push(0.0);
        assert!(matches!(
            Hmm::from_document(document),
            Err(HmmError::InvalidModelFormat { field: "transition", .. })
        ));

        let mut document = hmm.to_document();
        document.transition_mode = 7;
        assert!(matches!(
            Hmm::from_document(document),
            Err(HmmError::InvalidModelFormat { field: "transitionMode", .. })
        ));

        let mut document = hmm.to_document();
        document.exit_probabilities = Some(vec![0.0; 3]);
        assert!(matches!(
            Hmm::from_document(document),
            Err(HmmError::InvalidModelFormat { field: "exitProbabilities", .. })
        ));

        let mut document = hmm.to_document();
        document.states[1] = GaussianMixture::new(1, 2, None, 0.01).unwrap();
        assert!(matches!(
            Hmm::from_document(document),
            Err(HmmError::InvalidModelFormat { field: "states", .. })
        ));
    }

    #[test]
    fn test_invalid_probabilities_name_the_field() {
        let flat = trained_model(false);
        let mut document = flat.to_document();
        document.prior[1] = -0.2;
        assert!(matches!(
            Hmm::from_document(document),
            Err(HmmError::InvalidModelFormat { field: "prior", .. })
        ));

        let mut document = flat.to_document();
        document.transition[4] = f64::NAN;
        assert!(matches!(
            Hmm::from_document(document),
            Err(HmmError::InvalidModelFormat { field: "transition", .. })
        ));

        let hierarchical = trained_model(true);
        let mut document = hierarchical.to_document();
        if let Some(exit) = document.exit_probabilities.as_mut() {
            exit[2] = f64::INFINITY;
        }
        assert!(matches!(
            Hmm::from_document(document),
            Err(HmmError::InvalidModelFormat { field: "exitProbabilities", .. })
        ));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let hmm = trained_model(false);
        let mut value: serde_json::Value =
            serde_json::from_str(&hmm.to_json_string().unwrap()).unwrap();
        value["colour"] = serde_json::json!("blue");
        let result: Result<Hmm, _> = Hmm::from_json_str(&value.to_string());
        assert!(matches!(result, Err(HmmError::JsonError(_))));
    }

    #[test]
    fn test_hierarchy_mismatch() {
        let hierarchical = trained_model(true);
        let mut flat = trained_model(false);
        assert!(matches!(
            flat.load_document(hierarchical.to_document()),
            Err(HmmError::HierarchyMismatch {
                expected: "non-hierarchical",
                found: "hierarchical"
            })
        ));

        let mut other = trained_model(false);
        other.load_document(flat.to_document()).unwrap();
        assert_eq!(other.transitions(), flat.transitions());
    }
}
