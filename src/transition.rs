use crate::config::{TransitionMode, DEFAULT_EXIT_PROBABILITY_LAST_STATE};
use crate::error::HmmError;
use crate::utils::normalize_in_place;
use tracing::warn;

/// Prior vector, row-major `S × S` transition matrix and, for hierarchical
/// models only, the per-state exit probabilities.
///
/// `exit_probabilities` is `Some` exactly when the model is hierarchical.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionModel {
    n_states: usize,
    mode: TransitionMode,
    prior: Vec<f64>,
    transition: Vec<f64>,
    exit_probabilities: Option<Vec<f64>>,
}

impl TransitionModel {
    pub fn new(n_states: usize, mode: TransitionMode, hierarchical: bool) -> Result<Self, HmmError> {
        if n_states == 0 {
            return Err(HmmError::InvalidStateCount(n_states));
        }
        let mut model = Self {
            n_states,
            mode,
            prior: vec![0.0; n_states],
            transition: vec![0.0; n_states * n_states],
            exit_probabilities: hierarchical.then(|| default_exit_probabilities(n_states)),
        };
        model.apply_topology();
        Ok(model)
    }

    /// Rebuilds a model from stored parameters, checking sizes.
    pub fn from_parameters(
        mode: TransitionMode,
        prior: Vec<f64>,
        transition: Vec<f64>,
        exit_probabilities: Option<Vec<f64>>,
    ) -> Result<Self, HmmError> {
        let n_states = prior.len();
        if n_states == 0 {
            return Err(HmmError::InvalidStateCount(0));
        }
        if transition.len() != n_states * n_states {
            return Err(HmmError::DimensionMismatch {
                expected: n_states * n_states,
                actual: transition.len(),
            });
        }
        if let Some(exit) = &exit_probabilities {
            if exit.len() != n_states {
                return Err(HmmError::InvalidExitProbabilities {
                    expected: n_states,
                    actual: exit.len(),
                });
            }
        }
        Ok(Self {
            n_states,
            mode,
            prior,
            transition,
            exit_probabilities,
        })
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn mode(&self) -> TransitionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TransitionMode) {
        self.mode = mode;
    }

    pub fn is_hierarchical(&self) -> bool {
        self.exit_probabilities.is_some()
    }

    pub fn prior(&self) -> &[f64] {
        &self.prior
    }

    pub fn prior_mut(&mut self) -> &mut [f64] {
        &mut self.prior
    }

    /// Row-major transition matrix.
    pub fn transition(&self) -> &[f64] {
        &self.transition
    }

    pub fn transition_mut(&mut self) -> &mut [f64] {
        &mut self.transition
    }

    /// Probability of moving from state `i` to state `j`.
    #[inline]
    pub fn probability(&self, i: usize, j: usize) -> f64 {
        self.transition[i * self.n_states + j]
    }

    pub fn exit_probabilities(&self) -> Option<&[f64]> {
        self.exit_probabilities.as_deref()
    }

    /// Resets prior and transitions to the configured topology.
    pub fn apply_topology(&mut self) {
        match self.mode {
            TransitionMode::Ergodic => self.set_ergodic(),
            TransitionMode::LeftRight => self.set_left_right(),
        }
    }

    /// Uniform prior and uniform transition rows.
    pub fn set_ergodic(&mut self) {
        let uniform = 1.0 / self.n_states as f64;
        self.prior.iter_mut().for_each(|p| *p = uniform);
        self.transition.iter_mut().for_each(|a| *a = uniform);
    }

    /// All prior mass on state 0; each state stays or advances with
    /// probability 0.5, the last state is absorbing.
    pub fn set_left_right(&mut self) {
        let n = self.n_states;
        self.prior.iter_mut().for_each(|p| *p = 0.0);
        self.prior[0] = 1.0;
        for i in 0..n {
            for j in 0..n {
                self.transition[i * n + j] = if i == j || i + 1 == j { 0.5 } else { 0.0 };
            }
        }
        self.transition[n * n - 1] = 1.0;
    }

    /// Sets the wrap-around transition from the last state to the first.
    /// Ignored on hierarchical models, where looping is the parent's business.
    pub fn add_cyclic_transition(&mut self, probability: f64) {
        if self.is_hierarchical() {
            return;
        }
        let n = self.n_states;
        self.transition[(n - 1) * n] = probability;
    }

    /// Scales every transition row and the prior to sum to one.
    ///
    /// A row summing to exactly zero is left as is. A zero prior falls back
    /// to the uniform distribution.
    pub fn normalize(&mut self) {
        let n = self.n_states;
        for row in self.transition.chunks_mut(n) {
            normalize_in_place(row);
        }
        normalize_prior(&mut self.prior);
    }

    /// `None` restores the default: all exit mass on the last state.
    pub fn set_exit_probabilities(&mut self, exit: Option<&[f64]>) -> Result<(), HmmError> {
        let n = self.n_states;
        let current = self
            .exit_probabilities
            .as_mut()
            .ok_or(HmmError::NotHierarchical)?;
        match exit {
            None => *current = default_exit_probabilities(n),
            Some(values) => {
                if values.len() != n {
                    return Err(HmmError::InvalidExitProbabilities {
                        expected: n,
                        actual: values.len(),
                    });
                }
                current.copy_from_slice(values);
            }
        }
        Ok(())
    }

    pub fn set_exit_point(&mut self, state: usize, probability: f64) -> Result<(), HmmError> {
        let n = self.n_states;
        let current = self
            .exit_probabilities
            .as_mut()
            .ok_or(HmmError::NotHierarchical)?;
        let slot = current
            .get_mut(state)
            .ok_or(HmmError::StateIndexOutOfRange {
                index: state,
                n_states: n,
            })?;
        *slot = probability;
        Ok(())
    }
}

fn default_exit_probabilities(n_states: usize) -> Vec<f64> {
    let mut exit = vec![0.0; n_states];
    exit[n_states - 1] = DEFAULT_EXIT_PROBABILITY_LAST_STATE;
    exit
}

/// Normalises a prior vector, falling back to uniform when its mass is zero.
pub(crate) fn normalize_prior(prior: &mut [f64]) {
    let sum = normalize_in_place(prior);
    if !(sum > 0.0 && sum.is_finite()) {
        warn!(sum, "prior has no usable mass, falling back to uniform");
        let uniform = 1.0 / prior.len() as f64;
        prior.iter_mut().for_each(|p| *p = uniform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_stochastic(model: &TransitionModel) {
        assert_abs_diff_eq!(model.prior().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        for row in model.transition().chunks(model.n_states()) {
            assert_abs_diff_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ergodic_is_uniform() {
        let model = TransitionModel::new(4, TransitionMode::Ergodic, false).unwrap();
        assert!(model.transition().iter().all(|&a| a == 0.25));
        assert_stochastic(&model);
    }

    #[test]
    fn test_left_right_layout() {
        let model = TransitionModel::new(3, TransitionMode::LeftRight, false).unwrap();
        assert_eq!(model.prior(), &[1.0, 0.0, 0.0]);
        assert_eq!(
            model.transition(),
            &[0.5, 0.5, 0.0, 0.0, 0.5, 0.5, 0.0, 0.0, 1.0]
        );
        assert_stochastic(&model);
    }

    #[test]
    fn test_left_right_normalize_idempotent() {
        let mut model = TransitionModel::new(5, TransitionMode::LeftRight, false).unwrap();
        model.normalize();
        let once = model.clone();
        model.set_left_right();
        model.normalize();
        model.normalize();
        assert_eq!(model, once);
    }

    #[test]
    fn test_cyclic_transition() {
        let mut model = TransitionModel::new(3, TransitionMode::LeftRight, false).unwrap();
        model.add_cyclic_transition(0.2);
        assert_eq!(model.probability(2, 0), 0.2);
        model.normalize();
        assert_abs_diff_eq!(model.probability(2, 0), 0.2 / 1.2, epsilon = 1e-12);
        assert_stochastic(&model);

        let mut hierarchical = TransitionModel::new(3, TransitionMode::LeftRight, true).unwrap();
        hierarchical.add_cyclic_transition(0.2);
        assert_eq!(hierarchical.probability(2, 0), 0.0);
    }

    #[test]
    fn test_normalize_leaves_zero_rows() {
        let mut model = TransitionModel::new(2, TransitionMode::Ergodic, false).unwrap();
        model.transition_mut().copy_from_slice(&[0.0, 0.0, 2.0, 6.0]);
        model.prior_mut().copy_from_slice(&[0.0, 0.0]);
        model.normalize();
        assert_eq!(model.transition(), &[0.0, 0.0, 0.25, 0.75]);
        assert_eq!(model.prior(), &[0.5, 0.5]);
    }

    #[test]
    fn test_exit_probabilities() {
        let mut model = TransitionModel::new(4, TransitionMode::LeftRight, true).unwrap();
        assert_eq!(
            model.exit_probabilities().unwrap(),
            &[0.0, 0.0, 0.0, DEFAULT_EXIT_PROBABILITY_LAST_STATE]
        );
        model.set_exit_point(1, 0.3).unwrap();
        assert_eq!(model.exit_probabilities().unwrap()[1], 0.3);
        assert!(matches!(
            model.set_exit_point(4, 0.3),
            Err(HmmError::StateIndexOutOfRange { index: 4, n_states: 4 })
        ));
        assert!(matches!(
            model.set_exit_probabilities(Some(&[0.1])),
            Err(HmmError::InvalidExitProbabilities { expected: 4, actual: 1 })
        ));
        model.set_exit_probabilities(None).unwrap();
        assert_eq!(model.exit_probabilities().unwrap()[1], 0.0);

        let mut flat = TransitionModel::new(4, TransitionMode::LeftRight, false).unwrap();
        assert!(matches!(
            flat.set_exit_probabilities(None),
            Err(HmmError::NotHierarchical)
        ));
        assert!(matches!(flat.set_exit_point(0, 0.1), Err(HmmError::NotHierarchical)));
    }
}
