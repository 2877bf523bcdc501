use crate::emission::{EmissionModel, Observation};
use crate::transition::TransitionModel;
use tracing::trace;

/// Scaled forward variable of the current frame.
///
/// `previous_alpha` holds the distribution of the previous frame while the
/// new one is being computed, so it is never overwritten before use.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardState {
    alpha: Vec<f64>,
    previous_alpha: Vec<f64>,
    initialized: bool,
}

impl ForwardState {
    pub fn new(n_states: usize) -> Self {
        Self {
            alpha: vec![0.0; n_states],
            previous_alpha: vec![0.0; n_states],
            initialized: false,
        }
    }

    /// Forgets the current sequence: the next frame goes through the prior.
    pub fn reset(&mut self) {
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn previous_alpha(&self) -> &[f64] {
        &self.previous_alpha
    }

    /// Replaces the current α, e.g. once exit mass has left a sub-model.
    pub(crate) fn load_alpha(&mut self, alpha: &[f64]) {
        self.alpha.copy_from_slice(alpha);
    }

    /// Runs `forward_init` on the first frame of a sequence and
    /// `forward_update` afterwards. Returns the scale factor `1 / c_t`.
    pub fn step<E: EmissionModel>(
        &mut self,
        transitions: &TransitionModel,
        states: &[E],
        observation: Observation<'_>,
    ) -> f64 {
        if self.initialized {
            self.forward_update(transitions, states, observation)
        } else {
            self.forward_init(transitions, states, observation)
        }
    }

    /// α_0(i) = π_i b_i(o_0), normalised.
    ///
    /// Returns the scale factor `1 / Σα`, or 1 when every state rejects the
    /// observation, in which case α is reset to uniform.
    pub fn forward_init<E: EmissionModel>(
        &mut self,
        transitions: &TransitionModel,
        states: &[E],
        observation: Observation<'_>,
    ) -> f64 {
        for (i, (alpha, state)) in self.alpha.iter_mut().zip(states).enumerate() {
            *alpha = transitions.prior()[i] * state.likelihood(observation, None);
        }
        self.initialized = true;
        self.rescale()
    }

    /// α_t(j) = [Σ_i α_{t-1}(i) a_ij] b_j(o_t), normalised.
    pub fn forward_update<E: EmissionModel>(
        &mut self,
        transitions: &TransitionModel,
        states: &[E],
        observation: Observation<'_>,
    ) -> f64 {
        let n = self.alpha.len();
        std::mem::swap(&mut self.alpha, &mut self.previous_alpha);
        for j in 0..n {
            let mut predicted = 0.0;
            for i in 0..n {
                predicted += self.previous_alpha[i] * transitions.probability(i, j);
            }
            self.alpha[j] = predicted * states[j].likelihood(observation, None);
        }
        self.initialized = true;
        self.rescale()
    }

    fn rescale(&mut self) -> f64 {
        let norm_const: f64 = self.alpha.iter().sum();
        if norm_const > 0.0 && norm_const.is_finite() {
            self.alpha.iter_mut().for_each(|a| *a /= norm_const);
            1.0 / norm_const
        } else {
            trace!(norm_const, "degenerate frame, resetting alpha to uniform");
            let uniform = 1.0 / self.alpha.len() as f64;
            self.alpha.iter_mut().for_each(|a| *a = uniform);
            1.0
        }
    }
}
