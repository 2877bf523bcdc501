use crate::emission::{EmissionModel, Observation};
use crate::forward::ForwardState;
use crate::training_set::Phrase;
use crate::transition::TransitionModel;
use tracing::trace;

/// Stand-in for a non-finite backward variable.
pub const BETA_SENTINEL: f64 = 1e100;

/// Observation view of frame `t` of a training phrase.
pub(crate) fn phrase_observation(phrase: &Phrase, t: usize) -> Observation<'_> {
    if phrase.is_bimodal() {
        Observation::Bimodal {
            input: phrase.input(t),
            output: phrase.output(t),
        }
    } else {
        Observation::Unimodal(phrase.frame(t))
    }
}

/// Posterior statistics of one training sequence.
///
/// Indexing: `gamma[t * S + i]`, `gamma_per_mixture[c][t * S + i]`,
/// `epsilon[t * S * S + i * S + j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceBuffers {
    length: usize,
    n_states: usize,
    gamma: Vec<f64>,
    gamma_per_mixture: Vec<Vec<f64>>,
    epsilon: Vec<f64>,
}

impl SequenceBuffers {
    pub fn new(length: usize, n_states: usize, n_components: usize) -> Self {
        Self {
            length,
            n_states,
            gamma: vec![0.0; length * n_states],
            gamma_per_mixture: vec![vec![0.0; length * n_states]; n_components],
            epsilon: vec![0.0; length * n_states * n_states],
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Occupancy of state `i` at time `t`.
    #[inline]
    pub fn gamma(&self, t: usize, i: usize) -> f64 {
        self.gamma[t * self.n_states + i]
    }

    #[inline]
    pub fn gamma_per_mixture(&self, c: usize, t: usize, i: usize) -> f64 {
        self.gamma_per_mixture[c][t * self.n_states + i]
    }

    /// Occupancy of the transition `i -> j` between `t` and `t + 1`.
    #[inline]
    pub fn epsilon(&self, t: usize, i: usize, j: usize) -> f64 {
        self.epsilon[(t * self.n_states + i) * self.n_states + j]
    }

    pub fn n_components(&self) -> usize {
        self.gamma_per_mixture.len()
    }
}

/// Scaled forward-backward recursion over whole training sequences.
///
/// `alpha_seq` and `beta_seq` are sized for the longest sequence and reused
/// for every sequence of a pass.
#[derive(Debug, Clone)]
pub struct ForwardBackward {
    n_states: usize,
    forward: ForwardState,
    beta: Vec<f64>,
    previous_beta: Vec<f64>,
    alpha_seq: Vec<f64>,
    beta_seq: Vec<f64>,
    scale: Vec<f64>,
}

impl ForwardBackward {
    pub fn new(n_states: usize, max_length: usize) -> Self {
        Self {
            n_states,
            forward: ForwardState::new(n_states),
            beta: vec![0.0; n_states],
            previous_beta: vec![0.0; n_states],
            alpha_seq: vec![0.0; max_length * n_states],
            beta_seq: vec![0.0; max_length * n_states],
            scale: vec![0.0; max_length],
        }
    }

    /// Runs Init → Recurse → Terminate on one phrase and fills `buffers`.
    ///
    /// Returns the sequence log-likelihood `-Σ_t ln(scale_t)`.
    pub fn run<E: EmissionModel>(
        &mut self,
        transitions: &TransitionModel,
        states: &[E],
        phrase: &Phrase,
        buffers: &mut SequenceBuffers,
    ) -> f64 {
        let n = self.n_states;
        let length = phrase.length();
        if length == 0 {
            return 0.0;
        }
        if self.scale.len() < length {
            self.alpha_seq.resize(length * n, 0.0);
            self.beta_seq.resize(length * n, 0.0);
            self.scale.resize(length, 0.0);
        }

        // Forward
        let mut log_prob = 0.0;
        self.forward.reset();
        for t in 0..length {
            let ct = self
                .forward
                .step(transitions, states, phrase_observation(phrase, t));
            self.scale[t] = ct;
            log_prob -= ct.ln();
            self.alpha_seq[t * n..(t + 1) * n].copy_from_slice(self.forward.alpha());
        }

        // Backward
        self.backward_init(self.scale[length - 1]);
        self.beta_seq[(length - 1) * n..length * n].copy_from_slice(&self.beta);
        for t in (0..length - 1).rev() {
            self.backward_update(
                self.scale[t],
                transitions,
                states,
                phrase_observation(phrase, t + 1),
            );
            self.beta_seq[t * n..(t + 1) * n].copy_from_slice(&self.beta);
        }

        self.terminate(transitions, states, phrase, buffers);
        log_prob
    }

    fn backward_init(&mut self, ct: f64) {
        self.beta.iter_mut().for_each(|b| *b = ct);
    }

    /// β_t(i) = c_t Σ_j a_ij β_{t+1}(j) b_j(o_{t+1}).
    fn backward_update<E: EmissionModel>(
        &mut self,
        ct: f64,
        transitions: &TransitionModel,
        states: &[E],
        next_observation: Observation<'_>,
    ) {
        let n = self.n_states;
        std::mem::swap(&mut self.beta, &mut self.previous_beta);
        let emissions: Vec<f64> = states
            .iter()
            .map(|state| state.likelihood(next_observation, None))
            .collect();
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..n {
                sum += transitions.probability(i, j) * self.previous_beta[j] * emissions[j];
            }
            let value = sum * ct;
            self.beta[i] = if value.is_finite() {
                value
            } else {
                trace!(state = i, "non-finite backward variable, clamping");
                BETA_SENTINEL
            };
        }
    }

    /// Derives γ, per-mixture γ and ε from the stored α and β.
    fn terminate<E: EmissionModel>(
        &self,
        transitions: &TransitionModel,
        states: &[E],
        phrase: &Phrase,
        buffers: &mut SequenceBuffers,
    ) {
        let n = self.n_states;
        let length = phrase.length();
        let n_components = buffers.n_components();

        for t in 0..length {
            for i in 0..n {
                buffers.gamma[t * n + i] =
                    self.alpha_seq[t * n + i] * self.beta_seq[t * n + i] / self.scale[t];
            }
        }

        let mut shares = vec![0.0; n_components];
        for t in 0..length {
            let observation = phrase_observation(phrase, t);
            for (i, state) in states.iter().enumerate() {
                let mut norm_const = 0.0;
                for (c, share) in shares.iter_mut().enumerate() {
                    *share = state.likelihood(observation, Some(c));
                    norm_const += *share;
                }
                let gamma = buffers.gamma[t * n + i];
                for (c, share) in shares.iter().enumerate() {
                    buffers.gamma_per_mixture[c][t * n + i] = if norm_const > 0.0 {
                        gamma * share / norm_const
                    } else {
                        gamma * share
                    };
                }
            }
        }

        for t in 0..length.saturating_sub(1) {
            let next = phrase_observation(phrase, t + 1);
            let emissions: Vec<f64> = states
                .iter()
                .map(|state| state.likelihood(next, None))
                .collect();
            for i in 0..n {
                let alpha = self.alpha_seq[t * n + i];
                for j in 0..n {
                    buffers.epsilon[(t * n + i) * n + j] = alpha
                        * transitions.probability(i, j)
                        * self.beta_seq[(t + 1) * n + j]
                        * emissions[j];
                }
            }
        }
    }
}
