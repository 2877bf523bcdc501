//! One Expectation-Maximisation iteration of Baum-Welch.
//!
//! The trainer owns every buffer derived from the training set. Buffers are
//! keyed on a [`BufferLayout`]: whenever the phrase count, a phrase length,
//! the state count or the mixture count changes, they are dropped and
//! reallocated as a whole, and the trainer's generation counter increases.

use crate::config::TransitionMode;
use crate::emission::{EmissionModel, ReestimationPass};
use crate::error::HmmError;
use crate::forward_backward::{ForwardBackward, SequenceBuffers};
use crate::training_set::TrainingSet;
use crate::transition::{normalize_prior, TransitionModel};
use tracing::debug;

/// Shape of the training buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    pub lengths: Vec<usize>,
    pub n_states: usize,
    pub n_components: usize,
}

impl BufferLayout {
    pub fn of(set: &TrainingSet, n_states: usize, n_components: usize) -> Self {
        Self {
            lengths: set.lengths(),
            n_states,
            n_components,
        }
    }
}

#[derive(Debug, Clone)]
struct TrainingBuffers {
    layout: BufferLayout,
    engine: ForwardBackward,
    sequences: Vec<SequenceBuffers>,
    gamma_sum: Vec<f64>,
    gamma_sum_per_mixture: Vec<f64>,
}

impl TrainingBuffers {
    fn allocate(layout: BufferLayout) -> Self {
        let max_length = layout.lengths.iter().copied().max().unwrap_or(0);
        let sequences = layout
            .lengths
            .iter()
            .map(|&length| SequenceBuffers::new(length, layout.n_states, layout.n_components))
            .collect();
        Self {
            engine: ForwardBackward::new(layout.n_states, max_length),
            sequences,
            gamma_sum: vec![0.0; layout.n_states],
            gamma_sum_per_mixture: vec![0.0; layout.n_states * layout.n_components],
            layout,
        }
    }
}

/// Baum-Welch trainer.
#[derive(Debug, Clone, Default)]
pub struct BaumWelch {
    buffers: Option<TrainingBuffers>,
    generation: u64,
}

impl BaumWelch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffer allocations performed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn layout(&self) -> Option<&BufferLayout> {
        self.buffers.as_ref().map(|b| &b.layout)
    }

    /// Brings the buffers in line with `set`. Returns true if they were
    /// reallocated.
    pub fn synchronize(&mut self, set: &TrainingSet, n_states: usize, n_components: usize) -> bool {
        let layout = BufferLayout::of(set, n_states, n_components);
        if self.layout() == Some(&layout) {
            return false;
        }
        debug!(
            phrases = layout.lengths.len(),
            n_states, n_components, "allocating Baum-Welch buffers"
        );
        self.buffers = Some(TrainingBuffers::allocate(layout));
        self.generation += 1;
        true
    }

    /// Statistics of phrase `index` (in training-set order) from the last iteration.
    pub fn sequence(&self, index: usize) -> Option<&SequenceBuffers> {
        self.buffers.as_ref()?.sequences.get(index)
    }

    /// Per-state occupancy accumulated over the last iteration.
    pub fn gamma_sum(&self) -> &[f64] {
        self.buffers
            .as_ref()
            .map_or(&[][..], |b| b.gamma_sum.as_slice())
    }

    /// Runs forward-backward on every phrase, then re-estimates emissions,
    /// prior (ergodic only) and transitions. Returns the total
    /// log-likelihood of the training set under the parameters in force
    /// before the update.
    ///
    /// The update is all-or-nothing: on error `transitions` and `states`
    /// keep the parameters they had on entry.
    pub fn run_one_iteration<E: EmissionModel>(
        &mut self,
        transitions: &mut TransitionModel,
        states: &mut [E],
        set: &TrainingSet,
        estimate_means: bool,
    ) -> Result<f64, HmmError> {
        if set.is_empty() {
            return Err(HmmError::EmptyTrainingSet);
        }
        let n_states = transitions.n_states();
        let n_components = states.first().map_or(0, |s| s.n_components());
        self.synchronize(set, n_states, n_components);
        let buffers = self
            .buffers
            .as_mut()
            .ok_or(HmmError::EmptyTrainingSet)?;

        // E-step
        let mut log_prob = 0.0;
        for (phrase, sequence) in set.iter().zip(buffers.sequences.iter_mut()) {
            log_prob += buffers.engine.run(transitions, states, phrase, sequence);
        }
        accumulate_gamma_sums(buffers);

        // M-step
        let mut updated_states = states.to_vec();
        let mut updated_transitions = transitions.clone();
        for state in updated_states.iter_mut() {
            state.zero_parameters();
        }
        reestimate_emissions(buffers, &mut updated_states, set, ReestimationPass::MixtureWeights);
        if estimate_means {
            reestimate_emissions(buffers, &mut updated_states, set, ReestimationPass::Means);
        }
        reestimate_emissions(buffers, &mut updated_states, set, ReestimationPass::Covariances);
        for state in updated_states.iter_mut() {
            state.apply_covariance_regularization()?;
        }

        if updated_transitions.mode() == TransitionMode::Ergodic {
            reestimate_prior(buffers, &mut updated_transitions);
        }
        reestimate_transitions(buffers, &mut updated_transitions);
        updated_transitions.normalize();

        states.clone_from_slice(&updated_states);
        *transitions = updated_transitions;
        Ok(log_prob)
    }
}

fn accumulate_gamma_sums(buffers: &mut TrainingBuffers) {
    let n = buffers.layout.n_states;
    let n_components = buffers.layout.n_components;
    buffers.gamma_sum.iter_mut().for_each(|g| *g = 0.0);
    buffers.gamma_sum_per_mixture.iter_mut().for_each(|g| *g = 0.0);
    for sequence in &buffers.sequences {
        for t in 0..sequence.length() {
            for i in 0..n {
                buffers.gamma_sum[i] += sequence.gamma(t, i);
                for c in 0..n_components {
                    buffers.gamma_sum_per_mixture[i * n_components + c] +=
                        sequence.gamma_per_mixture(c, t, i);
                }
            }
        }
    }
}

fn reestimate_emissions<E: EmissionModel>(
    buffers: &TrainingBuffers,
    states: &mut [E],
    set: &TrainingSet,
    pass: ReestimationPass,
) {
    let n_components = buffers.layout.n_components;
    let mut responsibilities = vec![0.0; n_components];
    for (phrase, sequence) in set.iter().zip(&buffers.sequences) {
        for t in 0..sequence.length() {
            let frame = phrase.frame(t);
            for (i, state) in states.iter_mut().enumerate() {
                for (c, r) in responsibilities.iter_mut().enumerate() {
                    *r = sequence.gamma_per_mixture(c, t, i);
                }
                state.accumulate_responsibility(pass, frame, &responsibilities);
            }
        }
    }
    for (i, state) in states.iter_mut().enumerate() {
        let sums = &buffers.gamma_sum_per_mixture[i * n_components..(i + 1) * n_components];
        state.reestimate_from_responsibilities(pass, sums);
    }
}

fn reestimate_prior(buffers: &TrainingBuffers, transitions: &mut TransitionModel) {
    let prior = transitions.prior_mut();
    prior.iter_mut().for_each(|p| *p = 0.0);
    for sequence in buffers.sequences.iter().filter(|s| s.length() > 0) {
        for (i, p) in prior.iter_mut().enumerate() {
            *p += sequence.gamma(0, i);
        }
    }
    normalize_prior(prior);
}

fn reestimate_transitions(buffers: &TrainingBuffers, transitions: &mut TransitionModel) {
    let n = buffers.layout.n_states;
    let matrix = transitions.transition_mut();
    matrix.iter_mut().for_each(|a| *a = 0.0);
    for sequence in &buffers.sequences {
        for t in 0..sequence.length().saturating_sub(1) {
            for i in 0..n {
                for j in 0..n {
                    matrix[i * n + j] += sequence.epsilon(t, i, j);
                }
            }
        }
    }
    for (row, &gamma_sum) in matrix.chunks_mut(n).zip(&buffers.gamma_sum) {
        if gamma_sum > 0.0 {
            row.iter_mut().for_each(|a| *a /= gamma_sum);
        }
    }
}
