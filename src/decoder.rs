//! Frame-by-frame decoding at playback time.
//!
//! Only the α of the current frame is kept. For bimodal models the output
//! segment of each frame is predicted by regression and written back into
//! the caller's buffer.

use crate::emission::{EmissionModel, Observation};
use crate::error::HmmError;
use crate::forward::ForwardState;
use crate::transition::TransitionModel;
use crate::utils::normalize_in_place;
use std::collections::VecDeque;

/// Index of each hierarchical α partition.
pub const STAY: usize = 0;
pub const ADVANCE: usize = 1;
pub const EXIT: usize = 2;

/// Output of the last decoded frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeResults {
    /// Likelihood of the last frame given the past (`c_t`).
    pub instant_likelihood: f64,
    /// Mean log instant likelihood over the likelihood window.
    pub log_likelihood: f64,
    /// State-index weighted position in `[0, 1]`.
    pub progress: f64,
    /// Regressed output segment (empty for unimodal models).
    pub predicted_output: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct RealtimeDecoder {
    dimension: usize,
    dimension_input: Option<usize>,
    forward: ForwardState,
    /// Forward mass split into stay / advance / exit, hierarchical models only.
    alpha_h: Option<[Vec<f64>; 3]>,
    likelihood_window: VecDeque<f64>,
    window_size: usize,
    results: DecodeResults,
}

impl RealtimeDecoder {
    pub fn new(
        n_states: usize,
        hierarchical: bool,
        dimension: usize,
        dimension_input: Option<usize>,
        window_size: usize,
    ) -> Self {
        let dimension_output = dimension_input.map_or(0, |input| dimension - input);
        Self {
            dimension,
            dimension_input,
            forward: ForwardState::new(n_states),
            alpha_h: hierarchical.then(|| {
                [
                    vec![0.0; n_states],
                    vec![0.0; n_states],
                    vec![0.0; n_states],
                ]
            }),
            likelihood_window: VecDeque::with_capacity(window_size.max(1)),
            window_size: window_size.max(1),
            results: DecodeResults {
                predicted_output: vec![0.0; dimension_output],
                ..DecodeResults::default()
            },
        }
    }

    /// Starts a new stream: the next frame is decoded from the prior.
    pub fn reset(&mut self) {
        self.forward.reset();
        self.likelihood_window.clear();
        if let Some(partitions) = &mut self.alpha_h {
            for partition in partitions.iter_mut() {
                partition.iter_mut().for_each(|a| *a = 0.0);
            }
        }
        let dimension_output = self.results.predicted_output.len();
        self.results = DecodeResults {
            predicted_output: vec![0.0; dimension_output],
            ..DecodeResults::default()
        };
    }

    pub fn set_window_size(&mut self, window_size: usize) {
        self.window_size = window_size.max(1);
        while self.likelihood_window.len() > self.window_size {
            self.likelihood_window.pop_front();
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.forward.is_initialized()
    }

    pub fn alpha(&self) -> &[f64] {
        self.forward.alpha()
    }

    pub fn alpha_h(&self) -> Option<&[Vec<f64>; 3]> {
        self.alpha_h.as_ref()
    }

    pub fn results(&self) -> &DecodeResults {
        &self.results
    }

    /// Decodes one frame and returns its instant likelihood.
    ///
    /// In bimodal mode only the input segment of `observation` is read and
    /// the output segment is overwritten with the prediction.
    pub fn decode<E: EmissionModel>(
        &mut self,
        transitions: &TransitionModel,
        states: &[E],
        observation: &mut [f64],
    ) -> Result<f64, HmmError> {
        if observation.len() != self.dimension {
            return Err(HmmError::DimensionMismatch {
                expected: self.dimension,
                actual: observation.len(),
            });
        }

        let first_frame = !self.forward.is_initialized();
        if first_frame {
            self.likelihood_window.clear();
        }
        let view = match self.dimension_input {
            Some(d_in) => Observation::Input(&observation[..d_in]),
            None => Observation::Unimodal(observation),
        };
        let ct = self.forward.step(transitions, states, view);

        if self.alpha_h.is_some() {
            self.update_partitions(transitions, first_frame);
        }

        if let Some(d_in) = self.dimension_input {
            let (input, output) = observation.split_at_mut(d_in);
            self.regression(states, input);
            output.copy_from_slice(&self.results.predicted_output);
        }

        self.update_likelihood(1.0 / ct);
        self.update_progress();
        Ok(self.results.instant_likelihood)
    }

    /// Mixes per-state regressions with the current α as weights.
    fn regression<E: EmissionModel>(&mut self, states: &[E], input: &[f64]) {
        let predicted = &mut self.results.predicted_output;
        predicted.iter_mut().for_each(|p| *p = 0.0);
        let mut state_output = vec![0.0; predicted.len()];
        for (state, &weight) in states.iter().zip(self.forward.alpha()) {
            state.regress(input, &mut state_output);
            for (p, o) in predicted.iter_mut().zip(&state_output) {
                *p += weight * o;
            }
        }
    }

    /// Splits the new forward mass by how it arrived (self-loop or move
    /// from another state), then carves out the exit mass. Only the mass
    /// that stays inside the model is carried to the next frame.
    fn update_partitions(&mut self, transitions: &TransitionModel, first_frame: bool) {
        let Some(partitions) = self.alpha_h.as_mut() else {
            return;
        };
        let Some(exit) = transitions.exit_probabilities() else {
            return;
        };
        let n = transitions.n_states();
        let alpha = self.forward.alpha();
        let previous = self.forward.previous_alpha();

        for j in 0..n {
            let stay_share = if first_frame {
                0.0
            } else {
                let arriving: f64 = (0..n)
                    .map(|i| previous[i] * transitions.probability(i, j))
                    .sum();
                if arriving > 0.0 {
                    previous[j] * transitions.probability(j, j) / arriving
                } else {
                    0.0
                }
            };
            let stay = alpha[j] * stay_share;
            let advance = alpha[j] - stay;
            partitions[EXIT][j] = alpha[j] * exit[j];
            partitions[STAY][j] = stay * (1.0 - exit[j]);
            partitions[ADVANCE][j] = advance * (1.0 - exit[j]);
        }

        let mut remaining: Vec<f64> = (0..n)
            .map(|j| partitions[STAY][j] + partitions[ADVANCE][j])
            .collect();
        if normalize_in_place(&mut remaining) > 0.0 {
            self.forward.load_alpha(&remaining);
        }
    }

    fn update_likelihood(&mut self, instant_likelihood: f64) {
        self.results.instant_likelihood = instant_likelihood;
        self.likelihood_window.push_back(instant_likelihood.ln());
        while self.likelihood_window.len() > self.window_size {
            self.likelihood_window.pop_front();
        }
        self.results.log_likelihood =
            self.likelihood_window.iter().sum::<f64>() / self.likelihood_window.len() as f64;
    }

    fn update_progress(&mut self) {
        let alpha = self.forward.alpha();
        let n = alpha.len();
        self.results.progress = if n > 1 {
            alpha
                .iter()
                .enumerate()
                .map(|(i, a)| a * i as f64)
                .sum::<f64>()
                / (n - 1) as f64
        } else {
            0.0
        };
    }
}
