use crate::baum_welch::BaumWelch;
use crate::config::{HmmConfig, StopCriterion, TransitionMode};
use crate::decoder::{DecodeResults, RealtimeDecoder};
use crate::emission::EmissionModel;
use crate::error::HmmError;
use crate::gmm::GaussianMixture;
use crate::training_set::{Phrase, TrainingSet};
use crate::transition::TransitionModel;
use tracing::{debug, info, warn};

/// Outcome of [`Hmm::train`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub steps: usize,
    /// Log-likelihood of the training set at the last iteration.
    pub log_likelihood: f64,
    /// Log-likelihood of every iteration, in order.
    pub history: Vec<f64>,
}

/// Hidden Markov Model with one emission model per state.
///
/// Training goes through [`Hmm::train`] (or [`Hmm::init_training`] followed
/// by repeated [`Hmm::train_iteration`]); playback through
/// [`Hmm::init_playing`] and [`Hmm::play`].
#[derive(Debug, Clone)]
pub struct Hmm<E = GaussianMixture> {
    pub(crate) config: HmmConfig,
    pub(crate) transitions: TransitionModel,
    pub(crate) states: Vec<E>,
    pub(crate) trainer: BaumWelch,
    pub(crate) decoder: RealtimeDecoder,
    pub(crate) trained: bool,
}

impl Hmm<GaussianMixture> {
    /// Creates a model with Gaussian mixture states at default parameters.
    pub fn new(config: HmmConfig) -> Result<Self, HmmError> {
        config.validate()?;
        let states = gaussian_states(&config)?;
        Self::with_states(config, states)
    }

    /// Changes the state count. States are rebuilt at default parameters.
    pub fn set_n_states(&mut self, n_states: usize) -> Result<(), HmmError> {
        if n_states == 0 {
            return Err(HmmError::InvalidStateCount(n_states));
        }
        let mut config = self.config.clone();
        config.n_states = n_states;
        *self = Self::new(config)?;
        Ok(())
    }

    pub fn set_n_mixture_components(&mut self, n_components: usize) -> Result<(), HmmError> {
        if n_components == 0 {
            return Err(HmmError::InvalidMixtureCount(n_components));
        }
        let mut config = self.config.clone();
        config.n_mixture_components = n_components;
        *self = Self::new(config)?;
        Ok(())
    }

    /// Picks the state count from the first phrase: one state per `factor`
    /// frames.
    pub fn evaluate_n_states(&mut self, set: &TrainingSet, factor: usize) -> Result<(), HmmError> {
        let first = set.iter().next().ok_or(HmmError::EmptyTrainingSet)?;
        let n_states = first.length() / factor.max(1);
        debug!(length = first.length(), factor, n_states, "evaluated state count");
        self.set_n_states(n_states)
    }
}

fn gaussian_states(config: &HmmConfig) -> Result<Vec<GaussianMixture>, HmmError> {
    (0..config.n_states)
        .map(|_| {
            GaussianMixture::new(
                config.n_mixture_components,
                config.dimension,
                config.dimension_input,
                config.covariance_offset,
            )
        })
        .collect()
}

impl<E: EmissionModel> Hmm<E> {
    /// Builds a model around caller-supplied emission models, one per state.
    pub fn with_states(config: HmmConfig, states: Vec<E>) -> Result<Self, HmmError> {
        config.validate()?;
        if states.len() != config.n_states {
            return Err(HmmError::DimensionMismatch {
                expected: config.n_states,
                actual: states.len(),
            });
        }
        for state in &states {
            check_emission(&config, state)?;
        }
        let transitions =
            TransitionModel::new(config.n_states, config.transition_mode, config.hierarchical)?;
        let decoder = decoder_for(&config);
        Ok(Self {
            config,
            transitions,
            states,
            trainer: BaumWelch::new(),
            decoder,
            trained: false,
        })
    }

    pub fn config(&self) -> &HmmConfig {
        &self.config
    }

    pub fn n_states(&self) -> usize {
        self.config.n_states
    }

    pub fn n_mixture_components(&self) -> usize {
        self.config.n_mixture_components
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn dimension_input(&self) -> Option<usize> {
        self.config.dimension_input
    }

    pub fn is_bimodal(&self) -> bool {
        self.config.is_bimodal()
    }

    pub fn is_hierarchical(&self) -> bool {
        self.transitions.is_hierarchical()
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn transitions(&self) -> &TransitionModel {
        &self.transitions
    }

    /// Direct access to prior and transition matrix. Call
    /// [`Hmm::normalize_transitions`] after editing.
    pub fn transitions_mut(&mut self) -> &mut TransitionModel {
        &mut self.transitions
    }

    pub fn states(&self) -> &[E] {
        &self.states
    }

    pub fn state(&self, index: usize) -> Result<&E, HmmError> {
        let n_states = self.states.len();
        self.states
            .get(index)
            .ok_or(HmmError::StateIndexOutOfRange { index, n_states })
    }

    pub fn state_mut(&mut self, index: usize) -> Result<&mut E, HmmError> {
        let n_states = self.states.len();
        self.states
            .get_mut(index)
            .ok_or(HmmError::StateIndexOutOfRange { index, n_states })
    }

    pub fn trainer(&self) -> &BaumWelch {
        &self.trainer
    }

    /// Accepts `"ergodic"` or `"left-right"` and resets the transitions to
    /// that topology.
    pub fn set_transition_mode(&mut self, mode: &str) -> Result<(), HmmError> {
        let mode: TransitionMode = mode.parse()?;
        self.config.transition_mode = mode;
        self.transitions.set_mode(mode);
        self.transitions.apply_topology();
        self.trained = false;
        Ok(())
    }

    pub fn set_estimate_means(&mut self, estimate_means: bool) {
        self.config.estimate_means = estimate_means;
    }

    /// Takes effect at the next covariance re-estimation.
    pub fn set_covariance_offset(&mut self, offset: f64) -> Result<(), HmmError> {
        if !offset.is_finite() || offset < 0.0 {
            return Err(HmmError::InvalidCovarianceOffset(offset));
        }
        self.config.covariance_offset = offset;
        for state in &mut self.states {
            state.set_covariance_offset(offset);
        }
        Ok(())
    }

    /// Window of the smoothed playback log-likelihood; 0 is treated as 1.
    pub fn set_likelihood_window(&mut self, window: usize) {
        self.config.likelihood_window = window.max(1);
        self.decoder.set_window_size(window);
    }

    pub fn set_stop_criterion(&mut self, criterion: StopCriterion) {
        self.config.stop_criterion = criterion;
    }

    pub fn set_exit_probabilities(&mut self, exit: Option<&[f64]>) -> Result<(), HmmError> {
        self.transitions.set_exit_probabilities(exit)
    }

    pub fn set_exit_point(&mut self, state: usize, probability: f64) -> Result<(), HmmError> {
        self.transitions.set_exit_point(state, probability)
    }

    /// No-op on hierarchical models.
    pub fn add_cyclic_transition(&mut self, probability: f64) {
        self.transitions.add_cyclic_transition(probability);
    }

    pub fn normalize_transitions(&mut self) {
        self.transitions.normalize();
    }

    /// Likelihood of a full frame under state `state` (one component when
    /// `component` is `Some`).
    pub fn observation_probability(
        &self,
        observation: &[f64],
        state: usize,
        component: Option<usize>,
    ) -> Result<f64, HmmError> {
        check_width(self.config.dimension, observation.len())?;
        let emission = self.checked_state(state, component)?;
        Ok(emission.observation_likelihood(observation, component))
    }

    pub fn observation_probability_input(
        &self,
        input: &[f64],
        state: usize,
        component: Option<usize>,
    ) -> Result<f64, HmmError> {
        let dimension_input = self.config.dimension_input.ok_or(HmmError::NotBimodal)?;
        check_width(dimension_input, input.len())?;
        let emission = self.checked_state(state, component)?;
        Ok(emission.input_likelihood(input, component))
    }

    pub fn observation_probability_bimodal(
        &self,
        input: &[f64],
        output: &[f64],
        state: usize,
        component: Option<usize>,
    ) -> Result<f64, HmmError> {
        let dimension_input = self.config.dimension_input.ok_or(HmmError::NotBimodal)?;
        check_width(dimension_input, input.len())?;
        check_width(self.config.dimension_output(), output.len())?;
        let emission = self.checked_state(state, component)?;
        Ok(emission.joint_likelihood(input, output, component))
    }

    fn checked_state(&self, state: usize, component: Option<usize>) -> Result<&E, HmmError> {
        let emission = self.state(state)?;
        if let Some(index) = component {
            let n_components = emission.n_components();
            if index >= n_components {
                return Err(HmmError::ComponentIndexOutOfRange {
                    index,
                    n_components,
                });
            }
        }
        Ok(emission)
    }

    /// Resets the parameters ahead of Baum-Welch.
    ///
    /// The transitions go back to the configured topology and every state to
    /// its defaults. With a training set, each phrase is cut into `S` equal
    /// segments and segment `n` seeds state `n`.
    pub fn init_training(&mut self, set: Option<&TrainingSet>) -> Result<(), HmmError> {
        self.transitions.apply_topology();
        for state in &mut self.states {
            state.reset()?;
        }
        if let Some(set) = set {
            self.check_training_set(set)?;
            self.initialize_from_segments(set)?;
            let (n_states, n_components) = (self.n_states(), self.n_mixture_components());
            self.trainer.synchronize(set, n_states, n_components);
        }
        for state in &mut self.states {
            state.apply_covariance_regularization()?;
        }
        self.trained = false;
        Ok(())
    }

    fn initialize_from_segments(&mut self, set: &TrainingSet) -> Result<(), HmmError> {
        let n_states = self.n_states();
        let dimension = self.dimension();
        for (index, phrase) in set.iter().enumerate() {
            if phrase.length() < n_states {
                warn!(
                    phrase = index,
                    length = phrase.length(),
                    n_states,
                    "phrase shorter than the state count, skipped for initialisation"
                );
            }
        }

        let n_components = self.n_mixture_components();
        for (n, state) in self.states.iter_mut().enumerate() {
            if n_components == 1 {
                if let Some((mean, covariance)) =
                    segment_moments(set.iter(), n, n_states, dimension)
                {
                    state.set_component(0, &mean, &covariance)?;
                }
            } else {
                for (c, phrase) in set.iter().take(n_components).enumerate() {
                    if let Some((mean, covariance)) =
                        segment_moments(std::iter::once(phrase), n, n_states, dimension)
                    {
                        state.set_component(c, &mean, &covariance)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_training_set(&self, set: &TrainingSet) -> Result<(), HmmError> {
        check_width(self.config.dimension, set.dimension())?;
        if set.dimension_input() != self.config.dimension_input {
            return Err(HmmError::DimensionMismatch {
                expected: self.config.dimension_input.unwrap_or(self.config.dimension),
                actual: set.dimension_input().unwrap_or(set.dimension()),
            });
        }
        if set.is_empty() {
            return Err(HmmError::EmptyTrainingSet);
        }
        Ok(())
    }

    /// One Baum-Welch iteration; returns the log-likelihood of `set` before
    /// the update.
    pub fn train_iteration(&mut self, set: &TrainingSet) -> Result<f64, HmmError> {
        self.check_training_set(set)?;
        self.trainer.run_one_iteration(
            &mut self.transitions,
            &mut self.states,
            set,
            self.config.estimate_means,
        )
    }

    /// Initialises from `set` and iterates Baum-Welch until the stop
    /// criterion is met.
    pub fn train(&mut self, set: &TrainingSet) -> Result<TrainingSummary, HmmError> {
        self.check_training_set(set)?;
        info!(
            phrases = set.len(),
            n_states = self.n_states(),
            n_mixture_components = self.n_mixture_components(),
            "training started"
        );
        self.init_training(Some(set))?;

        let criterion = self.config.stop_criterion;
        let mut history = Vec::new();
        let mut previous = f64::NEG_INFINITY;
        loop {
            let log_likelihood = self.train_iteration(set)?;
            history.push(log_likelihood);
            let step = history.len();
            debug!(step, log_likelihood, "Baum-Welch iteration");
            if !log_likelihood.is_finite() {
                warn!(step, "log-likelihood is not finite, stopping");
                break;
            }
            if criterion.should_stop(step, log_likelihood, previous) {
                break;
            }
            previous = log_likelihood;
        }

        self.transitions.normalize();
        self.trained = true;
        self.init_playing();

        let summary = TrainingSummary {
            steps: history.len(),
            log_likelihood: history.last().copied().unwrap_or(f64::NEG_INFINITY),
            history,
        };
        info!(
            steps = summary.steps,
            log_likelihood = summary.log_likelihood,
            "training finished"
        );
        Ok(summary)
    }

    /// Starts a new playback stream.
    pub fn init_playing(&mut self) {
        self.decoder.reset();
    }

    /// Decodes one frame; see [`RealtimeDecoder::decode`].
    pub fn play(&mut self, observation: &mut [f64]) -> Result<f64, HmmError> {
        self.decoder
            .decode(&self.transitions, &self.states, observation)
    }

    pub fn results(&self) -> &DecodeResults {
        self.decoder.results()
    }

    pub fn alpha(&self) -> &[f64] {
        self.decoder.alpha()
    }

    pub fn alpha_h(&self) -> Option<&[Vec<f64>; 3]> {
        self.decoder.alpha_h()
    }
}

pub(crate) fn decoder_for(config: &HmmConfig) -> RealtimeDecoder {
    RealtimeDecoder::new(
        config.n_states,
        config.hierarchical,
        config.dimension,
        config.dimension_input,
        config.likelihood_window,
    )
}

pub(crate) fn check_emission<E: EmissionModel>(
    config: &HmmConfig,
    state: &E,
) -> Result<(), HmmError> {
    check_width(config.dimension, state.dimension())?;
    if state.dimension_input() != config.dimension_input {
        return Err(HmmError::DimensionMismatch {
            expected: config.dimension_input.unwrap_or(config.dimension),
            actual: state.dimension_input().unwrap_or(state.dimension()),
        });
    }
    if state.n_components() != config.n_mixture_components {
        return Err(HmmError::InvalidMixtureCount(state.n_components()));
    }
    Ok(())
}

fn check_width(expected: usize, actual: usize) -> Result<(), HmmError> {
    if expected != actual {
        return Err(HmmError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Mean and covariance `E[x xᵀ] - μ μᵀ` of segment `segment` of every
/// phrase, each phrase being cut into `n_segments` equal parts. `None` when
/// no frame falls into the segment.
fn segment_moments<'a>(
    phrases: impl Iterator<Item = &'a Phrase>,
    segment: usize,
    n_segments: usize,
    dimension: usize,
) -> Option<(Vec<f64>, Vec<f64>)> {
    let mut mean = vec![0.0; dimension];
    let mut covariance = vec![0.0; dimension * dimension];
    let mut count = 0usize;
    for phrase in phrases {
        let step = phrase.length() / n_segments;
        for t in segment * step..(segment + 1) * step {
            let frame = phrase.frame(t);
            for d1 in 0..dimension {
                mean[d1] += frame[d1];
                for d2 in 0..dimension {
                    covariance[d1 * dimension + d2] += frame[d1] * frame[d2];
                }
            }
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let count = count as f64;
    mean.iter_mut().for_each(|m| *m /= count);
    for d1 in 0..dimension {
        for d2 in 0..dimension {
            covariance[d1 * dimension + d2] =
                covariance[d1 * dimension + d2] / count - mean[d1] * mean[d2];
        }
    }
    Some((mean, covariance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_COVARIANCE_OFFSET;
    use approx::assert_abs_diff_eq;

    fn ramp_set(length: usize) -> TrainingSet {
        let mut set = TrainingSet::new(1);
        let frames: Vec<Vec<f64>> = (0..length).map(|t| vec![t as f64]).collect();
        set.push(Phrase::from_frames(1, &frames).unwrap()).unwrap();
        set
    }

    fn constant_phrase(value: f64, length: usize) -> Phrase {
        Phrase::from_frames(1, &vec![vec![value]; length]).unwrap()
    }

    #[test]
    fn test_default_model() {
        let hmm = Hmm::new(HmmConfig::default()).unwrap();
        assert_eq!(hmm.n_states(), 10);
        assert_eq!(hmm.transitions().prior()[0], 1.0);
        assert!(!hmm.is_trained());
        assert!(!hmm.is_hierarchical());
        assert!(hmm.alpha_h().is_none());
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            Hmm::new(HmmConfig::new(0, 1, 1)),
            Err(HmmError::InvalidStateCount(0))
        ));
        assert!(matches!(
            Hmm::new(HmmConfig::new(3, 0, 1)),
            Err(HmmError::InvalidMixtureCount(0))
        ));
        let config = HmmConfig {
            dimension: 2,
            dimension_input: Some(2),
            ..HmmConfig::default()
        };
        assert!(matches!(
            Hmm::new(config),
            Err(HmmError::InvalidInputDimension { input: 2, total: 2 })
        ));

        let mut hmm = Hmm::new(HmmConfig::new(3, 1, 1)).unwrap();
        assert!(matches!(
            hmm.set_transition_mode("circular"),
            Err(HmmError::InvalidTransitionMode(_))
        ));
        assert!(matches!(hmm.set_n_states(0), Err(HmmError::InvalidStateCount(0))));
        assert!(matches!(
            hmm.set_covariance_offset(-1.0),
            Err(HmmError::InvalidCovarianceOffset(_))
        ));
    }

    #[test]
    fn test_segment_initialisation() {
        let mut hmm = Hmm::new(HmmConfig::new(3, 1, 1)).unwrap();
        hmm.init_training(Some(&ramp_set(6))).unwrap();
        let means: Vec<f64> = hmm
            .states()
            .iter()
            .map(|s| s.components()[0].mean[0])
            .collect();
        assert_eq!(means, vec![0.5, 2.5, 4.5]);
        assert_abs_diff_eq!(
            hmm.state(0).unwrap().components()[0].covariance[0],
            0.25 + DEFAULT_COVARIANCE_OFFSET,
            epsilon = 1e-12
        );
        assert_eq!(hmm.trainer().generation(), 1);
    }

    #[test]
    fn test_component_initialisation_per_phrase() {
        let mut set = TrainingSet::new(1);
        set.push(constant_phrase(0.0, 4)).unwrap();
        set.push(constant_phrase(10.0, 4)).unwrap();
        let mut hmm = Hmm::new(HmmConfig::new(1, 2, 1)).unwrap();
        hmm.init_training(Some(&set)).unwrap();
        let components = hmm.state(0).unwrap().components();
        assert_eq!(components[0].mean, vec![0.0]);
        assert_eq!(components[1].mean, vec![10.0]);
    }

    #[test]
    fn test_short_phrases_keep_defaults() {
        let mut hmm = Hmm::new(HmmConfig::new(5, 1, 1)).unwrap();
        hmm.init_training(Some(&ramp_set(3))).unwrap();
        assert!(hmm
            .states()
            .iter()
            .all(|s| s.components()[0].mean == vec![0.0]));
    }

    #[test]
    fn test_training_set_must_match() {
        let mut hmm = Hmm::new(HmmConfig::new(2, 1, 2)).unwrap();
        assert!(matches!(
            hmm.train(&ramp_set(6)),
            Err(HmmError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            hmm.train(&TrainingSet::new(2)),
            Err(HmmError::EmptyTrainingSet)
        ));
    }

    #[test]
    fn test_failed_iteration_keeps_model_usable() {
        let config = HmmConfig {
            covariance_offset: 0.0,
            ..HmmConfig::new(3, 1, 1)
        };
        let mut hmm = Hmm::new(config).unwrap();
        let mut set = TrainingSet::new(1);
        set.push(Phrase::from_frames(1, &[vec![0.0]]).unwrap()).unwrap();
        hmm.init_training(Some(&set)).unwrap();
        let before = hmm.observation_probability(&[0.0], 2, None).unwrap();

        assert!(matches!(
            hmm.train_iteration(&set),
            Err(HmmError::SingularCovariance { component: 0 })
        ));
        assert_eq!(hmm.state(2).unwrap().components()[0].covariance, vec![1.0]);
        assert_eq!(hmm.observation_probability(&[0.0], 2, None).unwrap(), before);
        let restored: Hmm = Hmm::from_json_str(&hmm.to_json_string().unwrap()).unwrap();
        assert_eq!(restored.transitions(), hmm.transitions());
    }

    #[test]
    fn test_train_respects_max_steps() {
        let mut set = TrainingSet::new(1);
        set.push(Phrase::from_frames(1, &[vec![0.0], vec![0.1], vec![4.9], vec![5.0]]).unwrap())
            .unwrap();
        set.push(Phrase::from_frames(1, &[vec![0.2], vec![-0.1], vec![5.2], vec![5.1]]).unwrap())
            .unwrap();
        let mut hmm = Hmm::new(HmmConfig::new(2, 1, 1)).unwrap();
        hmm.set_stop_criterion(StopCriterion {
            min_steps: 3,
            max_steps: 3,
            percent_chg: 0.01,
        });
        let summary = hmm.train(&set).unwrap();
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.history.len(), 3);
        assert_eq!(summary.log_likelihood, summary.history[2]);
        assert!(hmm.is_trained());
        assert_eq!(hmm.transitions().prior(), &[1.0, 0.0]);

        let mut frame = [5.0];
        let likelihood = hmm.play(&mut frame).unwrap();
        assert!(likelihood > 0.0);
    }

    #[test]
    fn test_evaluate_n_states() {
        let mut hmm = Hmm::new(HmmConfig::default()).unwrap();
        hmm.evaluate_n_states(&ramp_set(12), 4).unwrap();
        assert_eq!(hmm.n_states(), 3);
        assert_eq!(hmm.states().len(), 3);
        assert_eq!(hmm.alpha().len(), 3);
        assert!(matches!(
            hmm.evaluate_n_states(&TrainingSet::new(1), 4),
            Err(HmmError::EmptyTrainingSet)
        ));
    }

    #[test]
    fn test_observation_probability_checks() {
        let hmm = Hmm::new(HmmConfig::new(2, 2, 1)).unwrap();
        assert!(hmm.observation_probability(&[0.0], 1, None).unwrap() > 0.0);
        assert!(matches!(
            hmm.observation_probability(&[0.0], 2, None),
            Err(HmmError::StateIndexOutOfRange { index: 2, n_states: 2 })
        ));
        assert!(matches!(
            hmm.observation_probability(&[0.0], 0, Some(2)),
            Err(HmmError::ComponentIndexOutOfRange { index: 2, n_components: 2 })
        ));
        assert!(matches!(
            hmm.observation_probability_input(&[0.0], 0, None),
            Err(HmmError::NotBimodal)
        ));
        assert!(matches!(
            hmm.observation_probability_bimodal(&[0.0], &[0.0], 0, None),
            Err(HmmError::NotBimodal)
        ));
    }

    #[test]
    fn test_bimodal_observation_probability() {
        let config = HmmConfig {
            n_states: 2,
            dimension: 2,
            dimension_input: Some(1),
            ..HmmConfig::default()
        };
        let hmm = Hmm::new(config).unwrap();
        let joint = hmm
            .observation_probability_bimodal(&[0.0], &[0.0], 0, None)
            .unwrap();
        assert_abs_diff_eq!(
            joint,
            hmm.observation_probability(&[0.0, 0.0], 0, None).unwrap(),
            epsilon = 1e-15
        );
        assert!(hmm.observation_probability_input(&[0.0], 0, None).unwrap() > joint);
        assert!(matches!(
            hmm.observation_probability_bimodal(&[0.0], &[0.0, 1.0], 0, None),
            Err(HmmError::DimensionMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_exit_probabilities_require_hierarchy() {
        let mut hmm = Hmm::new(HmmConfig::new(3, 1, 1)).unwrap();
        assert!(matches!(
            hmm.set_exit_point(0, 0.2),
            Err(HmmError::NotHierarchical)
        ));

        let config = HmmConfig {
            hierarchical: true,
            ..HmmConfig::new(3, 1, 1)
        };
        let mut hmm = Hmm::new(config).unwrap();
        hmm.set_exit_point(0, 0.2).unwrap();
        assert_eq!(
            hmm.transitions().exit_probabilities().unwrap(),
            &[0.2, 0.0, 0.1]
        );
        hmm.add_cyclic_transition(0.3);
        assert_eq!(hmm.transitions().probability(2, 0), 0.0);
    }

    #[test]
    fn test_transition_mode_resets_topology() {
        let mut hmm = Hmm::new(HmmConfig::new(4, 1, 1)).unwrap();
        hmm.set_transition_mode("ergodic").unwrap();
        assert_eq!(hmm.config().transition_mode, TransitionMode::Ergodic);
        assert!(hmm.transitions().transition().iter().all(|&a| a == 0.25));
    }

    #[test]
    fn test_with_states_checks_emissions() {
        let states = vec![GaussianMixture::new(1, 2, None, 0.01).unwrap()];
        assert!(matches!(
            Hmm::with_states(HmmConfig::new(1, 1, 1), states),
            Err(HmmError::DimensionMismatch { expected: 1, actual: 2 })
        ));
        let states = vec![GaussianMixture::new(1, 1, None, 0.01).unwrap()];
        assert!(matches!(
            Hmm::with_states(HmmConfig::new(2, 1, 1), states),
            Err(HmmError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }
}
