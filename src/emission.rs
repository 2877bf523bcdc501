use crate::error::HmmError;

/// View of one observation frame as the forward recursion sees it.
#[derive(Debug, Clone, Copy)]
pub enum Observation<'a> {
    /// Whole frame of a unimodal model.
    Unimodal(&'a [f64]),
    /// Input segment only (bimodal playback, output still unknown).
    Input(&'a [f64]),
    /// Input and output segments (bimodal training).
    Bimodal { input: &'a [f64], output: &'a [f64] },
}

/// Phases of the emission re-estimation, run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReestimationPass {
    MixtureWeights,
    Means,
    Covariances,
}

/// Per-state observation distribution driven by the HMM.
///
/// The HMM never looks inside an emission model: it reads likelihoods and
/// regressions and pushes responsibility weights back during Baum-Welch.
/// `component == None` aggregates over the whole mixture; `Some(c)` returns
/// the weighted contribution of component `c` alone.
pub trait EmissionModel: Clone {
    fn dimension(&self) -> usize;

    /// Width of the input segment, `None` when unimodal.
    fn dimension_input(&self) -> Option<usize>;

    fn n_components(&self) -> usize;

    fn observation_likelihood(&self, observation: &[f64], component: Option<usize>) -> f64;

    /// Likelihood of the input segment under the marginal input distribution.
    fn input_likelihood(&self, input: &[f64], component: Option<usize>) -> f64;

    fn joint_likelihood(&self, input: &[f64], output: &[f64], component: Option<usize>) -> f64;

    /// Predicts the output segment from the input segment.
    fn regress(&self, input: &[f64], output: &mut [f64]);

    /// Restores default parameters (uniform weights, zero means, identity covariance).
    fn reset(&mut self) -> Result<(), HmmError>;

    /// Overwrites the mean and row-major covariance of one component.
    fn set_component(
        &mut self,
        component: usize,
        mean: &[f64],
        covariance: &[f64],
    ) -> Result<(), HmmError>;

    fn set_covariance_offset(&mut self, offset: f64);

    /// Zeroes mixture weights, covariances and mean accumulators. Current
    /// means are kept so that a model trained without mean estimation
    /// retains them.
    fn zero_parameters(&mut self);

    /// Adds one frame weighted by its per-component responsibilities.
    fn accumulate_responsibility(
        &mut self,
        pass: ReestimationPass,
        frame: &[f64],
        responsibilities: &[f64],
    );

    /// Closes a pass: normalises weights or divides the accumulated moments
    /// by the per-component responsibility totals.
    fn reestimate_from_responsibilities(
        &mut self,
        pass: ReestimationPass,
        responsibility_sums: &[f64],
    );

    /// Adds the regularisation offset to the covariances and refreshes any
    /// cached inverse.
    fn apply_covariance_regularization(&mut self) -> Result<(), HmmError>;

    /// Recomputes derived state from the stored parameters, e.g. after
    /// deserialization.
    fn refresh_caches(&mut self) -> Result<(), HmmError>;

    fn likelihood(&self, observation: Observation<'_>, component: Option<usize>) -> f64 {
        match observation {
            Observation::Unimodal(frame) => self.observation_likelihood(frame, component),
            Observation::Input(input) => self.input_likelihood(input, component),
            Observation::Bimodal { input, output } => {
                self.joint_likelihood(input, output, component)
            }
        }
    }
}
