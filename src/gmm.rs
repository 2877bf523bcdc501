//! Gaussian Mixture Model emission distribution.
//!
//! Each component carries a full covariance matrix. Bimodal mixtures also
//! cache the inverse of the input block of the covariance, used for the
//! marginal input likelihood and for Gaussian Mixture Regression.

use crate::emission::{EmissionModel, ReestimationPass};
use crate::error::HmmError;
use crate::utils::{gaussian_density, invert_matrix};
use serde::{Deserialize, Serialize};

/// One multivariate Gaussian with full covariance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianComponent {
    pub mean: Vec<f64>,
    /// Row-major `dimension × dimension`.
    pub covariance: Vec<f64>,
    #[serde(skip)]
    inverse_covariance: Vec<f64>,
    #[serde(skip)]
    determinant: f64,
    #[serde(skip)]
    inverse_covariance_input: Vec<f64>,
    #[serde(skip)]
    determinant_input: f64,
    #[serde(skip)]
    mean_accumulator: Vec<f64>,
}

impl GaussianComponent {
    /// Zero mean, identity covariance.
    pub fn new(dimension: usize) -> Self {
        let mut covariance = vec![0.0; dimension * dimension];
        for d in 0..dimension {
            covariance[d * dimension + d] = 1.0;
        }
        Self {
            mean: vec![0.0; dimension],
            inverse_covariance: covariance.clone(),
            covariance,
            determinant: 1.0,
            inverse_covariance_input: Vec::new(),
            determinant_input: 1.0,
            mean_accumulator: vec![0.0; dimension],
        }
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Recomputes the cached inverses. `index` only labels the error.
    fn update_inverse(&mut self, dimension_input: Option<usize>, index: usize) -> Result<(), HmmError> {
        let d = self.dimension();
        let (inverse, determinant) = invert_matrix(&self.covariance, d)
            .filter(|(_, det)| *det > 0.0 && det.is_finite())
            .ok_or(HmmError::SingularCovariance { component: index })?;
        self.inverse_covariance = inverse;
        self.determinant = determinant;

        if let Some(d_in) = dimension_input {
            let mut block = vec![0.0; d_in * d_in];
            for l in 0..d_in {
                for k in 0..d_in {
                    block[l * d_in + k] = self.covariance[l * d + k];
                }
            }
            let (inverse, determinant) = invert_matrix(&block, d_in)
                .filter(|(_, det)| *det > 0.0 && det.is_finite())
                .ok_or(HmmError::SingularCovariance { component: index })?;
            self.inverse_covariance_input = inverse;
            self.determinant_input = determinant;
        } else {
            self.inverse_covariance_input.clear();
        }
        self.mean_accumulator.resize(d, 0.0);
        Ok(())
    }

    pub fn likelihood(&self, observation: &[f64]) -> f64 {
        gaussian_density(
            observation,
            &self.mean,
            &self.inverse_covariance,
            self.determinant,
        )
    }

    fn likelihood_input(&self, input: &[f64]) -> f64 {
        let d_in = input.len();
        gaussian_density(
            input,
            &self.mean[..d_in],
            &self.inverse_covariance_input,
            self.determinant_input,
        )
    }

    /// Conditional expectation of the output given the input:
    /// μ_out + Σ_out,in Σ_in,in⁻¹ (x - μ_in).
    fn regression(&self, input: &[f64], output: &mut [f64]) {
        let d = self.dimension();
        let d_in = input.len();
        for (o, out) in output.iter_mut().enumerate() {
            let row = d_in + o;
            let mut value = self.mean[row];
            for e in 0..d_in {
                let mut projected = 0.0;
                for k in 0..d_in {
                    projected +=
                        self.inverse_covariance_input[e * d_in + k] * (input[k] - self.mean[k]);
                }
                value += self.covariance[row * d + e] * projected;
            }
            *out = value;
        }
    }
}

/// Mixture of full-covariance Gaussians, the default emission model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaussianMixture {
    dimension: usize,
    dimension_input: Option<usize>,
    covariance_offset: f64,
    mixture_coeffs: Vec<f64>,
    components: Vec<GaussianComponent>,
}

impl GaussianMixture {
    pub fn new(
        n_components: usize,
        dimension: usize,
        dimension_input: Option<usize>,
        covariance_offset: f64,
    ) -> Result<Self, HmmError> {
        if n_components == 0 {
            return Err(HmmError::InvalidMixtureCount(n_components));
        }
        if let Some(input) = dimension_input {
            if input == 0 || input >= dimension {
                return Err(HmmError::InvalidInputDimension {
                    input,
                    total: dimension,
                });
            }
        }
        let mut gmm = Self {
            dimension,
            dimension_input,
            covariance_offset,
            mixture_coeffs: vec![1.0 / n_components as f64; n_components],
            components: vec![GaussianComponent::new(dimension); n_components],
        };
        gmm.rebuild_caches()?;
        Ok(gmm)
    }

    pub fn covariance_offset(&self) -> f64 {
        self.covariance_offset
    }

    pub fn mixture_coeffs(&self) -> &[f64] {
        &self.mixture_coeffs
    }

    pub fn components(&self) -> &[GaussianComponent] {
        &self.components
    }

    fn rebuild_caches(&mut self) -> Result<(), HmmError> {
        if self.mixture_coeffs.len() != self.components.len() {
            return Err(HmmError::DimensionMismatch {
                expected: self.components.len(),
                actual: self.mixture_coeffs.len(),
            });
        }
        let d = self.dimension;
        if let Some(input) = self.dimension_input {
            if input == 0 || input >= d {
                return Err(HmmError::InvalidInputDimension { input, total: d });
            }
        }
        for (c, component) in self.components.iter_mut().enumerate() {
            if component.mean.len() != d || component.covariance.len() != d * d {
                return Err(HmmError::DimensionMismatch {
                    expected: d,
                    actual: component.mean.len(),
                });
            }
            component.update_inverse(self.dimension_input, c)?;
        }
        Ok(())
    }

    /// Posterior weight of each component given an input segment; falls back
    /// to the prior mixture weights when every component rejects the input.
    fn input_responsibilities(&self, input: &[f64]) -> Vec<f64> {
        let mut weights: Vec<f64> = self
            .components
            .iter()
            .zip(&self.mixture_coeffs)
            .map(|(component, coeff)| coeff * component.likelihood_input(input))
            .collect();
        let sum: f64 = weights.iter().sum();
        if sum > 0.0 && sum.is_finite() {
            weights.iter_mut().for_each(|w| *w /= sum);
        } else {
            weights.copy_from_slice(&self.mixture_coeffs);
        }
        weights
    }
}

impl EmissionModel for GaussianMixture {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn dimension_input(&self) -> Option<usize> {
        self.dimension_input
    }

    fn n_components(&self) -> usize {
        self.components.len()
    }

    fn observation_likelihood(&self, observation: &[f64], component: Option<usize>) -> f64 {
        match component {
            Some(c) => self.mixture_coeffs[c] * self.components[c].likelihood(observation),
            None => self
                .components
                .iter()
                .zip(&self.mixture_coeffs)
                .map(|(g, coeff)| coeff * g.likelihood(observation))
                .sum(),
        }
    }

    fn input_likelihood(&self, input: &[f64], component: Option<usize>) -> f64 {
        if self.dimension_input.is_none() {
            return 0.0;
        }
        match component {
            Some(c) => self.mixture_coeffs[c] * self.components[c].likelihood_input(input),
            None => self
                .components
                .iter()
                .zip(&self.mixture_coeffs)
                .map(|(g, coeff)| coeff * g.likelihood_input(input))
                .sum(),
        }
    }

    fn joint_likelihood(&self, input: &[f64], output: &[f64], component: Option<usize>) -> f64 {
        let frame: Vec<f64> = input.iter().chain(output).copied().collect();
        self.observation_likelihood(&frame, component)
    }

    fn regress(&self, input: &[f64], output: &mut [f64]) {
        output.iter_mut().for_each(|o| *o = 0.0);
        if self.dimension_input.is_none() {
            return;
        }
        let weights = self.input_responsibilities(input);
        let mut prediction = vec![0.0; output.len()];
        for (component, weight) in self.components.iter().zip(weights) {
            component.regression(input, &mut prediction);
            for (o, p) in output.iter_mut().zip(&prediction) {
                *o += weight * p;
            }
        }
    }

    fn reset(&mut self) -> Result<(), HmmError> {
        let n = self.components.len();
        self.mixture_coeffs = vec![1.0 / n as f64; n];
        self.components = vec![GaussianComponent::new(self.dimension); n];
        self.rebuild_caches()
    }

    fn set_component(
        &mut self,
        component: usize,
        mean: &[f64],
        covariance: &[f64],
    ) -> Result<(), HmmError> {
        let n_components = self.components.len();
        let d = self.dimension;
        let target = self
            .components
            .get_mut(component)
            .ok_or(HmmError::ComponentIndexOutOfRange {
                index: component,
                n_components,
            })?;
        if mean.len() != d {
            return Err(HmmError::DimensionMismatch {
                expected: d,
                actual: mean.len(),
            });
        }
        if covariance.len() != d * d {
            return Err(HmmError::DimensionMismatch {
                expected: d * d,
                actual: covariance.len(),
            });
        }
        target.mean.copy_from_slice(mean);
        target.covariance.copy_from_slice(covariance);
        Ok(())
    }

    fn set_covariance_offset(&mut self, offset: f64) {
        self.covariance_offset = offset;
    }

    fn zero_parameters(&mut self) {
        self.mixture_coeffs.iter_mut().for_each(|w| *w = 0.0);
        for component in &mut self.components {
            component.covariance.iter_mut().for_each(|v| *v = 0.0);
            component.mean_accumulator.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    fn accumulate_responsibility(
        &mut self,
        pass: ReestimationPass,
        frame: &[f64],
        responsibilities: &[f64],
    ) {
        let d = self.dimension;
        match pass {
            ReestimationPass::MixtureWeights => {
                for (w, r) in self.mixture_coeffs.iter_mut().zip(responsibilities) {
                    *w += r;
                }
            }
            ReestimationPass::Means => {
                for (component, &r) in self.components.iter_mut().zip(responsibilities) {
                    for (acc, x) in component.mean_accumulator.iter_mut().zip(frame) {
                        *acc += r * x;
                    }
                }
            }
            ReestimationPass::Covariances => {
                for (component, &r) in self.components.iter_mut().zip(responsibilities) {
                    for d1 in 0..d {
                        let c1 = frame[d1] - component.mean[d1];
                        for d2 in 0..d {
                            component.covariance[d1 * d + d2] +=
                                r * c1 * (frame[d2] - component.mean[d2]);
                        }
                    }
                }
            }
        }
    }

    fn reestimate_from_responsibilities(
        &mut self,
        pass: ReestimationPass,
        responsibility_sums: &[f64],
    ) {
        match pass {
            ReestimationPass::MixtureWeights => {
                let sum: f64 = self.mixture_coeffs.iter().sum();
                if sum > 0.0 {
                    self.mixture_coeffs.iter_mut().for_each(|w| *w /= sum);
                } else {
                    let n = self.mixture_coeffs.len() as f64;
                    self.mixture_coeffs.iter_mut().for_each(|w| *w = 1.0 / n);
                }
            }
            ReestimationPass::Means => {
                for (component, &sum) in self.components.iter_mut().zip(responsibility_sums) {
                    if sum > 0.0 {
                        for (m, acc) in component.mean.iter_mut().zip(&component.mean_accumulator) {
                            *m = acc / sum;
                        }
                    }
                }
            }
            ReestimationPass::Covariances => {
                for (component, &sum) in self.components.iter_mut().zip(responsibility_sums) {
                    if sum > 0.0 {
                        component.covariance.iter_mut().for_each(|v| *v /= sum);
                    }
                }
            }
        }
    }

    fn apply_covariance_regularization(&mut self) -> Result<(), HmmError> {
        let d = self.dimension;
        for component in &mut self.components {
            for k in 0..d {
                component.covariance[k * d + k] += self.covariance_offset;
            }
        }
        self.rebuild_caches()
    }

    fn refresh_caches(&mut self) -> Result<(), HmmError> {
        self.rebuild_caches()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_default_mixture_likelihood() {
        let gmm = GaussianMixture::new(2, 1, None, 0.01).unwrap();
        let p = gmm.observation_likelihood(&[0.0], None);
        assert_abs_diff_eq!(p, 1.0 / (2.0 * PI).sqrt(), epsilon = 1e-12);
        // each component carries half of the mass
        assert_abs_diff_eq!(gmm.observation_likelihood(&[0.0], Some(1)), p / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reestimation_passes() {
        let mut gmm = GaussianMixture::new(1, 1, None, 0.0).unwrap();
        let frames = [1.0, 2.0, 3.0];
        gmm.zero_parameters();
        for x in frames {
            gmm.accumulate_responsibility(ReestimationPass::MixtureWeights, &[x], &[1.0]);
        }
        gmm.reestimate_from_responsibilities(ReestimationPass::MixtureWeights, &[3.0]);
        for x in frames {
            gmm.accumulate_responsibility(ReestimationPass::Means, &[x], &[1.0]);
        }
        gmm.reestimate_from_responsibilities(ReestimationPass::Means, &[3.0]);
        for x in frames {
            gmm.accumulate_responsibility(ReestimationPass::Covariances, &[x], &[1.0]);
        }
        gmm.reestimate_from_responsibilities(ReestimationPass::Covariances, &[3.0]);
        gmm.apply_covariance_regularization().unwrap();

        assert_abs_diff_eq!(gmm.mixture_coeffs()[0], 1.0);
        assert_abs_diff_eq!(gmm.components()[0].mean[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(gmm.components()[0].covariance[0], 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_means_kept_without_mean_pass() {
        let mut gmm = GaussianMixture::new(1, 1, None, 0.5).unwrap();
        gmm.set_component(0, &[4.0], &[1.0]).unwrap();
        gmm.zero_parameters();
        gmm.accumulate_responsibility(ReestimationPass::Covariances, &[5.0], &[1.0]);
        gmm.reestimate_from_responsibilities(ReestimationPass::Covariances, &[1.0]);
        gmm.apply_covariance_regularization().unwrap();
        assert_abs_diff_eq!(gmm.components()[0].mean[0], 4.0);
        assert_abs_diff_eq!(gmm.components()[0].covariance[0], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_regression_follows_correlation() {
        let mut gmm = GaussianMixture::new(1, 2, Some(1), 0.0).unwrap();
        // output = 2 * input, perfectly correlated up to a small residual
        gmm.set_component(0, &[1.0, 2.0], &[1.0, 2.0, 2.0, 4.01]).unwrap();
        gmm.refresh_caches().unwrap();
        let mut out = [0.0];
        gmm.regress(&[3.0], &mut out);
        assert_abs_diff_eq!(out[0], 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_set_component_bounds() {
        let mut gmm = GaussianMixture::new(2, 1, None, 0.01).unwrap();
        assert!(matches!(
            gmm.set_component(2, &[0.0], &[1.0]),
            Err(HmmError::ComponentIndexOutOfRange { index: 2, n_components: 2 })
        ));
        assert!(matches!(
            gmm.set_component(0, &[0.0, 1.0], &[1.0]),
            Err(HmmError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_singular_covariance_is_reported() {
        let mut gmm = GaussianMixture::new(1, 2, None, 0.0).unwrap();
        gmm.set_component(0, &[0.0, 0.0], &[1.0, 1.0, 1.0, 1.0]).unwrap();
        assert!(matches!(
            gmm.refresh_caches(),
            Err(HmmError::SingularCovariance { component: 0 })
        ));
    }

    #[test]
    fn test_unimodal_mixture_has_no_input_view() {
        let gmm = GaussianMixture::new(2, 2, None, 0.01).unwrap();
        assert_eq!(gmm.input_likelihood(&[0.0], None), 0.0);
        assert_eq!(gmm.input_likelihood(&[0.0], Some(1)), 0.0);
        let mut out = [7.0];
        gmm.regress(&[0.0], &mut out);
        assert_eq!(out, [0.0]);
    }
}
