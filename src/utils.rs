use std::f64::consts::PI;

/// Pivots smaller than this are treated as zero during inversion.
const PIVOT_EPSILON: f64 = 1e-300;

/// Multivariate Gaussian density with a precomputed inverse covariance.
///
/// N(x | μ, Σ) = exp(-0.5 * (x - μ)ᵀ Σ⁻¹ (x - μ)) / sqrt((2π)^d |Σ|)
///
/// `inverse_covariance` is row-major `d × d`. Underflow yields exactly 0 and
/// any non-finite result is mapped to 0, leaving the caller to recover from
/// an all-zero likelihood frame.
pub fn gaussian_density(
    observation: &[f64],
    mean: &[f64],
    inverse_covariance: &[f64],
    determinant: f64,
) -> f64 {
    let d = mean.len();
    let mut distance = 0.0;
    for l in 0..d {
        let dl = observation[l] - mean[l];
        let mut row = 0.0;
        for k in 0..d {
            row += inverse_covariance[l * d + k] * (observation[k] - mean[k]);
        }
        distance += dl * row;
    }

    let normalization = (determinant * (2.0 * PI).powi(d as i32)).sqrt();
    let p = (-0.5 * distance).exp() / normalization;
    if p.is_finite() {
        p
    } else {
        0.0
    }
}

/// Inverts a row-major `d × d` matrix by Gauss-Jordan elimination with
/// partial pivoting.
///
/// Returns the inverse and the determinant, or `None` when the matrix is
/// singular.
pub fn invert_matrix(matrix: &[f64], d: usize) -> Option<(Vec<f64>, f64)> {
    let mut work = matrix.to_vec();
    let mut inverse = vec![0.0; d * d];
    for i in 0..d {
        inverse[i * d + i] = 1.0;
    }

    let mut determinant = 1.0;
    for col in 0..d {
        let pivot_row = (col..d).max_by(|&a, &b| {
            work[a * d + col]
                .abs()
                .total_cmp(&work[b * d + col].abs())
        })?;
        let pivot = work[pivot_row * d + col];
        if pivot.abs() < PIVOT_EPSILON || !pivot.is_finite() {
            return None;
        }
        if pivot_row != col {
            for k in 0..d {
                work.swap(pivot_row * d + k, col * d + k);
                inverse.swap(pivot_row * d + k, col * d + k);
            }
            determinant = -determinant;
        }
        determinant *= pivot;

        for k in 0..d {
            work[col * d + k] /= pivot;
            inverse[col * d + k] /= pivot;
        }
        for row in 0..d {
            if row == col {
                continue;
            }
            let factor = work[row * d + col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..d {
                work[row * d + k] -= factor * work[col * d + k];
                inverse[row * d + k] -= factor * inverse[col * d + k];
            }
        }
    }

    Some((inverse, determinant))
}

/// Scales `values` to sum to one. Returns the original sum; a zero or
/// non-finite sum leaves `values` untouched.
pub fn normalize_in_place(values: &mut [f64]) -> f64 {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
    sum
}
