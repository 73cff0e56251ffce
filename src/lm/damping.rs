//! Damped Gauss-Newton steps and the damping schedule.
//!
//! The step solves `(JᵀJ + λ D) δ = -Jᵀr` with Marquardt's scaling
//! `D = diag(JᵀJ)`, so the damping acts on each parameter in its own units.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use super::config::LmConfig;

/// Floor for the scaling diagonal, keeps `D` positive for parameters the
/// residuals do not (yet) depend on.
const MIN_SCALE: f64 = 1e-12;

/// Gain ratio above which a step is accepted.
const ACCEPT_RATIO: f64 = 1e-4;

/// Gain ratio above which the damping is relaxed.
const GOOD_RATIO: f64 = 0.75;

/// Gain ratio below which an accepted step still increases the damping.
const POOR_RATIO: f64 = 0.25;

/// A proposed step and the reduction of the sum of squares the linear model
/// predicts for it.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step: Array1<f64>,
    pub predicted_reduction: f64,
}

/// Normal equations at the current point.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    jtj: DMatrix<f64>,
    gradient: Array1<f64>,
    scale: DVector<f64>,
}

impl NormalEquations {
    /// Build `JᵀJ` and `Jᵀr` from the Jacobian and residuals.
    pub fn new(jacobian: &Array2<f64>, residuals: &Array1<f64>) -> Self {
        let jtj_nd = jacobian.t().dot(jacobian);
        let n = jtj_nd.nrows();
        let jtj = DMatrix::from_fn(n, n, |i, j| jtj_nd[[i, j]]);
        let scale = DVector::from_fn(n, |i, _| jtj[(i, i)].max(MIN_SCALE));
        Self {
            jtj,
            gradient: jacobian.t().dot(residuals),
            scale,
        }
    }

    /// `Jᵀr`, half the gradient of the sum of squares.
    pub fn gradient(&self) -> &Array1<f64> {
        &self.gradient
    }

    /// Solve for the damped step at `lambda`.
    ///
    /// Cholesky is tried first; LU is the fallback when rounding leaves the
    /// damped matrix not quite positive definite. `None` means both failed.
    pub fn step(&self, lambda: f64) -> Option<StepResult> {
        let n = self.gradient.len();
        let mut a = self.jtj.clone();
        for i in 0..n {
            a[(i, i)] += lambda * self.scale[i];
        }
        let b = DVector::from_fn(n, |i, _| -self.gradient[i]);

        let x = match a.clone().cholesky() {
            Some(chol) => chol.solve(&b),
            None => a.lu().solve(&b)?,
        };
        if x.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let step = Array1::from_iter(x.iter().copied());
        // Sum of squares reduction of the linearized model, using the step equation
        let scaled: f64 = (0..n).map(|i| self.scale[i] * step[i] * step[i]).sum();
        let predicted_reduction = -step.dot(&self.gradient) + lambda * scaled;

        Some(StepResult {
            step,
            predicted_reduction,
        })
    }
}

/// Ratio of actual to predicted reduction.
pub fn gain_ratio(current_cost: f64, new_cost: f64, predicted_reduction: f64) -> f64 {
    let actual_reduction = current_cost - new_cost;
    if predicted_reduction > 0.0 {
        actual_reduction / predicted_reduction
    } else if actual_reduction > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// The damping parameter and its update rule.
#[derive(Debug, Clone)]
pub struct Damping {
    lambda: f64,
    min: f64,
    max: f64,
    up: f64,
    down: f64,
}

impl Damping {
    pub fn new(config: &LmConfig) -> Self {
        Self {
            lambda: config.initial_lambda,
            min: config.min_lambda,
            max: config.max_lambda,
            up: config.lambda_up_factor,
            down: config.lambda_down_factor,
        }
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Whether a step with this gain ratio is accepted.
    pub fn accepts(gain_ratio: f64) -> bool {
        gain_ratio > ACCEPT_RATIO
    }

    /// Update lambda after a step with the given gain ratio. Returns whether
    /// the step is accepted.
    pub fn update(&mut self, gain_ratio: f64) -> bool {
        if Self::accepts(gain_ratio) {
            if gain_ratio > GOOD_RATIO {
                self.lambda = (self.lambda * self.down).max(self.min);
            } else if gain_ratio < POOR_RATIO {
                self.lambda = (self.lambda * self.up).min(self.max);
            }
            true
        } else {
            self.increase();
            false
        }
    }

    /// Increase lambda. Returns false once the maximum has been exceeded.
    pub fn increase(&mut self) -> bool {
        let next = self.lambda * self.up;
        self.lambda = next.min(self.max);
        next <= self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.lambda >= self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_undamped_step_is_gauss_newton() {
        // r = J x - y for a linear model; one GN step from 0 solves it
        let jac = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0]];
        let r = array![-1.0, -3.0, -5.0];
        let eqs = NormalEquations::new(&jac, &r);

        let result = eqs.step(1e-14).unwrap();
        assert_relative_eq!(result.step[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.step[1], 2.0, epsilon = 1e-9);

        // Full reduction of the sum of squares 35
        assert_relative_eq!(result.predicted_reduction, 35.0, epsilon = 1e-8);
    }

    #[test]
    fn test_damping_shortens_step() {
        let jac = array![[2.0, 0.0], [0.0, 3.0]];
        let r = array![1.0, 1.0];
        let eqs = NormalEquations::new(&jac, &r);

        let small = eqs.step(1e-6).unwrap();
        let large = eqs.step(1e3).unwrap();
        assert!(large.step.dot(&large.step) < small.step.dot(&small.step));
        assert!(large.predicted_reduction > 0.0);
    }

    #[test]
    fn test_zero_column_is_regularized() {
        let jac = array![[1.0, 0.0], [2.0, 0.0]];
        let r = array![1.0, 1.0];
        let result = NormalEquations::new(&jac, &r).step(1e-3).unwrap();
        assert_eq!(result.step[1], 0.0);
    }

    #[test]
    fn test_damping_schedule() {
        let mut damping = Damping::new(&LmConfig::default());
        assert!(damping.update(0.9));
        assert_relative_eq!(damping.lambda(), 1e-4);
        assert!(damping.update(0.5));
        assert_relative_eq!(damping.lambda(), 1e-4);
        assert!(!damping.update(-1.0));
        assert_relative_eq!(damping.lambda(), 1e-3);

        let config = LmConfig {
            initial_lambda: 1e9,
            ..Default::default()
        };
        let mut damping = Damping::new(&config);
        assert!(damping.increase());
        assert!(damping.is_exhausted());
        assert!(!damping.increase());
    }

    #[test]
    fn test_gain_ratio() {
        assert_relative_eq!(gain_ratio(10.0, 5.0, 5.0), 1.0);
        assert_relative_eq!(gain_ratio(10.0, 12.0, 4.0), -0.5);
        assert_eq!(gain_ratio(10.0, 10.0, 0.0), 0.0);
    }
}
