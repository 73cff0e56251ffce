//! Dormand-Prince 5(4) integrator with exact output at requested times.
//!
//! Steps are chosen adaptively from the embedded 4th-order error estimate.
//! Output times that fall inside an accepted step are filled in with the
//! 4th-order continuous extension of the method, built from the seven stages
//! of that step, so interior values carry the same accuracy as step ends.

use tracing::trace;

use super::{IntegrationError, OdeConfig, OdeSystem, SolverStats, Trajectory};

const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights (also the last stage row)
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Difference between the 5th- and 4th-order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

// Continuous extension: y(t + s h) = y + h * sum_i k_i * (P_i1 s + P_i2 s^2 + P_i3 s^3 + P_i4 s^4).
// Stage 2 has no row. At s = 1 each row sums to the 5th-order weight.
const DENSE: [[f64; 4]; 6] = [
    [
        1.0,
        -8048581381.0 / 2820520608.0,
        8663915743.0 / 2820520608.0,
        -12715105075.0 / 11282082432.0,
    ],
    [
        0.0,
        131558114200.0 / 32700410799.0,
        -68118460800.0 / 10900136933.0,
        87487479700.0 / 32700410799.0,
    ],
    [
        0.0,
        -1754552775.0 / 470086768.0,
        14199869525.0 / 1410260304.0,
        -10690763975.0 / 1880347072.0,
    ],
    [
        0.0,
        127303824393.0 / 49829197408.0,
        -318862633887.0 / 49829197408.0,
        701980252875.0 / 199316789632.0,
    ],
    [
        0.0,
        -282668133.0 / 205662961.0,
        2019193451.0 / 616988883.0,
        -1453857185.0 / 822651844.0,
    ],
    [
        0.0,
        40617522.0 / 29380423.0,
        -110615467.0 / 29380423.0,
        69997945.0 / 29380423.0,
    ],
];

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

/// Adaptive Dormand-Prince 5(4) integrator.
#[derive(Debug, Clone, Default)]
pub struct Dopri5 {
    config: OdeConfig,
}

impl Dopri5 {
    pub fn new(config: OdeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OdeConfig {
        &self.config
    }

    /// Integrate `system` from `(t0, y0)` to `t_end`.
    ///
    /// `t_eval` must be sorted, non-decreasing and lie in `[t0, t_end]`; the
    /// returned trajectory holds one state per entry. Entries equal to `t0`
    /// receive `y0` unchanged.
    pub fn integrate<S, const N: usize>(
        &self,
        system: &S,
        t0: f64,
        y0: [f64; N],
        t_end: f64,
        t_eval: &[f64],
    ) -> Result<Trajectory<N>, IntegrationError>
    where
        S: OdeSystem<N> + ?Sized,
    {
        self.config.validate()?;
        check_request(t0, t_end, t_eval)?;

        let mut stats = SolverStats::default();
        let mut values = Vec::with_capacity(t_eval.len());
        let mut next = 0;
        while next < t_eval.len() && t_eval[next] <= t0 {
            values.push(y0);
            next += 1;
        }

        if t_end <= t0 {
            return Ok(Trajectory {
                values,
                final_state: y0,
                stats,
            });
        }

        let span = t_end - t0;
        let mut t = t0;
        let mut y = y0;
        let mut f = system.rhs(t, &y);
        stats.rhs_evals += 1;
        if !all_finite(&f) {
            return Err(IntegrationError::NonFinite { time: t });
        }

        let mut h = match self.config.initial_step {
            Some(h) => h,
            None => {
                stats.rhs_evals += 1;
                self.initial_step(system, t, &y, &f)
            }
        };
        if let Some(max_step) = self.config.max_step {
            h = h.min(max_step);
        }
        h = h.min(span);

        let mut previous_rejected = false;
        let mut last_failure_non_finite = false;

        loop {
            if stats.accepted_steps + stats.rejected_steps >= self.config.max_steps {
                return Err(IntegrationError::TooManySteps {
                    time: t,
                    max_steps: self.config.max_steps,
                });
            }

            let min_step = 16.0 * f64::EPSILON * t.abs().max(span);
            if h < min_step {
                return Err(if last_failure_non_finite {
                    IntegrationError::NonFinite { time: t }
                } else {
                    IntegrationError::StepSizeUnderflow { time: t, step: h }
                });
            }

            let remaining = t_end - t;
            let last = h >= remaining || remaining - h <= min_step;
            if last {
                h = remaining;
            }

            let step = self.attempt(system, t, &y, &f, h);
            stats.rhs_evals += 6;
            let Step {
                y_new,
                f_new,
                err,
                ..
            } = step;

            if !err.is_finite() || !all_finite(&y_new) || !all_finite(&f_new) {
                stats.rejected_steps += 1;
                previous_rejected = true;
                last_failure_non_finite = true;
                h *= MIN_FACTOR;
                continue;
            }

            if err > 1.0 {
                stats.rejected_steps += 1;
                previous_rejected = true;
                last_failure_non_finite = false;
                h *= (SAFETY * err.powf(-0.2)).max(MIN_FACTOR);
                continue;
            }

            let t_new = if last { t_end } else { t + h };
            if !system.admissible(&y_new) {
                return Err(IntegrationError::InadmissibleState {
                    time: t_new,
                    state: y_new.to_vec(),
                });
            }

            while next < t_eval.len() && t_eval[next] <= t_new {
                let te = t_eval[next];
                if te == t_new {
                    values.push(y_new);
                } else {
                    values.push(step.dense(&y, h, (te - t) / h));
                }
                next += 1;
            }

            stats.accepted_steps += 1;
            t = t_new;
            y = y_new;
            f = f_new;
            last_failure_non_finite = false;

            if last {
                break;
            }

            let mut factor = if err == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
            };
            if previous_rejected {
                factor = factor.min(1.0);
            }
            previous_rejected = false;
            h *= factor;
            if let Some(max_step) = self.config.max_step {
                h = h.min(max_step);
            }
        }

        // Requested times beyond the last accepted step can only be t_end itself.
        while next < t_eval.len() {
            values.push(y);
            next += 1;
        }

        trace!(
            t0,
            t_end,
            accepted = stats.accepted_steps,
            rejected = stats.rejected_steps,
            rhs_evals = stats.rhs_evals,
            "integrated segment"
        );

        Ok(Trajectory {
            values,
            final_state: y,
            stats,
        })
    }

    /// One Dormand-Prince step of size `h`.
    fn attempt<S, const N: usize>(
        &self,
        system: &S,
        t: f64,
        y: &[f64; N],
        k1: &[f64; N],
        h: f64,
    ) -> Step<N>
    where
        S: OdeSystem<N> + ?Sized,
    {
        let k2 = system.rhs(t + C2 * h, &combine(y, h, &[(A21, k1)]));
        let k3 = system.rhs(t + C3 * h, &combine(y, h, &[(A31, k1), (A32, &k2)]));
        let k4 = system.rhs(
            t + C4 * h,
            &combine(y, h, &[(A41, k1), (A42, &k2), (A43, &k3)]),
        );
        let k5 = system.rhs(
            t + C5 * h,
            &combine(y, h, &[(A51, k1), (A52, &k2), (A53, &k3), (A54, &k4)]),
        );
        let k6 = system.rhs(
            t + h,
            &combine(
                y,
                h,
                &[(A61, k1), (A62, &k2), (A63, &k3), (A64, &k4), (A65, &k5)],
            ),
        );
        let y_new = combine(
            y,
            h,
            &[(B1, k1), (B3, &k3), (B4, &k4), (B5, &k5), (B6, &k6)],
        );
        let k7 = system.rhs(t + h, &y_new);

        let mut sum = 0.0;
        for i in 0..N {
            let e = h
                * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
            let scale = self.config.atol + self.config.rtol * y[i].abs().max(y_new[i].abs());
            sum += if scale > 0.0 {
                (e / scale).powi(2)
            } else if e == 0.0 {
                0.0
            } else {
                f64::INFINITY
            };
        }
        let err = if N == 0 { 0.0 } else { (sum / N as f64).sqrt() };

        Step {
            y_new,
            f_new: k7,
            err,
            stages: [*k1, k3, k4, k5, k6, k7],
        }
    }

    /// Starting step from the local scale of the solution and its derivative
    /// (Hairer, Nørsett & Wanner, Solving ODEs I, II.4).
    fn initial_step<S, const N: usize>(&self, system: &S, t: f64, y: &[f64; N], f: &[f64; N]) -> f64
    where
        S: OdeSystem<N> + ?Sized,
    {
        let scale: Vec<f64> = y
            .iter()
            .map(|v| self.config.atol + self.config.rtol * v.abs())
            .collect();
        let d0 = rms(y.iter().zip(&scale).map(|(v, s)| v / s));
        let d1 = rms(f.iter().zip(&scale).map(|(v, s)| v / s));
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };

        let y1 = combine(y, h0, &[(1.0, f)]);
        let f1 = system.rhs(t + h0, &y1);
        let d2 = rms(
            f1.iter()
                .zip(f.iter())
                .zip(&scale)
                .map(|((a, b), s)| (a - b) / s),
        ) / h0;

        let h1 = if d1.max(d2) <= 1e-15 || !d2.is_finite() {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(0.2)
        };

        (100.0 * h0).min(h1)
    }
}

fn check_request(t0: f64, t_end: f64, t_eval: &[f64]) -> Result<(), IntegrationError> {
    if !t0.is_finite() || !t_end.is_finite() || t_end < t0 {
        return Err(IntegrationError::InvalidRequest(format!(
            "interval [{t0}, {t_end}] is not a finite forward span"
        )));
    }
    if t_eval.iter().any(|&t| !(t >= t0 && t <= t_end)) {
        return Err(IntegrationError::InvalidRequest(format!(
            "output times must lie in [{t0}, {t_end}]"
        )));
    }
    if t_eval.windows(2).any(|w| w[1] < w[0]) {
        return Err(IntegrationError::InvalidRequest(
            "output times must be sorted".to_string(),
        ));
    }
    Ok(())
}

/// `y + h * sum(a_i * k_i)`
fn combine<const N: usize>(y: &[f64; N], h: f64, terms: &[(f64, &[f64; N])]) -> [f64; N] {
    let mut out = *y;
    for (i, value) in out.iter_mut().enumerate() {
        let slope: f64 = terms.iter().map(|(a, k)| a * k[i]).sum();
        *value += h * slope;
    }
    out
}

/// Result of one attempted step.
struct Step<const N: usize> {
    y_new: [f64; N],
    f_new: [f64; N],
    /// Scaled RMS error estimate; accepted when at most 1
    err: f64,
    /// k1, k3, k4, k5, k6, k7 (k2 does not enter the continuous extension)
    stages: [[f64; N]; 6],
}

impl<const N: usize> Step<N> {
    /// State at fraction `s` of a step of size `h` that started at `y`.
    fn dense(&self, y: &[f64; N], h: f64, s: f64) -> [f64; N] {
        let powers = [s, s * s, s * s * s, s * s * s * s];
        let weights: Vec<f64> = DENSE
            .iter()
            .map(|row| row.iter().zip(&powers).map(|(p, x)| p * x).sum())
            .collect();

        let mut out = *y;
        for (i, value) in out.iter_mut().enumerate() {
            let slope: f64 = weights
                .iter()
                .zip(&self.stages)
                .map(|(w, k)| w * k[i])
                .sum();
            *value += h * slope;
        }
        out
    }
}

fn rms(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v * v, n + 1));
    if n == 0 {
        0.0
    } else {
        (sum / n as f64).sqrt()
    }
}

fn all_finite<const N: usize>(y: &[f64; N]) -> bool {
    y.iter().all(|v| v.is_finite())
}
