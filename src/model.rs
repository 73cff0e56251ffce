//! Fed-batch process model with Monod growth kinetics.
//!
//! States are the substrate mass `mS` (g), the biomass `mX` (g) and the broth
//! volume `V` (L). With `cS = mS / V` and `cX = mX / V`:
//!
//! ```text
//! mu     = mumax * cS / (cS + Ks)
//! qS     = mu / Yxs
//! dmS/dt = -qS * cX * V + csf * F(t)
//! dmX/dt =  mu * cX * V
//! dV/dt  =  F(t)
//! ```
//!
//! where the feed flow `F(t)` equals the feed rate strictly after the feed
//! start time and zero before. The base consumption rate is an observable
//! proportional to the instantaneous biomass growth, `base_coef * dmX/dt`.
//!
//! Precondition: the volume stays strictly positive. The model itself does not
//! guard the divisions by `V`; the simulator rejects non-positive volumes.

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::parameters::{ParameterError, ParameterSet};

/// Maximum specific growth rate (1/h).
pub const MUMAX: &str = "mumax";
/// Biomass yield on substrate (g/g).
pub const YXS: &str = "Yxs";
/// Monod half-saturation constant (g/L).
pub const KS: &str = "Ks";
/// Base consumed per unit of biomass formed.
pub const BASE_COEF: &str = "base_coef";

/// Parameters the model reads from a [`ParameterSet`].
pub const REQUIRED_PARAMETERS: [&str; 4] = [MUMAX, YXS, KS, BASE_COEF];

/// State of the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    /// Substrate mass (g)
    pub substrate_mass: f64,

    /// Biomass dry mass (g)
    pub biomass: f64,

    /// Broth volume (L)
    pub volume: f64,
}

impl StateVector {
    pub fn new(substrate_mass: f64, biomass: f64, volume: f64) -> Self {
        Self {
            substrate_mass,
            biomass,
            volume,
        }
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.substrate_mass, self.biomass, self.volume]
    }

    pub fn from_array(y: &[f64; 3]) -> Self {
        Self::new(y[0], y[1], y[2])
    }

    /// Substrate concentration (g/L).
    pub fn substrate_conc(&self) -> f64 {
        self.substrate_mass / self.volume
    }

    /// Biomass concentration (g/L).
    pub fn biomass_conc(&self) -> f64 {
        self.biomass / self.volume
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Check an initial state: finite values and a strictly positive volume.
    pub fn validate(&self) -> Result<()> {
        if !self.is_finite() {
            return Err(FitError::Configuration(format!(
                "initial state must be finite, got {self:?}"
            )));
        }
        if self.volume <= 0.0 {
            return Err(FitError::Configuration(format!(
                "initial volume must be positive, got {} L",
                self.volume
            )));
        }
        Ok(())
    }
}

/// Feed settings of one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlInputs {
    /// Time at which the feed is switched on (h)
    pub feed_start_time: f64,

    /// Volumetric feed rate (L/h)
    pub feed_rate: f64,

    /// Substrate concentration in the feed (g/L)
    pub feed_substrate_conc: f64,
}

impl ControlInputs {
    pub fn new(feed_start_time: f64, feed_rate: f64, feed_substrate_conc: f64) -> Self {
        Self {
            feed_start_time,
            feed_rate,
            feed_substrate_conc,
        }
    }

    /// Batch operation: no feed at all.
    pub fn batch() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// The feed runs strictly after the start time.
    pub fn feed_active(&self, t: f64) -> bool {
        t > self.feed_start_time
    }

    /// Feed flow at time `t` (L/h).
    pub fn feed_flow(&self, t: f64) -> f64 {
        FeedPhase::at(self, t).flow(self)
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.feed_start_time, self.feed_rate, self.feed_substrate_conc];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FitError::Configuration(format!(
                "control inputs must be finite, got {self:?}"
            )));
        }
        Ok(())
    }
}

/// Which side of the feed switch the model is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Off,
    On,
}

impl FeedPhase {
    pub fn at(controls: &ControlInputs, t: f64) -> Self {
        if controls.feed_active(t) {
            FeedPhase::On
        } else {
            FeedPhase::Off
        }
    }

    pub fn flow(self, controls: &ControlInputs) -> f64 {
        match self {
            FeedPhase::On => controls.feed_rate,
            FeedPhase::Off => 0.0,
        }
    }
}

/// Kinetic constants resolved from a [`ParameterSet`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonodKinetics {
    pub mumax: f64,
    pub yxs: f64,
    pub ks: f64,
    pub base_coef: f64,
}

impl MonodKinetics {
    /// Read the kinetic constants by name.
    pub fn from_parameters(params: &ParameterSet) -> std::result::Result<Self, ParameterError> {
        Ok(Self {
            mumax: params.value(MUMAX)?,
            yxs: params.value(YXS)?,
            ks: params.value(KS)?,
            base_coef: params.value(BASE_COEF)?,
        })
    }

    /// Specific growth rate mu (1/h) at substrate concentration `cs`.
    pub fn growth_rate(&self, cs: f64) -> f64 {
        self.mumax * cs / (cs + self.ks)
    }

    /// Specific substrate uptake rate qS (g/g/h) for growth rate `mu`.
    pub fn uptake_rate(&self, mu: f64) -> f64 {
        mu / self.yxs
    }
}

/// The fed-batch model for one experiment: kinetics plus that experiment's feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FedBatchModel {
    kinetics: MonodKinetics,
    controls: ControlInputs,
}

impl FedBatchModel {
    pub fn new(kinetics: MonodKinetics, controls: ControlInputs) -> Self {
        Self { kinetics, controls }
    }

    pub fn from_parameters(params: &ParameterSet, controls: &ControlInputs) -> Result<Self> {
        Ok(Self::new(MonodKinetics::from_parameters(params)?, *controls))
    }

    pub fn kinetics(&self) -> &MonodKinetics {
        &self.kinetics
    }

    pub fn controls(&self) -> &ControlInputs {
        &self.controls
    }

    /// Time derivative of the state at time `t`.
    pub fn rhs(&self, t: f64, state: &StateVector) -> StateVector {
        self.rhs_in_phase(FeedPhase::at(&self.controls, t), state)
    }

    /// Time derivative with the feed phase given explicitly, so each side of
    /// the switch can be integrated as a continuous system.
    pub fn rhs_in_phase(&self, phase: FeedPhase, state: &StateVector) -> StateVector {
        let flow = phase.flow(&self.controls);
        let cs = state.substrate_conc();
        let cx = state.biomass_conc();

        let mu = self.kinetics.growth_rate(cs);
        let qs = self.kinetics.uptake_rate(mu);

        StateVector {
            substrate_mass: -qs * cx * state.volume
                + self.controls.feed_substrate_conc * flow,
            biomass: mu * cx * state.volume,
            volume: flow,
        }
    }

    /// Base consumption rate at `t`: `base_coef * dmX/dt`, re-evaluated from
    /// the right-hand side at the given state.
    pub fn base_consumption_rate(&self, t: f64, state: &StateVector) -> f64 {
        self.kinetics.base_coef * self.rhs(t, state).biomass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> FedBatchModel {
        let kinetics = MonodKinetics {
            mumax: 0.5,
            yxs: 0.2,
            ks: 1.0,
            base_coef: 1.0,
        };
        FedBatchModel::new(kinetics, ControlInputs::new(5.0, 0.02, 200.0))
    }

    #[test]
    fn test_feed_is_off_at_start_time() {
        let controls = ControlInputs::new(5.0, 0.02, 200.0);
        assert_eq!(controls.feed_flow(4.99), 0.0);
        assert_eq!(controls.feed_flow(5.0), 0.0);
        assert_eq!(controls.feed_flow(5.0 + 1e-9), 0.02);
    }

    #[test]
    fn test_rhs_initial_state() {
        let state = StateVector::new(3.0, 0.2, 0.5);
        let d = model().rhs(0.0, &state);

        // cS = 6, cX = 0.4, mu = 0.5 * 6 / 7
        let mu = 0.5 * 6.0 / 7.0;
        assert_relative_eq!(d.biomass, mu * 0.2, epsilon = 1e-12);
        assert_relative_eq!(d.substrate_mass, -mu / 0.2 * 0.2, epsilon = 1e-12);
        assert_eq!(d.volume, 0.0);
    }

    #[test]
    fn test_rhs_with_feed() {
        let state = StateVector::new(3.0, 0.2, 0.5);
        let m = model();
        let off = m.rhs(5.0, &state);
        let on = m.rhs(6.0, &state);

        assert_relative_eq!(on.volume, 0.02);
        assert_relative_eq!(on.substrate_mass - off.substrate_mass, 200.0 * 0.02, epsilon = 1e-12);
        assert_relative_eq!(on.biomass, off.biomass);
        assert_eq!(m.rhs_in_phase(FeedPhase::On, &state), on);
    }

    #[test]
    fn test_yield_links_growth_and_uptake() {
        let state = StateVector::new(1.3, 0.7, 0.8);
        let d = model().rhs(1.0, &state);
        assert_relative_eq!(d.substrate_mass, -d.biomass / 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_base_consumption_rate() {
        let mut m = model();
        m.kinetics.base_coef = 2.5;
        let state = StateVector::new(3.0, 0.2, 0.5);
        let rate = m.base_consumption_rate(0.0, &state);
        assert_relative_eq!(rate, 2.5 * m.rhs(0.0, &state).biomass);
    }

    #[test]
    fn test_kinetics_from_parameters() {
        let mut params = ParameterSet::new();
        params.add_param(MUMAX, 0.5).unwrap();
        params.add_param(YXS, 0.2).unwrap();
        params.add_fixed(KS, 1.0).unwrap();

        assert!(matches!(
            MonodKinetics::from_parameters(&params),
            Err(ParameterError::NotFound { .. })
        ));

        params.add_param(BASE_COEF, 1.0).unwrap();
        let kinetics = MonodKinetics::from_parameters(&params).unwrap();
        assert_eq!(kinetics.ks, 1.0);
    }

    #[test]
    fn test_state_validation() {
        assert!(StateVector::new(3.0, 0.2, 0.5).validate().is_ok());
        assert!(StateVector::new(3.0, 0.2, 0.0).validate().is_err());
        assert!(StateVector::new(f64::NAN, 0.2, 0.5).validate().is_err());
    }
}
