//! Measurable quantities and their residual weighting factors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// A quantity that can be both simulated and measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Observable {
    /// Substrate concentration (g/L)
    SubstrateConc,

    /// Biomass concentration (g/L)
    BiomassConc,

    /// Base consumption rate
    BaseConsumptionRate,
}

impl Observable {
    pub const ALL: [Observable; 3] = [
        Observable::SubstrateConc,
        Observable::BiomassConc,
        Observable::BaseConsumptionRate,
    ];

    /// Canonical name, as used in setup files and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Observable::SubstrateConc => "substrate_conc",
            Observable::BiomassConc => "biomass_conc",
            Observable::BaseConsumptionRate => "base_consumption_rate",
        }
    }
}

impl fmt::Display for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Observable {
    type Err = FitError;

    /// Parse a measured-variable name. The short spreadsheet headers `cS`,
    /// `cX` and `base_rate` are accepted as well; anything else is an
    /// unknown observable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "substrate_conc" | "cS" => Ok(Observable::SubstrateConc),
            "biomass_conc" | "cX" => Ok(Observable::BiomassConc),
            "base_consumption_rate" | "base_rate" => Ok(Observable::BaseConsumptionRate),
            other => Err(FitError::UnknownObservable(other.to_string())),
        }
    }
}

impl TryFrom<String> for Observable {
    type Error = FitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Observable> for String {
    fn from(value: Observable) -> Self {
        value.name().to_string()
    }
}

/// Weighting factor applied to each observable's residuals.
///
/// The table is total over [`Observable`], so there is no fallback weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualWeights {
    pub substrate_conc: f64,
    pub biomass_conc: f64,
    pub base_consumption_rate: f64,
}

impl Default for ResidualWeights {
    fn default() -> Self {
        Self {
            substrate_conc: 1.0,
            biomass_conc: 1.0,
            base_consumption_rate: 0.1,
        }
    }
}

impl ResidualWeights {
    pub fn weight(&self, observable: Observable) -> f64 {
        match observable {
            Observable::SubstrateConc => self.substrate_conc,
            Observable::BiomassConc => self.biomass_conc,
            Observable::BaseConsumptionRate => self.base_consumption_rate,
        }
    }

    pub fn validate(&self) -> Result<(), FitError> {
        for observable in Observable::ALL {
            let w = self.weight(observable);
            if !w.is_finite() || w < 0.0 {
                return Err(FitError::Configuration(format!(
                    "weight for {observable} must be finite and non-negative, got {w}"
                )));
            }
        }
        Ok(())
    }
}
