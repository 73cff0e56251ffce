//! A single named, bounded, fixable scalar parameter.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parameters::bounds::{Bounds, BoundsError, BoundsTransform};

/// Errors that can occur when working with parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Parameter '{name}': {source}")]
    Bounds {
        name: String,
        #[source]
        source: BoundsError,
    },

    #[error("Parameter '{name}' value {value} is outside bounds [{min}, {max}]")]
    OutsideBounds {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Parameter '{name}' has a non-finite value")]
    NonFinite { name: String },

    #[error("Parameter '{name}' is defined more than once")]
    Duplicate { name: String },

    #[error("Parameter '{name}' not found")]
    NotFound { name: String },

    #[error("Expected {expected} values for varying parameters, got {actual}")]
    VaryingCount { expected: usize, actual: usize },
}

/// A parameter of the process model.
///
/// A varying parameter is adjusted by the estimator and must satisfy
/// `min <= value <= max`. A fixed parameter is held at its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterSpec", into = "ParameterSpec")]
pub struct Parameter {
    name: String,
    value: f64,
    bounds: Bounds,
    fixed: bool,
    stderr: Option<f64>,
}

impl Parameter {
    /// Create an unbounded, varying parameter.
    ///
    /// # Examples
    ///
    /// ```
    /// use fedbatch_fit::parameters::Parameter;
    ///
    /// let param = Parameter::new("mumax", 0.5).unwrap();
    /// assert_eq!(param.name(), "mumax");
    /// assert!(!param.is_fixed());
    /// ```
    pub fn new(name: &str, value: f64) -> Result<Self, ParameterError> {
        Self::with_bounds(name, value, Bounds::unbounded())
    }

    /// Create a varying parameter with bounds. Unlike a clamp, an initial value
    /// outside `[min, max]` is rejected.
    pub fn bounded(name: &str, value: f64, min: f64, max: f64) -> Result<Self, ParameterError> {
        let bounds = Bounds::new(min, max).map_err(|source| ParameterError::Bounds {
            name: name.to_string(),
            source,
        })?;
        Self::with_bounds(name, value, bounds)
    }

    /// Create a parameter that the estimator never adjusts.
    pub fn fixed(name: &str, value: f64) -> Result<Self, ParameterError> {
        let mut param = Self::new(name, value)?;
        param.fixed = true;
        Ok(param)
    }

    pub fn with_bounds(name: &str, value: f64, bounds: Bounds) -> Result<Self, ParameterError> {
        let param = Self {
            name: name.to_string(),
            value,
            bounds,
            fixed: false,
            stderr: None,
        };
        param.validate()?;
        Ok(param)
    }

    /// Check the value invariants of this parameter.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !self.value.is_finite() {
            return Err(ParameterError::NonFinite {
                name: self.name.clone(),
            });
        }
        if !self.fixed && !self.bounds.is_within_bounds(self.value) {
            return Err(ParameterError::OutsideBounds {
                name: self.name.clone(),
                value: self.value,
                min: self.bounds.min,
                max: self.bounds.max,
            });
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the value, enforcing the bounds of a varying parameter.
    pub fn set_value(&mut self, value: f64) -> Result<(), ParameterError> {
        let previous = std::mem::replace(&mut self.value, value);
        if let Err(err) = self.validate() {
            self.value = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn min(&self) -> f64 {
        self.bounds.min
    }

    pub fn max(&self) -> f64 {
        self.bounds.max
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Fix or release the parameter. Releasing re-checks the bounds.
    pub fn set_fixed(&mut self, fixed: bool) -> Result<(), ParameterError> {
        let previous = std::mem::replace(&mut self.fixed, fixed);
        if let Err(err) = self.validate() {
            self.fixed = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Standard error from the last fit, if one was computed.
    pub fn stderr(&self) -> Option<f64> {
        self.stderr
    }

    pub fn set_stderr(&mut self, stderr: Option<f64>) {
        self.stderr = stderr;
    }

    pub(crate) fn transform(&self) -> BoundsTransform {
        BoundsTransform::new(self.bounds)
    }

    /// Internal optimizer coordinate of the current value.
    pub(crate) fn internal_value(&self) -> Result<f64, ParameterError> {
        self.transform()
            .to_internal(self.value)
            .map_err(|source| ParameterError::Bounds {
                name: self.name.clone(),
                source,
            })
    }
}

/// Serialized form of a [`Parameter`]; infinite bounds are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ParameterSpec {
    name: String,
    value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
    #[serde(default)]
    fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stderr: Option<f64>,
}

impl TryFrom<ParameterSpec> for Parameter {
    type Error = ParameterError;

    fn try_from(spec: ParameterSpec) -> Result<Self, Self::Error> {
        let bounds =
            Bounds::from_options(spec.min, spec.max).map_err(|source| ParameterError::Bounds {
                name: spec.name.clone(),
                source,
            })?;
        let param = Parameter {
            name: spec.name,
            value: spec.value,
            bounds,
            fixed: spec.fixed,
            stderr: spec.stderr,
        };
        param.validate()?;
        Ok(param)
    }
}

impl From<Parameter> for ParameterSpec {
    fn from(param: Parameter) -> Self {
        ParameterSpec {
            min: param.bounds.lower(),
            max: param.bounds.upper(),
            name: param.name,
            value: param.value,
            fixed: param.fixed,
            stderr: param.stderr,
        }
    }
}
