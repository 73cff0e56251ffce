//! Parameter bounds and the Minuit-style bounds transformation.
//!
//! The optimizer works on unbounded internal coordinates. Every candidate it
//! proposes is mapped back through [`BoundsTransform::to_external`], so kinetic
//! parameters handed to the simulator always lie inside their bounds.

use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must not exceed max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Non-finite parameter value is not allowed")]
    NonFiniteValue,
}

/// Represents the bounds constraints on a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum allowed value for the parameter
    pub min: f64,

    /// Maximum allowed value for the parameter
    pub max: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: NEG_INFINITY,
            max: INFINITY,
        }
    }
}

impl Bounds {
    /// Create new bounds, failing if `min > max` or either side is NaN.
    ///
    /// # Examples
    ///
    /// ```
    /// use fedbatch_fit::parameters::Bounds;
    ///
    /// let bounds = Bounds::new(1e-4, 1.0).unwrap();
    /// assert_eq!(bounds.max, 1.0);
    /// assert!(Bounds::new(1.0, 0.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// Bounds from optional limits; a missing limit is infinite.
    pub fn from_options(min: Option<f64>, max: Option<f64>) -> Result<Self, BoundsError> {
        Self::new(min.unwrap_or(NEG_INFINITY), max.unwrap_or(INFINITY))
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn min_only(min: f64) -> Self {
        Self {
            min,
            max: INFINITY,
        }
    }

    pub fn max_only(max: f64) -> Self {
        Self {
            min: NEG_INFINITY,
            max,
        }
    }

    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    /// Lower limit as an option, `None` when unbounded below.
    pub fn lower(&self) -> Option<f64> {
        self.has_lower_bound().then_some(self.min)
    }

    /// Upper limit as an option, `None` when unbounded above.
    pub fn upper(&self) -> Option<f64> {
        self.has_upper_bound().then_some(self.max)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Minuit-style transformation between bounded external values and
/// unbounded internal values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    /// Map an internal (optimizer) value to an external value inside the bounds.
    pub fn to_external(&self, internal_value: f64) -> f64 {
        let b = &self.bounds;
        let external = match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => internal_value,
            (true, false) => b.min - 1.0 + (internal_value * internal_value + 1.0).sqrt(),
            (false, true) => b.max + 1.0 - (internal_value * internal_value + 1.0).sqrt(),
            (true, true) => b.min + (internal_value.sin() + 1.0) * (b.max - b.min) / 2.0,
        };
        // Rounding can land one ulp outside
        b.clamp(external)
    }

    /// Map an external value to the internal coordinate.
    ///
    /// Fails if the value is non-finite or outside the bounds.
    pub fn to_internal(&self, external_value: f64) -> Result<f64, BoundsError> {
        if !external_value.is_finite() {
            return Err(BoundsError::NonFiniteValue);
        }

        let b = &self.bounds;
        if !b.is_within_bounds(external_value) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external_value,
                min: b.min,
                max: b.max,
            });
        }

        let internal = match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => external_value,
            (true, false) => ((external_value - b.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((b.max - external_value + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                let scaled = 2.0 * (external_value - b.min) / (b.max - b.min) - 1.0;
                // Degenerate bounds (min == max) give NaN here
                if scaled.is_nan() {
                    0.0
                } else {
                    scaled.clamp(-1.0, 1.0).asin()
                }
            }
        };

        Ok(internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounds_creation() {
        let bounds = Bounds::new(0.0, 10.0).unwrap();
        assert_eq!(bounds.min, 0.0);
        assert_eq!(bounds.max, 10.0);

        assert!(Bounds::new(10.0, 0.0).is_err());
        assert!(Bounds::new(f64::NAN, 0.0).is_err());

        let bounds = Bounds::from_options(Some(1e-4), None).unwrap();
        assert_eq!(bounds, Bounds::min_only(1e-4));
        assert_eq!(bounds.lower(), Some(1e-4));
        assert_eq!(bounds.upper(), None);
    }

    #[test]
    fn test_is_within_bounds() {
        let bounds = Bounds::new(0.0, 10.0).unwrap();

        assert!(bounds.is_within_bounds(0.0));
        assert!(bounds.is_within_bounds(10.0));
        assert!(!bounds.is_within_bounds(-1.0));
        assert!(!bounds.is_within_bounds(11.0));
        assert!(!bounds.is_within_bounds(f64::NAN));
    }

    #[test]
    fn test_transform_round_trip() {
        let cases = [
            Bounds::unbounded(),
            Bounds::min_only(1e-4),
            Bounds::max_only(5.0),
            Bounds::new(1e-4, 1.0).unwrap(),
        ];

        for bounds in cases {
            let transform = BoundsTransform::new(bounds);
            for internal in [0.1, 0.5, 1.2] {
                let external = transform.to_external(internal);
                assert!(bounds.is_within_bounds(external));
                let back = transform.to_internal(external).unwrap();
                assert_relative_eq!(back, internal, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_transform_keeps_any_internal_value_inside() {
        let bounds = Bounds::new(1e-4, 1.0).unwrap();
        let transform = BoundsTransform::new(bounds);
        for internal in [-1e6, -3.0, 0.0, 2.0, 1e6] {
            assert!(bounds.is_within_bounds(transform.to_external(internal)));
        }
    }

    #[test]
    fn test_transform_errors() {
        let transform = BoundsTransform::new(Bounds::new(0.0, 10.0).unwrap());

        assert!(transform.to_internal(-1.0).is_err());
        assert!(transform.to_internal(11.0).is_err());
        assert_eq!(
            transform.to_internal(f64::INFINITY),
            Err(BoundsError::NonFiniteValue)
        );
    }
}
