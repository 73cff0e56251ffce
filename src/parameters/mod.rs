//! # Parameter System
//!
//! Named, bounded, fixable scalar parameters for the kinetic model.
//!
//! - [`Parameter`]: a value with optional bounds and a fixed flag
//! - [`ParameterSet`]: an ordered collection with unique names
//! - [`Bounds`] and [`BoundsTransform`]: bounds handling during optimization
//!
//! ## Example Usage
//!
//! ```rust
//! use fedbatch_fit::parameters::ParameterSet;
//!
//! let mut params = ParameterSet::new();
//! params.add_bounded("mumax", 0.5, 1e-4, 1.0).unwrap();
//! params.add_bounded("Yxs", 0.2, 1e-4, 1.0).unwrap();
//! params.add_fixed("Ks", 1.0).unwrap();
//! params.add_bounded("base_coef", 1.0, 1e-4, f64::INFINITY).unwrap();
//!
//! // Only varying parameters reach the optimizer
//! let internal = params.to_internal().unwrap();
//! assert_eq!(internal.len(), 3);
//! ```

pub mod bounds;
pub mod parameter;
pub mod parameter_set;

pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use parameter::{Parameter, ParameterError};
pub use parameter_set::ParameterSet;
