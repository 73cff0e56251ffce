//! Numerical helpers shared by the optimizer and the uncertainty estimate.

pub mod finite_difference;

pub use finite_difference::{jacobian_at, jacobian_in_bounds};
