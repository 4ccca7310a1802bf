//! Nonlinear curve fitting: the optimizer and its result type.

mod curve_fit;
pub use curve_fit::CurveFitResult;

mod differential_evolution;
pub use differential_evolution::{DifferentialEvolution, Minimum};
