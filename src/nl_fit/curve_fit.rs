/// Result of a nonlinear light-curve fit.
#[derive(Clone, Debug)]
pub struct CurveFitResult {
    /// Best-fit parameter vector, in the order the model defines
    pub x: Vec<f64>,
    /// Chi-square of the best fit divided by the degrees of freedom
    pub reduced_chi2: f64,
    /// Whether the optimizer converged before exhausting its budget
    pub success: bool,
}
