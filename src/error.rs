/// Error returned from the periodic and microlensing fitters
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FitError {
    #[error("period must be positive and finite, got {0}")]
    InvalidPeriod(f64),

    #[error("harmonic term count {actual} exceeds the maximum {maximum}")]
    TooManyTerms { actual: usize, maximum: usize },

    #[error("no passband has the minimum of {minimum} valid observations")]
    InsufficientData { minimum: usize },

    #[error("fit failed to converge: {0}")]
    NonConvergence(&'static str),
}

/// Error returned from DC calibration
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("no nearby reference source, DC calibration is undefined")]
    MissingReference,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SortedArrayError {
    #[error("SortedArray constructors accept sorted arrays only")]
    Unsorted,
}
