#![doc = include_str!("../README.md")]

mod calibration;
pub use calibration::{
    dc_flux, dc_mag, flux_to_mag, is_source_behind, mag_to_flux, CalibrationMode,
};

mod cutout;
pub use cutout::{convolve, data_stretch, Kernel, Stretch, StretchConfig};

mod data;
pub use data::{BandSeries, CalibratedCurve, CalibratedPoint, LightCurve, PhotometryRecord};

mod error;
pub use error::{CalibrationError, FitError, SortedArrayError};

mod microlensing;
pub use microlensing::{pspl_magnification, MicrolensingFit, MicrolensingFitResult};

pub mod nl_fit;
pub use nl_fit::{CurveFitResult, DifferentialEvolution, Minimum};

mod passband;
pub use passband::Passband;

mod periodic;
pub use periodic::{BandPhaseCurve, PeriodicFit, PeriodicFitConfig, PeriodicFitResult};

pub mod periodogram;
pub use periodogram::{MultibandPeriodogram, PeriodSearchConfig};

mod sorted_array;
pub use sorted_array::SortedArray;

pub mod time;
pub use time::{jd_to_iso, phase};

pub use ndarray;
