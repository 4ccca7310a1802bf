//! Photometric calibration: difference-image magnitudes combined with the
//! reference-source flux into DC ("difference-calibrated") magnitudes or
//! fluxes.

use crate::data::PhotometryRecord;
use crate::error::CalibrationError;

use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// d(flux)/d(mag) factor of the magnitude scale
const FLUX_MAG_SLOPE: f64 = 0.4 * std::f64::consts::LN_10;

/// Angular separation below which the nearest reference source is considered
/// to sit on top of the detection, arcsec. DC calibration is only meaningful
/// in that case.
const REFERENCE_MATCH_RADIUS_ARCSEC: f64 = 1.5;

/// How a raw photometry row is turned into a plottable value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CalibrationMode {
    /// Raw difference-image magnitude, passed through unchanged
    Difference,
    /// DC magnitude: difference flux folded into the reference-source flux
    Dc,
    /// Same combination as [`CalibrationMode::Dc`] but reported as flux
    Flux,
}

/// `flux = 10^(-0.4 (mag - zp))`, the standard zero-point relation.
pub fn mag_to_flux(mag: f64, zp: f64) -> f64 {
    10f64.powf(-0.4 * (mag - zp))
}

/// Inverse of [`mag_to_flux`]; NaN for non-positive flux.
pub fn flux_to_mag(flux: f64, zp: f64) -> f64 {
    zp - 2.5 * flux.log10()
}

/// DC flux and its 1-sigma uncertainty.
///
/// The difference flux is added to (or subtracted from, per `is_diff_pos`)
/// the reference-source flux, both taken through the science zero-point.
/// Uncertainty is first-order propagation of both magnitude errors.
pub fn dc_flux(record: &PhotometryRecord) -> Result<(f64, f64), CalibrationError> {
    let mag_nr = record.mag_nr.ok_or(CalibrationError::MissingReference)?;
    let sigma_nr = record.sigma_nr.ok_or(CalibrationError::MissingReference)?;

    let ref_flux = mag_to_flux(mag_nr, record.magzp_sci);
    let diff_flux = mag_to_flux(record.mag_psf, record.magzp_sci);
    let sign = if record.is_diff_pos { 1.0 } else { -1.0 };

    let flux = ref_flux + sign * diff_flux;
    let sigma = FLUX_MAG_SLOPE
        * f64::hypot(diff_flux * record.sigma_psf, ref_flux * sigma_nr);
    Ok((flux, sigma))
}

/// DC magnitude and its 1-sigma uncertainty.
///
/// Both come out NaN when the combined flux is non-positive (a negative
/// difference deeper than the reference source): the magnitude is undefined
/// there, so the uncertainty is too.
pub fn dc_mag(record: &PhotometryRecord) -> Result<(f64, f64), CalibrationError> {
    let (flux, sigma_flux) = dc_flux(record)?;
    if flux <= 0.0 {
        return Ok((f64::NAN, f64::NAN));
    }
    let mag = flux_to_mag(flux, record.magzp_sci);
    let sigma = sigma_flux / flux / FLUX_MAG_SLOPE;
    Ok((mag, sigma))
}

/// True when the nearest reference source is close enough that the detection
/// sits on top of it, i.e. DC magnitudes describe the total brightness.
pub fn is_source_behind(distnr: f64) -> bool {
    distnr > 0.0 && distnr < REFERENCE_MATCH_RADIUS_ARCSEC
}

impl CalibrationMode {
    /// Calibrated value and uncertainty for one record.
    ///
    /// When the record has no nearby reference source, `Dc` falls back to the
    /// raw difference magnitude and `Flux` to the bare difference flux.
    pub fn apply(&self, record: &PhotometryRecord) -> (f64, f64) {
        match self {
            Self::Difference => (record.mag_psf, record.sigma_psf),
            Self::Dc => dc_mag(record).unwrap_or_else(|_| {
                warn!(
                    "no reference source at jd={}, falling back to difference magnitude",
                    record.jd
                );
                (record.mag_psf, record.sigma_psf)
            }),
            Self::Flux => dc_flux(record).unwrap_or_else(|_| {
                warn!(
                    "no reference source at jd={}, falling back to difference flux",
                    record.jd
                );
                let flux = mag_to_flux(record.mag_psf, record.magzp_sci);
                (flux, FLUX_MAG_SLOPE * flux * record.sigma_psf)
            }),
        }
    }
}
