use crate::passband::Passband;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One photometry row: a single detection of one source at one epoch.
///
/// Records are immutable once built; calibration derives new values without
/// touching the raw fields, so every calibrated point stays traceable to its
/// input row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PhotometryRecord {
    /// Observation epoch, Julian Date
    pub jd: f64,
    pub band: Passband,
    /// Difference-image PSF magnitude
    pub mag_psf: f64,
    /// 1-sigma uncertainty of `mag_psf`
    pub sigma_psf: f64,
    /// Magnitude of the nearest reference source, `None` when no source is
    /// close enough to the detection
    pub mag_nr: Option<f64>,
    /// 1-sigma uncertainty of `mag_nr`
    pub sigma_nr: Option<f64>,
    /// Photometric zero-point of the science image
    pub magzp_sci: f64,
    /// Whether the difference flux is positive (source brighter than the
    /// reference image) or negative
    pub is_diff_pos: bool,
}

impl PhotometryRecord {
    /// Build a record, normalizing NaN reference values to "absent".
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jd: f64,
        band: Passband,
        mag_psf: f64,
        sigma_psf: f64,
        mag_nr: Option<f64>,
        sigma_nr: Option<f64>,
        magzp_sci: f64,
        is_diff_pos: bool,
    ) -> Self {
        assert!(jd > 0.0, "Julian Date must be strictly positive");
        Self {
            jd,
            band,
            mag_psf,
            sigma_psf,
            mag_nr: mag_nr.filter(|x| x.is_finite()),
            sigma_nr: sigma_nr.filter(|x| x.is_finite()),
            magzp_sci,
            is_diff_pos,
        }
    }

    /// Parse the sign token used by the alert stream for `is_diff_pos`.
    pub fn parse_diff_pos(token: &str) -> Option<bool> {
        match token {
            "t" | "T" | "1" => Some(true),
            "f" | "F" | "0" => Some(false),
            _ => None,
        }
    }

    /// True when both the reference magnitude and its uncertainty are known,
    /// i.e. DC calibration is defined for this record.
    pub fn has_reference(&self) -> bool {
        self.mag_nr.is_some() && self.sigma_nr.is_some()
    }

    /// True when the measurement is an upper limit: no magnitude was measured
    /// at this epoch.
    pub fn is_upper_limit(&self) -> bool {
        !self.mag_psf.is_finite()
    }
}
