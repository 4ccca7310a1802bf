use crate::calibration::CalibrationMode;
use crate::data::record::PhotometryRecord;
use crate::passband::Passband;

use itertools::Itertools;
use ndarray::Array1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// All photometry rows of one object, in stream order.
///
/// Built fresh from the upstream store for each display or fit request and
/// never persisted; rows are not assumed to be time-sorted.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct LightCurve {
    object_id: String,
    records: Vec<PhotometryRecord>,
}

impl LightCurve {
    pub fn new(object_id: impl Into<String>, records: Vec<PhotometryRecord>) -> Self {
        Self {
            object_id: object_id.into(),
            records,
        }
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    pub fn records(&self) -> &[PhotometryRecord] {
        &self.records
    }

    /// Calibrate every record under the given mode.
    ///
    /// The raw records are left untouched; the returned curve holds derived
    /// values only.
    pub fn calibrated(&self, mode: CalibrationMode) -> CalibratedCurve {
        let points = self
            .records
            .iter()
            .map(|r| {
                let (value, sigma) = mode.apply(r);
                CalibratedPoint {
                    jd: r.jd,
                    band: r.band,
                    value,
                    sigma,
                }
            })
            .collect();
        CalibratedCurve { mode, points }
    }
}

/// One calibrated observation. `value` is a magnitude under
/// [`CalibrationMode::Difference`] and [`CalibrationMode::Dc`], a flux under
/// [`CalibrationMode::Flux`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema)]
pub struct CalibratedPoint {
    pub jd: f64,
    pub band: Passband,
    pub value: f64,
    pub sigma: f64,
}

/// Calibrated photometry of one object, queryable per passband.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct CalibratedCurve {
    mode: CalibrationMode,
    points: Vec<CalibratedPoint>,
}

impl CalibratedCurve {
    pub fn from_points(mode: CalibrationMode, points: Vec<CalibratedPoint>) -> Self {
        Self { mode, points }
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    pub fn points(&self) -> &[CalibratedPoint] {
        &self.points
    }

    /// Time-sorted arrays of the valid points in one passband.
    ///
    /// Upper limits (NaN value) and unusable uncertainties are dropped here;
    /// the returned series may be empty.
    pub fn band_series(&self, band: Passband) -> BandSeries {
        let (t, m, w): (Vec<_>, Vec<_>, Vec<_>) = self
            .points
            .iter()
            .filter(|p| {
                p.band == band && p.value.is_finite() && p.sigma.is_finite() && p.sigma > 0.0
            })
            .sorted_by(|a, b| a.jd.partial_cmp(&b.jd).unwrap())
            .map(|p| (p.jd, p.value, p.sigma.powi(-2)))
            .multiunzip();
        BandSeries {
            t: t.into(),
            m: m.into(),
            w: w.into(),
        }
    }
}

/// Per-band arrays ready for fitting: time, value and inverse-square-error
/// weight, sorted by time.
#[derive(Clone, Debug)]
pub struct BandSeries {
    pub t: Array1<f64>,
    pub m: Array1<f64>,
    pub w: Array1<f64>,
}

impl BandSeries {
    #[inline]
    pub fn len(&self) -> usize {
        self.t.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}
