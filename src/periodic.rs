//! Periodic signal fitter: period search plus folded phase curves.
//!
//! Wraps the multiband periodogram of [`crate::periodogram`] into the shape
//! the dashboard plots: per band, the observed points folded at the chosen
//! period and a smooth model curve sampled on a uniform phase grid.

use crate::data::{BandSeries, CalibratedCurve};
use crate::error::FitError;
use crate::passband::Passband;
use crate::periodogram::{MultibandPeriodogram, PeriodSearchConfig};
use crate::time::phase;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of model samples per band, uniform in phase over `[0, period)`
pub const MODEL_SAMPLES: usize = 100;

/// User-facing fitter configuration.
///
/// `fixed_period` skips the period search entirely; the value is validated
/// here, once, so the fit itself never sees a non-positive or non-finite
/// period.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PeriodicFitConfig {
    /// Harmonic terms shared between bands
    pub n_terms_base: usize,
    /// Additional harmonic terms per band
    pub n_terms_band: usize,
    /// Fold at this period instead of searching
    pub fixed_period: Option<f64>,
    pub search: PeriodSearchConfig,
}

impl Default for PeriodicFitConfig {
    fn default() -> Self {
        Self {
            n_terms_base: 1,
            n_terms_band: 1,
            fixed_period: None,
            search: PeriodSearchConfig::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PeriodicFit {
    config: PeriodicFitConfig,
    periodogram: MultibandPeriodogram,
}

impl PeriodicFit {
    /// Validate the configuration up front; term counts and the manual
    /// period are rejected here, before any data is touched.
    pub fn new(config: PeriodicFitConfig) -> Result<Self, FitError> {
        if let Some(period) = config.fixed_period {
            if !(period > 0.0 && period.is_finite()) {
                return Err(FitError::InvalidPeriod(period));
            }
        }
        let periodogram = MultibandPeriodogram::new(config.n_terms_base, config.n_terms_band)?;
        Ok(Self {
            config,
            periodogram,
        })
    }

    /// Fit the harmonic model and fold the data.
    ///
    /// Bands with no valid points are omitted from the result; a curve with
    /// no valid points in any band is a fit failure.
    pub fn fit(&self, curve: &CalibratedCurve) -> Result<PeriodicFitResult, FitError> {
        let bands: Vec<(Passband, BandSeries)> = Passband::ALL
            .iter()
            .map(|&band| (band, curve.band_series(band)))
            .filter(|(_, series)| !series.is_empty())
            .collect();
        let band_refs: Vec<(Passband, &BandSeries)> =
            bands.iter().map(|(b, s)| (*b, s)).collect();

        let period = match self.config.fixed_period {
            Some(period) => period,
            None => self.periodogram.best_period(&band_refs, &self.config.search)?,
        };
        let model = self.periodogram.fit_at_period(&band_refs, period)?;

        let folded = bands
            .iter()
            .map(|(band, series)| {
                let observed = series
                    .t
                    .iter()
                    .zip(series.m.iter())
                    .map(|(&t, &m)| (phase(t, period), m))
                    .collect();
                let model_curve = (0..MODEL_SAMPLES)
                    .map(|i| {
                        let ph = period * i as f64 / MODEL_SAMPLES as f64;
                        // every band folded here also entered the fit
                        (ph, model.predict(*band, ph).expect("band was fitted"))
                    })
                    .collect();
                (
                    *band,
                    BandPhaseCurve {
                        observed,
                        model: model_curve,
                    },
                )
            })
            .collect();

        Ok(PeriodicFitResult {
            period,
            bands: folded,
        })
    }
}

/// Folded observations and the sampled harmonic model for one band.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct BandPhaseCurve {
    /// `(phase, magnitude)` of each valid observation, phase in `[0, period)`
    pub observed: Vec<(f64, f64)>,
    /// [`MODEL_SAMPLES`] model points uniform in phase over `[0, period)`
    pub model: Vec<(f64, f64)>,
}

/// Chosen period and per-band phase curves.
///
/// With `fixed_period` set, `period` echoes the input exactly.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct PeriodicFitResult {
    pub period: f64,
    pub bands: BTreeMap<Passband, BandPhaseCurve>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::calibration::CalibrationMode;
    use crate::data::CalibratedPoint;
    use approx::assert_relative_eq;
    use rand::prelude::*;
    use std::f64::consts::TAU;

    fn sinusoid_curve(period: f64, bands: &[(Passband, f64)], n_per_band: usize) -> CalibratedCurve {
        let mut rng = StdRng::seed_from_u64(0);
        let mut points = Vec::with_capacity(bands.len() * n_per_band);
        for &(band, mean_mag) in bands {
            for _ in 0..n_per_band {
                let t = 2459000.5 + 30.0 * rng.random::<f64>();
                points.push(CalibratedPoint {
                    jd: t,
                    band,
                    value: mean_mag + 0.3 * (TAU / period * t).sin(),
                    sigma: 0.02,
                });
            }
        }
        CalibratedCurve::from_points(CalibrationMode::Dc, points)
    }

    #[test]
    fn recovers_period_of_two_band_sinusoid() {
        const PERIOD: f64 = 0.62;

        let curve = sinusoid_curve(PERIOD, &[(Passband::G, 17.0), (Passband::R, 16.5)], 80);
        let fit = PeriodicFit::new(PeriodicFitConfig::default()).unwrap();
        let result = fit.fit(&curve).unwrap();
        assert_relative_eq!(result.period, PERIOD, max_relative = 1e-2);
        assert_eq!(result.bands.len(), 2);
    }

    #[test]
    fn fixed_period_is_echoed_and_model_has_hundred_samples() {
        const PERIOD: f64 = 0.777;

        let curve = sinusoid_curve(PERIOD, &[(Passband::G, 17.0), (Passband::R, 16.5)], 40);
        let config = PeriodicFitConfig {
            fixed_period: Some(PERIOD),
            ..Default::default()
        };
        let result = PeriodicFit::new(config).unwrap().fit(&curve).unwrap();

        assert_eq!(result.period, PERIOD);
        for curve in result.bands.values() {
            assert_eq!(curve.model.len(), MODEL_SAMPLES);
            for (i, &(ph, m)) in curve.model.iter().enumerate() {
                assert_relative_eq!(ph, PERIOD * i as f64 / MODEL_SAMPLES as f64);
                assert!(m.is_finite());
            }
        }
    }

    #[test]
    fn folded_phases_lie_in_period_interval() {
        const PERIOD: f64 = 0.5;

        let curve = sinusoid_curve(PERIOD, &[(Passband::G, 17.0)], 50);
        let config = PeriodicFitConfig {
            fixed_period: Some(PERIOD),
            ..Default::default()
        };
        let result = PeriodicFit::new(config).unwrap().fit(&curve).unwrap();
        for &(ph, _) in &result.bands[&Passband::G].observed {
            assert!((0.0..PERIOD).contains(&ph), "phase {ph}");
        }
    }

    #[test]
    fn model_follows_observations() {
        const PERIOD: f64 = 0.62;

        let curve = sinusoid_curve(PERIOD, &[(Passband::G, 17.0)], 100);
        let config = PeriodicFitConfig {
            fixed_period: Some(PERIOD),
            ..Default::default()
        };
        let result = PeriodicFit::new(config).unwrap().fit(&curve).unwrap();

        // noiseless sinusoid: the one-term model must interpolate it
        let band = &result.bands[&Passband::G];
        let model_at = |ph: f64| {
            band.model
                .iter()
                .min_by(|a, b| {
                    (a.0 - ph).abs().partial_cmp(&(b.0 - ph).abs()).unwrap()
                })
                .unwrap()
                .1
        };
        for &(ph, m) in band.observed.iter().take(20) {
            assert_relative_eq!(model_at(ph), m, epsilon = 0.05);
        }
    }

    #[test]
    fn empty_band_is_omitted() {
        const PERIOD: f64 = 0.5;

        let curve = sinusoid_curve(PERIOD, &[(Passband::G, 17.0)], 30);
        let config = PeriodicFitConfig {
            fixed_period: Some(PERIOD),
            ..Default::default()
        };
        let result = PeriodicFit::new(config).unwrap().fit(&curve).unwrap();
        assert!(result.bands.contains_key(&Passband::G));
        assert!(!result.bands.contains_key(&Passband::R));
    }

    #[test]
    fn bad_configs_are_rejected_before_fitting() {
        let config = PeriodicFitConfig {
            fixed_period: Some(-0.5),
            ..Default::default()
        };
        assert_eq!(
            PeriodicFit::new(config).unwrap_err(),
            FitError::InvalidPeriod(-0.5)
        );

        let config = PeriodicFitConfig {
            n_terms_base: 20,
            ..Default::default()
        };
        assert!(matches!(
            PeriodicFit::new(config).unwrap_err(),
            FitError::TooManyTerms { actual: 20, .. }
        ));
    }

    #[test]
    fn empty_curve_is_a_fit_failure() {
        let curve = CalibratedCurve::from_points(CalibrationMode::Dc, vec![]);
        let fit = PeriodicFit::new(PeriodicFitConfig::default()).unwrap();
        assert!(fit.fit(&curve).is_err());
    }
}
