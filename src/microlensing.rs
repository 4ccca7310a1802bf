//! Single-lens point-source (PSPL) microlensing fit.
//!
//! The model is the Paczynski magnification curve: a point lens crossing in
//! front of a point source brightens it by
//! `A(u) = (u^2 + 2) / (u * sqrt(u^2 + 4))` with
//! `u(t) = sqrt(u0^2 + ((t - t0) / tE)^2)`. The event geometry `t0`, `tE`,
//! `u0` is shared between passbands; each band has its own baseline
//! magnitude. All four-plus parameters are fitted jointly by differential
//! evolution over the calibrated magnitudes.

use crate::data::{BandSeries, CalibratedCurve};
use crate::error::FitError;
use crate::nl_fit::{CurveFitResult, DifferentialEvolution};
use crate::passband::Passband;

use log::debug;
use ndarray_stats::QuantileExt;
use std::collections::BTreeMap;

/// Points brighter than this are treated as photometric artifacts and masked
pub const BRIGHT_OUTLIER_MAG: f64 = 12.0;

/// A band must keep at least this many masked-valid points to enter the fit
pub const MIN_POINTS_PER_BAND: usize = 4;

/// Shared geometry parameters plus one baseline per band; the per-band
/// degrees of freedom subtract this many
const N_MODEL_PARAMS: usize = 4;

const T0_MARGIN_DAYS: f64 = 50.0;
const TE_RANGE_DAYS: (f64, f64) = (1.0, 500.0);
const U0_RANGE: (f64, f64) = (1e-4, 2.0);
const MAG_STAR_MARGIN: f64 = 2.0;

/// Paczynski point-lens magnification at time `t`.
#[inline]
pub fn pspl_magnification(t: f64, t0: f64, te: f64, u0: f64) -> f64 {
    let u2 = u0 * u0 + ((t - t0) / te).powi(2);
    (u2 + 2.0) / (u2 * (u2 + 4.0)).sqrt()
}

#[inline]
fn pspl_mag(t: f64, t0: f64, te: f64, u0: f64, mag_star: f64) -> f64 {
    mag_star - 2.5 * pspl_magnification(t, t0, te, u0).log10()
}

/// Joint PSPL fit over all passbands with enough valid photometry.
#[derive(Clone, Debug, Default)]
pub struct MicrolensingFit {
    optimizer: DifferentialEvolution,
}

impl MicrolensingFit {
    pub fn new(optimizer: DifferentialEvolution) -> Self {
        Self { optimizer }
    }

    /// Fit the magnification curve to calibrated magnitudes.
    ///
    /// Bands with fewer than [`MIN_POINTS_PER_BAND`] valid points are left
    /// out of both the fit and the reported chi-squares. With no qualifying
    /// band at all the optimizer is never invoked and
    /// [`FitError::InsufficientData`] is returned.
    pub fn fit(&self, curve: &CalibratedCurve) -> Result<MicrolensingFitResult, FitError> {
        let bands: Vec<(Passband, BandSeries)> = Passband::ALL
            .iter()
            .map(|&band| (band, masked_series(curve, band)))
            .filter(|(band, series)| {
                let keep = series.len() >= MIN_POINTS_PER_BAND;
                if !keep {
                    debug!(
                        "band {} excluded: {} valid points, need {}",
                        band,
                        series.len(),
                        MIN_POINTS_PER_BAND
                    );
                }
                keep
            })
            .collect();
        if bands.is_empty() {
            return Err(FitError::InsufficientData {
                minimum: MIN_POINTS_PER_BAND,
            });
        }

        // the series are time-sorted, so the span is first-to-last
        let t_min = bands
            .iter()
            .map(|(_, s)| s.t[0])
            .fold(f64::INFINITY, f64::min);
        let t_max = bands
            .iter()
            .map(|(_, s)| s.t[s.len() - 1])
            .fold(f64::NEG_INFINITY, f64::max);

        // parameter order: t0, tE, u0, then one baseline per included band
        let mut bounds = vec![
            (t_min - T0_MARGIN_DAYS, t_max + T0_MARGIN_DAYS),
            TE_RANGE_DAYS,
            U0_RANGE,
        ];
        for (_, series) in &bands {
            // masked series are non-empty and finite, so skipnan cannot panic
            let m_min = *series.m.min_skipnan();
            let m_max = *series.m.max_skipnan();
            bounds.push((m_min - MAG_STAR_MARGIN, m_max + MAG_STAR_MARGIN));
        }

        let objective = |p: &[f64]| {
            let (t0, te, u0) = (p[0], p[1], p[2]);
            bands
                .iter()
                .enumerate()
                .map(|(i, (_, series))| band_chi2(series, t0, te, u0, p[3 + i]))
                .sum::<f64>()
        };
        let minimum = self.optimizer.minimize(objective, &bounds);
        if !minimum.cost.is_finite() {
            return Err(FitError::NonConvergence("objective never became finite"));
        }

        let x = minimum.x;
        let (t0, te, u0) = (x[0], x[1], x[2]);
        let mut mag_star = BTreeMap::new();
        let mut reduced_chi2 = BTreeMap::new();
        for (i, (band, series)) in bands.iter().enumerate() {
            let dof = usize::max(series.len() - N_MODEL_PARAMS, 1);
            mag_star.insert(*band, x[3 + i]);
            reduced_chi2.insert(
                *band,
                band_chi2(series, t0, te, u0, x[3 + i]) / dof as f64,
            );
        }

        let n_points: usize = bands.iter().map(|(_, s)| s.len()).sum();
        let joint_dof = usize::max(n_points.saturating_sub(3 + bands.len()), 1);
        Ok(MicrolensingFitResult {
            t0,
            te,
            u0,
            mag_star,
            reduced_chi2,
            joint: CurveFitResult {
                x,
                reduced_chi2: minimum.cost / joint_dof as f64,
                success: minimum.converged,
            },
        })
    }
}

/// Fitted PSPL parameters and per-band goodness of fit.
#[derive(Clone, Debug)]
pub struct MicrolensingFitResult {
    /// Time of peak magnification, JD
    pub t0: f64,
    /// Einstein-crossing time, days
    pub te: f64,
    /// Impact parameter in Einstein radii
    pub u0: f64,
    /// Baseline magnitude per fitted band
    pub mag_star: BTreeMap<Passband, f64>,
    /// Reduced chi-square per fitted band, over that band's valid points
    pub reduced_chi2: BTreeMap<Passband, f64>,
    /// Raw optimizer output for the joint fit
    pub joint: CurveFitResult,
}

impl MicrolensingFitResult {
    /// Model magnitude for a fitted band at time `t`.
    ///
    /// Returns `None` for bands that were excluded from the fit.
    pub fn model_mag(&self, band: Passband, t: f64) -> Option<f64> {
        self.mag_star
            .get(&band)
            .map(|&mag_star| pspl_mag(t, self.t0, self.te, self.u0, mag_star))
    }
}

/// Valid points of one band: upper limits are already dropped by
/// [`CalibratedCurve::band_series`], bright-end outliers are masked here.
fn masked_series(curve: &CalibratedCurve, band: Passband) -> BandSeries {
    let series = curve.band_series(band);
    let keep: Vec<usize> = series
        .m
        .iter()
        .enumerate()
        .filter(|(_, &m)| m >= BRIGHT_OUTLIER_MAG)
        .map(|(i, _)| i)
        .collect();
    if keep.len() == series.len() {
        return series;
    }
    BandSeries {
        t: keep.iter().map(|&i| series.t[i]).collect(),
        m: keep.iter().map(|&i| series.m[i]).collect(),
        w: keep.iter().map(|&i| series.w[i]).collect(),
    }
}

fn band_chi2(series: &BandSeries, t0: f64, te: f64, u0: f64, mag_star: f64) -> f64 {
    series
        .t
        .iter()
        .zip(series.m.iter())
        .zip(series.w.iter())
        .map(|((&t, &m), &w)| w * (m - pspl_mag(t, t0, te, u0, mag_star)).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::calibration::CalibrationMode;
    use crate::data::CalibratedPoint;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn point(jd: f64, band: Passband, value: f64) -> CalibratedPoint {
        CalibratedPoint {
            jd,
            band,
            value,
            sigma: 0.02,
        }
    }

    fn pspl_curve(
        rng: &mut StdRng,
        n_per_band: usize,
        t0: f64,
        te: f64,
        u0: f64,
        baselines: &[(Passband, f64)],
    ) -> CalibratedCurve {
        let points = baselines
            .iter()
            .flat_map(|&(band, mag_star)| {
                (0..n_per_band).map(move |i| {
                    let t = 100.0 * i as f64 / (n_per_band - 1) as f64;
                    point(t, band, pspl_mag(t, t0, te, u0, mag_star))
                })
            })
            .map(|mut p| {
                p.value += 0.02 * rng.sample::<f64, _>(rand_distr::StandardNormal);
                p
            })
            .collect();
        CalibratedCurve::from_points(CalibrationMode::Dc, points)
    }

    #[test]
    fn magnification_limits() {
        // far from the event the source is unmagnified
        assert_relative_eq!(pspl_magnification(1e6, 0.0, 20.0, 0.5), 1.0, epsilon = 1e-6);
        // at peak with u0 = 1: A = 3 / sqrt(5)
        assert_relative_eq!(
            pspl_magnification(0.0, 0.0, 20.0, 1.0),
            3.0 / 5.0_f64.sqrt(),
            epsilon = 1e-12,
        );
    }

    #[test]
    fn recovers_synthetic_event() {
        let mut rng = StdRng::seed_from_u64(0);
        let curve = pspl_curve(
            &mut rng,
            120,
            50.0,
            20.0,
            0.3,
            &[(Passband::G, 18.0), (Passband::R, 17.4)],
        );

        let fit = MicrolensingFit::new(DifferentialEvolution::new(400, Some(0)));
        let result = fit.fit(&curve).unwrap();

        assert_relative_eq!(result.t0, 50.0, epsilon = 1.0);
        assert_relative_eq!(result.te, 20.0, max_relative = 0.15);
        assert_relative_eq!(result.u0, 0.3, epsilon = 0.05);
        assert_relative_eq!(result.mag_star[&Passband::G], 18.0, epsilon = 0.05);
        assert_relative_eq!(result.mag_star[&Passband::R], 17.4, epsilon = 0.05);
        for &chi2 in result.reduced_chi2.values() {
            assert!(chi2 < 3.0, "reduced chi2 {chi2}");
        }
        assert!(result.joint.success);
    }

    #[test]
    fn band_with_three_points_is_excluded_with_four_included() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut curve = pspl_curve(&mut rng, 40, 50.0, 20.0, 0.3, &[(Passband::G, 18.0)]);
        let mut points = curve.points().to_vec();
        for jd in [10.0, 48.0, 90.0] {
            points.push(point(jd, Passband::R, 17.5));
        }
        curve = CalibratedCurve::from_points(CalibrationMode::Dc, points.clone());

        let fit = MicrolensingFit::new(DifferentialEvolution::new(100, Some(2)));
        let result = fit.fit(&curve).unwrap();
        assert!(!result.mag_star.contains_key(&Passband::R));
        assert!(!result.reduced_chi2.contains_key(&Passband::R));
        assert!(result.model_mag(Passband::R, 50.0).is_none());

        points.push(point(70.0, Passband::R, 17.5));
        curve = CalibratedCurve::from_points(CalibrationMode::Dc, points);
        let result = fit.fit(&curve).unwrap();
        assert!(result.mag_star.contains_key(&Passband::R));
        assert!(result.reduced_chi2.contains_key(&Passband::R));
    }

    #[test]
    fn upper_limits_and_bright_outliers_are_masked() {
        let mut points: Vec<CalibratedPoint> = (0..6)
            .map(|i| point(10.0 * i as f64, Passband::G, 18.0))
            .collect();
        points.push(point(30.0, Passband::G, f64::NAN)); // upper limit
        points.push(point(35.0, Passband::G, 9.0)); // saturated artifact

        let curve = CalibratedCurve::from_points(CalibrationMode::Dc, points);
        let series = masked_series(&curve, Passband::G);
        assert_eq!(series.len(), 6);
        assert!(series.m.iter().all(|&m| m >= BRIGHT_OUTLIER_MAG));
    }

    #[test]
    fn no_qualifying_band_is_insufficient_data() {
        let points = vec![
            point(1.0, Passband::G, 18.0),
            point(2.0, Passband::G, 18.1),
            point(3.0, Passband::R, f64::NAN),
        ];
        let curve = CalibratedCurve::from_points(CalibrationMode::Dc, points);
        let fit = MicrolensingFit::default();
        assert_eq!(
            fit.fit(&curve).unwrap_err(),
            FitError::InsufficientData {
                minimum: MIN_POINTS_PER_BAND
            }
        );
    }

    #[test]
    fn exhausted_budget_is_not_a_success() {
        let mut rng = StdRng::seed_from_u64(5);
        let curve = pspl_curve(&mut rng, 40, 50.0, 20.0, 0.3, &[(Passband::G, 18.0)]);
        // one generation cannot collapse a random population
        let fit = MicrolensingFit::new(DifferentialEvolution::new(1, Some(6)));
        let result = fit.fit(&curve).unwrap();
        assert!(!result.joint.success);
    }

    #[test]
    fn degrees_of_freedom_clamp_at_one() {
        // exactly 4 points in the band: dof would be 0, clamps to 1
        let mut rng = StdRng::seed_from_u64(3);
        let curve = pspl_curve(&mut rng, 4, 50.0, 20.0, 0.3, &[(Passband::G, 18.0)]);
        let fit = MicrolensingFit::new(DifferentialEvolution::new(100, Some(4)));
        let result = fit.fit(&curve).unwrap();
        assert!(result.reduced_chi2[&Passband::G].is_finite());
    }
}
