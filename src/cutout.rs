//! Cutout display normalization: percentile clipping, intensity stretch and
//! optional smoothing of raw pixel grids.
//!
//! Raw difference and science cutouts have a handful of very bright pixels
//! and plenty of NaNs; plotting them directly shows nothing. The stretch
//! clips the pixel histogram to an asymmetric percentile interval, maps it
//! through a linear or asinh curve and quantizes to 8 bits for rendering.

use crate::sorted_array::SortedArray;

use ndarray::{Array2, ArrayView2};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Intensity mapping applied after percentile normalization.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Stretch {
    Linear,
    /// `asinh(x / a) / asinh(1 / a)` on the normalized intensity; small `a`
    /// compresses the bright end harder
    Asinh { a: f64 },
}

impl Stretch {
    pub const DEFAULT_ASINH_A: f64 = 0.1;

    #[inline]
    fn apply(self, x: f64) -> f64 {
        match self {
            Self::Linear => x,
            Self::Asinh { a } => (x / a).asinh() / (1.0 / a).asinh(),
        }
    }
}

/// Clipping interval and stretch choice for [`data_stretch`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StretchConfig {
    /// Lower clip value; computed from `pmin` when absent
    pub vmin: Option<f64>,
    /// Upper clip value; computed from `pmax` when absent
    pub vmax: Option<f64>,
    /// Lower percentile, percent
    pub pmin: f64,
    /// Upper percentile, percent
    pub pmax: f64,
    pub stretch: Stretch,
}

impl Default for StretchConfig {
    fn default() -> Self {
        Self {
            vmin: None,
            vmax: None,
            pmin: 0.25,
            pmax: 99.75,
            stretch: Stretch::Linear,
        }
    }
}

/// Map a raw pixel grid to 8-bit display values.
///
/// Non-finite pixels never enter the statistics and end up at the bottom of
/// the output range. An image with no finite pixel at all comes out as all
/// zeros.
pub fn data_stretch(image: ArrayView2<'_, f64>, config: &StretchConfig) -> Array2<u8> {
    let valid: SortedArray = image
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect::<Vec<_>>()
        .into();
    let (vmin, vmax) = if valid.is_empty() {
        (0.0, 0.0)
    } else {
        (
            config.vmin.unwrap_or_else(|| valid.ppf(config.pmin / 100.0)),
            config.vmax.unwrap_or_else(|| valid.ppf(config.pmax / 100.0)),
        )
    };
    let range = vmax - vmin;

    image.mapv(|v| {
        let v = if v.is_finite() { v } else { vmin };
        let normalized = if range > 0.0 {
            ((v - vmin) / range).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (config.stretch.apply(normalized) * 255.0).round().clamp(0.0, 255.0) as u8
    })
}

/// Smoothing kernel for [`convolve`]; `smooth` is the Gaussian sigma or the
/// box half-width, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Kernel {
    Gauss { smooth: f64 },
    Box { smooth: usize },
}

impl Kernel {
    fn weights(&self) -> Vec<f64> {
        match *self {
            Self::Gauss { smooth } => {
                let radius = (4.0 * smooth).ceil().max(1.0) as i64;
                (-radius..=radius)
                    .map(|i| (-0.5 * (i as f64 / smooth).powi(2)).exp())
                    .collect()
            }
            Self::Box { smooth } => vec![1.0; 2 * smooth + 1],
        }
    }
}

/// Separable 2D convolution with edge-extend boundaries.
///
/// NaN pixels are interpolated over: each output pixel is the weighted mean
/// of the finite pixels under the kernel, and stays NaN only when the whole
/// neighbourhood is NaN.
pub fn convolve(image: ArrayView2<'_, f64>, kernel: &Kernel) -> Array2<f64> {
    let weights = kernel.weights();
    let radius = (weights.len() / 2) as i64;
    let (rows, cols) = image.dim();
    let (rows_i, cols_i) = (rows as i64, cols as i64);

    let mut out = Array2::zeros((rows, cols));
    for r in 0..rows_i {
        for c in 0..cols_i {
            let mut acc = 0.0;
            let mut norm = 0.0;
            for (di, &wr) in weights.iter().enumerate() {
                let rr = (r + di as i64 - radius).clamp(0, rows_i - 1) as usize;
                for (dj, &wc) in weights.iter().enumerate() {
                    let cc = (c + dj as i64 - radius).clamp(0, cols_i - 1) as usize;
                    let v = image[(rr, cc)];
                    if v.is_finite() {
                        let w = wr * wc;
                        acc += w * v;
                        norm += w;
                    }
                }
            }
            out[(r as usize, c as usize)] = if norm > 0.0 { acc / norm } else { f64::NAN };
        }
    }
    out
}
