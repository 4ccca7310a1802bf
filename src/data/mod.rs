mod light_curve;
pub use light_curve::{BandSeries, CalibratedCurve, CalibratedPoint, LightCurve};

mod record;
pub use record::PhotometryRecord;
