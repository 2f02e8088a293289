//! Linear raw-to-engineering scaling shared by the read and write paths.

use scada_core::ScadaError;

/// A register mapping's scaling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    /// Minimum raw register value the scaling range covers.
    pub raw_min: f64,
    /// Maximum raw register value the scaling range covers.
    pub raw_max: f64,
    /// Engineering value corresponding to `raw_min`.
    pub eng_min: f64,
    /// Engineering value corresponding to `raw_max`.
    pub eng_max: f64,
    /// Fixed additive offset applied after scaling.
    pub offset: f64,
}

impl Scale {
    /// The identity scale: raw values pass through unchanged.
    pub fn identity() -> Self {
        Scale {
            raw_min: 0.0,
            raw_max: 1.0,
            eng_min: 0.0,
            eng_max: 1.0,
            offset: 0.0,
        }
    }

    /// Convert a raw register value to engineering units.
    pub fn to_engineering(&self, raw: f64) -> Result<f64, ScadaError> {
        let span = self.raw_max - self.raw_min;
        if span == 0.0 {
            return Err(ScadaError::InvalidParam(
                "scale has a zero raw range (raw_min == raw_max)".into(),
            ));
        }
        let fraction = (raw - self.raw_min) / span;
        Ok(fraction * (self.eng_max - self.eng_min) + self.eng_min + self.offset)
    }

    /// Convert an engineering value back to a raw register value, the
    /// inverse of [`Scale::to_engineering`].
    pub fn to_raw(&self, eng: f64) -> Result<f64, ScadaError> {
        let eng_span = self.eng_max - self.eng_min;
        if eng_span == 0.0 {
            return Err(ScadaError::InvalidParam(
                "scale has a zero engineering range (eng_min == eng_max)".into(),
            ));
        }
        let fraction = (eng - self.offset - self.eng_min) / eng_span;
        Ok(fraction * (self.raw_max - self.raw_min) + self.raw_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_0_to_100_scaled_to_eng_0_to_1_round_trips_midpoint() {
        let scale = Scale {
            raw_min: 0.0,
            raw_max: 100.0,
            eng_min: 0.0,
            eng_max: 1.0,
            offset: 0.0,
        };
        let eng = scale.to_engineering(50.0).unwrap();
        assert!((eng - 0.5).abs() < 1e-9);
        let raw = scale.to_raw(eng).unwrap();
        assert!((raw - 50.0).abs() < 1e-9);
    }

    #[test]
    fn zero_raw_range_is_rejected() {
        let scale = Scale {
            raw_min: 10.0,
            raw_max: 10.0,
            eng_min: 0.0,
            eng_max: 1.0,
            offset: 0.0,
        };
        assert!(scale.to_engineering(10.0).is_err());
    }

    #[test]
    fn offset_is_applied_additively() {
        let scale = Scale {
            raw_min: 0.0,
            raw_max: 10.0,
            eng_min: 0.0,
            eng_max: 10.0,
            offset: 5.0,
        };
        assert!((scale.to_engineering(0.0).unwrap() - 5.0).abs() < 1e-9);
    }
}
