//! Transform trait and parameter definitions
//!
//! Every effect resolves to one [`TransformParams`] value, which builds a
//! [`Transform`]. Transforms are pure: they read one buffer and return a new
//! one, so any number may run in parallel.

use serde::{Deserialize, Serialize};

use crate::codec::SampleBuffer;
use crate::config::StretchSettings;
use crate::dsp::pitch::{PitchShiftCompressor, PitchShifter};
use crate::dsp::ring_mod::RingModulator;
use crate::dsp::stretch::TimeStretcher;
use crate::error::{Result, VoxError};

/// A deterministic buffer-to-buffer signal transform
pub trait Transform: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Produce the transformed buffer
    ///
    /// Implementations may assume a non-empty input; the pipeline rejects
    /// empty buffers before calling.
    fn apply(&self, buffer: &SampleBuffer) -> Result<SampleBuffer>;
}

/// Parameters of the transform an effect maps to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transform", rename_all = "snake_case")]
pub enum TransformParams {
    /// Amplitude modulation by a sine carrier
    RingModulation { carrier_hz: f64, depth: f64 },
    /// Pitch shift with the input duration preserved
    PitchShift { semitone_shift: f64 },
    /// Pitch shift with output duration scaled by `stretch_ratio`
    PitchShiftCompress {
        semitone_shift: f64,
        stretch_ratio: f64,
    },
}

impl TransformParams {
    pub fn carrier_hz(&self) -> Option<f64> {
        match self {
            TransformParams::RingModulation { carrier_hz, .. } => Some(*carrier_hz),
            _ => None,
        }
    }

    pub fn modulation_depth(&self) -> Option<f64> {
        match self {
            TransformParams::RingModulation { depth, .. } => Some(*depth),
            _ => None,
        }
    }

    pub fn semitone_shift(&self) -> Option<f64> {
        match self {
            TransformParams::PitchShift { semitone_shift }
            | TransformParams::PitchShiftCompress { semitone_shift, .. } => Some(*semitone_shift),
            TransformParams::RingModulation { .. } => None,
        }
    }

    pub fn stretch_ratio(&self) -> Option<f64> {
        match self {
            TransformParams::PitchShiftCompress { stretch_ratio, .. } => Some(*stretch_ratio),
            _ => None,
        }
    }

    /// Check the values independently of any buffer
    ///
    /// Rate-dependent checks (a shift driving the virtual sample rate to zero)
    /// happen when the transform runs.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(VoxError::InvalidParameters { reason });

        match *self {
            TransformParams::RingModulation { carrier_hz, depth } => {
                if !carrier_hz.is_finite() || carrier_hz < 0.0 {
                    return invalid(format!("carrier frequency {} Hz", carrier_hz));
                }
                if !depth.is_finite() || depth < 0.0 {
                    return invalid(format!("modulation depth {}", depth));
                }
            }
            TransformParams::PitchShift { semitone_shift } => {
                if !semitone_shift.is_finite() {
                    return invalid(format!("semitone shift {}", semitone_shift));
                }
            }
            TransformParams::PitchShiftCompress {
                semitone_shift,
                stretch_ratio,
            } => {
                if !semitone_shift.is_finite() {
                    return invalid(format!("semitone shift {}", semitone_shift));
                }
                if !stretch_ratio.is_finite() || stretch_ratio <= 0.0 {
                    return invalid(format!("stretch ratio {}", stretch_ratio));
                }
            }
        }
        Ok(())
    }

    /// Build the transform these parameters describe
    pub fn build(&self, stretch: &StretchSettings) -> Result<Box<dyn Transform>> {
        self.validate()?;

        let transform: Box<dyn Transform> = match *self {
            TransformParams::RingModulation { carrier_hz, depth } => {
                Box::new(RingModulator::new(carrier_hz, depth))
            }
            TransformParams::PitchShift { semitone_shift } => Box::new(PitchShifter::new(
                semitone_shift,
                TimeStretcher::new(stretch)?,
            )),
            TransformParams::PitchShiftCompress {
                semitone_shift,
                stretch_ratio,
            } => Box::new(PitchShiftCompressor::new(
                semitone_shift,
                stretch_ratio,
                TimeStretcher::new(stretch)?,
            )),
        };

        Ok(transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_parameter_view() {
        let params = TransformParams::PitchShiftCompress {
            semitone_shift: 10.0,
            stretch_ratio: 0.85,
        };
        assert_eq!(params.semitone_shift(), Some(10.0));
        assert_eq!(params.stretch_ratio(), Some(0.85));
        assert_eq!(params.carrier_hz(), None);
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        assert!(TransformParams::PitchShift {
            semitone_shift: f64::NAN
        }
        .validate()
        .is_err());
        assert!(TransformParams::RingModulation {
            carrier_hz: -1.0,
            depth: 1.0
        }
        .validate()
        .is_err());
        assert!(TransformParams::PitchShiftCompress {
            semitone_shift: 3.0,
            stretch_ratio: -0.5
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(TransformParams::RingModulation {
            carrier_hz: 30.0,
            depth: 1.0,
        })
        .unwrap();
        assert_eq!(json["transform"], "ring_modulation");
        assert_eq!(json["carrier_hz"], 30.0);
    }
}
