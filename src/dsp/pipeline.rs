//! Transform pipeline
//!
//! Runs the transform an effect maps to, then renormalises the result so
//! the peak never exceeds full scale.

use tracing::{debug, warn};

use crate::codec::SampleBuffer;
use crate::config::StretchSettings;
use crate::dsp::registry::EffectDescriptor;
use crate::error::{Result, VoxError};

/// Transformed buffer plus any non-fatal notes about it
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub buffer: SampleBuffer,
    pub warnings: Vec<String>,
}

/// Stateless driver applying effects to buffers
///
/// Holds only configuration, so a single pipeline can be shared between
/// threads and used for any number of buffers at once.
#[derive(Debug, Clone, Default)]
pub struct TransformPipeline {
    stretch: StretchSettings,
}

impl TransformPipeline {
    pub fn new(stretch: &StretchSettings) -> Self {
        Self {
            stretch: stretch.clone(),
        }
    }

    /// Apply `effect` to `input`
    ///
    /// # Errors
    /// * `InvalidParameters` - Empty input, or parameters the buffer cannot
    ///   support (a shift driving the sample rate to zero)
    /// * `ProcessingFailure` - The transform produced non-finite samples
    pub fn run(&self, input: &SampleBuffer, effect: &EffectDescriptor) -> Result<TransformOutput> {
        if input.is_empty() {
            return Err(VoxError::InvalidParameters {
                reason: "input buffer has no samples".to_string(),
            });
        }

        let transform = effect.parameters.build(&self.stretch)?;
        let mut buffer = transform.apply(input)?;

        debug!(
            transform = transform.name(),
            input_frames = input.num_frames(),
            output_frames = buffer.num_frames(),
            "Transform applied"
        );

        let peak = buffer.peak();
        if !peak.is_finite() {
            return Err(VoxError::ProcessingFailure {
                reason: format!("{} produced non-finite samples", transform.name()),
            });
        }

        let mut warnings = Vec::new();
        if let Some(warning) = normalize_peak(&mut buffer) {
            warn!(effect = effect.id, "{}", warning);
            warnings.push(warning);
        }

        Ok(TransformOutput { buffer, warnings })
    }
}

/// Scale `buffer` down linearly so its peak is at most 1.0
///
/// Quiet buffers are left untouched. Returns a warning if any sample still
/// had to be clamped after scaling.
pub fn normalize_peak(buffer: &mut SampleBuffer) -> Option<String> {
    let peak = buffer.peak();
    if peak.is_nan() || peak <= 1.0 {
        return None;
    }

    let gain = 1.0 / peak;
    let mut clamped = 0usize;
    for channel in buffer.channels_mut() {
        for sample in channel.iter_mut() {
            *sample *= gain;
            if sample.abs() > 1.0 {
                *sample = sample.clamp(-1.0, 1.0);
                clamped += 1;
            }
        }
    }

    debug!(peak, gain, "Output scaled to full scale");

    (clamped > 0).then(|| {
        format!(
            "{} sample(s) still exceeded full scale after normalisation and were clipped",
            clamped
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::registry::EffectRegistry;
    use crate::dsp::transform::TransformParams;
    use crate::error::ErrorKind;
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    fn pipeline() -> TransformPipeline {
        TransformPipeline::new(&StretchSettings::default())
    }

    fn voice() -> SampleBuffer {
        SampleBuffer::sine(180.0, 2.0, 44100, 0.7)
    }

    #[test_case("robotic" ; "robotic")]
    #[test_case("male" ; "male")]
    #[test_case("female" ; "female")]
    fn test_duration_preserving_effects(id: &str) {
        let registry = EffectRegistry::with_defaults();
        let input = voice();
        let output = pipeline().run(&input, registry.resolve(id).unwrap()).unwrap();

        let frame = StretchSettings::default().frame_size;
        let diff = output.buffer.num_frames().abs_diff(input.num_frames());
        assert!(diff <= frame, "{} changed length by {}", id, diff);
        assert!(output.buffer.peak() <= 1.0);
    }

    #[test]
    fn test_robotic_length_is_exact() {
        let registry = EffectRegistry::with_defaults();
        let input = voice();
        let output = pipeline().run(&input, registry.resolve("robotic").unwrap()).unwrap();
        assert_eq!(output.buffer.num_frames(), input.num_frames());
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_baby_duration_follows_ratio() {
        let registry = EffectRegistry::with_defaults();
        let output = pipeline().run(&voice(), registry.resolve("baby").unwrap()).unwrap();
        assert_abs_diff_eq!(output.buffer.duration_secs(), 1.7, epsilon = 1.0 / 44100.0);
    }

    #[test]
    fn test_empty_input_is_invalid() {
        let registry = EffectRegistry::with_defaults();
        let empty = SampleBuffer::new(vec![Vec::new()], 44100).unwrap();
        for effect in registry.list() {
            let err = pipeline().run(&empty, effect).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        }
    }

    #[test]
    fn test_vanishing_rate_is_invalid() {
        let effect = EffectDescriptor {
            id: "male",
            display_name: "Male Voice",
            description: "",
            parameters: TransformParams::PitchShift {
                semitone_shift: -300.0,
            },
        };
        let err = pipeline().run(&voice(), &effect).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    }

    #[test]
    fn test_loud_output_is_scaled_down() {
        let effect = EffectDescriptor {
            id: "robotic",
            display_name: "Robotic Voice",
            description: "",
            parameters: TransformParams::RingModulation {
                carrier_hz: 30.0,
                depth: 3.0,
            },
        };
        let input = SampleBuffer::sine(440.0, 0.5, 8000, 1.0);
        let output = pipeline().run(&input, &effect).unwrap();
        assert!(output.buffer.peak() <= 1.0);
        assert!(output.buffer.peak() > 0.99);
    }

    #[test]
    fn test_normalize_leaves_quiet_buffer_alone() {
        let mut buffer = SampleBuffer::sine(440.0, 0.1, 8000, 0.5);
        let before = buffer.clone();
        assert!(normalize_peak(&mut buffer).is_none());
        assert_eq!(buffer, before);
    }

    #[test]
    fn test_normalize_is_linear() {
        let mut buffer = SampleBuffer::new(vec![vec![2.0, -1.0, 0.5]], 8000).unwrap();
        normalize_peak(&mut buffer);
        assert_abs_diff_eq!(buffer.channel(0)[0], 1.0);
        assert_abs_diff_eq!(buffer.channel(0)[1], -0.5);
        assert_abs_diff_eq!(buffer.channel(0)[2], 0.25);
    }
}
