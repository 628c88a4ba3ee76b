//! Voice transform DSP
//!
//! The effect registry, the transforms each effect maps to, and the
//! pipeline that runs them. Everything here is pure computation.

mod pipeline;
mod pitch;
mod registry;
mod resample;
mod ring_mod;
mod stretch;
mod transform;

pub use pipeline::{normalize_peak, TransformOutput, TransformPipeline};
pub use pitch::{semitone_ratio, shift_factor, PitchShiftCompressor, PitchShifter};
pub use registry::{EffectDescriptor, EffectRegistry};
pub use resample::{resample, resampled_len};
pub use ring_mod::RingModulator;
pub use stretch::TimeStretcher;
pub use transform::{Transform, TransformParams};
