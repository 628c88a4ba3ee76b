//! Ring Modulation
//!
//! Multiplies each sample by a half-scaled sine carrier:
//!
//! `y[n] = x[n] * (1 + depth * sin(2π * carrier_hz * n / sample_rate)) / 2`
//!
//! Only amplitude changes; the output has exactly as many samples as the
//! input.

use std::f64::consts::PI;

use crate::codec::SampleBuffer;
use crate::dsp::transform::Transform;
use crate::error::Result;

/// Sine-carrier amplitude modulator (the "robotic" voice)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingModulator {
    carrier_hz: f64,
    depth: f64,
}

impl RingModulator {
    pub fn new(carrier_hz: f64, depth: f64) -> Self {
        Self { carrier_hz, depth }
    }

    pub fn carrier_hz(&self) -> f64 {
        self.carrier_hz
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    fn modulate(&self, samples: &[f32], sample_rate: u32) -> Vec<f32> {
        let angular_freq = 2.0 * PI * self.carrier_hz / sample_rate as f64;

        samples
            .iter()
            .enumerate()
            .map(|(n, &s)| {
                let carrier = (angular_freq * n as f64).sin();
                (s as f64 * (1.0 + self.depth * carrier) * 0.5) as f32
            })
            .collect()
    }
}

impl Transform for RingModulator {
    fn name(&self) -> &'static str {
        "ring_modulation"
    }

    fn apply(&self, buffer: &SampleBuffer) -> Result<SampleBuffer> {
        let channels = buffer
            .channels()
            .iter()
            .map(|channel| self.modulate(channel, buffer.sample_rate()))
            .collect();

        SampleBuffer::new(channels, buffer.sample_rate())
    }
}
