//! Sample Buffer
//!
//! The decoded, format-neutral form of an audio artifact: one `Vec<f32>` per
//! channel at the source sample rate.

use crate::error::{Result, VoxError};

/// Largest channel count the engine accepts (mono or stereo)
pub const MAX_CHANNELS: usize = 2;

/// Decoded audio: per-channel float samples plus the sample rate
///
/// All channels always have equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Create a buffer from per-channel sample vectors
    ///
    /// # Errors
    /// * `InvalidParameters` - If the sample rate is zero, the channel count is
    ///   not 1 or 2, or the channels differ in length
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(VoxError::InvalidParameters {
                reason: "sample rate must be positive".to_string(),
            });
        }
        if channels.is_empty() || channels.len() > MAX_CHANNELS {
            return Err(VoxError::InvalidParameters {
                reason: format!(
                    "{} channel(s) given (only mono/stereo supported)",
                    channels.len()
                ),
            });
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(VoxError::InvalidParameters {
                reason: "channels have unequal lengths".to_string(),
            });
        }

        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Create a buffer from interleaved samples [L,R,L,R,...]
    ///
    /// Trailing samples that do not fill a whole frame are dropped.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if channel_count == 0 {
            return Err(VoxError::InvalidParameters {
                reason: "channel count must be positive".to_string(),
            });
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];

        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        Self::new(channels, sample_rate)
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels (1 or 2)
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of samples in each channel
    pub fn num_frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// True if the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.num_frames() == 0
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate as f64
    }

    /// Samples of one channel
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// All channels
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Mutable access to the channels; lengths must stay equal
    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    /// Consume the buffer, returning its channels
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Peak absolute amplitude over all channels (NaN propagates)
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .map(|s| s.abs())
            .fold(0.0_f32, |acc, s| if s.is_nan() || acc.is_nan() { f32::NAN } else { acc.max(s) })
    }

    /// Interleave channels from [[L,L,...], [R,R,...]] to [L,R,L,R,...]
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.num_frames();
        let mut result = Vec::with_capacity(frames * self.channel_count());

        for frame in 0..frames {
            for channel in &self.channels {
                result.push(channel[frame]);
            }
        }

        result
    }

    /// Generate a mono sine test tone
    pub fn sine(frequency: f32, duration_secs: f32, sample_rate: u32, amplitude: f32) -> Self {
        let num_samples = (duration_secs * sample_rate as f32).round() as usize;
        let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
        let samples = (0..num_samples)
            .map(|i| amplitude * (angular_freq * i as f32).sin())
            .collect();

        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Generate a stereo test tone with different frequencies per channel
    pub fn sine_stereo(
        freq_left: f32,
        freq_right: f32,
        duration_secs: f32,
        sample_rate: u32,
        amplitude: f32,
    ) -> Self {
        let left = Self::sine(freq_left, duration_secs, sample_rate, amplitude);
        let right = Self::sine(freq_right, duration_secs, sample_rate, amplitude);

        Self {
            channels: vec![left.into_channels().remove(0), right.into_channels().remove(0)],
            sample_rate,
        }
    }
}
