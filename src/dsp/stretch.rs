//! Overlap-add time stretching
//!
//! Changes duration without changing pitch. Output frames are laid out
//! `synthesis_hop` apart; each is read from the input near the matching
//! (scaled) position, Hann-windowed, and summed. Dividing by the summed
//! window weight keeps the gain flat wherever frames overlap.
//!
//! The read position of each frame is nudged by up to half a hop so that its
//! waveform lines up with the natural continuation of the previous frame
//! (waveform-similarity overlap-add). Without the nudge, overlapping frames
//! meet out of phase and the summed signal drifts in pitch.

use std::f64::consts::PI;

use crate::config::StretchSettings;
use crate::error::Result;

/// Every n-th sample is compared when scoring alignment candidates
const SIMILARITY_STRIDE: usize = 4;

/// Frame-based overlap-add stretcher
#[derive(Debug, Clone)]
pub struct TimeStretcher {
    frame_size: usize,
    synthesis_hop: usize,
    search_radius: isize,
    window: Vec<f64>,
}

impl TimeStretcher {
    pub fn new(settings: &StretchSettings) -> Result<Self> {
        settings.validate()?;

        let frame_size = settings.frame_size;
        let synthesis_hop = settings.synthesis_hop();
        // Periodic Hann: overlapping copies sum to a constant at 75% overlap
        let window = (0..frame_size)
            .map(|j| 0.5 - 0.5 * (2.0 * PI * j as f64 / frame_size as f64).cos())
            .collect();

        Ok(Self {
            frame_size,
            synthesis_hop,
            search_radius: (synthesis_hop / 2) as isize,
            window,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Stretch or compress `input` to exactly `target_len` samples
    pub fn stretch_to_length(&self, input: &[f32], target_len: usize) -> Vec<f32> {
        if target_len == 0 {
            return Vec::new();
        }
        if input.is_empty() {
            return vec![0.0; target_len];
        }
        if input.len() == target_len {
            return input.to_vec();
        }

        // Output position t reads input position t / alpha
        let alpha = target_len as f64 / input.len() as f64;
        let half = (self.frame_size / 2) as isize;
        let hop = self.synthesis_hop as isize;

        let mut output = vec![0.0_f64; target_len];
        let mut weights = vec![0.0_f64; target_len];
        let mut previous_start: Option<isize> = None;

        let mut frame = 0isize;
        loop {
            let out_start = frame * hop - half;
            if out_start >= target_len as isize {
                break;
            }

            let nominal = ((frame * hop) as f64 / alpha).round() as isize - half;
            let in_start = match previous_start {
                Some(previous) => self.best_aligned_start(input, nominal, previous + hop),
                None => nominal,
            };

            for (j, w) in self.window.iter().enumerate() {
                let out_idx = out_start + j as isize;
                if out_idx < 0 || out_idx >= target_len as isize {
                    continue;
                }
                if let Some(sample) = sample_at(input, in_start + j as isize) {
                    output[out_idx as usize] += w * sample as f64;
                    weights[out_idx as usize] += w;
                }
            }

            previous_start = Some(in_start);
            frame += 1;
        }

        output
            .iter()
            .zip(&weights)
            .map(|(s, w)| if *w > 1e-9 { (s / w) as f32 } else { 0.0 })
            .collect()
    }

    /// Pick the read position within `search_radius` of `nominal` whose
    /// overlap region best matches the input continuing from `continuation`
    ///
    /// Candidates never start later than `input.len() - frame_size`, so every
    /// frame near the end reads real samples and the tail keeps its weight.
    fn best_aligned_start(&self, input: &[f32], nominal: isize, continuation: isize) -> isize {
        let overlap = (self.frame_size - self.synthesis_hop) as isize;
        let latest = input.len() as isize - self.frame_size as isize;

        let score = |candidate: isize| -> f64 {
            let mut cross = 0.0_f64;
            let mut energy = 0.0_f64;
            let mut j = 0isize;
            while j < overlap {
                let a = sample_at(input, candidate + j).unwrap_or(0.0) as f64;
                let b = sample_at(input, continuation + j).unwrap_or(0.0) as f64;
                cross += a * b;
                energy += a * a;
                j += SIMILARITY_STRIDE as isize;
            }
            cross / (energy.sqrt() + 1e-9)
        };

        let mut lowest = nominal - self.search_radius;
        let mut highest = nominal + self.search_radius;
        // Inputs shorter than a frame cannot fit one anywhere. Otherwise a
        // frame pushed back from the end keeps a full search window.
        if latest >= 0 {
            highest = highest.min(latest);
            lowest = lowest.min(highest - 2 * self.search_radius);
        }

        let mut best = nominal.clamp(lowest, highest);
        let mut best_score = score(best);
        for candidate in lowest..=highest {
            if candidate == best {
                continue;
            }
            let candidate_score = score(candidate);
            if candidate_score > best_score + 1e-12 {
                best = candidate;
                best_score = candidate_score;
            }
        }
        best
    }
}

#[inline]
fn sample_at(input: &[f32], index: isize) -> Option<f32> {
    if index < 0 {
        None
    } else {
        input.get(index as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn stretcher() -> TimeStretcher {
        TimeStretcher::new(&StretchSettings::default()).unwrap()
    }

    fn rising_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| w[0] < 0.0 && w[1] >= 0.0)
            .count()
    }

    fn sine(freq: f64, rate: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * freq * n as f64 / rate).sin() as f32)
            .collect()
    }

    #[test]
    fn test_exact_target_length() {
        let input = sine(220.0, 44100.0, 44100);
        for target in [1, 100, 30000, 44100, 60000] {
            assert_eq!(stretcher().stretch_to_length(&input, target).len(), target);
        }
    }

    #[test]
    fn test_window_is_periodic_hann() {
        let s = stretcher();
        assert_eq!(s.frame_size(), 2048);
        assert_abs_diff_eq!(s.window[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.window[1024], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_signal_keeps_level() {
        let input = vec![0.5_f32; 20000];
        let output = stretcher().stretch_to_length(&input, 15000);
        for s in &output {
            assert_abs_diff_eq!(*s, 0.5, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_pitch_is_preserved_when_lengthening() {
        let rate = 16000.0;
        let input = sine(250.0, rate, 32000);
        let output = stretcher().stretch_to_length(&input, 48000);

        let in_freq = rising_crossings(&input) as f64 / (input.len() as f64 / rate);
        let out_freq = rising_crossings(&output) as f64 / (output.len() as f64 / rate);
        assert!(
            (out_freq / in_freq - 1.0).abs() < 0.02,
            "frequency moved from {} to {}",
            in_freq,
            out_freq
        );
    }

    #[test]
    fn test_pitch_is_preserved_when_compressing() {
        let rate = 16000.0;
        let input = sine(330.0, rate, 32000);
        let output = stretcher().stretch_to_length(&input, 20000);

        let in_freq = rising_crossings(&input) as f64 / (input.len() as f64 / rate);
        let out_freq = rising_crossings(&output) as f64 / (output.len() as f64 / rate);
        assert!((out_freq / in_freq - 1.0).abs() < 0.02);
    }

    #[test]
    fn test_aligned_output_keeps_amplitude() {
        // In-phase frames sum without cancellation
        let input = sine(250.0, 16000.0, 32000);
        let output = stretcher().stretch_to_length(&input, 40000);
        let interior = &output[4096..36000];
        let peak = interior.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.9 && peak < 1.05, "peak {}", peak);
    }

    #[test]
    fn test_tail_is_never_silent() {
        // A 2 s voice-range tone; compressed and lengthened tails must both
        // carry signal up to the last sample
        let input = sine(196.0, 44100.0, 88200);
        for target in [49520, 66150, 88199, 99000, 117700] {
            let output = stretcher().stretch_to_length(&input, target);
            let trailing_zeros = output.iter().rev().take_while(|s| **s == 0.0).count();
            assert_eq!(trailing_zeros, 0, "target {} ends in silence", target);

            let tail = &output[target - 256..];
            let peak = tail.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
            assert!(peak > 0.5, "target {} tail peak {}", target, peak);
        }
    }

    #[test]
    fn test_empty_input_yields_silence() {
        assert_eq!(stretcher().stretch_to_length(&[], 4), vec![0.0; 4]);
        assert!(stretcher().stretch_to_length(&[0.1, 0.2], 0).is_empty());
    }
}
