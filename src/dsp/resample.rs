//! Band-limited resampling
//!
//! Windowed-sinc interpolation. Reading the input with a step of `factor`
//! samples per output sample shortens (factor > 1) or lengthens (factor < 1)
//! the signal and scales every frequency by `factor` when played back at the
//! original rate. When shortening, the kernel cutoff drops to `1 / factor` so
//! content above the new Nyquist limit is removed instead of aliased.

use std::f64::consts::PI;

/// Kernel zero crossings on each side of the interpolation point
const ZERO_CROSSINGS: f64 = 16.0;

/// Number of output samples produced for an input of `len` samples
pub fn resampled_len(len: usize, factor: f64) -> usize {
    if len == 0 {
        return 0;
    }
    ((len as f64 / factor).round() as usize).max(1)
}

/// Resample `samples`, advancing `factor` input samples per output sample
pub fn resample(samples: &[f32], factor: f64) -> Vec<f32> {
    let out_len = resampled_len(samples.len(), factor);
    if out_len == 0 {
        return Vec::new();
    }

    // Identity step: nothing to interpolate
    if (factor - 1.0).abs() < 1e-12 {
        return samples.to_vec();
    }

    let cutoff = (1.0 / factor).min(1.0);
    let half_width = (ZERO_CROSSINGS / cutoff).ceil();
    let last = samples.len() as isize - 1;

    (0..out_len)
        .map(|i| {
            let position = i as f64 * factor;
            let first = ((position - half_width).ceil() as isize).max(0);
            let end = ((position + half_width).floor() as isize).min(last);

            let mut acc = 0.0_f64;
            let mut k = first;
            while k <= end {
                let distance = position - k as f64;
                let weight = cutoff * sinc(cutoff * distance) * hann(distance / half_width);
                acc += samples[k as usize] as f64 * weight;
                k += 1;
            }
            acc as f32
        })
        .collect()
}

#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

/// Hann taper over [-1, 1], zero outside
#[inline]
fn hann(t: f64) -> f64 {
    if t.abs() >= 1.0 {
        0.0
    } else {
        0.5 * (1.0 + (PI * t).cos())
    }
}
