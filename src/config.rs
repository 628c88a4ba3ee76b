//! Engine configuration
//!
//! Every section carries `#[serde(default)]`, so a JSON file only needs to
//! name the values it overrides:
//!
//! ```json
//! { "storage": { "root": "/srv/clips" }, "effects": { "baby": { "stretch_ratio": 0.8 } } }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::{AudioFormat, SUPPORTED_BIT_DEPTHS};
use crate::dsp::TransformParams;
use crate::error::{Result, VoxError};

/// Default storage directory, relative to the working directory
const DEFAULT_STORAGE_ROOT: &str = "uploads";

/// Default upload ceiling (50 MiB)
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub effects: EffectSettings,
    pub stretch: StretchSettings,
    pub codec: CodecSettings,
    pub upload: UploadPolicy,
    pub processor: ProcessorSettings,
}

impl EngineConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| VoxError::InvalidConfig {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;

        let config: EngineConfig =
            serde_json::from_str(&content).map_err(|e| VoxError::InvalidConfig {
                reason: format!("{}: {}", path.display(), e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check every section for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.stretch.validate()?;
        self.storage.delete_retry.validate()?;

        if !SUPPORTED_BIT_DEPTHS.contains(&self.codec.bit_depth) {
            return Err(VoxError::InvalidConfig {
                reason: format!(
                    "codec.bit_depth {} (supported: {:?})",
                    self.codec.bit_depth, SUPPORTED_BIT_DEPTHS
                ),
            });
        }

        for (id, params) in self.effects.entries() {
            params.validate().map_err(|e| VoxError::InvalidConfig {
                reason: format!("effects.{}: {}", id, e),
            })?;
        }

        if self.upload.allowed_extensions.is_empty() {
            return Err(VoxError::InvalidConfig {
                reason: "upload.allowed_extensions is empty".to_string(),
            });
        }
        for extension in &self.upload.allowed_extensions {
            AudioFormat::from_extension(extension).map_err(|_| VoxError::InvalidConfig {
                reason: format!("upload.allowed_extensions: '{}' cannot be decoded", extension),
            })?;
        }

        Ok(())
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Where artifacts live and how deletion retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Flat directory holding every artifact
    pub root: PathBuf,
    pub delete_retry: RetryPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            delete_retry: RetryPolicy::default(),
        }
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay_ms: u64,
    /// Growth factor applied to the delay after each failure
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 100,
            multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((self.initial_delay_ms as f64 * factor).round() as u64)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(VoxError::InvalidConfig {
                reason: "storage.delete_retry.max_attempts must be at least 1".to_string(),
            });
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(VoxError::InvalidConfig {
                reason: format!(
                    "storage.delete_retry.multiplier {} must be >= 1.0",
                    self.multiplier
                ),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Effects
// ============================================================================

/// Tunable parameters of the fixed effect set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub robotic: RingModulationSettings,
    pub male: PitchShiftSettings,
    pub female: PitchShiftSettings,
    pub baby: CompressedPitchSettings,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            robotic: RingModulationSettings::default(),
            male: PitchShiftSettings { semitone_shift: -5.0 },
            female: PitchShiftSettings { semitone_shift: 5.0 },
            baby: CompressedPitchSettings::default(),
        }
    }
}

impl EffectSettings {
    /// Effect ids paired with their transform parameters, in registry order
    pub fn entries(&self) -> [(&'static str, TransformParams); 4] {
        [
            (
                "robotic",
                TransformParams::RingModulation {
                    carrier_hz: self.robotic.carrier_hz,
                    depth: self.robotic.depth,
                },
            ),
            (
                "male",
                TransformParams::PitchShift {
                    semitone_shift: self.male.semitone_shift,
                },
            ),
            (
                "female",
                TransformParams::PitchShift {
                    semitone_shift: self.female.semitone_shift,
                },
            ),
            (
                "baby",
                TransformParams::PitchShiftCompress {
                    semitone_shift: self.baby.semitone_shift,
                    stretch_ratio: self.baby.stretch_ratio,
                },
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingModulationSettings {
    pub carrier_hz: f64,
    pub depth: f64,
}

impl Default for RingModulationSettings {
    fn default() -> Self {
        Self {
            carrier_hz: 30.0,
            depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchShiftSettings {
    pub semitone_shift: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressedPitchSettings {
    pub semitone_shift: f64,
    /// Output duration as a fraction of the input duration
    pub stretch_ratio: f64,
}

impl Default for CompressedPitchSettings {
    fn default() -> Self {
        Self {
            semitone_shift: 10.0,
            stretch_ratio: 0.85,
        }
    }
}

// ============================================================================
// DSP / Codec / Processor
// ============================================================================

/// Overlap-add frame layout for time stretching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StretchSettings {
    /// Frame length in samples
    pub frame_size: usize,
    /// Fraction of each frame shared with the next, in (0, 1)
    pub overlap: f64,
}

impl Default for StretchSettings {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            overlap: 0.75,
        }
    }
}

impl StretchSettings {
    /// Distance between consecutive output frames
    pub fn synthesis_hop(&self) -> usize {
        ((self.frame_size as f64 * (1.0 - self.overlap)).round() as usize).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_size < 16 {
            return Err(VoxError::InvalidConfig {
                reason: format!("stretch.frame_size {} is below 16 samples", self.frame_size),
            });
        }
        if !(self.overlap > 0.0 && self.overlap < 1.0) {
            return Err(VoxError::InvalidConfig {
                reason: format!("stretch.overlap {} must lie in (0, 1)", self.overlap),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    /// Bit depth of encoded WAV output: 16, 24 or 32 (float)
    pub bit_depth: u16,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self { bit_depth: 16 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorSettings {
    /// Finished request statuses kept available for polling
    pub status_history: usize,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            status_history: 256,
        }
    }
}

// ============================================================================
// Upload policy
// ============================================================================

/// Size ceiling and extension allow-list applied by the upload collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    pub max_size_bytes: u64,
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: vec!["wav".to_string(), "mp3".to_string()],
        }
    }
}

impl UploadPolicy {
    /// Reject uploads with a disallowed extension or above the size ceiling
    pub fn check(&self, filename: &str, size_bytes: u64) -> Result<()> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if !self.allowed_extensions.iter().any(|a| a == &extension) {
            return Err(VoxError::DisallowedExtension {
                extension,
                allowed: self.allowed_extensions.join(", "),
            });
        }

        if size_bytes > self.max_size_bytes {
            return Err(VoxError::FileTooLarge {
                size_bytes,
                max_bytes: self.max_size_bytes,
            });
        }

        Ok(())
    }
}
