//! Error handling for Voxshift
//!
//! Every failure maps to one [`ErrorKind`]. Errors raised while a request is
//! being processed are wrapped in [`VoxError::Stage`] so the failing step is
//! reported alongside the underlying kind.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::processor::ProcessingStage;

/// Result type alias for Voxshift operations
pub type Result<T> = std::result::Result<T, VoxError>;

/// Kind of a failure, independent of its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    CorruptAudio,
    UnknownEffect,
    InvalidParameters,
    ProcessingFailure,
    SourceNotFound,
    ChainedEffectNotAllowed,
    StorageFailure,
    DeleteFailed,
    InvalidFilename,
    FileTooLarge,
    DisallowedExtension,
    InvalidConfig,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::CorruptAudio => "CorruptAudio",
            ErrorKind::UnknownEffect => "UnknownEffect",
            ErrorKind::InvalidParameters => "InvalidParameters",
            ErrorKind::ProcessingFailure => "ProcessingFailure",
            ErrorKind::SourceNotFound => "SourceNotFound",
            ErrorKind::ChainedEffectNotAllowed => "ChainedEffectNotAllowed",
            ErrorKind::StorageFailure => "StorageFailure",
            ErrorKind::DeleteFailed => "DeleteFailed",
            ErrorKind::InvalidFilename => "InvalidFilename",
            ErrorKind::FileTooLarge => "FileTooLarge",
            ErrorKind::DisallowedExtension => "DisallowedExtension",
            ErrorKind::InvalidConfig => "InvalidConfig",
        };
        f.write_str(name)
    }
}

/// Main error type for Voxshift operations
#[derive(Error, Debug)]
pub enum VoxError {
    // Codec Errors
    #[error("Unsupported audio format: {format}: {reason}")]
    UnsupportedFormat { format: String, reason: String },

    #[error("Corrupt audio: {reason}")]
    CorruptAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Effect Errors
    #[error("Unknown effect: '{effect_id}'")]
    UnknownEffect { effect_id: String },

    #[error("Invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("Processing failure: {reason}")]
    ProcessingFailure { reason: String },

    // Request Errors
    #[error("Source artifact not found: {filename}")]
    SourceNotFound { filename: String },

    #[error("'{filename}' is derived from '{source_filename}'; effects apply only to originals")]
    ChainedEffectNotAllowed {
        filename: String,
        source_filename: String,
    },

    // Storage Errors
    #[error("Storage failure at {path}: {source}")]
    StorageFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete '{filename}' after {attempts} attempt(s): {source}")]
    DeleteFailed {
        filename: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid filename: '{filename}'")]
    InvalidFilename { filename: String },

    // Upload Policy Errors
    #[error("File too large: {size_bytes} bytes (maximum {max_bytes} bytes)")]
    FileTooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("File type not allowed: '{extension}' (allowed: {allowed})")]
    DisallowedExtension { extension: String, allowed: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Manifest serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: ProcessingStage,
        #[source]
        source: Box<VoxError>,
    },
}

impl VoxError {
    /// Wrap an error with the processing step it failed in
    pub fn at_stage(self, stage: ProcessingStage) -> Self {
        match self {
            // Keep the innermost stage
            already @ VoxError::Stage { .. } => already,
            other => VoxError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Shorthand for a storage failure at `path`
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VoxError::StorageFailure {
            path: path.into(),
            source,
        }
    }

    /// Get the kind of this error, looking through stage wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoxError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            VoxError::CorruptAudio { .. } => ErrorKind::CorruptAudio,
            VoxError::UnknownEffect { .. } => ErrorKind::UnknownEffect,
            VoxError::InvalidParameters { .. } => ErrorKind::InvalidParameters,
            VoxError::ProcessingFailure { .. } => ErrorKind::ProcessingFailure,
            VoxError::SourceNotFound { .. } => ErrorKind::SourceNotFound,
            VoxError::ChainedEffectNotAllowed { .. } => ErrorKind::ChainedEffectNotAllowed,
            VoxError::StorageFailure { .. } => ErrorKind::StorageFailure,
            VoxError::DeleteFailed { .. } => ErrorKind::DeleteFailed,
            VoxError::InvalidFilename { .. } => ErrorKind::InvalidFilename,
            VoxError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            VoxError::DisallowedExtension { .. } => ErrorKind::DisallowedExtension,
            VoxError::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            VoxError::Serialization(_) => ErrorKind::StorageFailure,
            VoxError::Stage { source, .. } => source.kind(),
        }
    }

    /// Get the processing step this error was raised in, if any
    pub fn stage(&self) -> Option<ProcessingStage> {
        match self {
            VoxError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorKind::CorruptAudio => "CORRUPT_AUDIO",
            ErrorKind::UnknownEffect => "UNKNOWN_EFFECT",
            ErrorKind::InvalidParameters => "INVALID_PARAMETERS",
            ErrorKind::ProcessingFailure => "PROCESSING_FAILURE",
            ErrorKind::SourceNotFound => "SOURCE_NOT_FOUND",
            ErrorKind::ChainedEffectNotAllowed => "CHAINED_EFFECT_NOT_ALLOWED",
            ErrorKind::StorageFailure => "STORAGE_FAILURE",
            ErrorKind::DeleteFailed => "DELETE_FAILED",
            ErrorKind::InvalidFilename => "INVALID_FILENAME",
            ErrorKind::FileTooLarge => "FILE_TOO_LARGE",
            ErrorKind::DisallowedExtension => "DISALLOWED_EXTENSION",
            ErrorKind::InvalidConfig => "INVALID_CONFIG",
        }
    }

    /// Returns true if retrying the same operation may succeed.
    ///
    /// Codec and transform errors are deterministic in their input and are
    /// never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::StorageFailure | ErrorKind::DeleteFailed)
    }

    /// Returns a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::UnsupportedFormat => Some("Only PCM WAV and MP3 files are supported."),
            ErrorKind::CorruptAudio => {
                Some("The file appears truncated - re-export it from the source and upload again.")
            }
            ErrorKind::UnknownEffect => {
                Some("Run 'voxshift effects' to see the available effects.")
            }
            ErrorKind::SourceNotFound => Some("Run 'voxshift list' to see stored artifacts."),
            ErrorKind::ChainedEffectNotAllowed => {
                Some("Apply the effect to the original upload instead.")
            }
            ErrorKind::DeleteFailed => {
                Some("The file may be in use - stop any playback and try again.")
            }
            ErrorKind::FileTooLarge => Some("Trim the clip or upload a shorter recording."),
            _ => None,
        }
    }
}
