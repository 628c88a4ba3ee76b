//! Voxshift - Voice-Effect Audio Processing Engine
//!
//! Applies one of a fixed set of voice effects (robotic, male, female, baby)
//! to an uploaded clip and stores the result as a new derived artifact,
//! leaving the original untouched.
//!
//! # Architecture
//!
//! - `codec`: WAV / MP3 bytes to and from [`codec::SampleBuffer`]
//! - `dsp`: effect registry, ring modulation, pitch shifting, time stretching
//! - `storage`: flat artifact namespace with atomic writes and retrying deletes
//! - `processor`: validates requests, serializes work per source, drives the rest
//!
//! ```no_run
//! # async fn run() -> voxshift::Result<()> {
//! use voxshift::{EngineConfig, ProcessingRequest, Processor};
//!
//! let processor = Processor::new(&EngineConfig::default())?;
//! let result = processor
//!     .process(ProcessingRequest::new("voice.wav", "robotic"))
//!     .await?;
//! println!("{}", result.artifact.filename); // voice_robotic.wav
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod codec;
pub mod config;
pub mod dsp;
pub mod error;
pub mod processor;
pub mod storage;

pub use config::EngineConfig;
pub use error::{ErrorKind, Result, VoxError};
pub use processor::{ProcessingRequest, ProcessingResult, ProcessingStage, Processor, RequestId};
pub use storage::{Artifact, ArtifactStore, Origin};
