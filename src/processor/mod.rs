//! Processing orchestrator
//!
//! Turns `(source_filename, effect_id)` into a new derived artifact:
//!
//! 1. **Validating**: the effect must exist, the source must exist and be an
//!    original. The per-source lock is taken here and held to the end.
//! 2. **Decoding / Transforming / Encoding**: CPU work on the blocking pool.
//! 3. **Persisting**: name allocation and the atomic write, on the blocking
//!    pool with the lock moved in, so it completes even if the caller stops
//!    waiting.
//!
//! A failure at any step leaves no file, manifest record or reserved name.

mod locks;
mod stage;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::task::{self, JoinError};
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::codec::{self, AudioFormat};
use crate::config::EngineConfig;
use crate::dsp::{EffectDescriptor, EffectRegistry, TransformPipeline};
use crate::error::{Result, VoxError};
use crate::storage::{Artifact, ArtifactStore, Origin};

pub use locks::{SourceGuard, SourceLocks};
pub use stage::ProcessingStage;

/// Identifier of one processing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Apply `effect_id` to `source_filename`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRequest {
    pub id: RequestId,
    pub source_filename: String,
    pub effect_id: String,
}

impl ProcessingRequest {
    pub fn new(source_filename: impl Into<String>, effect_id: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            source_filename: source_filename.into(),
            effect_id: effect_id.into(),
        }
    }
}

/// Outcome of a successful request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub request_id: RequestId,
    pub artifact: Artifact,
    /// Duration of the derived audio
    pub duration_seconds: f64,
    /// Non-fatal notes, such as clipping during encode
    pub warnings: Vec<String>,
}

/// Encoded output waiting to be persisted
struct Rendered {
    bytes: Vec<u8>,
    duration_seconds: f64,
    warnings: Vec<String>,
}

/// Latest stage of recent requests, bounded in the finished ones it keeps
///
/// An entry starts at `Requested` and is frozen once terminal. Updates for
/// unknown or settled requests are dropped, so a render that outlives its
/// caller can neither revive an evicted entry nor overwrite `Cancelled`.
#[derive(Debug)]
struct StatusBoard {
    stages: HashMap<RequestId, ProcessingStage>,
    finished: VecDeque<RequestId>,
    capacity: usize,
}

impl StatusBoard {
    fn new(capacity: usize) -> Self {
        Self {
            stages: HashMap::new(),
            finished: VecDeque::new(),
            capacity,
        }
    }

    fn set(&mut self, id: RequestId, stage: ProcessingStage) {
        match self.stages.get(&id) {
            Some(current) if current.is_terminal() => return,
            None if stage != ProcessingStage::Requested => return,
            _ => {}
        }

        self.stages.insert(id, stage);
        if stage.is_terminal() {
            self.finished.push_back(id);
            while self.finished.len() > self.capacity {
                if let Some(oldest) = self.finished.pop_front() {
                    self.stages.remove(&oldest);
                }
            }
        }
    }

    /// Mark a request whose caller went away as `Cancelled`
    ///
    /// Returns false once the request is settled or has reached `Persisting`,
    /// which finishes on its own.
    fn abandon(&mut self, id: RequestId) -> bool {
        match self.stages.get(&id).copied() {
            Some(stage) if !stage.is_terminal() && !stage.is_committed() => {
                self.set(id, ProcessingStage::Cancelled);
                true
            }
            _ => false,
        }
    }
}

/// Settles the status of a request whose future is dropped mid-flight
struct AbandonGuard<'a> {
    shared: &'a Shared,
    id: RequestId,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.shared.statuses().abandon(self.id) {
            info!(request_id = %self.id, "Request abandoned before persisting");
        }
    }
}

struct Shared {
    store: ArtifactStore,
    registry: EffectRegistry,
    pipeline: TransformPipeline,
    bit_depth: u16,
    locks: Arc<SourceLocks>,
    statuses: Mutex<StatusBoard>,
}

/// The processing engine
///
/// Cheap to clone; clones share storage, locks and statuses.
#[derive(Clone)]
pub struct Processor {
    shared: Arc<Shared>,
}

impl Processor {
    /// Validate `config`, open its storage and build the registry
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = ArtifactStore::open(&config.storage)?;
        Ok(Self::with_store(store, config))
    }

    /// Build a processor over an already opened store
    pub fn with_store(store: ArtifactStore, config: &EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                registry: EffectRegistry::from_settings(&config.effects),
                pipeline: TransformPipeline::new(&config.stretch),
                bit_depth: config.codec.bit_depth,
                locks: SourceLocks::new(),
                statuses: Mutex::new(StatusBoard::new(config.processor.status_history)),
            }),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.shared.store
    }

    /// Effects available for requests, in presentation order
    pub fn effects(&self) -> &[EffectDescriptor] {
        self.shared.registry.list()
    }

    /// Latest known stage of a request
    pub fn status(&self, id: RequestId) -> Option<ProcessingStage> {
        self.shared.statuses().stages.get(&id).copied()
    }

    /// Run one request to completion
    ///
    /// Requests on the same source complete in the order they take its lock.
    /// Errors carry the stage they failed in (see [`VoxError::stage`]).
    pub async fn process(&self, request: ProcessingRequest) -> Result<ProcessingResult> {
        let span = info_span!(
            "process",
            request_id = %request.id,
            source = %request.source_filename,
            effect = %request.effect_id,
        );
        let id = request.id;

        async move {
            self.shared.set_status(id, ProcessingStage::Requested);
            let _abandoned = AbandonGuard {
                shared: &self.shared,
                id,
            };

            let result = self.execute(request).await;
            match &result {
                Ok(done) => info!(
                    artifact = %done.artifact.filename,
                    size_bytes = done.artifact.size_bytes,
                    duration_seconds = done.duration_seconds,
                    warnings = done.warnings.len(),
                    "Request completed"
                ),
                Err(e) => {
                    self.shared.set_status(id, ProcessingStage::Failed(e.kind()));
                    warn!(error = %e, code = e.error_code(), "Request failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, request: ProcessingRequest) -> Result<ProcessingResult> {
        let id = request.id;
        let shared = &self.shared;

        shared.set_status(id, ProcessingStage::Validating);
        let effect = shared
            .registry
            .resolve(&request.effect_id)
            .map_err(|e| e.at_stage(ProcessingStage::Validating))?
            .clone();

        let guard = shared.locks.acquire(&request.source_filename).await;
        debug!("Source lock acquired");

        let source = shared
            .store
            .artifact(&request.source_filename)
            .map_err(|e| e.at_stage(ProcessingStage::Validating))?;
        if let Origin::Derived {
            source_filename, ..
        } = &source.origin
        {
            return Err(VoxError::ChainedEffectNotAllowed {
                filename: source.filename.clone(),
                source_filename: source_filename.clone(),
            }
            .at_stage(ProcessingStage::Validating));
        }

        // The guard travels with the work so an abandoned request still
        // finishes reading before the source can be deleted
        let worker = Arc::clone(shared);
        let span = Span::current();
        let source_filename = source.filename.clone();
        let render_effect = effect.clone();
        let (guard, rendered) = task::spawn_blocking(move || {
            let _entered = span.enter();
            let rendered = worker.render(id, &source_filename, &render_effect);
            (guard, rendered)
        })
        .await
        .map_err(|e| worker_failure(ProcessingStage::Transforming, e))?;
        let rendered = rendered?;

        shared.set_status(id, ProcessingStage::Persisting);
        let worker = Arc::clone(shared);
        let span = Span::current();
        let source_filename = source.filename;
        let artifact = task::spawn_blocking(move || {
            let _entered = span.enter();
            let _guard = guard;
            let persisted = worker
                .persist(&source_filename, &effect, &rendered.bytes)
                .map_err(|e| e.at_stage(ProcessingStage::Persisting));
            match &persisted {
                Ok(_) => worker.set_status(id, ProcessingStage::Completed),
                Err(e) => worker.set_status(id, ProcessingStage::Failed(e.kind())),
            }
            persisted.map(|artifact| (artifact, rendered.duration_seconds, rendered.warnings))
        })
        .await
        .map_err(|e| worker_failure(ProcessingStage::Persisting, e))?;

        let (artifact, duration_seconds, warnings) = artifact?;
        Ok(ProcessingResult {
            request_id: id,
            artifact,
            duration_seconds,
            warnings,
        })
    }

    /// Store uploaded bytes as a new original
    ///
    /// Upload policy (size, extension) is checked by the caller.
    pub async fn import_original(&self, requested_name: &str, bytes: Vec<u8>) -> Result<Artifact> {
        let store = self.shared.store.clone();
        let requested_name = requested_name.to_string();
        task::spawn_blocking(move || store.import_original(&requested_name, &bytes))
            .await
            .map_err(|e| worker_failure(ProcessingStage::Persisting, e))?
    }

    /// Delete an artifact once no request is processing it
    ///
    /// Returns whether a file was removed; deleting a missing file succeeds.
    pub async fn delete(&self, filename: &str) -> Result<bool> {
        let guard = self.shared.locks.acquire(filename).await;
        let store = self.shared.store.clone();
        let filename = filename.to_string();

        task::spawn_blocking(move || {
            let _guard = guard;
            store.delete(&filename)
        })
        .await
        .map_err(|e| VoxError::ProcessingFailure {
            reason: format!("delete task failed: {}", e),
        })?
    }
}

impl Shared {
    fn statuses(&self) -> MutexGuard<'_, StatusBoard> {
        self.statuses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, id: RequestId, stage: ProcessingStage) {
        debug!(%stage, "Stage entered");
        self.statuses().set(id, stage);
    }

    /// Decode, transform and encode the source
    fn render(
        &self,
        id: RequestId,
        source_filename: &str,
        effect: &EffectDescriptor,
    ) -> Result<Rendered> {
        self.set_status(id, ProcessingStage::Decoding);
        let bytes = self
            .store
            .read(source_filename)
            .map_err(|e| e.at_stage(ProcessingStage::Decoding))?;
        let extension = Path::new(source_filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let buffer = codec::decode(&bytes, extension)
            .map_err(|e| e.at_stage(ProcessingStage::Decoding))?;

        self.set_status(id, ProcessingStage::Transforming);
        let output = self
            .pipeline
            .run(&buffer, effect)
            .map_err(|e| e.at_stage(ProcessingStage::Transforming))?;

        self.set_status(id, ProcessingStage::Encoding);
        let encoded = codec::encode(&output.buffer, AudioFormat::Wav, self.bit_depth)
            .map_err(|e| e.at_stage(ProcessingStage::Encoding))?;

        let mut warnings = output.warnings;
        warnings.extend(encoded.warnings);

        Ok(Rendered {
            bytes: encoded.bytes,
            duration_seconds: output.buffer.duration_secs(),
            warnings,
        })
    }

    /// Allocate the derived name and write the artifact
    fn persist(
        &self,
        source_filename: &str,
        effect: &EffectDescriptor,
        bytes: &[u8],
    ) -> Result<Artifact> {
        let reservation = self.store.allocate_name(source_filename, effect.id)?;
        self.store.persist(
            reservation,
            bytes,
            Origin::Derived {
                source_filename: source_filename.to_string(),
                effect_id: effect.id.to_string(),
            },
        )
    }
}

fn worker_failure(stage: ProcessingStage, error: JoinError) -> VoxError {
    VoxError::ProcessingFailure {
        reason: format!("worker task failed: {}", error),
    }
    .at_stage(stage)
}
