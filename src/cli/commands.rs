//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

use crate::config::UploadPolicy;
use crate::error::{Result, VoxError};
use crate::processor::{ProcessingRequest, Processor};

/// Store a local audio file as a new original.
pub async fn upload(processor: &Processor, policy: &UploadPolicy, path: &Path) -> Result<()> {
    info!("Uploading: {}", path.display());

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| VoxError::InvalidFilename {
            filename: path.display().to_string(),
        })?;
    let size = fs::metadata(path)
        .map_err(|e| VoxError::storage(path, e))?
        .len();
    policy.check(&name, size)?;

    let bytes = fs::read(path).map_err(|e| VoxError::storage(path, e))?;
    let artifact = processor.import_original(&name, bytes).await?;

    println!("Uploaded: {} ({} bytes)", artifact.filename, artifact.size_bytes);
    Ok(())
}

/// Apply an effect to a stored original.
pub async fn process(processor: &Processor, filename: &str, effect: &str) -> Result<()> {
    let result = processor
        .process(ProcessingRequest::new(filename, effect))
        .await?;

    println!(
        "Created: {} ({:.2}s, {} bytes)",
        result.artifact.filename, result.duration_seconds, result.artifact.size_bytes
    );
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}

/// List stored artifacts.
pub fn list(processor: &Processor, json: bool) -> Result<()> {
    let artifacts = processor.store().list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
        return Ok(());
    }

    if artifacts.is_empty() {
        println!("No artifacts in {}", processor.store().root().display());
        return Ok(());
    }

    for artifact in &artifacts {
        println!(
            "{:<40} {:>10}  {}  {}",
            artifact.filename,
            artifact.size_bytes,
            artifact.created_at.format("%Y-%m-%d %H:%M:%S"),
            artifact.origin
        );
    }
    Ok(())
}

/// Delete a stored artifact.
pub async fn delete(processor: &Processor, filename: &str) -> Result<()> {
    if processor.delete(filename).await? {
        println!("Deleted: {}", filename);
    } else {
        println!("Nothing to delete: {}", filename);
    }
    Ok(())
}

/// Show the available effects.
pub fn effects(processor: &Processor) {
    for effect in processor.effects() {
        println!("{:<10} {:<14} {}", effect.id, effect.display_name, effect.description);
    }
}

/// Copy a stored artifact to `dest`.
pub fn export(processor: &Processor, filename: &str, dest: &Path) -> Result<()> {
    info!("Exporting {} to {}", filename, dest.display());

    let mut source = processor.store().open_file(filename)?;
    let mut target = fs::File::create(dest).map_err(|e| VoxError::storage(dest, e))?;
    let copied = io::copy(&mut source, &mut target).map_err(|e| VoxError::storage(dest, e))?;

    println!("Exported: {} ({} bytes)", dest.display(), copied);
    Ok(())
}
