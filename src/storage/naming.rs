//! Artifact naming rules
//!
//! Derived artifacts are named `{stem}_{effect}.wav`; collisions append
//! `_1`, `_2`, ... Uploaded originals keep their (sanitised) name, with the
//! same numeric suffix placed before the extension on collision.

use crate::codec::AudioFormat;
use crate::error::{Result, VoxError};

/// True for dot-files: the manifest and in-progress temporaries
pub fn is_hidden(filename: &str) -> bool {
    filename.starts_with('.')
}

/// Split `clip.wav` into `("clip", Some("wav"))`
///
/// A leading dot does not start an extension.
pub fn split_name(filename: &str) -> (&str, Option<&str>) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    }
}

/// Base name a derived artifact is named after
///
/// Drops a recognised audio extension; any other suffix is part of the name.
pub fn base_stem(base_name: &str) -> &str {
    match split_name(base_name) {
        (stem, Some(ext)) if AudioFormat::from_extension(ext).is_ok() => stem,
        _ => base_name,
    }
}

/// Candidate number `n` for a derived artifact (0 = no suffix)
pub fn derived_candidate(stem: &str, effect_id: &str, n: u32) -> String {
    let ext = AudioFormat::Wav.extension();
    if n == 0 {
        format!("{}_{}.{}", stem, effect_id, ext)
    } else {
        format!("{}_{}_{}.{}", stem, effect_id, n, ext)
    }
}

/// Candidate number `n` for an uploaded name (0 = unchanged)
pub fn numbered_candidate(filename: &str, n: u32) -> String {
    if n == 0 {
        return filename.to_string();
    }
    match split_name(filename) {
        (stem, Some(ext)) => format!("{}_{}.{}", stem, n, ext),
        (stem, None) => format!("{}_{}", stem, n),
    }
}

/// Reduce a user-supplied name to a safe, flat filename
///
/// Keeps only the final path component, turns whitespace into `_` and drops
/// characters outside `[A-Za-z0-9._-]`.
///
/// # Errors
/// * `InvalidFilename` - If nothing usable remains, or the result is `.`,
///   `..` or a hidden name
pub fn sanitize_filename(requested: &str) -> Result<String> {
    let last = requested
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = last
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." || is_hidden(&cleaned) {
        return Err(VoxError::InvalidFilename {
            filename: requested.to_string(),
        });
    }

    Ok(cleaned)
}

/// Check that `filename` names an entry directly inside the namespace
///
/// # Errors
/// * `InvalidFilename` - Empty, hidden, or containing a path separator
pub fn check_plain(filename: &str) -> Result<()> {
    if filename.is_empty()
        || filename.contains(['/', '\\'])
        || filename == ".."
        || is_hidden(filename)
    {
        return Err(VoxError::InvalidFilename {
            filename: filename.to_string(),
        });
    }
    Ok(())
}
