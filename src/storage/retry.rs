//! Retrying file removal
//!
//! A reader (playback, an in-flight decode) may hold a file open for a
//! moment. Removal is retried with bounded exponential backoff while the
//! failure looks transient; anything else fails at once.

use std::io;
use std::path::Path;
use std::thread;

use tracing::warn;

use crate::config::RetryPolicy;
use crate::error::{Result, VoxError};

/// Windows sharing and lock violations (ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION)
#[cfg(windows)]
const TRANSIENT_OS_CODES: &[i32] = &[32, 33];
/// EBUSY, ETXTBSY
#[cfg(not(windows))]
const TRANSIENT_OS_CODES: &[i32] = &[16, 26];

/// True if retrying the same removal may succeed
pub fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
    ) || error
        .raw_os_error()
        .is_some_and(|code| TRANSIENT_OS_CODES.contains(&code))
}

/// Remove `path` with `remove`, retrying transient failures per `policy`
///
/// Returns `Ok(true)` if the file was removed and `Ok(false)` if it did not
/// exist.
///
/// # Errors
/// * `DeleteFailed` - On a non-transient error, or once `max_attempts` is used up
pub fn delete_with_retry<F>(path: &Path, policy: &RetryPolicy, mut remove: F) -> Result<bool>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match remove(path) {
            Ok(()) => return Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) if is_transient(&e) && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    path = %path.display(),
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Delete failed, retrying"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                return Err(VoxError::DeleteFailed {
                    filename: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string()),
                    attempts: attempt,
                    source: e,
                })
            }
        }
    }
}
