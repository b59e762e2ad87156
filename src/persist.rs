use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::error::{AkerError, io_err};

/// Atomically write content to a file
///
/// Writes to a temporary file in the same directory, syncs it to disk, then
/// renames it over the target so readers never see a half-written schedule.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), AkerError> {
    if let Some(parent) = path.parent() {
        ensure_directory_exists(parent)?;
    }

    let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    {
        let mut file = File::create(&temp_path).map_err(|e| io_err(&temp_path, e))?;
        file.write_all(content).map_err(|e| io_err(&temp_path, e))?;
        file.sync_all().map_err(|e| io_err(&temp_path, e))?;
    }

    std::fs::rename(&temp_path, path).map_err(|e| io_err(path, e))?;

    Ok(())
}

/// Ensure a directory exists, creating it and all parents if needed
pub fn ensure_directory_exists(path: &Path) -> Result<(), AkerError> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

/// Read a whole file
pub fn read_file(path: &Path) -> Result<Vec<u8>, AkerError> {
    std::fs::read(path).map_err(|e| io_err(path, e))
}

/// Version tag of a file: modification time in nanoseconds since the Unix
/// epoch, or 0 when the file is missing or unreadable
pub fn file_version(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Compute the SHA-256 checksum of content as lowercase hex
pub fn checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(&hasher.finalize())
}

/// Persist a schedule document and its checksum
///
/// The checksum file is written after the data file, so a reader that sees a
/// new checksum can rely on the data file already being in place.
pub fn write_schedule(
    data_file: &Path,
    checksum_file: &Path,
    content: &[u8],
) -> Result<String, AkerError> {
    atomic_write(data_file, content)?;

    let sum = checksum(content);
    atomic_write(checksum_file, sum.as_bytes())?;

    Ok(sum)
}

/// Run blocking file work off the async worker threads
pub async fn blocking<T, F>(work: F) -> Result<T, AkerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AkerError> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
