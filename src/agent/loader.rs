use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::ScheduleStore;
use crate::error::AkerError;
use crate::persist;
use crate::schedule::decode_schedule;

/// Backing storage of the schedule document
///
/// `load` may block; the loader calls it on the blocking thread pool.
pub trait ScheduleSource: Send + Sync + 'static {
    /// Cheap version tag; 0 or negative means there is no document yet
    fn version(&self) -> i64;

    /// Read the whole document
    fn load(&self) -> Result<Vec<u8>, AkerError>;
}

impl<T: ScheduleSource + ?Sized> ScheduleSource for Arc<T> {
    fn version(&self) -> i64 {
        (**self).version()
    }

    fn load(&self) -> Result<Vec<u8>, AkerError> {
        (**self).load()
    }
}

/// Schedule document on the local filesystem, versioned by modification time
#[derive(Debug, Clone)]
pub struct FileScheduleSource {
    path: PathBuf,
}

impl FileScheduleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScheduleSource for FileScheduleSource {
    fn version(&self) -> i64 {
        persist::file_version(&self.path)
    }

    fn load(&self) -> Result<Vec<u8>, AkerError> {
        persist::read_file(&self.path)
    }
}

/// What a poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Version unchanged or no document yet
    NoUpdate,
    /// New schedule decoded and installed
    Installed { version: i64 },
    /// New version, but the bytes match the installed schedule
    Unchanged { version: i64 },
}

/// Picks up new versions of the schedule document and installs them
pub struct ScheduleLoader<S> {
    source: Arc<S>,
    seen_version: i64,
}

impl<S: ScheduleSource> ScheduleLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            seen_version: 0,
        }
    }

    /// Last version this loader acted on
    #[cfg(test)]
    pub fn seen_version(&self) -> i64 {
        self.seen_version
    }

    pub fn poll_version(&self) -> i64 {
        self.source.version()
    }

    /// Read the whole document without blocking the async runtime
    pub async fn load(&self) -> Result<Vec<u8>, AkerError> {
        let source = self.source.clone();
        persist::blocking(move || source.load()).await
    }

    /// Check whether `version` needs a reload
    pub fn update_pending(&self, version: i64) -> bool {
        version > 0 && version != self.seen_version
    }

    /// Reload the schedule into `store` if the source has a new version
    ///
    /// The seen version advances before decoding, so a broken document is
    /// attempted once per version rather than on every poll. On a decode
    /// failure the store is left without an active schedule.
    pub async fn poll(&mut self, store: &ScheduleStore) -> Result<LoadOutcome, AkerError> {
        let version = self.poll_version();
        if !self.update_pending(version) {
            return Ok(LoadOutcome::NoUpdate);
        }

        self.seen_version = version;
        info!("Schedule file changed (version {})", version);

        let raw = self.load().await?;

        if store.current_raw().await.as_deref() == Some(raw.as_slice()) {
            debug!("Schedule content unchanged, skipping decode");
            return Ok(LoadOutcome::Unchanged { version });
        }

        match decode_schedule(&raw) {
            Ok(schedule) => {
                debug!(
                    "Decoded schedule: {} rules, {} absolute blocks",
                    schedule.rules.len(),
                    schedule.absolute.len()
                );
                store.install(schedule, raw, version).await;
                info!("Installed schedule version {}", version);
                Ok(LoadOutcome::Installed { version })
            }
            Err(e) => {
                store.clear().await;
                Err(e)
            }
        }
    }
}
