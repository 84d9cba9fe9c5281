//! Crash-safe persistence of the active-target index and activity
//! timestamps.
//!
//! The on-disk layout is fixed and big-endian (spec §6):
//!
//! ```text
//! offset  size  field
//! 0       4     magic cookie 0xE2BD1A96
//! 4       4     format version (currently 1)
//! 8       4     target count N
//! 12      4     active index (signed, -1..N-1)
//! 16      8     standalone last-active ms since epoch (0 = null)
//! 24      8*N   per-target last-active ms since epoch (0 = null)
//! ```
//!
//! Writes go through a temp file that is fsynced and then renamed over
//! the target path, the same atomic-replace shape as
//! `StorageEngine::save_catalog` in the teacher crate, plus the fsync
//! that crash-safety here actually requires.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{FacadeError, Result};

const MAGIC: u32 = 0xE2BD1A96;
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 16;

/// The record persisted to the state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedState {
    /// Number of configured clustered targets this record was written
    /// for. Used only to detect a stale file after a configuration
    /// change; never returned to callers.
    pub target_count: usize,
    /// `-1` for standalone, otherwise an index into the configured
    /// target list.
    pub active_index: i32,
    /// Standalone backend's last-active wall-clock time, if it has ever
    /// been active.
    pub standalone_last_active: Option<SystemTime>,
    /// Per-target last-active wall-clock time, in configured order.
    pub target_last_active: Vec<Option<SystemTime>>,
}

impl PersistedState {
    /// The default record used when no state file exists yet: routes to
    /// the most-preferred clustered target, with no recorded activity.
    pub fn default_for(target_count: usize) -> Self {
        Self {
            target_count,
            active_index: target_count as i32 - 1,
            standalone_last_active: None,
            target_last_active: vec![None; target_count],
        }
    }
}

fn system_time_to_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn millis_to_system_time(millis: u64) -> Option<SystemTime> {
    if millis == 0 {
        None
    } else {
        Some(UNIX_EPOCH + Duration::from_millis(millis))
    }
}

/// Persists [`PersistedState`] to a fixed path using atomic replace.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the state file if present.
    ///
    /// - Missing file: returns `Ok(None)`; the caller should fall back to
    ///   [`PersistedState::default_for`].
    /// - Cookie/version mismatch: fatal, returns `Err`.
    /// - Target count mismatch against `expected_target_count`: a soft
    ///   warning, returns `Ok(None)` as if the file were absent.
    pub fn load(&self, expected_target_count: usize) -> Result<Option<PersistedState>> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.len() < HEADER_LEN {
            return Err(FacadeError::StateFileCorrupt(format!(
                "state file '{}' is too short ({} bytes)",
                self.path.display(),
                bytes.len()
            )));
        }

        let magic = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(FacadeError::StateFileCorrupt(format!(
                "state file '{}' has wrong magic cookie 0x{:08X}",
                self.path.display(),
                magic
            )));
        }

        let version = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(FacadeError::StateFileCorrupt(format!(
                "state file '{}' has unsupported format version {}",
                self.path.display(),
                version
            )));
        }

        let target_count = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) as usize;
        if target_count != expected_target_count {
            log::warn!(
                "state file '{}' was written for {} target(s) but {} are configured; ignoring stale file",
                self.path.display(),
                target_count,
                expected_target_count
            );
            return Ok(None);
        }

        let active_index = i32::from_be_bytes(bytes[12..16].try_into().unwrap());

        let expected_len = HEADER_LEN + 8 + 8 * target_count;
        if bytes.len() < expected_len {
            return Err(FacadeError::StateFileCorrupt(format!(
                "state file '{}' is truncated: expected at least {} bytes, found {}",
                self.path.display(),
                expected_len,
                bytes.len()
            )));
        }

        let standalone_millis = u64::from_be_bytes(bytes[16..24].try_into().unwrap());
        let standalone_last_active = millis_to_system_time(standalone_millis);

        let mut target_last_active = Vec::with_capacity(target_count);
        for i in 0..target_count {
            let start = 24 + 8 * i;
            let millis = u64::from_be_bytes(bytes[start..start + 8].try_into().unwrap());
            target_last_active.push(millis_to_system_time(millis));
        }

        Ok(Some(PersistedState {
            target_count,
            active_index,
            standalone_last_active,
            target_last_active,
        }))
    }

    /// Persist `state` via atomic replace: write a temp file, fsync it,
    /// then rename over the target path.
    pub fn store(&self, state: &PersistedState) -> Result<()> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 8 + 8 * state.target_last_active.len());
        buf.extend_from_slice(&MAGIC.to_be_bytes());
        buf.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        buf.extend_from_slice(&(state.target_last_active.len() as u32).to_be_bytes());
        buf.extend_from_slice(&state.active_index.to_be_bytes());
        buf.extend_from_slice(
            &state
                .standalone_last_active
                .map(system_time_to_millis)
                .unwrap_or(0)
                .to_be_bytes(),
        );
        for t in &state.target_last_active {
            buf.extend_from_slice(&t.map(system_time_to_millis).unwrap_or(0).to_be_bytes());
        }

        let temp_path = temp_path_for(&self.path);
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&buf)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.bin"));
        assert_eq!(store.load(2).unwrap(), None);
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.bin"));

        let state = PersistedState {
            target_count: 2,
            active_index: 1,
            standalone_last_active: Some(UNIX_EPOCH + Duration::from_millis(12_345)),
            target_last_active: vec![None, Some(UNIX_EPOCH + Duration::from_millis(999))],
        };

        store.store(&state).unwrap();
        let loaded = store.load(2).unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn default_for_routes_to_most_preferred_target() {
        let state = PersistedState::default_for(3);
        assert_eq!(state.active_index, 2);
        assert_eq!(state.target_last_active.len(), 3);
        assert!(state.standalone_last_active.is_none());
    }

    #[test]
    fn wrong_magic_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.bin");
        fs::write(&path, [0u8; 32]).unwrap();

        let store = StateStore::new(path);
        match store.load(2) {
            Err(FacadeError::StateFileCorrupt(_)) => {}
            other => panic!("expected StateFileCorrupt, got {:?}", other),
        }
    }

    #[test]
    fn target_count_mismatch_is_ignored_not_fatal() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.bin"));

        let state = PersistedState::default_for(2);
        store.store(&state).unwrap();

        // Configuration changed: now 3 targets instead of 2.
        assert_eq!(store.load(3).unwrap(), None);
    }

    #[test]
    fn active_index_can_be_standalone() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.bin"));

        let mut state = PersistedState::default_for(2);
        state.active_index = -1;
        store.store(&state).unwrap();

        let loaded = store.load(2).unwrap().unwrap();
        assert_eq!(loaded.active_index, -1);
    }

    #[test]
    fn store_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.bin");
        let store = StateStore::new(path.clone());
        store.store(&PersistedState::default_for(1)).unwrap();

        assert!(path.exists());
        assert!(!temp_path_for(&path).exists());
    }
}
