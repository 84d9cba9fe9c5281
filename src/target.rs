//! Per-clustered-backend configuration and runtime availability state.

use std::sync::Arc;
use std::time::SystemTime;

use crate::backend::Backend;
use crate::error::{FacadeError, Result};
use crate::merge::MergeStrategy;
use crate::timestamp::Timestamp;

/// Configuration for one clustered backend in the fallback list.
///
/// Targets are held in increasing preference: index 0 is the least
/// preferred clustered target, the last index the most preferred. This
/// type is `Clone` (cheap — every field is an `Arc` or a plain value) so
/// a configuration snapshot can be handed back to callers without
/// exposing the live runtime state the controller mutates; see
/// [`crate::facade::FacadeDatabase::fallback_targets`].
#[derive(Clone)]
pub struct FallbackTarget {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) check_availability: Arc<dyn Fn() -> Result<bool> + Send + Sync>,
    pub(crate) check_interval_ms: u64,
    pub(crate) min_available_time_ms: u64,
    pub(crate) min_unavailable_time_ms: u64,
    pub(crate) rejoin_merge_strategy: Arc<dyn MergeStrategy>,
    pub(crate) unavailable_merge_strategy: Arc<dyn MergeStrategy>,
}

impl FallbackTarget {
    /// Build a target configuration. `check_availability` is invoked by
    /// the availability probe off the facade lock (spec §4.5 step 2);
    /// any `Err` it returns is treated the same as a `false` result.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn Backend>,
        check_availability: Arc<dyn Fn() -> Result<bool> + Send + Sync>,
        check_interval_ms: u64,
        min_available_time_ms: u64,
        min_unavailable_time_ms: u64,
        rejoin_merge_strategy: Arc<dyn MergeStrategy>,
        unavailable_merge_strategy: Arc<dyn MergeStrategy>,
    ) -> Self {
        Self {
            backend,
            check_availability,
            check_interval_ms,
            min_available_time_ms,
            min_unavailable_time_ms,
            rejoin_merge_strategy,
            unavailable_merge_strategy,
        }
    }

    /// Validate this target's configuration in isolation (a non-null
    /// backend and a positive check interval). Cross-target validation
    /// (a non-empty list) happens in `FacadeDatabase::start`.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.check_interval_ms == 0 {
            return Err(FacadeError::Configuration(
                "target check_interval_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// The mutable, per-target state the controller and probes maintain.
/// Lives behind the facade's single coarse lock; never exposed directly
/// to callers (see [`FallbackTargetSnapshot`] for the copy that is).
#[derive(Debug, Clone, Default)]
pub(crate) struct TargetRuntime {
    /// The debounced availability the controller acts on.
    pub(crate) available: bool,
    /// Set while the raw probe result disagrees with `available`, to the
    /// moment that disagreement started; cleared as soon as the raw
    /// result agrees with `available` again. The probe flips `available`
    /// once this has stood for `min_available_time_ms` /
    /// `min_unavailable_time_ms`, implementing the hysteresis spec §4.2
    /// describes.
    pub(crate) pending_since: Option<Timestamp>,
    /// The last time `available` actually flipped, kept for diagnostics.
    pub(crate) last_change_timestamp: Option<Timestamp>,
    pub(crate) last_active_time: Option<SystemTime>,
}

impl TargetRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

/// A deep-copied, point-in-time view of one target's configuration and
/// runtime state, safe to hand to callers (spec §6
/// `fallback_targets()`).
#[derive(Debug, Clone)]
pub struct FallbackTargetSnapshot {
    pub check_interval_ms: u64,
    pub min_available_time_ms: u64,
    pub min_unavailable_time_ms: u64,
    pub available: bool,
    pub last_active_time: Option<SystemTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_backend::MemoryBackend;
    use crate::merge::{NoneMerge, OverwriteMerge};

    fn sample_target(interval_ms: u64) -> FallbackTarget {
        FallbackTarget::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(|| Ok(true)),
            interval_ms,
            1_000,
            2_000,
            Arc::new(OverwriteMerge),
            Arc::new(NoneMerge),
        )
    }

    #[test]
    fn zero_interval_fails_validation() {
        let target = sample_target(0);
        assert!(target.validate().is_err());
    }

    #[test]
    fn positive_interval_validates() {
        let target = sample_target(500);
        assert!(target.validate().is_ok());
    }

    #[test]
    fn runtime_defaults_to_unavailable_with_no_history() {
        let runtime = TargetRuntime::new();
        assert!(!runtime.available);
        assert!(runtime.pending_since.is_none());
        assert!(runtime.last_change_timestamp.is_none());
        assert!(runtime.last_active_time.is_none());
    }
}
