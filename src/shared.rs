//! The facade's single coarse lock and the mutable state it guards.
//!
//! Every background thread (one per target's availability probe, plus
//! the migration-check loop) and every `FacadeDatabase` method holds a
//! reference to one `Shared`, created fresh each time `start()`
//! succeeds and dropped on `stop()`. Splitting this out of
//! `FacadeDatabase` itself keeps the pre-start configuration surface
//! (which has its own, simpler mutability rules) separate from the
//! running facade's state machine.

use std::sync::{Arc, Condvar, Mutex};
use std::time::SystemTime;

use crate::backend::Backend;
use crate::state_store::StateStore;
use crate::target::{FallbackTarget, TargetRuntime};

/// The facade's mutable runtime state, guarded by `Shared::inner`.
///
/// This is deliberately one flat struct rather than several smaller
/// locks: spec §5 calls for "a single facade-scoped mutex [that] guards
/// all mutable facade state", so that the swap of `current_active_index`
/// and the bump of `migration_count` are atomic with respect to
/// `create_transaction()` reading them (invariant 5, §3).
pub(crate) struct Inner {
    pub(crate) migrating: bool,
    pub(crate) current_active_index: i32,
    pub(crate) migration_count: u64,
    pub(crate) last_standalone_active_time: Option<SystemTime>,
    pub(crate) target_runtime: Vec<TargetRuntime>,
}

/// Everything a running facade needs: the frozen-at-start configuration
/// plus the mutable [`Inner`] state and the two condition variables built
/// on top of it.
pub(crate) struct Shared {
    pub(crate) state_store: StateStore,
    pub(crate) standalone: Arc<dyn Backend>,
    /// Clustered targets, in increasing preference (index 0 least
    /// preferred, last index most preferred). Frozen for the lifetime of
    /// this `Shared`; only `Inner::target_runtime` (same length) mutates.
    pub(crate) targets: Vec<FallbackTarget>,
    pub(crate) inner: Mutex<Inner>,
    /// The migration-check loop waits on this with a timeout equal to
    /// its cadence; an availability probe that observes an edge
    /// notifies it so the check runs promptly instead of waiting out
    /// the rest of the cadence (spec §4.6's "performance optimization").
    pub(crate) wake: Condvar,
    /// Broadcast once a migration finishes (committed or aborted), so
    /// `stop()` can drain any in-flight migration before tearing
    /// anything down.
    pub(crate) migration_done: Condvar,
}

impl Shared {
    /// The backend at `index` (`-1` for standalone).
    pub(crate) fn backend_at(&self, index: i32) -> &dyn Backend {
        if index < 0 {
            self.standalone.as_ref()
        } else {
            self.targets[index as usize].backend.as_ref()
        }
    }
}
