//! Single-migration arbitration: deciding the best target to be on, and
//! carrying out the handoff from the current target to a better one.
//!
//! Only one migration ever runs at a time (`Inner::migrating` guards
//! this) — spec §4.4's "no concurrent migrations" invariant — so this
//! module has no locking of its own beyond the facade's single coarse
//! mutex on [`Shared`].

use std::sync::Arc;
use std::time::SystemTime;

use crate::backend::Consistency;
use crate::shared::{Inner, Shared};
use crate::target::FallbackTarget;

/// Pick the target the facade should ideally be on right now: the most
/// preferred (highest-index) clustered target that is currently
/// debounced-available, or standalone (`-1`) if none are.
///
/// This does not consult `current_active_index` at all — it answers
/// "what's best", not "should we move". [`maybe_migrate`] is what
/// decides whether the answer differs enough from where we are to act
/// on it.
pub(crate) fn select_best(inner: &Inner, targets: &[FallbackTarget]) -> i32 {
    for idx in (0..targets.len()).rev() {
        if inner.target_runtime[idx].available {
            return idx as i32;
        }
    }
    -1
}

/// One tick of the migration-check loop: compute the best target and,
/// if it differs from the current one and no migration is already in
/// flight, run it. Returns once the decision is made — a `false` result
/// means either nothing needed to change or a migration was already
/// running (the next tick will pick it up).
pub(crate) fn maybe_migrate(shared: &Arc<Shared>) -> bool {
    let dst_idx = {
        let inner = shared.inner.lock().expect("facade lock poisoned");
        if inner.migrating {
            return false;
        }
        let best = select_best(&inner, &shared.targets);
        if best == inner.current_active_index {
            return false;
        }
        best
    };

    execute_migration(shared, dst_idx);
    true
}

/// Which merge strategy applies for a migration from `src_idx` to
/// `dst_idx`. A move to a higher index is a rejoin (prefer the
/// incoming target's own strategy); a move to a lower index is a
/// degrade (prefer the outgoing target's strategy) — spec §4.3/§4.6.
fn merge_strategy_for(
    src_idx: i32,
    dst_idx: i32,
    targets: &[FallbackTarget],
) -> Arc<dyn crate::merge::MergeStrategy> {
    if dst_idx > src_idx {
        Arc::clone(&targets[dst_idx as usize].rejoin_merge_strategy)
    } else {
        Arc::clone(&targets[src_idx as usize].unavailable_merge_strategy)
    }
}

fn last_active_of(inner: &Inner, idx: i32) -> Option<SystemTime> {
    if idx < 0 {
        inner.last_standalone_active_time
    } else {
        inner.target_runtime[idx as usize].last_active_time
    }
}

fn set_last_active(inner: &mut Inner, idx: i32, when: SystemTime) {
    if idx < 0 {
        inner.last_standalone_active_time = Some(when);
    } else {
        inner.target_runtime[idx as usize].last_active_time = Some(when);
    }
}

/// Carry out a single migration from the current active target to
/// `dst_idx`. Always clears `Inner::migrating` and notifies
/// `migration_done` before returning, including on every error path, so
/// `stop()` can never block forever waiting for a migration that
/// silently gave up.
fn execute_migration(shared: &Arc<Shared>, dst_idx: i32) {
    let src_idx = {
        let mut inner = shared.inner.lock().expect("facade lock poisoned");
        inner.migrating = true;
        inner.current_active_index
    };

    log::info!("migrating from target {} to target {}", src_idx, dst_idx);

    let result = run_merge(shared, src_idx, dst_idx);

    let mut inner = shared.inner.lock().expect("facade lock poisoned");
    match result {
        Ok(()) => {
            let now = SystemTime::now();
            inner.current_active_index = dst_idx;
            inner.migration_count += 1;
            set_last_active(&mut inner, dst_idx, now);

            let state = crate::state_store::PersistedState {
                target_count: shared.targets.len(),
                active_index: dst_idx,
                standalone_last_active: inner.last_standalone_active_time,
                target_last_active: inner
                    .target_runtime
                    .iter()
                    .map(|rt| rt.last_active_time)
                    .collect(),
            };
            if let Err(e) = shared.state_store.store(&state) {
                log::error!("failed to persist migration state: {}", e);
            }

            log::info!(
                "migration to target {} complete (migration_count={})",
                dst_idx,
                inner.migration_count
            );
        }
        Err(e) if e.is_retryable() => {
            log::info!(
                "migration from target {} to target {} aborted, will retry: {}",
                src_idx,
                dst_idx,
                e
            );
        }
        Err(e) => {
            log::error!(
                "migration from target {} to target {} aborted: {}",
                src_idx,
                dst_idx,
                e
            );
        }
    }
    inner.migrating = false;
    drop(inner);
    shared.migration_done.notify_all();
    shared.wake.notify_all();
}

fn run_merge(shared: &Arc<Shared>, src_idx: i32, dst_idx: i32) -> crate::error::Result<()> {
    let dst_last_active = {
        let inner = shared.inner.lock().expect("facade lock poisoned");
        last_active_of(&inner, dst_idx)
    };

    let src_backend = shared.backend_at(src_idx);
    let dst_backend = shared.backend_at(dst_idx);

    let src_consistency = if src_idx < 0 {
        Consistency::Strong
    } else {
        Consistency::EventualCommitted
    };
    let src_tx = src_backend.create_transaction_with_consistency(src_consistency)?;
    let mut dst_tx = dst_backend.create_transaction()?;

    let strategy = merge_strategy_for(src_idx, dst_idx, &shared.targets);
    let merge_result = strategy.merge(src_tx.as_ref(), dst_tx.as_mut(), dst_last_active);

    if let Err(e) = merge_result {
        let _ = dst_tx.rollback();
        let _ = src_tx.rollback();
        return Err(e);
    }

    // Commit src_tx first, then dst_tx (spec order). src_tx is read-only
    // and eventual-committed when clustered, so its commit never needs a
    // quorum and has no observable effect to undo; if it still fails,
    // dst_tx (not yet committed) is rolled back and the migration aborts.
    // If dst_tx's commit then fails, src_tx's already-successful read-only
    // commit has nothing left to roll back.
    if let Err(e) = src_tx.commit() {
        let _ = dst_tx.rollback();
        return Err(e);
    }
    dst_tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_backend::MemoryBackend;
    use crate::merge::{NoneMerge, OverwriteMerge};
    use crate::shared::Inner;
    use crate::target::TargetRuntime;
    use std::sync::Arc as StdArc;

    fn sample_targets(n: usize) -> Vec<FallbackTarget> {
        (0..n)
            .map(|_| {
                FallbackTarget::new(
                    StdArc::new(MemoryBackend::new()),
                    StdArc::new(|| Ok(true)),
                    1_000,
                    0,
                    0,
                    StdArc::new(OverwriteMerge),
                    StdArc::new(NoneMerge),
                )
            })
            .collect()
    }

    fn inner_with_availability(flags: &[bool], current: i32) -> Inner {
        Inner {
            migrating: false,
            current_active_index: current,
            migration_count: 0,
            last_standalone_active_time: None,
            target_runtime: flags
                .iter()
                .map(|&available| TargetRuntime {
                    available,
                    ..TargetRuntime::new()
                })
                .collect(),
        }
    }

    #[test]
    fn select_best_prefers_highest_available_index() {
        let targets = sample_targets(3);
        let inner = inner_with_availability(&[true, false, true], -1);
        assert_eq!(select_best(&inner, &targets), 2);
    }

    #[test]
    fn select_best_falls_back_to_standalone_when_none_available() {
        let targets = sample_targets(2);
        let inner = inner_with_availability(&[false, false], 1);
        assert_eq!(select_best(&inner, &targets), -1);
    }

    #[test]
    fn merge_strategy_picks_rejoin_when_moving_up_and_unavailable_when_moving_down() {
        let make_target = || {
            FallbackTarget::new(
                StdArc::new(MemoryBackend::new()),
                StdArc::new(|| Ok(true)),
                1_000,
                0,
                0,
                StdArc::new(OverwriteMerge),
                StdArc::new(NoneMerge),
            )
        };
        let targets = vec![make_target(), make_target()];

        // -1 (standalone) -> 0: rejoin, so targets[0].rejoin_merge_strategy.
        let picked = merge_strategy_for(-1, 0, &targets);
        assert!(StdArc::ptr_eq(&picked, &targets[0].rejoin_merge_strategy));

        // 1 -> 0: degrade, so targets[1].unavailable_merge_strategy.
        let picked = merge_strategy_for(1, 0, &targets);
        assert!(StdArc::ptr_eq(&picked, &targets[1].unavailable_merge_strategy));
    }
}
