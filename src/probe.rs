//! Background availability probing for one clustered target.
//!
//! One thread per configured target runs [`run`] for as long as the
//! facade is started. Each tick calls the target's
//! `check_availability` closure off the facade lock (so a slow or
//! misbehaving check can't stall transactions) and applies the result
//! to that target's [`TargetRuntime`] through the hysteresis rule in
//! §4.2: a raw result only flips the debounced `available` flag once it
//! has disagreed with the current state for at least
//! `min_available_time_ms` / `min_unavailable_time_ms`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::shared::Shared;
use crate::timestamp::Timestamp;

/// Run the availability probe for `target_index` until `cancel` is set
/// or `epoch` no longer matches `spawn_epoch` (the facade was stopped
/// and possibly restarted).
pub(crate) fn run(
    target_index: usize,
    shared: Arc<Shared>,
    cancel: Arc<AtomicBool>,
    epoch: Arc<AtomicU64>,
    spawn_epoch: u64,
) {
    let target = shared.targets[target_index].clone();

    loop {
        if cancel.load(Ordering::SeqCst) || epoch.load(Ordering::SeqCst) != spawn_epoch {
            return;
        }

        let raw = (target.check_availability)().unwrap_or(false);
        apply_observation(&shared, target_index, raw);

        sleep_cancellable(
            Duration::from_millis(target.check_interval_ms),
            &cancel,
            &epoch,
            spawn_epoch,
        );
    }
}

/// Sleep in short increments so cancellation is noticed promptly instead
/// of only after the full interval elapses.
fn sleep_cancellable(
    total: Duration,
    cancel: &AtomicBool,
    epoch: &AtomicU64,
    spawn_epoch: u64,
) {
    const SLICE: Duration = Duration::from_millis(100);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if cancel.load(Ordering::SeqCst) || epoch.load(Ordering::SeqCst) != spawn_epoch {
            return;
        }
        let slice = remaining.min(SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
}

fn apply_observation(shared: &Shared, target_index: usize, raw: bool) {
    let mut inner = shared.inner.lock().expect("facade lock poisoned");
    let rt = &mut inner.target_runtime[target_index];

    // Spec §4.5 step 4 / §3: null any stored timestamp once it's near
    // rollover so the hysteresis arithmetic below never has to deal with
    // an ambiguous (possibly wrong-signed) "how long ago" computed from
    // it. `last_change_timestamp` is diagnostic-only and simply dropped;
    // `pending_since` feeds `offset_from_now` directly below, so nulling
    // it here restarts the dwell timer from this observation rather than
    // risk treating a stale instant as the opposite sign.
    if rt.last_change_timestamp.is_some_and(|ts| ts.is_rollover_danger()) {
        rt.last_change_timestamp = None;
    }
    if rt.pending_since.is_some_and(|ts| ts.is_rollover_danger()) {
        rt.pending_since = None;
    }

    if raw == rt.available {
        rt.pending_since = None;
        return;
    }

    let now = Timestamp::now();
    let pending_since = *rt.pending_since.get_or_insert(now);
    let elapsed_ms = pending_since.offset_from_now().max(0) as u64;

    let threshold_ms = if raw {
        shared.targets[target_index].min_available_time_ms
    } else {
        shared.targets[target_index].min_unavailable_time_ms
    };

    if elapsed_ms >= threshold_ms {
        log::info!(
            "target {} availability changed: {} -> {}",
            target_index,
            rt.available,
            raw
        );
        rt.available = raw;
        rt.pending_since = None;
        rt.last_change_timestamp = Some(now);
        drop(inner);
        shared.wake.notify_all();
    }
}
