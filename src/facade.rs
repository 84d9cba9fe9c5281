//! The public entry point: a key/value facade that transparently
//! migrates application traffic across a prioritized list of clustered
//! backends and a standalone fallback.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crate::backend::Backend;
use crate::controller;
use crate::error::{FacadeError, Result};
use crate::probe;
use crate::shared::{Inner, Shared};
use crate::state_store::{PersistedState, StateStore};
use crate::target::{FallbackTarget, FallbackTargetSnapshot};
use crate::transaction::FacadeTransaction;

/// Options for [`FacadeDatabase::create_transaction_with_options`].
/// Empty today; accepted so new options can be added without breaking
/// callers, per spec §6's `create_transaction(options)` surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {}

/// How often the migration-check loop wakes up even without an
/// availability-edge notification, so a target that slowly drifts back
/// into its hysteresis window is still picked up promptly.
const MIGRATION_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration set before [`FacadeDatabase::start`]. Not accessible
/// (and not mutable) once the facade has started — see each setter.
#[derive(Default)]
struct Config {
    state_file: Option<PathBuf>,
    standalone: Option<Arc<dyn Backend>>,
    targets: Vec<FallbackTarget>,
}

struct ScheduledTask {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Partition-tolerant key/value facade.
///
/// Configure it with the setters, call [`start`](Self::start), issue
/// transactions with [`create_transaction`](Self::create_transaction),
/// and call [`stop`](Self::stop) to shut it down. A `FacadeDatabase` can
/// be started, stopped, and reconfigured any number of times over its
/// lifetime.
pub struct FacadeDatabase {
    config: Mutex<Config>,
    shared: Mutex<Option<Arc<Shared>>>,
    tasks: Mutex<Vec<ScheduledTask>>,
    epoch: Arc<AtomicU64>,
}

impl Default for FacadeDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl FacadeDatabase {
    /// Create an unconfigured, unstarted facade.
    pub fn new() -> Self {
        Self {
            config: Mutex::new(Config::default()),
            shared: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    fn require_not_started(&self) -> Result<()> {
        if self.shared.lock().expect("facade lock poisoned").is_some() {
            return Err(FacadeError::AlreadyStarted);
        }
        Ok(())
    }

    /// Set the path the facade persists its active-target state to.
    /// Required before [`start`](Self::start).
    pub fn set_state_file(&self, path: PathBuf) -> Result<()> {
        self.require_not_started()?;
        self.config.lock().expect("facade lock poisoned").state_file = Some(path);
        Ok(())
    }

    /// Set the standalone fallback backend, used when no clustered
    /// target is available. Required before [`start`](Self::start).
    pub fn set_standalone_target(&self, backend: Arc<dyn Backend>) -> Result<()> {
        self.require_not_started()?;
        self.config.lock().expect("facade lock poisoned").standalone = Some(backend);
        Ok(())
    }

    /// Set the prioritized list of clustered targets, least preferred
    /// first. Required before [`start`](Self::start): at least one
    /// target must be configured.
    pub fn set_fallback_targets(&self, targets: Vec<FallbackTarget>) -> Result<()> {
        self.require_not_started()?;
        for target in &targets {
            target.validate()?;
        }
        self.config.lock().expect("facade lock poisoned").targets = targets;
        Ok(())
    }

    /// Start the facade: start every configured backend, load persisted
    /// state (or default to the most-preferred clustered target), and
    /// spawn the availability probes and migration-check loop.
    pub fn start(&self) -> Result<()> {
        let mut shared_guard = self.shared.lock().expect("facade lock poisoned");
        if shared_guard.is_some() {
            return Err(FacadeError::AlreadyStarted);
        }

        let config = self.config.lock().expect("facade lock poisoned");
        let state_file = config
            .state_file
            .clone()
            .ok_or_else(|| FacadeError::Configuration("state file path not set".into()))?;
        let standalone = config
            .standalone
            .clone()
            .ok_or_else(|| FacadeError::Configuration("standalone target not set".into()))?;
        let targets = config.targets.clone();
        drop(config);

        if targets.is_empty() {
            return Err(FacadeError::Configuration(
                "at least one fallback target must be configured".into(),
            ));
        }

        let state_store = StateStore::new(state_file);
        let persisted = match state_store.load(targets.len())? {
            Some(p) => p,
            None => PersistedState::default_for(targets.len()),
        };
        let active_index = if persisted.active_index >= targets.len() as i32 {
            log::warn!(
                "persisted active index {} out of range for {} target(s); defaulting",
                persisted.active_index,
                targets.len()
            );
            PersistedState::default_for(targets.len()).active_index
        } else {
            persisted.active_index
        };

        standalone.start()?;
        for (i, target) in targets.iter().enumerate() {
            if let Err(e) = target.backend.start() {
                for started in &targets[..i] {
                    let _ = started.backend.stop();
                }
                let _ = standalone.stop();
                return Err(e);
            }
        }

        // Seed the restored (or default) active index as already
        // `available`, unobserved. Spec §4.6's selection algorithm treats
        // the currently-active index as `previous_available` unconditionally,
        // so its very first raw observation is trusted with no dwell; since
        // this crate folds hysteresis into the probe's debounce instead of
        // re-deriving it at decision time, the same index must start out
        // `available` here or the migration-check loop would see every
        // target unavailable on its first tick and migrate away from a
        // healthy persisted target before the probe has had even one chance
        // to confirm it, then migrate back once `min_available_time_ms`
        // elapses — self-inflicted thrash on every restart.
        let target_runtime = targets
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let mut rt = crate::target::TargetRuntime::new();
                rt.last_active_time = persisted.target_last_active.get(i).copied().flatten();
                rt.available = i as i32 == active_index;
                rt
            })
            .collect();

        let shared = Arc::new(Shared {
            state_store,
            standalone,
            targets,
            inner: Mutex::new(Inner {
                migrating: false,
                current_active_index: active_index,
                migration_count: 0,
                last_standalone_active_time: persisted.standalone_last_active,
                target_runtime,
            }),
            wake: std::sync::Condvar::new(),
            migration_done: std::sync::Condvar::new(),
        });

        let spawn_epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let mut tasks = self.tasks.lock().expect("facade lock poisoned");

        for idx in 0..shared.targets.len() {
            let cancel = Arc::new(AtomicBool::new(false));
            let handle = {
                let shared = Arc::clone(&shared);
                let cancel = Arc::clone(&cancel);
                let epoch = Arc::clone(&self.epoch);
                std::thread::spawn(move || probe::run(idx, shared, cancel, epoch, spawn_epoch))
            };
            tasks.push(ScheduledTask { cancel, handle });
        }

        {
            let cancel = Arc::new(AtomicBool::new(false));
            let handle = {
                let shared = Arc::clone(&shared);
                let cancel = Arc::clone(&cancel);
                let epoch = Arc::clone(&self.epoch);
                std::thread::spawn(move || {
                    run_migration_check_loop(shared, cancel, epoch, spawn_epoch)
                })
            };
            tasks.push(ScheduledTask { cancel, handle });
        }

        *shared_guard = Some(shared);
        Ok(())
    }

    /// Stop the facade: wait for any in-flight migration to finish,
    /// cancel and join every background thread, and stop every backend.
    /// Backend `stop()` failures are logged, not propagated — by the
    /// time we're stopping, there is no longer a meaningful "undo" for
    /// a backend that refuses to shut down.
    pub fn stop(&self) -> Result<()> {
        let shared = {
            let mut guard = self.shared.lock().expect("facade lock poisoned");
            guard.take().ok_or(FacadeError::NotStarted)?
        };

        {
            let mut inner = shared.inner.lock().expect("facade lock poisoned");
            while inner.migrating {
                inner = shared
                    .migration_done
                    .wait(inner)
                    .expect("facade lock poisoned");
            }
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        shared.wake.notify_all();

        let tasks = std::mem::take(&mut *self.tasks.lock().expect("facade lock poisoned"));
        for task in &tasks {
            task.cancel.store(true, Ordering::SeqCst);
        }
        for task in tasks {
            let _ = task.handle.join();
        }

        if let Err(e) = shared.standalone.stop() {
            log::warn!("error stopping standalone backend: {}", e);
        }
        for target in &shared.targets {
            if let Err(e) = target.backend.stop() {
                log::warn!("error stopping target backend: {}", e);
            }
        }

        Ok(())
    }

    /// Open a transaction against whichever backend is currently active.
    pub fn create_transaction(&self) -> Result<FacadeTransaction> {
        let shared = self.current_shared()?;
        let (index, migration_count) = {
            let inner = shared.inner.lock().expect("facade lock poisoned");
            (inner.current_active_index, inner.migration_count)
        };
        let tx = shared.backend_at(index).create_transaction()?;
        Ok(FacadeTransaction::new(tx, shared, migration_count))
    }

    /// Equivalent to [`create_transaction`](Self::create_transaction),
    /// accepting an options value for forward compatibility. `options`
    /// is currently always empty and has no effect.
    pub fn create_transaction_with_options(
        &self,
        options: TransactionOptions,
    ) -> Result<FacadeTransaction> {
        let TransactionOptions {} = options;
        self.create_transaction()
    }

    /// The index of the currently active target (`-1` for standalone).
    pub fn current_target_index(&self) -> Result<i32> {
        let shared = self.current_shared()?;
        let inner = shared.inner.lock().expect("facade lock poisoned");
        Ok(inner.current_active_index)
    }

    /// The standalone backend's last-active time, if it has ever been
    /// the active target.
    pub fn last_standalone_active_time(&self) -> Result<Option<SystemTime>> {
        let shared = self.current_shared()?;
        let inner = shared.inner.lock().expect("facade lock poisoned");
        Ok(inner.last_standalone_active_time)
    }

    /// A point-in-time snapshot of every configured clustered target's
    /// configuration and runtime availability state.
    pub fn fallback_targets(&self) -> Result<Vec<FallbackTargetSnapshot>> {
        let shared = self.current_shared()?;
        let inner = shared.inner.lock().expect("facade lock poisoned");
        Ok(shared
            .targets
            .iter()
            .zip(inner.target_runtime.iter())
            .map(|(target, rt)| FallbackTargetSnapshot {
                check_interval_ms: target.check_interval_ms,
                min_available_time_ms: target.min_available_time_ms,
                min_unavailable_time_ms: target.min_unavailable_time_ms,
                available: rt.available,
                last_active_time: rt.last_active_time,
            })
            .collect())
    }

    fn current_shared(&self) -> Result<Arc<Shared>> {
        self.shared
            .lock()
            .expect("facade lock poisoned")
            .clone()
            .ok_or(FacadeError::NotStarted)
    }
}

fn run_migration_check_loop(
    shared: Arc<Shared>,
    cancel: Arc<AtomicBool>,
    epoch: Arc<AtomicU64>,
    spawn_epoch: u64,
) {
    loop {
        if cancel.load(Ordering::SeqCst) || epoch.load(Ordering::SeqCst) != spawn_epoch {
            return;
        }

        controller::maybe_migrate(&shared);

        let inner = shared.inner.lock().expect("facade lock poisoned");
        let _ = shared
            .wake
            .wait_timeout(inner, MIGRATION_CHECK_INTERVAL)
            .expect("facade lock poisoned");
    }
}
