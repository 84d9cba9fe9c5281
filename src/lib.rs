//! A partition-tolerant key/value facade.
//!
//! [`FacadeDatabase`] multiplexes application transactions across a
//! prioritized list of clustered backends and a standalone fallback,
//! migrating between them as backends become available or unavailable,
//! and invalidates any transaction left open across a migration
//! boundary rather than let it commit against a backend that's no
//! longer serving traffic.
//!
//! Backend key/value stores themselves are external collaborators: this
//! crate only ever sees them through the [`backend::Backend`] and
//! [`backend::Transaction`] traits.

pub mod backend;
pub mod error;
pub mod facade;
pub mod memory_backend;
pub mod merge;
pub mod state_store;
pub mod target;
pub mod timestamp;
pub mod transaction;

mod controller;
mod probe;
mod shared;

pub use backend::{Backend, Consistency, Transaction};
pub use error::{FacadeError, Result};
pub use facade::{FacadeDatabase, TransactionOptions};
pub use merge::{MergeStrategy, NoneMerge, OverwriteMerge};
pub use state_store::{PersistedState, StateStore};
pub use target::{FallbackTarget, FallbackTargetSnapshot};
pub use transaction::FacadeTransaction;
