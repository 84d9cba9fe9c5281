//! Pluggable data-copy policy run between an outgoing and an incoming
//! backend transaction during a migration.

use std::time::SystemTime;

use crate::backend::Transaction;
use crate::error::Result;

/// Copies (or deliberately doesn't copy) data from an outgoing backend's
/// read-only transaction into an incoming backend's read-write
/// transaction.
///
/// Implementations must be stateless: the same strategy instance may be
/// invoked concurrently from different migrations over the lifetime of
/// a facade (never truly concurrently in this crate, since only one
/// migration runs at a time, but nothing prevents a caller from sharing
/// one `Arc<dyn MergeStrategy>` across multiple [`crate::FallbackTarget`]
/// configurations).
pub trait MergeStrategy: Send + Sync {
    /// Run the merge. `src` is read-only (opened with
    /// [`crate::backend::Consistency::EventualCommitted`] when the
    /// outgoing backend is clustered); `dst` is read-write. `dst_last_active`
    /// is the incoming backend's last recorded active time, or `None` if
    /// it has never been active, matching spec §4.3's
    /// `last_active_time_of_dst_or_null`.
    fn merge(
        &self,
        src: &dyn Transaction,
        dst: &mut dyn Transaction,
        dst_last_active: Option<SystemTime>,
    ) -> Result<()>;
}

/// Clears the destination, then copies every key from the source.
pub struct OverwriteMerge;

impl MergeStrategy for OverwriteMerge {
    fn merge(
        &self,
        src: &dyn Transaction,
        dst: &mut dyn Transaction,
        _dst_last_active: Option<SystemTime>,
    ) -> Result<()> {
        dst.clear()?;
        for (key, value) in src.scan()? {
            dst.put(&key, &value)?;
        }
        Ok(())
    }
}

/// Leaves the destination unchanged.
pub struct NoneMerge;

impl MergeStrategy for NoneMerge {
    fn merge(
        &self,
        _src: &dyn Transaction,
        _dst: &mut dyn Transaction,
        _dst_last_active: Option<SystemTime>,
    ) -> Result<()> {
        Ok(())
    }
}
