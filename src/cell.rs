//! # Shared state/command cells.
//!
//! A [`SharedCell`] pairs a value with a reader/writer lock: many concurrent
//! readers or a single writer. The active controller advances in place under
//! a shared lock on the robot state and an exclusive lock on the actuator
//! command; an external ingester writes the state and an external emitter
//! consumes the command through clones of the same cells.
//!
//! ## Rules
//! - Guards are scoped: release is guaranteed on every exit path, including
//!   failure paths inside a controller.
//! - The cell never copies on read.
//! - The manager never dereferences cell contents; it only hands cells to
//!   controllers at construction.

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Robot state cell, written by the sensor ingester and read by controllers.
pub type StateCell<S> = SharedCell<S>;

/// Actuator command cell, written by the active controller and consumed by
/// the actuator emitter. Single-writer in practice; carries the same lock
/// type as the state cell for symmetry.
pub type CommandCell<C> = SharedCell<C>;

/// Reader/writer-guarded cell holding one shared value.
pub struct SharedCell<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for SharedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedCell<T> {
    /// Creates a new cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    /// Acquires a shared read guard. Many readers may hold this at once.
    pub async fn read_shared(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().await
    }

    /// Acquires an exclusive write guard.
    pub async fn write_exclusive(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().await
    }
}

impl<T: Default> Default for SharedCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_readers_share_the_cell() {
        let cell = SharedCell::new(7u32);
        let a = cell.read_shared().await;
        let b = cell.read_shared().await;
        assert_eq!(*a, 7);
        assert_eq!(*b, 7);
    }

    #[tokio::test]
    async fn writer_sees_latest_value() {
        let cell = SharedCell::new(0u32);
        {
            let mut w = cell.write_exclusive().await;
            *w = 42;
        }
        assert_eq!(*cell.read_shared().await, 42);
    }

    #[tokio::test]
    async fn clones_alias_the_same_value() {
        let cell = SharedCell::new(String::from("stand"));
        let alias = cell.clone();
        {
            let mut w = alias.write_exclusive().await;
            w.push_str("ing");
        }
        assert_eq!(*cell.read_shared().await, "standing");
    }
}
