//! Lazily established, mutex-guarded backend connections.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::error::{StoreError, StoreResult};

use super::BackendKind;

/// A connection handle that is opened on first use and cached afterwards.
///
/// - A failed connect leaves the slot empty and reports
///   [`StoreError::Unavailable`]; the next call tries again.
/// - An operation failing with a connection-level error drops the cached handle.
/// - Access is serialized by a mutex, so one handle is never used by two requests at once.
pub struct LazyConnection<C> {
    backend: BackendKind,
    slot: Mutex<Option<C>>,
}

impl<C> fmt::Debug for LazyConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyConnection")
            .field("backend", &self.backend)
            .field("connected", &self.slot.try_lock().ok().map(|slot| slot.is_some()))
            .finish()
    }
}

impl<C> LazyConnection<C> {
    /// Create an empty slot for `backend`.
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            slot: Mutex::new(None),
        }
    }

    /// Whether a handle is currently cached.
    pub fn is_connected(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Drop the cached handle, if any.
    pub fn reset(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Run `op` against the cached handle, opening it with `connect` first if needed.
    pub fn with<T>(
        &self,
        connect: impl FnOnce() -> StoreResult<C>,
        op: impl FnOnce(&mut C) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = match &mut *slot {
            Some(conn) => conn,
            empty => empty.insert(self.open(connect)?),
        };

        let result = op(conn);
        if let Err(e) = &result {
            if e.is_connection_failure() {
                tracing::warn!(backend = %self.backend, error = %e, "dropping broken connection");
                *slot = None;
            }
        }
        result
    }

    fn open(&self, connect: impl FnOnce() -> StoreResult<C>) -> StoreResult<C> {
        match connect() {
            Ok(conn) => {
                tracing::info!(backend = %self.backend, "connected");
                Ok(conn)
            }
            Err(e) => {
                tracing::warn!(backend = %self.backend, error = %e, "connection failed");
                Err(match e {
                    StoreError::Unavailable { .. } => e,
                    other => StoreError::Unavailable {
                        backend: self.backend,
                        reason: other.to_string(),
                    },
                })
            }
        }
    }
}
