//! Long-lived connection slot shared by every worker of a run

use std::sync::Mutex;

use libunieval_core::TransferError;

enum Slot<T> {
    Empty,
    Open(T),
    Closed,
}

/// Lazily-created, cloneable connection handle.
///
/// `T` is a cheap handle onto a pooled transport (a reqwest client, a tonic
/// channel). The first caller creates it; later callers get clones of the
/// same handle. After [`close`](Self::close) every access fails.
pub struct SharedConnection<T> {
    slot: Mutex<Slot<T>>,
}

impl<T: Clone> SharedConnection<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// Get the connection, creating it with `init` on first use
    pub fn get_or_try_init<F>(&self, init: F) -> Result<T, TransferError>
    where
        F: FnOnce() -> Result<T, TransferError>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match &*slot {
            Slot::Open(conn) => Ok(conn.clone()),
            Slot::Closed => Err(TransferError::ConnectionRefused("adapter closed".to_string())),
            Slot::Empty => {
                let conn = init()?;
                *slot = Slot::Open(conn.clone());
                Ok(conn)
            }
        }
    }

    /// Drop the connection. Returns true if one was open.
    pub fn close(&self) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        let was_open = matches!(*slot, Slot::Open(_));
        *slot = Slot::Closed;
        was_open
    }

    pub fn is_open(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*slot, Slot::Open(_))
    }
}

impl<T: Clone> Default for SharedConnection<T> {
    fn default() -> Self {
        Self::new()
    }
}
