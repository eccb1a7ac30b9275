//! Reentrant per-module read/write lock
//!
//! `get_entity_state` takes the read side, `apply_changes` and `discard`
//! take the write side. The write side is reentrant for the owning thread:
//! while a thread holds it, that thread may read and write again without
//! blocking itself.
//!
//! Guards own an `Arc` of the lock, so a write guard can be stored in a
//! committer and released from another thread. The lock is released when
//! the last write guard of the owner is dropped, whatever the drop order.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock};

struct Owner {
    thread: ThreadId,
    depth: usize,
    _guard: ArcRwLockWriteGuard<RawRwLock, ()>,
}

struct Shared {
    rw: Arc<RwLock<()>>,
    owner: Mutex<Option<Owner>>,
}

/// Reentrant read/write lock scoped to one module
#[derive(Clone)]
pub struct ModuleLock {
    shared: Arc<Shared>,
}

impl ModuleLock {
    /// Create an unlocked lock
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                rw: Arc::new(RwLock::new(())),
                owner: Mutex::new(None),
            }),
        }
    }

    /// Acquire the read side, blocking while another thread writes
    pub fn read(&self) -> ModuleReadGuard {
        if self.is_held_by_current_thread() {
            return ModuleReadGuard { guard: None };
        }
        ModuleReadGuard {
            guard: Some(self.shared.rw.read_arc()),
        }
    }

    /// Acquire the write side, blocking while any other thread holds the lock
    pub fn write(&self) -> ModuleWriteGuard {
        let current = thread::current().id();
        {
            let mut owner = self.shared.owner.lock();
            if let Some(owner) = owner.as_mut().filter(|o| o.thread == current) {
                owner.depth += 1;
                return ModuleWriteGuard {
                    shared: Arc::clone(&self.shared),
                };
            }
        }

        let guard = self.shared.rw.write_arc();
        *self.shared.owner.lock() = Some(Owner {
            thread: current,
            depth: 1,
            _guard: guard,
        });
        ModuleWriteGuard {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Check whether the current thread holds the write side
    pub fn is_held_by_current_thread(&self) -> bool {
        let current = thread::current().id();
        self.shared
            .owner
            .lock()
            .as_ref()
            .map_or(false, |o| o.thread == current)
    }

    /// Check whether any thread holds the write side
    pub fn is_write_locked(&self) -> bool {
        self.shared.rw.is_locked_exclusive()
    }
}

impl Default for ModuleLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModuleLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owner = self.shared.owner.lock();
        f.debug_struct("ModuleLock")
            .field("owner", &owner.as_ref().map(|o| o.thread))
            .field("depth", &owner.as_ref().map_or(0, |o| o.depth))
            .finish()
    }
}

/// Read access to a module; released on drop
pub struct ModuleReadGuard {
    // None when the reader already holds the write side
    guard: Option<ArcRwLockReadGuard<RawRwLock, ()>>,
}

impl ModuleReadGuard {
    /// Check whether this read was served by the thread's own write lock
    pub fn is_reentrant(&self) -> bool {
        self.guard.is_none()
    }
}

impl fmt::Debug for ModuleReadGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleReadGuard")
            .field("reentrant", &self.is_reentrant())
            .finish()
    }
}

/// Write access to a module; released on drop
pub struct ModuleWriteGuard {
    shared: Arc<Shared>,
}

impl Drop for ModuleWriteGuard {
    fn drop(&mut self) {
        let released = {
            let mut owner = self.shared.owner.lock();
            match owner.as_mut() {
                Some(o) if o.depth > 1 => {
                    o.depth -= 1;
                    None
                }
                _ => owner.take(),
            }
        };
        // Unlock outside the owner mutex so waiting writers can record themselves
        drop(released);
    }
}

impl fmt::Debug for ModuleWriteGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleWriteGuard").finish()
    }
}
