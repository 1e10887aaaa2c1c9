//! The cross-process reader/writer lock embedded in block 0.
//!
//! A single `pthread_rwlock_t` lives inline in shared memory, configured
//! `PTHREAD_PROCESS_SHARED` (and, on glibc, writer-preferring) so it can be
//! acquired from any process that has the region mapped. Guards release the
//! lock unconditionally on drop, including on panic unwinds through a held
//! guard.

use crate::block::{set_tag, BlockTag, BLOCK_SIZE};
use crate::error::RegionError;

const HEADER_RESERVED: usize = 4;
const LOCK_OFFSET: usize = HEADER_RESERVED;
const LOCKATTR_OFFSET: usize = LOCK_OFFSET + std::mem::size_of::<libc::pthread_rwlock_t>();

const _: () =
    assert!(LOCKATTR_OFFSET + std::mem::size_of::<libc::pthread_rwlockattr_t>() <= BLOCK_SIZE);

/// A handle to the lock living inside a mapped header block.
///
/// Cloning is cheap (it's just a raw pointer) and intentional: every reader
/// and the writer each hold their own handle pointing at the same bytes.
pub struct RegionLock {
    lock: *mut libc::pthread_rwlock_t,
}

// SAFETY: `pthread_rwlock_t` is designed to be shared across threads and
// processes once initialized with `PTHREAD_PROCESS_SHARED`; the pointer
// itself is never dereferenced outside of the pthread calls below.
unsafe impl Send for RegionLock {}
unsafe impl Sync for RegionLock {}

impl RegionLock {
    /// Initialize a fresh lock in a header block. Must be called exactly
    /// once, by the region's creator, before any reader attaches.
    ///
    /// # Safety
    ///
    /// `header` must point at a block that outlives every [`RegionLock`]
    /// handle built from it (i.e. the whole life of the mapped region).
    pub unsafe fn init(header: *mut [u8; BLOCK_SIZE]) -> Result<Self, RegionError> {
        set_tag(&mut *header, BlockTag::Header);

        let base = header as *mut u8;
        let lock = base.add(LOCK_OFFSET) as *mut libc::pthread_rwlock_t;
        let attr = base.add(LOCKATTR_OFFSET) as *mut libc::pthread_rwlockattr_t;

        check(libc::pthread_rwlockattr_init(attr))?;
        check(libc::pthread_rwlockattr_setpshared(
            attr,
            libc::PTHREAD_PROCESS_SHARED,
        ))?;
        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        check(libc::pthread_rwlockattr_setkind_np(
            attr,
            libc::PTHREAD_RWLOCK_PREFER_WRITER_NONRECURSIVE_NP,
        ))?;
        check(libc::pthread_rwlock_init(lock, attr))?;

        Ok(Self { lock })
    }

    /// Attach to a lock that was already initialized by the region's creator.
    ///
    /// # Safety
    ///
    /// `header` must point at a block previously initialized by [`Self::init`]
    /// and must outlive this handle.
    pub unsafe fn attach(header: *mut [u8; BLOCK_SIZE]) -> Self {
        let base = header as *mut u8;
        let lock = base.add(LOCK_OFFSET) as *mut libc::pthread_rwlock_t;
        Self { lock }
    }

    /// Acquire the shared (reader) half of the lock for the life of the guard.
    pub fn read(&self) -> ReadGuard<'_> {
        let rc = unsafe { libc::pthread_rwlock_rdlock(self.lock) };
        assert_eq!(rc, 0, "acquiring the region read lock failed (errno {rc})");
        ReadGuard { lock: self }
    }

    /// Acquire the exclusive (writer) half of the lock for the life of the guard.
    pub fn write(&self) -> WriteGuard<'_> {
        let rc = unsafe { libc::pthread_rwlock_wrlock(self.lock) };
        assert_eq!(rc, 0, "acquiring the region write lock failed (errno {rc})");
        WriteGuard { lock: self }
    }
}

fn check(rc: i32) -> Result<(), RegionError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(RegionError::LockInit(rc))
    }
}

/// Held for the duration of one reader lookup.
pub struct ReadGuard<'a> {
    lock: &'a RegionLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_rwlock_unlock(self.lock.lock);
        }
    }
}

/// Held for the duration of one writer batch.
pub struct WriteGuard<'a> {
    lock: &'a RegionLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_rwlock_unlock(self.lock.lock);
        }
    }
}
