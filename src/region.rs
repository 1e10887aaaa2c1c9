//! The block region: a fixed array of 512-byte blocks backed by shared
//! memory, addressed by 32-bit block index rather than by pointer so the
//! same contents mean the same thing no matter where each process happens
//! to map it.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use fs4::fs_std::FileExt;
use memmap2::{MmapOptions, MmapRaw};

use crate::block::{link_view_mut, set_tag, BlockTag, BLOCK_SIZE};
use crate::error::RegionError;
use crate::lock::RegionLock;

/// Block 1 always holds the tree root.
pub const ROOT_BLOCK: u32 = 1;

/// The minimum region size: header, root, and at least one spare block.
pub const MIN_BLOCKS: u32 = 3;

fn region_path(name: &str) -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/dev/shm").join(name)
    }
    #[cfg(not(target_os = "linux"))]
    {
        std::env::temp_dir().join(name)
    }
}

/// A mapped block region. Both the writer and readers wrap one of these;
/// only the writer is expected to call the `_mut` accessors.
pub struct Region {
    map: MmapRaw,
    block_count: u32,
    // Kept alive for the duration of the mapping; for the writer this also
    // holds the advisory exclusive lock that refuses a second writer.
    _file: File,
}

// SAFETY: the region is, by construction, shared mutable memory guarded by
// the cross-process rwlock in `RegionLock`; `Region` itself does no
// synchronization and trusts callers to hold the appropriate guard.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Create (or truncate) the named region with `block_count` blocks and
    /// initialize its header and root blocks. Fails if another writer
    /// already holds the region.
    pub fn create(name: &str, block_count: u32) -> Result<(Self, RegionLock), RegionError> {
        assert!(block_count >= MIN_BLOCKS, "region too small to hold a tree");
        let path = region_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(RegionError::Open)?;
        file.try_lock_exclusive().map_err(RegionError::Lock)?;

        let size = block_count as u64 * BLOCK_SIZE as u64;
        file.set_len(size).map_err(|source| RegionError::Resize {
            requested: block_count,
            source,
        })?;

        let map = MmapOptions::new()
            .len(size as usize)
            .map_raw(&file)
            .map_err(RegionError::Map)?;

        let region = Self {
            map,
            block_count,
            _file: file,
        };

        // SAFETY: we're the only initialized handle to this fresh mapping.
        unsafe {
            let header = region.block_mut(0) as *mut _;
            let lock = RegionLock::init(header)?;

            let root = region.block_mut(ROOT_BLOCK);
            set_tag(root, BlockTag::Link);
            *link_view_mut(root) = Default::default();

            tracing::info!(name, block_count, "created shared query region");
            Ok((region, lock))
        }
    }

    /// Attach to an already-running writer's region.
    pub fn attach(name: &str) -> Result<(Self, RegionLock), RegionError> {
        let path = region_path(name);
        if !path.exists() {
            return Err(RegionError::Missing(name.to_string()));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(RegionError::Open)?;

        let len = file.metadata().map_err(RegionError::Open)?.len();
        if len == 0 || len % BLOCK_SIZE as u64 != 0 {
            return Err(RegionError::SizeMismatch(len));
        }
        let block_count = (len / BLOCK_SIZE as u64) as u32;

        let map = MmapOptions::new()
            .len(len as usize)
            .map_raw(&file)
            .map_err(RegionError::Map)?;

        let region = Self {
            map,
            block_count,
            _file: file,
        };

        // SAFETY: the creator has already initialized block 0's lock before
        // this path could exist at the size we just validated.
        let lock = unsafe { RegionLock::attach(region.block_mut(0) as *mut _) };
        Ok((region, lock))
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    fn base_ptr(&self) -> *mut u8 {
        self.map.as_mut_ptr()
    }

    /// # Safety
    ///
    /// `idx` must be `< block_count`. The caller is responsible for holding
    /// the appropriate half of the region lock for the access pattern in use.
    pub unsafe fn block(&self, idx: u32) -> &[u8; BLOCK_SIZE] {
        debug_assert!(idx < self.block_count, "block index out of range");
        &*(self.base_ptr().add(idx as usize * BLOCK_SIZE) as *const [u8; BLOCK_SIZE])
    }

    /// # Safety
    ///
    /// Same requirements as [`Self::block`], plus: only the writer, holding
    /// the exclusive lock, may call this.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn block_mut(&self, idx: u32) -> &mut [u8; BLOCK_SIZE] {
        debug_assert!(idx < self.block_count, "block index out of range");
        &mut *(self.base_ptr().add(idx as usize * BLOCK_SIZE) as *mut [u8; BLOCK_SIZE])
    }
}
