//! The reader side: attach to an existing region by name and look prefixes
//! up under the shared half of the lock. Readers never allocate and never
//! touch anything but the lock and the blocks they walk past.

use std::net::IpAddr;

use crate::error::{QueryError, RegionError};
use crate::lock::RegionLock;
use crate::payload;
use crate::prefix::{self, Prefix, MAX_PREFIX_LEN};
use crate::region::Region;
use crate::tree;

/// An attached, read-only view of a writer's region.
pub struct ReaderHandle {
    region: Region,
    lock: RegionLock,
}

impl ReaderHandle {
    pub fn attach(name: &str) -> Result<Self, RegionError> {
        let (region, lock) = Region::attach(name)?;
        Ok(Self { region, lock })
    }

    /// Look up the exact prefix `"A.B.C.D/L"` (or its v6 equivalent).
    /// Returns `None` for a malformed prefix or a prefix with no entry.
    pub fn find(&self, text: &str) -> Option<Vec<u8>> {
        let prefix = Prefix::parse(text).ok()?;
        self.find_prefix(prefix)
    }

    /// Look up a [`Prefix`] already parsed by the caller.
    pub fn find_prefix(&self, prefix: Prefix) -> Option<Vec<u8>> {
        let _guard = self.lock.read();
        // SAFETY: the read guard is held for the duration of this call.
        let leaf = unsafe { tree::find(&self.region, prefix) }?;
        // SAFETY: `leaf` was just resolved under the read lock.
        unsafe { payload::read(&self.region, leaf).ok() }
    }

    /// Enumerate every prefix covering `address`, longest match first, and
    /// concatenate their decompressed payloads.
    pub fn find_all(&self, address: &str) -> Result<Vec<u8>, QueryError> {
        let addr: IpAddr = prefix::parse_address(address)?;
        let host = Prefix::host(addr);
        let max_len = if addr.is_ipv4() { 32 } else { MAX_PREFIX_LEN };

        let _guard = self.lock.read();
        let mut out = Vec::new();
        for len in (0..=max_len).rev() {
            let candidate = Prefix::new(host.raw_bits(), len);
            // SAFETY: the read guard is held for the duration of the loop.
            if let Some(leaf) = unsafe { tree::find(&self.region, candidate) } {
                // SAFETY: `leaf` was just resolved under the read lock.
                if let Ok(bytes) = unsafe { payload::read(&self.region, leaf) } {
                    out.extend_from_slice(&bytes);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::Allocator;
    use crate::payload as payload_mod;
    use crate::region::{Region, MIN_BLOCKS};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unique_name() -> String {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        format!("query-reader-test-{}", NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[test]
    fn find_on_empty_region_is_none() {
        let name = unique_name();
        let (_writer_region, _lock) = Region::create(&name, MIN_BLOCKS + 16).unwrap();
        let reader = ReaderHandle::attach(&name).unwrap();
        assert_eq!(reader.find("10.0.0.0/8"), None);
    }

    #[test]
    fn find_sees_writer_installed_payload() {
        let name = unique_name();
        let (region, _lock) = Region::create(&name, MIN_BLOCKS + 16).unwrap();
        let mut alloc = Allocator::new(region.block_count());
        let p = Prefix::parse("10.0.0.0/8").unwrap();
        unsafe {
            let idx = tree::get(&region, &mut alloc, p).unwrap();
            payload_mod::write(&region, &mut alloc, idx, b"A").unwrap();
        }

        let reader = ReaderHandle::attach(&name).unwrap();
        assert_eq!(reader.find("10.0.0.0/8"), Some(b"A".to_vec()));
    }

    #[test]
    fn find_all_concatenates_longest_prefix_first() {
        let name = unique_name();
        let (region, _lock) = Region::create(&name, MIN_BLOCKS + 64).unwrap();
        let mut alloc = Allocator::new(region.block_count());
        unsafe {
            let wide = Prefix::parse("10.0.0.0/8").unwrap();
            let narrow = Prefix::parse("10.1.0.0/16").unwrap();
            let w = tree::get(&region, &mut alloc, wide).unwrap();
            payload_mod::write(&region, &mut alloc, w, b"A").unwrap();
            let n = tree::get(&region, &mut alloc, narrow).unwrap();
            payload_mod::write(&region, &mut alloc, n, b"B").unwrap();
        }

        let reader = ReaderHandle::attach(&name).unwrap();
        assert_eq!(reader.find_all("10.1.2.3").unwrap(), b"BA".to_vec());
        assert_eq!(reader.find_all("10.2.2.3").unwrap(), b"A".to_vec());
    }

    #[test]
    fn find_all_on_malformed_address_errors() {
        let name = unique_name();
        let (_region, _lock) = Region::create(&name, MIN_BLOCKS + 8).unwrap();
        let reader = ReaderHandle::attach(&name).unwrap();
        assert!(reader.find_all("not-an-address").is_err());
    }
}
