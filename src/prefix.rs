//! IP prefixes as the radix tree walks them: a left-justified bit string and
//! a length, independent of whether the address is v4 or v6.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::QueryError;

/// The longest prefix the tree can hold (a full IPv6 address).
pub const MAX_PREFIX_LEN: u8 = 128;

/// An address prefix: `len` significant bits, MSB first, held in the top of
/// a 128-bit word so v4 and v6 prefixes walk the same 6-bit-chunk logic.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix {
    bits: u128,
    len: u8,
}

impl Prefix {
    pub fn new(bits: u128, len: u8) -> Self {
        assert!(len <= MAX_PREFIX_LEN, "prefix length out of range");
        let mask = if len == 0 { 0 } else { !0u128 << (128 - len) };
        Self { bits: bits & mask, len }
    }

    pub fn from_v4(addr: Ipv4Addr, len: u8) -> Self {
        assert!(len <= 32, "IPv4 prefix length out of range");
        let bits = (u32::from(addr) as u128) << 96;
        Self::new(bits, len)
    }

    pub fn from_v6(addr: Ipv6Addr, len: u8) -> Self {
        Self::new(u128::from(addr), len)
    }

    pub fn from_addr(addr: IpAddr, len: u8) -> Self {
        match addr {
            IpAddr::V4(a) => Self::from_v4(a, len),
            IpAddr::V6(a) => Self::from_v6(a, len),
        }
    }

    /// A prefix that matches every address of the given family at its widest length.
    pub fn host(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(a) => Self::from_v4(a, 32),
            IpAddr::V6(a) => Self::from_v6(a, 128),
        }
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    /// The raw bit string, independent of `len`. Used to re-truncate a host
    /// address to a series of shorter prefixes during longest-match scans.
    pub(crate) fn raw_bits(&self) -> u128 {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Extract `count` bits (0..=6) starting at bit offset `start`, MSB first.
    pub fn chunk(&self, start: u8, count: u8) -> u32 {
        debug_assert!(count <= 6);
        if count == 0 {
            return 0;
        }
        let shift = 128 - start as u32 - count as u32;
        ((self.bits >> shift) & ((1u128 << count) - 1)) as u32
    }

    /// Parse `"A.B.C.D/L"` or `"h:h:.../L"`.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let (addr_part, len_part) = text
            .split_once('/')
            .ok_or_else(|| QueryError::MalformedPrefix(text.to_string()))?;
        let addr: IpAddr = addr_part
            .parse()
            .map_err(|_| QueryError::MalformedPrefix(text.to_string()))?;
        let len: u8 = len_part
            .parse()
            .map_err(|_| QueryError::MalformedPrefix(text.to_string()))?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        if len > max {
            return Err(QueryError::MalformedPrefix(text.to_string()));
        }
        Ok(Self::from_addr(addr, len))
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prefix(0x{:032x}/{})", self.bits, self.len)
    }
}

/// Parse a bare address (no prefix length) for `find_all`-style longest-prefix scans.
pub fn parse_address(text: &str) -> Result<IpAddr, QueryError> {
    text.parse()
        .map_err(|_| QueryError::MalformedAddress(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_matches_manual_bits() {
        let p = Prefix::from_v4(Ipv4Addr::new(0b10101010, 0, 0, 0), 8);
        assert_eq!(p.chunk(0, 6), 0b101010);
        assert_eq!(p.chunk(6, 2), 0b10);
    }

    #[test]
    fn zero_length_prefix_is_all_zero_bits() {
        let p = Prefix::from_v4(Ipv4Addr::new(10, 0, 0, 0), 0);
        assert_eq!(p.chunk(0, 6), 0);
        assert_eq!(p.len(), 0);
    }

    #[test]
    fn parse_v4_and_v6() {
        let p = Prefix::parse("10.1.0.0/16").unwrap();
        assert_eq!(p.len(), 16);
        let p6 = Prefix::parse("2001:db8::/32").unwrap();
        assert_eq!(p6.len(), 32);
        assert!(Prefix::parse("not-an-ip/8").is_err());
        assert!(Prefix::parse("10.0.0.0/99").is_err());
    }

    #[test]
    fn masks_bits_beyond_length() {
        let a = Prefix::from_v4(Ipv4Addr::new(255, 255, 255, 255), 8);
        let b = Prefix::from_v4(Ipv4Addr::new(255, 0, 0, 0), 8);
        assert_eq!(a, b);
    }
}
