//! Raw 512-byte block layouts. Block 0 is the header, block 1 is the root
//! link block; everything else is allocated on demand as either a link or a
//! data block. Blocks are addressed by 32-bit index, never by pointer, since
//! the region is mapped at an independent address in every process.

use bytemuck::{Pod, Zeroable};

/// Size of a single block in the region.
pub const BLOCK_SIZE: usize = 512;

/// Usable payload bytes in a data block.
pub const DATA_BUF_LEN: usize = 504;

/// High bit of a `link[]` slot: the slot holds a data block index directly,
/// short-circuiting an otherwise-empty link block for prefixes whose length
/// is an exact multiple of 6.
pub const LINK_TO_DATA_BIT: u32 = 0x8000_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockTag {
    Free = 0,
    Header = 1,
    Link = 2,
    Data = 3,
}

impl BlockTag {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Free),
            1 => Some(Self::Header),
            2 => Some(Self::Link),
            3 => Some(Self::Data),
            _ => None,
        }
    }
}

pub fn tag_of(block: &[u8; BLOCK_SIZE]) -> u8 {
    block[0]
}

pub fn set_tag(block: &mut [u8; BLOCK_SIZE], tag: BlockTag) {
    block[0] = tag as u8;
}

/// Layout of a link (interior) block: 6-bit branching plus six small arrays
/// for "the remaining prefix is less than 6 bits" tails.
#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct LinkRaw {
    pub tag: u8,
    pub count_data: u8,
    pub count_link: u8,
    _reserved: u8,
    pub data0: [u32; 1],
    pub data1: [u32; 2],
    pub data2: [u32; 4],
    pub data3: [u32; 8],
    pub data4: [u32; 16],
    pub data5: [u32; 32],
    pub link: [u32; 64],
}

const _: () = assert!(std::mem::size_of::<LinkRaw>() == BLOCK_SIZE);

impl LinkRaw {
    pub fn new() -> Self {
        Self {
            tag: BlockTag::Link as u8,
            ..Zeroable::zeroed()
        }
    }

    /// The short-tail array for a remaining prefix length of 0..=5 bits.
    pub fn data_slots_mut(&mut self, remaining: u8) -> &mut [u32] {
        match remaining {
            0 => &mut self.data0,
            1 => &mut self.data1,
            2 => &mut self.data2,
            3 => &mut self.data3,
            4 => &mut self.data4,
            5 => &mut self.data5,
            _ => panic!("remaining prefix length out of range for a data slot"),
        }
    }

    pub fn data_slots(&self, remaining: u8) -> &[u32] {
        match remaining {
            0 => &self.data0,
            1 => &self.data1,
            2 => &self.data2,
            3 => &self.data3,
            4 => &self.data4,
            5 => &self.data5,
            _ => panic!("remaining prefix length out of range for a data slot"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count_data == 0 && self.count_link == 0
    }
}

impl Default for LinkRaw {
    fn default() -> Self {
        Self::new()
    }
}

pub fn link_view(block: &[u8; BLOCK_SIZE]) -> &LinkRaw {
    bytemuck::from_bytes(&block[..])
}

pub fn link_view_mut(block: &mut [u8; BLOCK_SIZE]) -> &mut LinkRaw {
    bytemuck::from_bytes_mut(&mut block[..])
}

/// Layout of a data (leaf payload) block: a chunk of a compressed byte
/// stream, chained to its continuation by `next`.
#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct DataRaw {
    pub tag: u8,
    _reserved: u8,
    pub length: u16,
    pub next: u32,
    pub data: [u8; DATA_BUF_LEN],
}

const _: () = assert!(std::mem::size_of::<DataRaw>() == BLOCK_SIZE);

impl DataRaw {
    pub fn new() -> Self {
        Self {
            tag: BlockTag::Data as u8,
            ..Zeroable::zeroed()
        }
    }
}

impl Default for DataRaw {
    fn default() -> Self {
        Self::new()
    }
}

pub fn data_view(block: &[u8; BLOCK_SIZE]) -> &DataRaw {
    bytemuck::from_bytes(&block[..])
}

pub fn data_view_mut(block: &mut [u8; BLOCK_SIZE]) -> &mut DataRaw {
    bytemuck::from_bytes_mut(&mut block[..])
}
