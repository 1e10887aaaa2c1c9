//! Reading and writing a leaf's payload: a zlib-compressed byte stream
//! chained across as many 504-byte data blocks as it takes.
//!
//! Both directions reuse flate2's streaming `Compress`/`Decompress` state
//! across block boundaries rather than compressing each block
//! independently, so the chain is one continuous deflate stream split on
//! arbitrary byte boundaries, not one stream per block.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::alloc::{alloc_block, free_chain, Allocator};
use crate::block::{data_view, data_view_mut, BlockTag};
use crate::error::CodecError;
use crate::region::Region;

/// Compress `payload` into the data block chain rooted at `head`, reusing
/// existing blocks in the chain before allocating new ones, and freeing any
/// now-unused tail once the stream finishes.
///
/// # Safety
///
/// `head` must be a live data block and the caller must hold the region's
/// write lock.
pub unsafe fn write(
    region: &Region,
    alloc: &mut Allocator,
    head: u32,
    payload: &[u8],
) -> Result<(), CodecError> {
    let mut compress = Compress::new(Compression::default(), true);
    let mut cur = head;
    let mut offset = 0usize;

    loop {
        let block = region.block_mut(cur);
        let data = data_view_mut(block);
        let existing_next = data.next;

        let mut out_pos = 0usize;
        let mut finished = false;

        loop {
            let remaining_in = &payload[offset..];
            let flush = if remaining_in.is_empty() {
                FlushCompress::Finish
            } else {
                FlushCompress::None
            };
            let before_in = compress.total_in();
            let before_out = compress.total_out();
            let status = compress
                .compress(remaining_in, &mut data.data[out_pos..], flush)
                .map_err(|_| CodecError::Compress)?;
            offset += (compress.total_in() - before_in) as usize;
            out_pos += (compress.total_out() - before_out) as usize;

            if status == Status::StreamEnd {
                finished = true;
                break;
            }
            if out_pos == data.data.len() {
                break;
            }
        }

        data.length = out_pos as u16;

        if finished {
            let leftover = data.next;
            data.next = 0;
            if leftover != 0 {
                free_chain(region, alloc, leftover);
            }
            return Ok(());
        }

        let next_block = if existing_next != 0 {
            existing_next
        } else {
            alloc_block(region, alloc, BlockTag::Data).ok_or(CodecError::OutOfSpace)?
        };
        data.next = next_block;
        cur = next_block;
    }
}

/// Decompress the data block chain rooted at `head` into one contiguous
/// buffer. Any malformed stream (a chain that ends without the deflate
/// stream signaling completion, or a codec rejection) aborts rather than
/// returning a partial result.
///
/// # Safety
///
/// `head` must be a live data block and the caller must hold at least the
/// region's read lock.
pub unsafe fn read(region: &Region, head: u32) -> Result<Vec<u8>, CodecError> {
    let mut decompress = Decompress::new(true);
    let mut out = vec![0u8; crate::block::DATA_BUF_LEN * 2];
    let mut out_len = 0usize;
    let mut cur = head;

    loop {
        let block = region.block(cur);
        let data = data_view(block);
        let input = &data.data[..data.length as usize];
        let next = data.next;
        let flush = if next == 0 {
            FlushDecompress::Finish
        } else {
            FlushDecompress::None
        };

        let mut in_pos = 0usize;
        loop {
            if out_len == out.len() {
                out.resize(out.len() * 2, 0);
            }
            let before_in = decompress.total_in();
            let before_out = decompress.total_out();
            let status = decompress
                .decompress(&input[in_pos..], &mut out[out_len..], flush)
                .map_err(|_| CodecError::Decompress)?;
            in_pos += (decompress.total_in() - before_in) as usize;
            out_len += (decompress.total_out() - before_out) as usize;

            if status == Status::StreamEnd {
                out.truncate(out_len);
                return Ok(out);
            }
            if in_pos >= input.len() {
                break;
            }
        }

        if next == 0 {
            return Err(CodecError::Decompress);
        }
        cur = next;
    }
}
