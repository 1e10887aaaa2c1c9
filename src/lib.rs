//! A shared-memory radix tree that publishes per-prefix routing text to
//! out-of-process readers.
//!
//! A single writer owns a fixed-size region of 512-byte blocks mapped into
//! shared memory, addressed by 32-bit block index rather than by pointer
//! (pointer values aren't portable across processes with independent
//! mappings of the same file). The writer walks a 6-bit-per-level radix
//! tree keyed by IP prefix, storing each leaf's rendered text as a
//! deflate-compressed chain of data blocks. Readers in other processes
//! attach to the same region by name, take the shared half of a
//! process-shared `pthread_rwlock_t` embedded in block 0, and walk the same
//! tree to answer exact-prefix and longest-prefix-match lookups.
//!
//! ```text
//! pub mod error    — failure types for each fallible boundary
//! pub mod prefix   — the Prefix type and its text parsing
//!     mod block    — raw block layouts (link/data) and tag bytes
//!     mod region   — the mapped block array and its create/attach paths
//!     mod lock     — the embedded cross-process reader/writer lock
//!     mod alloc    — the writer-local free-range allocator
//!     mod tree     — find/get/delete over the radix tree
//!     mod payload  — the deflate/inflate payload chain codec
//! pub mod writer   — the debounced update queue and batch-apply loop
//! pub mod reader   — the attach-and-lookup API
//! ```
//!
//! `block`, `region`, `lock`, `alloc`, `tree`, and `payload` are internal:
//! callers only need [`writer::Writer`] and [`reader::ReaderHandle`].

pub mod error;
pub mod prefix;
pub mod reader;
pub mod writer;

mod alloc;
mod block;
mod lock;
mod payload;
mod region;
mod tree;

pub use error::{CodecError, QueryError, RegionError};
pub use prefix::Prefix;
pub use reader::ReaderHandle;
pub use writer::{RouteSource, Writer, WriterConfig};
