use thiserror::Error;

/// Failures opening, creating, or mapping the backing shared region.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegionError {
    /// The named region doesn't exist (reader attach against a missing writer).
    #[error("shared region {0:?} does not exist")]
    Missing(String),
    /// Couldn't open or create the backing file.
    #[error("opening shared region failed")]
    Open(#[source] std::io::Error),
    /// Couldn't take the advisory exclusive lock guarding single-writer access.
    #[error("another writer already holds the shared region")]
    Lock(#[source] std::io::Error),
    /// Couldn't resize the backing file to the requested block count.
    #[error("resizing shared region to {requested} blocks failed")]
    Resize {
        requested: u32,
        #[source]
        source: std::io::Error,
    },
    /// Couldn't memory-map the backing file.
    #[error("mapping shared region failed")]
    Map(#[source] std::io::Error),
    /// The region's on-disk size doesn't divide evenly into 512-byte blocks.
    #[error("shared region size {0} is not a whole number of 512-byte blocks")]
    SizeMismatch(u64),
    /// Initializing the process-shared lock in block 0 failed.
    #[error("initializing the shared reader/writer lock failed (errno {0})")]
    LockInit(i32),
}

/// Codec failures while writing or reading a leaf's payload chain.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("compression rejected the input stream")]
    Compress,
    #[error("decompression rejected the stored stream")]
    Decompress,
    /// The allocator ran out of blocks while growing the payload chain.
    #[error("region is full: could not allocate another payload block")]
    OutOfSpace,
}

/// Malformed textual input to the reader API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error("{0:?} is not a valid prefix of the form address/length")]
    MalformedPrefix(String),
    #[error("{0:?} is not a valid address")]
    MalformedAddress(String),
}
