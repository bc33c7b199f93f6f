//! Chunked file transfer primitives: deterministic chunk partitioning,
//! ranged chunk reads, source file validation and throughput estimation.

mod chunked;
mod progress;
mod source;
mod validation;

pub use chunked::{ChunkPlan, ChunkRange, ChunkReader};
pub use progress::SpeedCalculator;
pub use source::SourceFile;
pub use validation::{
    ALLOWED_EXTENSIONS, ALLOWED_MIME_TYPES, DEFAULT_MAX_FILE_SIZE, ValidationError,
    guess_mime_type, validate_video_file,
};

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("file has {chunks} chunks, more than the protocol supports")]
    TooManyChunks { chunks: u64 },

    #[error("source file changed: expected {expected} bytes, found {actual}")]
    SourceChanged { expected: u64, actual: u64 },
}
