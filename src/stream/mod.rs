//! Stream module - writing streamed values as PLP chunks.

mod output;

pub use output::{TdsOutputStream, PLP_CHUNK_HEADER_SIZE, UNICODE_PREAMBLE};
