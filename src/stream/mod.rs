//! Line-delimited stream-json decoding for agent output.

pub mod codec;
pub mod decoder;

pub use codec::{StreamCodec, MAX_LINE_BYTES};
pub use decoder::{parse_stream_line, LineDecoder};
