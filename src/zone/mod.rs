//! Zone file body handling: chunk-to-line decoding and record parsing

pub mod decoder;
pub mod parser;

pub use decoder::{Compression, LineDecoder, decode_lines};
pub use parser::{ZoneLineParser, parse_line};
