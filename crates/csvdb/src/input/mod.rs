//! Reading table files from disk.

mod parser;
mod source;

pub use parser::{Parser, ParserConfig, UNNAMED_PREFIX, is_gzip};
pub use source::{RawFragment, SourceMetadata};
