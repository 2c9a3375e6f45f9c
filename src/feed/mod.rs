pub mod decode;
pub mod exchange;
pub mod indexer;

pub use decode::DecodeError;
