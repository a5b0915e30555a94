#![forbid(unsafe_code)]
//! Line-oriented season snapshot codec and file helpers.
pub mod file_io;
pub mod snapshot;

pub use snapshot::{parse_season, serialize_season, SnapshotParseError};
