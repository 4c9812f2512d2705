//! Line index.
//!
//! Every line of the loaded text is described by one or more packed entries
//! (offset + flags). Lines longer than the configured maximum are split into
//! partial lines; a continuation flag marks every partial after the first.

pub mod builder;
pub mod entry;
pub mod line_index;
pub mod longest;

pub use builder::{BuildStats, LineIndexBuilder};
pub use entry::{PackedEntry, TermMask, FLAGS_WIDTH, MAX_OFFSET, TERM_BITS};
pub use line_index::LineIndex;
pub use longest::LongestLines;
