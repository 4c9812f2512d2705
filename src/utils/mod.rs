//! Shared helpers.
//!
//! - [`encoding`] - text encoding detection, window alignment and decoding
//! - [`progress`] - progress bar that compiles to a no-op without the
//!   `progress` feature

pub mod encoding;
pub mod progress;

pub use encoding::*;
