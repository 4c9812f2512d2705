//! # linex - line indexing and search for very large text files
//!
//! linex loads a text of arbitrary size into chunked storage, builds a compact
//! index of its lines and searches it with boolean queries on all cores.
//! Results of every query term are kept as bits in the index, so refining a
//! query only pays for the terms that changed.
//!
//! ## Architecture
//!
//! - [`storage`] - chunked content, optionally LZ4-compressed in the background
//! - [`index`] - the line index and its streaming builder
//! - [`loader`] - block sources (plain, mmap, gzip) and the load loop
//! - [`context`] - per-thread decoding of lines into text
//! - [`query`] - query parsing and the term table
//! - [`search`] - the partitioned, resumable search
//! - [`export`] - raw byte export, optionally gzip-compressed
//! - [`document`] - everything above behind one handle
//!
//! ## Quick Start
//!
//! ```ignore
//! use linex::{CancelToken, Config, Document, NoopObserver};
//! use std::path::Path;
//!
//! let cancel = CancelToken::new();
//! let (mut doc, _) = Document::open(Path::new("huge.log"), Config::default(), &NoopObserver, &cancel)?;
//! let result = doc.search("error AND NOT r:timeout\\s+\\d+", &NoopObserver, &cancel)?;
//!
//! for partial in doc.matches().take(10) {
//!     let mut ctx = doc.display_context();
//!     println!("{}", ctx.partial_line(doc.index(), partial).text);
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod context;
pub mod document;
pub mod events;
pub mod export;
pub mod index;
pub mod loader;
pub mod output;
pub mod query;
pub mod search;
pub mod storage;
pub mod utils;

pub use cancel::CancelToken;
pub use config::Config;
pub use document::Document;
pub use events::{NoopObserver, Observer, OperationResult, SearchResult};
pub use export::{ExportOptions, ExportSelection};
