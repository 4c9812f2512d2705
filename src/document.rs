//! A loaded text and everything needed to search and display it.

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::context::{CharFilter, TextLayout, ThreadContext};
use crate::events::{Observer, OperationResult, SearchResult};
use crate::export::{self, ExportOptions, ExportSelection};
use crate::index::{BuildStats, LineIndex};
use crate::loader::{self, BlockSource};
use crate::query::{parse_query, Matcher, Query, QueryError, TermTable};
use crate::search::Searcher;
use crate::storage::{Storage, StorageKind, StorageStats};
use crate::utils::TextEncoding;
use anyhow::Result;
use std::io::Write;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

pub struct Document {
    storage: Storage,
    index: LineIndex,
    layout: TextLayout,
    stats: BuildStats,
    /// Longest partial lines, longest first, as `(partial, bytes)`
    longest: Vec<(usize, u64)>,
    terms: TermTable,
    config: Config,
    /// Built on first search
    searcher: Option<Searcher>,
    last_query: Option<Query>,
}

impl Document {
    /// Load a file, transparently decompressing gzip
    pub fn open(
        path: &Path,
        config: Config,
        observer: &dyn Observer,
        cancel: &CancelToken,
    ) -> Result<(Self, OperationResult)> {
        config.validate()?;
        let mut source = loader::open_path(path)?;
        Ok(Self::load(source.as_mut(), config, observer, cancel))
    }

    /// Load from any block source.
    ///
    /// A cancelled or failed load still yields a document over the content
    /// read so far.
    pub fn load(
        source: &mut dyn BlockSource,
        config: Config,
        observer: &dyn Observer,
        cancel: &CancelToken,
    ) -> (Self, OperationResult) {
        let loaded = loader::load(source, &config, observer, cancel);
        let document = Self {
            storage: loaded.storage,
            index: loaded.index,
            layout: loaded.layout,
            stats: loaded.stats,
            longest: loaded.longest.sorted(),
            terms: TermTable::new(),
            config,
            searcher: None,
            last_query: None,
        };
        (document, loaded.result)
    }

    pub fn index(&self) -> &LineIndex {
        &self.index
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.storage.kind()
    }

    pub fn storage_stats(&self) -> StorageStats {
        self.storage.stats()
    }

    pub fn encoding(&self) -> TextEncoding {
        self.layout.encoding
    }

    pub fn layout(&self) -> TextLayout {
        self.layout
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn terms(&self) -> &TermTable {
        &self.terms
    }

    pub fn longest_lines(&self) -> &[(usize, u64)] {
        &self.longest
    }

    pub fn partial_count(&self) -> usize {
        self.index.partial_count()
    }

    pub fn line_count(&self) -> usize {
        self.index.line_count()
    }

    /// Context returning text as stored
    pub fn thread_context(&self) -> ThreadContext {
        let mut ctx = ThreadContext::new(&self.storage, self.layout);
        ctx.reserve(self.line_hint());
        ctx
    }

    /// Context for display: configured truncation and tab expansion
    pub fn display_context(&self) -> ThreadContext {
        self.thread_context()
            .with_max_chars(self.config.max_line_chars)
            .with_filter(CharFilter::ExpandTabs(self.config.tab_width))
    }

    fn line_hint(&self) -> usize {
        self.longest.first().map_or(0, |&(_, len)| len as usize)
    }

    /// Run a query over the whole document.
    ///
    /// Query errors are returned before any work starts; everything else ends
    /// up in the [`SearchResult`].
    pub fn search(
        &mut self,
        query: &str,
        observer: &dyn Observer,
        cancel: &CancelToken,
    ) -> Result<SearchResult, QueryError> {
        let query = parse_query(query, &mut self.terms)?;

        if self.searcher.is_none() {
            match Searcher::new(self.config.search_threads.resolve()) {
                Ok(mut searcher) => {
                    searcher.set_line_hint(self.line_hint());
                    self.searcher = Some(searcher);
                }
                Err(e) => {
                    let result = SearchResult {
                        error: Some(e.context("Failed to start search threads")),
                        ..SearchResult::default()
                    };
                    observer.on_search_complete(&result);
                    return Ok(result);
                }
            }
        }

        let Some(searcher) = self.searcher.as_mut() else {
            return Ok(SearchResult::default());
        };
        let result = searcher.run(
            &mut self.index,
            &self.storage,
            self.layout,
            &query,
            &mut self.terms,
            observer,
            cancel,
        );
        self.last_query = Some(query);
        Ok(result)
    }

    /// Matchers of the last query's terms, for highlighting
    pub fn highlighters(&self) -> Vec<Arc<Matcher>> {
        self.last_query
            .as_ref()
            .map(|q| self.terms.matchers(q.terms()).into_iter().map(|(_, m)| m).collect())
            .unwrap_or_default()
    }

    /// Partial lines matched by the last search
    pub fn matches(&self) -> impl Iterator<Item = usize> + '_ {
        self.index.matches()
    }

    pub fn select(&mut self, partials: Range<usize>, on: bool) {
        self.index.select(partials, on);
    }

    pub fn clear_selection(&mut self) {
        self.index.clear_selection();
    }

    pub fn selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.index.selected()
    }

    pub fn export(
        &self,
        selection: &ExportSelection,
        out: &mut dyn Write,
        options: ExportOptions,
        observer: &dyn Observer,
        cancel: &CancelToken,
    ) -> OperationResult {
        export::export(
            &self.storage,
            &self.index,
            self.layout,
            selection,
            out,
            options,
            observer,
            cancel,
        )
    }

    /// Export the selected partial lines
    pub fn export_selected(
        &self,
        out: &mut dyn Write,
        options: ExportOptions,
        observer: &dyn Observer,
        cancel: &CancelToken,
    ) -> OperationResult {
        let selection = ExportSelection::Partials(self.selected().collect());
        self.export(&selection, out, options, observer, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThreadCount;
    use crate::events::NoopObserver;
    use crate::loader::ReadSource;
    use std::io::Cursor;

    fn document(text: &str) -> Document {
        let mut source = ReadSource::new(Cursor::new(text.as_bytes().to_vec()), Some(text.len() as u64));
        let config = Config {
            search_threads: ThreadCount::Fixed(2),
            ..Config::default()
        };
        let (doc, result) = Document::load(&mut source, config, &NoopObserver, &CancelToken::new());
        assert!(result.is_complete());
        doc
    }

    fn search(doc: &mut Document, query: &str) -> Vec<usize> {
        let result = doc.search(query, &NoopObserver, &CancelToken::new()).unwrap();
        assert!(result.is_complete());
        doc.matches().collect()
    }

    #[test]
    fn test_search_and_select_roundtrip() {
        let mut doc = document("alpha\nbeta\ngamma\n");
        assert_eq!(search(&mut doc, "a AND NOT beta"), vec![0, 2]);

        doc.select(0..3, true);
        doc.select(1..2, false);
        assert_eq!(doc.selected().collect::<Vec<_>>(), vec![0, 2]);

        // Search never touches the selection
        search(&mut doc, "beta");
        assert_eq!(doc.selected().collect::<Vec<_>>(), vec![0, 2]);

        let mut out = Vec::new();
        let result = doc.export_selected(&mut out, ExportOptions::default(), &NoopObserver, &CancelToken::new());
        assert!(result.is_complete());
        assert_eq!(out, b"alpha\ngamma\n");
    }

    #[test]
    fn test_query_error_is_synchronous() {
        let mut doc = document("alpha\n");
        let err = doc.search("(alpha", &NoopObserver, &CancelToken::new()).unwrap_err();
        assert_eq!(err, QueryError::UnbalancedParen { pos: 0 });
        assert!(doc.terms().is_empty());
    }

    #[test]
    fn test_display_context_expands_tabs() {
        let mut doc = document("a\tb\n");
        doc.config.tab_width = 4;
        let mut ctx = doc.display_context();
        assert_eq!(ctx.partial_line(doc.index(), 0).text, "a   b");
    }
}
