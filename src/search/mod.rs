//! Multi-threaded incremental search.
//!
//! Every term of a query owns a bit in each packed entry. A term whose bit is
//! valid across the whole index is *computed*; a query made only of computed
//! terms is answered from the bits alone without decoding a single line.
//! Otherwise the line of every entry is decoded once, all pending term bits
//! are written, and the query is evaluated on the bits. Both paths evaluate
//! the same bit expression, so they always agree.
//!
//! The index is split into one contiguous partition per worker. Workers only
//! touch their own entries and never wait on each other.

pub mod worker;

use crate::cancel::CancelToken;
use crate::context::{TextLayout, ThreadContext};
use crate::events::{Observer, SearchResult};
use crate::index::{LineIndex, PackedEntry, TermMask};
use crate::query::{Query, TermKey, TermTable};
use crate::storage::Storage;
use anyhow::{anyhow, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::AtomicUsize;
use std::time::Instant;
use tracing::{debug, info, warn};
use worker::{Partition, PartitionOutcome, SearchShared};

/// Split `n` entries into `threads` contiguous ranges.
///
/// Every range gets `n / threads` entries and the first one also takes the
/// remainder, which can leave it noticeably larger when `n` is small.
pub fn partition_bounds(n: usize, threads: usize) -> Vec<(usize, usize)> {
    let threads = threads.clamp(1, n.max(1));
    let size = n / threads;
    let first = size + n % threads;

    let mut bounds = Vec::with_capacity(threads);
    bounds.push((0, first));
    let mut start = first;
    for _ in 1..threads {
        bounds.push((start, start + size));
        start += size;
    }
    bounds
}

pub struct Searcher {
    pool: ThreadPool,
    threads: usize,
    /// Scratch capacity per worker, in bytes
    line_hint: usize,
    /// Terms whose bits are valid on every ALL_EVALUATED entry after an
    /// incomplete run
    partial: Vec<(u8, TermKey)>,
}

impl Searcher {
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("linex-search-{}", i))
            .build()?;
        Ok(Self {
            pool,
            threads,
            line_hint: 0,
            partial: Vec::new(),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Size worker scratch buffers for lines of up to `bytes` bytes
    pub fn set_line_hint(&mut self, bytes: usize) {
        self.line_hint = bytes;
    }

    /// Evaluate `query` over the whole index, updating term bits and MATCHED
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self,
        index: &mut LineIndex,
        storage: &Storage,
        layout: TextLayout,
        query: &Query,
        table: &mut TermTable,
        observer: &dyn Observer,
        cancel: &CancelToken,
    ) -> SearchResult {
        let start = Instant::now();
        storage.drain();

        let pending = table.pending(query.terms());
        if !pending.is_empty() {
            self.prepare(index, table, pending);
        }

        let n = index.partial_count();
        let bounds = partition_bounds(n, self.threads);
        let end_offsets: Vec<u64> = bounds.iter().map(|&(_, end)| index.entry(end).offset()).collect();
        let matchers = table.matchers(pending);
        let processed = AtomicUsize::new(0);
        let shared = SearchShared {
            query,
            pending,
            matchers: &matchers,
            observer,
            cancel,
            processed: &processed,
            total: n,
        };

        debug!(
            query = %query.text,
            entries = n,
            partitions = bounds.len(),
            pending = pending.0,
            "search started"
        );

        let mut outcomes: Vec<Option<std::thread::Result<PartitionOutcome>>> =
            (0..bounds.len()).map(|_| None).collect();
        let reserve = self.line_hint;
        {
            let mut rest = index.partials_mut();
            let mut partitions = Vec::with_capacity(bounds.len());
            for (i, &(lo, hi)) in bounds.iter().enumerate() {
                let (entries, tail) = std::mem::take(&mut rest).split_at_mut(hi - lo);
                rest = tail;
                partitions.push(Partition {
                    start: lo,
                    entries,
                    end_offset: end_offsets[i],
                    report_first: i == 0,
                });
            }

            let shared = &shared;
            self.pool.scope(|scope| {
                for (partition, slot) in partitions.into_iter().zip(outcomes.iter_mut()) {
                    scope.spawn(move |_| {
                        *slot = Some(panic::catch_unwind(AssertUnwindSafe(|| {
                            let mut ctx = ThreadContext::new(storage, layout);
                            ctx.reserve(reserve);
                            partition.run(shared, &mut ctx)
                        })));
                    });
                }
            });
        }

        let mut result = SearchResult::default();
        let mut first_in_partition0 = None;
        for (i, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(outcome)) => {
                    result.match_count += outcome.matches;
                    result.cancelled |= outcome.cancelled;
                    if i == 0 {
                        first_in_partition0 = outcome.first_match;
                    }
                }
                Some(Err(payload)) => {
                    let message = panic_message(payload.as_ref());
                    warn!(partition = i, reason = %message, "search worker panicked");
                    result.error.get_or_insert(anyhow!("search worker {} panicked: {}", i, message));
                }
                None => {
                    result.error.get_or_insert(anyhow!("search worker {} did not run", i));
                }
            }
        }

        result.first_match = match first_in_partition0 {
            Some(first) => Some(first),
            None => {
                let from = bounds.first().map_or(0, |&(_, end)| end);
                let found = index.entries()[from..n].iter().position(|e| e.is_matched()).map(|i| from + i);
                if let Some(first) = found {
                    observer.on_first_match(first);
                }
                found
            }
        };

        if result.is_complete() {
            table.mark_computed(pending);
            self.partial.clear();
        } else {
            self.partial = pending
                .iter()
                .filter_map(|bit| table.term(bit).map(|t| (bit, t.key.clone())))
                .collect();
        }

        result.elapsed = start.elapsed();
        info!(
            query = %query.text,
            matches = result.match_count,
            cancelled = result.cancelled,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "search finished"
        );
        observer.on_search_complete(&result);
        result
    }

    /// Make the bits of `pending` terms ready for evaluation.
    ///
    /// After an incomplete run, entries flagged ALL_EVALUATED still hold valid
    /// bits for the terms of that run; they are reused when every pending term
    /// was among them. Otherwise the pending bits and the evaluation flags are
    /// cleared across the whole index.
    fn prepare(&mut self, index: &mut LineIndex, table: &TermTable, pending: TermMask) {
        let reusable = pending.iter().all(|bit| {
            table
                .term(bit)
                .is_some_and(|t| self.partial.iter().any(|(b, key)| *b == bit && *key == t.key))
        });

        if reusable {
            debug!(pending = pending.0, "resuming partially evaluated terms");
        } else {
            index.clear_flags(pending, PackedEntry::MATCHED | PackedEntry::ALL_EVALUATED);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
