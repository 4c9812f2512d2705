//! Evaluation of one index partition.

use crate::cancel::{CancelToken, CANCEL_CHECK_INTERVAL};
use crate::context::ThreadContext;
use crate::events::Observer;
use crate::index::{PackedEntry, TermMask};
use crate::query::{Matcher, Query};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// State shared by every worker of one search
pub struct SearchShared<'a> {
    pub query: &'a Query,
    /// Terms whose bits must be computed from line text
    pub pending: TermMask,
    pub matchers: &'a [(u8, Arc<Matcher>)],
    pub observer: &'a dyn Observer,
    pub cancel: &'a CancelToken,
    pub processed: &'a AtomicUsize,
    pub total: usize,
}

impl SearchShared<'_> {
    fn report(&self, batch: usize) {
        let done = self.processed.fetch_add(batch, Ordering::Relaxed) + batch;
        let percent = (done.min(self.total) * 100 / self.total.max(1)) as u8;
        self.observer.on_progress(percent);
    }
}

/// Result of one partition
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PartitionOutcome {
    pub matches: usize,
    /// Lowest matching partial line in the partition
    pub first_match: Option<usize>,
    pub cancelled: bool,
}

pub struct Partition<'a> {
    /// Index of `entries[0]` in the whole index
    pub start: usize,
    pub entries: &'a mut [PackedEntry],
    /// Offset where the last entry of the partition ends
    pub end_offset: u64,
    /// Report the first match as soon as it is found
    pub report_first: bool,
}

impl Partition<'_> {
    pub fn run(self, shared: &SearchShared<'_>, ctx: &mut ThreadContext) -> PartitionOutcome {
        let mut outcome = PartitionOutcome::default();
        let entries = self.entries;
        let len = entries.len();
        let mut reported = 0;

        for k in 0..len {
            if k > 0 && k % CANCEL_CHECK_INTERVAL == 0 {
                shared.report(k - reported);
                reported = k;
                if shared.cancel.is_cancelled() {
                    // Unreached entries must not keep the previous query's result
                    for entry in &mut entries[k..] {
                        entry.set(PackedEntry::MATCHED, false);
                    }
                    outcome.cancelled = true;
                    return outcome;
                }
            }

            let end = match entries.get(k + 1) {
                Some(next) => next.offset(),
                None => self.end_offset,
            };
            let entry = &mut entries[k];

            if !shared.pending.is_empty() && !entry.all_evaluated() {
                let line = ctx.text(entry.offset()..end);
                for (bit, matcher) in shared.matchers {
                    entry.set_term(*bit, !line.faulted && matcher.is_match(line.text));
                }
                entry.set(PackedEntry::ALL_EVALUATED, true);
            }

            let hit = shared.query.matches(entry.terms());
            entry.set(PackedEntry::MATCHED, hit);
            if hit {
                outcome.matches += 1;
                if outcome.first_match.is_none() {
                    let global = self.start + k;
                    outcome.first_match = Some(global);
                    if self.report_first {
                        shared.observer.on_first_match(global);
                    }
                }
            }
        }

        shared.report(len - reported);
        outcome
    }
}
