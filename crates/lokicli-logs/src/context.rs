//! Context lines around matches
//!
//! Each match (anchor) gets its own window of neighbouring lines. Windows of
//! nearby anchors usually overlap, so they are merged into groups keyed by
//! timestamp before printing; a group is flushed as soon as the next
//! anchor's window no longer touches it.

use std::collections::BTreeMap;

use tracing::debug;

use lokicli_types::{
    BatchRequest, ContextRequest, Direction, LogEntry, QuerySpec, Result, TimeWindow,
};

use crate::query::build_query;
use crate::source::LogSource;

/// Distance either side of an anchor searched for context, in nanoseconds.
///
/// About 27.8 hours. The service must accept a range this wide; lines
/// further away than this are never shown as context.
pub const CONTEXT_ENVELOPE_NANOS: i64 = 100_000_000_000_000;

/// Fetches context windows with the bare selector, so a window holds the
/// neighbouring lines rather than neighbouring matches.
pub struct ContextFetcher<'a, S> {
    source: &'a S,
    query: String,
}

impl<'a, S: LogSource> ContextFetcher<'a, S> {
    pub fn new(source: &'a S, spec: &QuerySpec) -> Self {
        Self {
            source,
            query: build_query(&spec.unfiltered()),
        }
    }

    /// Up to `count` lines strictly older than the anchor (`Backward`), or
    /// the anchor plus up to `count` newer lines (`Forward`), in the order
    /// the service returns them.
    pub async fn window(
        &self,
        anchor: &LogEntry,
        direction: Direction,
        count: usize,
    ) -> Result<Vec<LogEntry>> {
        let ts = anchor.timestamp;
        let (window, limit) = match direction {
            Direction::Forward => (
                TimeWindow::new(ts, ts.saturating_add(CONTEXT_ENVELOPE_NANOS))?,
                count + 1,
            ),
            Direction::Backward => (
                TimeWindow::new(ts.saturating_sub(CONTEXT_ENVELOPE_NANOS), ts)?,
                count,
            ),
        };

        let request = BatchRequest {
            window,
            limit,
            query: self.query.clone(),
            direction,
        };
        self.source.query_range(&request).await
    }

    /// The anchor together with its requested newer and older context
    pub async fn slice(&self, anchor: &LogEntry, request: ContextRequest) -> Result<ContextSlice> {
        let newer = if request.newer > 0 {
            self.window(anchor, Direction::Forward, request.newer).await?
        } else {
            Vec::new()
        };
        let older = if request.older > 0 {
            self.window(anchor, Direction::Backward, request.older).await?
        } else {
            Vec::new()
        };

        debug!(
            anchor = anchor.timestamp,
            newer = newer.len(),
            older = older.len(),
            "context window"
        );
        Ok(ContextSlice::assemble(anchor.clone(), newer, older))
    }
}

/// One anchor's context, deduplicated and ordered by timestamp
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextSlice {
    entries: BTreeMap<i64, LogEntry>,
    oldest: i64,
    newest: i64,
}

impl ContextSlice {
    pub fn assemble(anchor: LogEntry, newer: Vec<LogEntry>, older: Vec<LogEntry>) -> Self {
        let mut oldest = anchor.timestamp;
        let mut newest = anchor.timestamp;
        let mut entries = BTreeMap::new();

        for entry in std::iter::once(anchor).chain(newer).chain(older) {
            oldest = oldest.min(entry.timestamp);
            newest = newest.max(entry.timestamp);
            entries.entry(entry.timestamp).or_insert(entry);
        }

        Self {
            entries,
            oldest,
            newest,
        }
    }

    pub fn oldest(&self) -> i64 {
        self.oldest
    }

    pub fn newest(&self) -> i64 {
        self.newest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulator for the group currently being built
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PendingGroup {
    #[default]
    Empty,
    Accumulating(BTreeMap<i64, LogEntry>),
}

impl PendingGroup {
    /// Start a group from a single slice
    pub fn seed(slice: ContextSlice) -> Self {
        Self::Accumulating(slice.entries)
    }

    /// Union a slice into the group; an existing timestamp keeps its entry
    pub fn extend(self, slice: ContextSlice) -> Self {
        match self {
            Self::Empty => Self::seed(slice),
            Self::Accumulating(mut group) => {
                for (ts, entry) in slice.entries {
                    group.entry(ts).or_insert(entry);
                }
                Self::Accumulating(group)
            }
        }
    }

    /// Everything accumulated, oldest first; empty for an empty group
    pub fn flush(self) -> Vec<LogEntry> {
        match self {
            Self::Empty => Vec::new(),
            Self::Accumulating(group) => group.into_values().collect(),
        }
    }

    /// Whether the slice overlaps or touches the group's time span
    pub fn touches(&self, slice: &ContextSlice) -> bool {
        let Self::Accumulating(group) = self else {
            return false;
        };
        match (group.keys().next(), group.keys().next_back()) {
            (Some(&oldest), Some(&newest)) => slice.newest >= oldest && slice.oldest <= newest,
            _ => false,
        }
    }

    /// Feed the next anchor's slice.
    ///
    /// Returns the new state and, when the slice is disjoint from the group,
    /// the group that had to be flushed.
    pub fn absorb(self, slice: ContextSlice) -> (Self, Option<Vec<LogEntry>>) {
        match self {
            Self::Empty => (Self::seed(slice), None),
            group if group.touches(&slice) => (group.extend(slice), None),
            group => (Self::seed(slice), Some(group.flush())),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
