//! Log retrieval for lokicli
//!
//! This crate builds queries, pages backward through a time window, expands
//! matches with surrounding context, and prints the result.

mod context;
mod highlight;
mod paginate;
mod query;
mod retrieve;
mod source;

pub use context::{CONTEXT_ENVELOPE_NANOS, ContextFetcher, ContextSlice, PendingGroup};
pub use highlight::{GROUP_SEPARATOR, Highlighter, Presenter};
pub use paginate::{DEFAULT_BATCH_SIZE, Paginator};
pub use query::{build_query, selector};
pub use retrieve::{RetrievalPlan, RetrievalSummary, retrieve, validate_request};
pub use source::LogSource;

// Re-export types used in our public API
pub use lokicli_types::{ContextRequest, LogEntry, QuerySpec};
