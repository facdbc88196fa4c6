//! Shared types for lokicli
//!
//! This crate contains data structures used across multiple lokicli crates.

mod error;
pub mod time;

pub use error::{LokiError, Result};

use std::fmt;

/// Upper bound on the total number of entries a single retrieval may request
pub const MAX_LIMIT: usize = 500_000;

/// Upper bound on context lines either side of a match
pub const MAX_CONTEXT: usize = 250;

// ============================================================================
// Log Types
// ============================================================================

/// A single log line returned by the query service.
///
/// Two entries are the same line for merging purposes iff their timestamps
/// are equal; the text is not compared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Nanoseconds since the Unix epoch
    pub timestamp: i64,

    /// Decoded log text
    pub text: String,
}

impl LogEntry {
    pub fn new(timestamp: i64, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }
}

/// Half-open time range in epoch nanoseconds, `start < end`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    start: i64,
    end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start >= end {
            return Err(LokiError::Validation(format!(
                "Invalid time window: start ({start}) must be before end ({end})."
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }
}

/// Scan direction of a range query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Oldest entries first, starting at the window start
    Forward,
    /// Newest entries first, starting at the window end
    Backward,
}

impl Direction {
    /// Wire value expected by the query service
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "FORWARD",
            Self::Backward => "BACKWARD",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bounded request against the query service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchRequest {
    pub window: TimeWindow,
    pub limit: usize,
    pub query: String,
    pub direction: Direction,
}

// ============================================================================
// Query Types
// ============================================================================

/// The label set that pins down one application's log stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppIdentity {
    pub app: String,
    pub namespace: String,
    pub instance: String,
}

impl AppIdentity {
    pub fn new(
        app: impl Into<String>,
        namespace: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            app: app.into(),
            namespace: namespace.into(),
            instance: instance.into(),
        }
    }
}

/// Selector plus optional line filter for one logical query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuerySpec {
    pub app: AppIdentity,
    pub regex: Option<String>,
    pub invert: bool,
}

impl QuerySpec {
    /// Build a spec; an empty regex counts as no filter
    pub fn new(app: AppIdentity, regex: Option<String>, invert: bool) -> Self {
        Self {
            app,
            regex: regex.filter(|r| !r.is_empty()),
            invert,
        }
    }

    /// The same stream without any line filter
    pub fn unfiltered(&self) -> Self {
        Self {
            app: self.app.clone(),
            regex: None,
            invert: false,
        }
    }
}

// ============================================================================
// Context Types
// ============================================================================

/// How many lines to show around each match
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContextRequest {
    pub older: usize,
    pub newer: usize,
}

impl ContextRequest {
    /// Reconcile `--context`, `--older-context` and `--newer-context`.
    ///
    /// Zero means "not given". A symmetric `context` fills whichever side
    /// was left unset; a one-sided request leaves the other side at zero.
    pub fn normalize(context: usize, older: usize, newer: usize) -> Self {
        if context > 0 {
            Self {
                older: if older == 0 { context } else { older },
                newer: if newer == 0 { context } else { newer },
            }
        } else {
            Self { older, newer }
        }
    }

    /// Largest side, used for gating and validation
    pub fn span(&self) -> usize {
        self.older.max(self.newer)
    }

    pub fn is_enabled(&self) -> bool {
        self.span() > 0
    }
}
