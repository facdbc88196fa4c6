use tracing::{debug, info};

use lokicli_types::{BatchRequest, Direction, LogEntry, Result, TimeWindow};

use crate::source::LogSource;

/// Default per-request entry cap
pub const DEFAULT_BATCH_SIZE: usize = 250;

/// Walks a time window backward, one batch per call.
///
/// The cursor starts at the window end and moves to the oldest timestamp of
/// each batch. The service treats `end` as exclusive; entries at or after
/// the cursor are dropped as well, so no line appears in two batches.
pub struct Paginator {
    query: String,
    window: TimeWindow,
    batch_size: usize,
    remaining: usize,
    cursor: i64,
    finished: bool,
}

impl Paginator {
    pub fn new(query: String, window: TimeWindow, limit: usize, batch_size: usize) -> Self {
        Self {
            query,
            window,
            batch_size: batch_size.max(1),
            remaining: limit,
            cursor: window.end(),
            finished: false,
        }
    }

    /// Entries still allowed by the limit
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Fetch the next batch, newest first. `None` once the limit is reached,
    /// the window is exhausted, or the service returns nothing.
    pub async fn next_batch<S: LogSource>(&mut self, source: &S) -> Result<Option<Vec<LogEntry>>> {
        if self.finished || self.remaining == 0 || self.cursor <= self.window.start() {
            self.finished = true;
            return Ok(None);
        }

        let request = BatchRequest {
            window: TimeWindow::new(self.window.start(), self.cursor)?,
            limit: self.remaining.min(self.batch_size),
            query: self.query.clone(),
            direction: Direction::Backward,
        };
        debug!(end = self.cursor, limit = request.limit, "requesting batch");

        let mut batch = source.query_range(&request).await?;
        let cursor = self.cursor;
        batch.retain(|entry| entry.timestamp < cursor);

        let Some(oldest) = batch.iter().map(|entry| entry.timestamp).min() else {
            info!("no more logs before {}", cursor);
            self.finished = true;
            return Ok(None);
        };

        self.remaining = self.remaining.saturating_sub(batch.len());
        self.cursor = oldest;
        info!(entries = batch.len(), remaining = self.remaining, "fetched batch");

        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use parking_lot::Mutex;

    use super::*;
    use crate::source::fake::FakeLoki;

    /// Returns `batch_size` fresh entries below `end` for a fixed number of calls
    struct CountingSource {
        full_batches: usize,
        calls: Mutex<usize>,
    }

    impl LogSource for CountingSource {
        async fn query_range(&self, request: &BatchRequest) -> Result<Vec<LogEntry>> {
            let mut calls = self.calls.lock();
            *calls += 1;
            if *calls > self.full_batches {
                return Ok(Vec::new());
            }
            let end = request.window.end();
            Ok((1..=request.limit as i64)
                .map(|offset| LogEntry::new(end - offset, format!("line {}", end - offset)))
                .collect())
        }
    }

    async fn drain<S: LogSource>(pages: &mut Paginator, source: &S) -> Vec<LogEntry> {
        let mut all = Vec::new();
        while let Some(batch) = pages.next_batch(source).await.unwrap() {
            all.extend(batch);
        }
        all
    }

    #[tokio::test]
    async fn test_stops_on_empty_batch() {
        let batch_size = 250;
        let source = CountingSource {
            full_batches: 3,
            calls: Mutex::new(0),
        };
        let window = TimeWindow::new(0, 1_000_000).unwrap();
        let mut pages = Paginator::new("{}".to_string(), window, 10 * batch_size, batch_size);

        let all = drain(&mut pages, &source).await;

        assert_eq!(*source.calls.lock(), 4);
        assert_eq!(all.len(), 3 * batch_size);
        assert_eq!(pages.remaining(), 7 * batch_size);
    }

    #[tokio::test]
    async fn test_limit_caps_last_request() {
        let lines: Vec<(i64, String)> = (1..=1000).map(|ts| (ts, format!("line {}", ts))).collect();
        let lines: Vec<(i64, &str)> = lines.iter().map(|(ts, s)| (*ts, s.as_str())).collect();
        let source = FakeLoki::new(&lines);
        let window = TimeWindow::new(0, 2000).unwrap();
        let mut pages = Paginator::new("{}".to_string(), window, 600, 250);

        let all = drain(&mut pages, &source).await;

        assert_eq!(all.len(), 600);
        let limits: Vec<_> = source.calls().iter().map(|c| c.limit).collect();
        assert_eq!(limits, vec![250, 250, 100]);
        assert_eq!(all.first().map(|e| e.timestamp), Some(1000));
        assert_eq!(all.last().map(|e| e.timestamp), Some(401));
    }

    #[tokio::test]
    async fn test_cursor_moves_to_oldest_entry() {
        let source = FakeLoki::new(&[(10, "a"), (20, "b"), (30, "c"), (40, "d")]);
        let window = TimeWindow::new(0, 100).unwrap();
        let mut pages = Paginator::new("{}".to_string(), window, 100, 2);

        drain(&mut pages, &source).await;

        let ends: Vec<_> = source.calls().iter().map(|c| c.window.end()).collect();
        assert_eq!(ends, vec![100, 30, 10]);
        assert!(source.calls().iter().all(|c| c.direction == Direction::Backward));
    }

    #[tokio::test]
    async fn test_no_duplicates_across_batches_with_inclusive_end() {
        let lines: Vec<(i64, String)> = (1..=50).map(|ts| (ts * 3, format!("line {}", ts))).collect();
        let lines: Vec<(i64, &str)> = lines.iter().map(|(ts, s)| (*ts, s.as_str())).collect();

        for inclusive_end in [false, true] {
            for batch_size in [1, 2, 7, 50] {
                let mut source = FakeLoki::new(&lines);
                source.inclusive_end = inclusive_end;
                let window = TimeWindow::new(0, 1_000).unwrap();
                let mut pages = Paginator::new("{}".to_string(), window, 10_000, batch_size);

                let all = drain(&mut pages, &source).await;

                let unique: HashSet<_> = all.iter().map(|e| e.timestamp).collect();
                assert_eq!(unique.len(), all.len(), "duplicates with batch size {batch_size}");
                // batch_size 1 against an inclusive end can stall on the boundary line
                if !(inclusive_end && batch_size == 1) {
                    assert_eq!(all.len(), 50, "missing lines with batch size {batch_size}");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_window_start_ends_pagination() {
        let source = FakeLoki::new(&[(5, "too old"), (15, "x"), (25, "y")]);
        let window = TimeWindow::new(10, 30).unwrap();
        let mut pages = Paginator::new("{}".to_string(), window, 100, 1);

        let all = drain(&mut pages, &source).await;

        assert_eq!(all, vec![LogEntry::new(25, "y"), LogEntry::new(15, "x")]);
    }

    #[tokio::test]
    async fn test_fetch_error_aborts() {
        let source = FakeLoki::new(&[(1, "a"), (2, "b"), (3, "c")])
            .failing_on(1, || lokicli_types::LokiError::Fetch {
                status: 500,
                body: "boom".to_string(),
            });
        let window = TimeWindow::new(0, 10).unwrap();
        let mut pages = Paginator::new("{}".to_string(), window, 100, 1);

        assert!(pages.next_batch(&source).await.unwrap().is_some());
        assert!(matches!(
            pages.next_batch(&source).await,
            Err(lokicli_types::LokiError::Fetch { status: 500, .. })
        ));
    }
}
