use lokicli_client::LokiClient;
use lokicli_types::{BatchRequest, LogEntry, Result};

/// Anything that can answer one bounded range query.
///
/// Implementations issue exactly one request per call and return entries in
/// the order the service produced them.
#[allow(async_fn_in_trait)]
pub trait LogSource {
    async fn query_range(&self, request: &BatchRequest) -> Result<Vec<LogEntry>>;
}

impl LogSource for LokiClient {
    async fn query_range(&self, request: &BatchRequest) -> Result<Vec<LogEntry>> {
        LokiClient::query_range(self, request).await
    }
}
