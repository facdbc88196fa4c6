//! HTTP client for the Loki gateway

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use lokicli_types::time::{UtcRange, format_utc};
use lokicli_types::{BatchRequest, LogEntry, LokiError, Result};

/// Fixed timeout for every request against the gateway
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Session cookie issued by the OAuth2 proxy
pub const AUTH_COOKIE: &str = "_oauth2_proxy";

const QUERY_RANGE_PATH: &str = "/loki/api/v1/query_range";
const SERIES_PATH: &str = "/loki/api/v1/series";

/// Status, headers and body of one completed request
pub(crate) struct Exchange {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Build the shared HTTP client: fixed timeout, redirects left to the caller
pub(crate) fn build_http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| LokiError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// `Cookie` header value carrying the session token
pub(crate) fn session_cookie(token: &str) -> String {
    format!("{}={}", AUTH_COOKIE, token)
}

/// Query string of one `query_range` call
fn query_range_params(request: &BatchRequest) -> [(&'static str, String); 5] {
    [
        ("direction", request.direction.as_str().to_string()),
        ("start", request.window.start().to_string()),
        ("end", request.window.end().to_string()),
        ("limit", request.limit.to_string()),
        ("query", request.query.clone()),
    ]
}

fn map_http_error(error: reqwest::Error) -> LokiError {
    if error.is_timeout() {
        LokiError::Transport(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        LokiError::Transport(format!("Connection error: {}", error))
    } else {
        LokiError::Transport(format!("HTTP error: {}", error))
    }
}

/// Send a request and read its body, aborting as soon as `cancel` fires
pub(crate) async fn exchange(
    cancel: &CancellationToken,
    request: RequestBuilder,
) -> Result<Exchange> {
    let round_trip = async {
        let response = request.send().await.map_err(map_http_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(map_http_error)?;
        Ok(Exchange {
            status,
            headers,
            body,
        })
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            error!("Interrupted by user.");
            Err(LokiError::Cancelled)
        }
        result = round_trip => result,
    }
}

/// Authenticated client for the query and series endpoints
pub struct LokiClient {
    http: Client,
    base_url: String,
    token: String,
    cancel: CancellationToken,
}

impl LokiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        Ok(Self {
            http: build_http_client()?,
            base_url: base_url.into(),
            token: token.into(),
            cancel,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .header(COOKIE, session_cookie(&self.token))
    }

    /// Issue exactly one range query; no retries
    pub async fn query_range(&self, request: &BatchRequest) -> Result<Vec<LogEntry>> {
        let params = query_range_params(request);
        debug!(?params, "query_range");

        let response = exchange(&self.cancel, self.get(QUERY_RANGE_PATH).query(&params))
            .await
            .inspect_err(|e| {
                if !e.is_cancelled() {
                    error!("Error fetching logs: {}", e)
                }
            })?;

        if response.status != StatusCode::OK {
            error!(
                "Error fetching logs: {}. Response: {}",
                response.status.as_u16(),
                response.body
            );
            return Err(LokiError::from_response(
                response.status.as_u16(),
                response.body,
            ));
        }

        parse_query_range(&response.body).inspect_err(|e| error!("Error fetching logs: {}", e))
    }

    /// List the label sets that logged within `range`
    pub async fn series(&self, range: &UtcRange) -> Result<Vec<HashMap<String, String>>> {
        let params = [
            ("end", format_utc(&range.to)),
            ("match", "{}".to_string()),
            ("start", format_utc(&range.from)),
        ];

        let response = exchange(&self.cancel, self.get(SERIES_PATH).query(&params))
            .await
            .inspect_err(|e| {
                if !e.is_cancelled() {
                    error!("Error getting app map: {}", e)
                }
            })?;

        match response.status {
            StatusCode::OK => {}
            StatusCode::BAD_REQUEST => {
                error!("Selected time range is out of range. Valid time range is within last 720 hours.");
                return Err(LokiError::Validation(
                    "Selected time range is out of range. Valid time range is within last 720 hours."
                        .to_string(),
                ));
            }
            status => {
                error!("Error getting app map: {}, {}", status.as_u16(), response.body);
                return Err(LokiError::Fetch {
                    status: status.as_u16(),
                    body: response.body,
                });
            }
        }

        let series: SeriesResponse = serde_json::from_str(&response.body)
            .map_err(|e| LokiError::Decode(format!("series response: {}", e)))
            .inspect_err(|e| error!("Error getting app map: {}", e))?;
        Ok(series.data)
    }
}

#[derive(Deserialize)]
struct QueryRangeResponse {
    data: QueryRangeData,
}

#[derive(Deserialize)]
struct QueryRangeData {
    #[serde(default)]
    result: Vec<StreamValues>,
}

#[derive(Deserialize)]
struct StreamValues {
    #[serde(default)]
    values: Vec<(String, String)>,
}

#[derive(Deserialize)]
struct LogPayload {
    log: String,
}

#[derive(Deserialize)]
struct SeriesResponse {
    #[serde(default)]
    data: Vec<HashMap<String, String>>,
}

/// Decode a `query_range` body into entries, keeping the service's order.
///
/// Only the first stream is read. Payloads that are not `{"log": ...}`
/// objects are used verbatim.
pub fn parse_query_range(body: &str) -> Result<Vec<LogEntry>> {
    let response: QueryRangeResponse = serde_json::from_str(body)
        .map_err(|e| LokiError::Decode(format!("query_range response: {}", e)))?;

    let Some(stream) = response.data.result.into_iter().next() else {
        return Ok(Vec::new());
    };

    stream
        .values
        .into_iter()
        .map(|(timestamp, payload)| {
            let timestamp = timestamp.parse::<i64>().map_err(|_| {
                LokiError::Decode(format!("invalid timestamp '{}'", timestamp))
            })?;
            let text = match serde_json::from_str::<LogPayload>(&payload) {
                Ok(decoded) => decoded.log,
                Err(_) => payload,
            };
            Ok(LogEntry::new(timestamp, text))
        })
        .collect()
}
