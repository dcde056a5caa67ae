use flate2::write::GzEncoder;
use flate2::Compression;
use gaugemon_common::hasher::{HashError, Hasher, HASH_HEADER};
use gaugemon_common::retry::RetrySchedule;
use gaugemon_common::types::MetricRecord;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::io::Write;
use std::time::Duration;

/// Largest uncompressed JSON body the agent will send.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const RETRYABLE_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to compress batch: {0}")]
    Compress(#[from] std::io::Error),

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("server responded {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl TransportError {
    /// Transport-level failures and the throttling/unavailable statuses are
    /// worth another attempt; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Status { status, .. } => RETRYABLE_STATUSES.contains(status),
            _ => false,
        }
    }
}

/// Serialises `batch` to JSON, enforces [`MAX_PAYLOAD_BYTES`] and gzips it.
pub fn encode_batch(batch: &[MetricRecord]) -> Result<Vec<u8>, TransportError> {
    let json = serde_json::to_vec(batch)?;
    if json.len() > MAX_PAYLOAD_BYTES {
        return Err(TransportError::PayloadTooLarge {
            size: json.len(),
            limit: MAX_PAYLOAD_BYTES,
        });
    }
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::fast());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// HTTP client that delivers batches to the server's `/updates/` endpoint.
#[derive(Debug)]
pub struct Transport {
    client: Client,
    url: String,
    hasher: Option<Hasher>,
    retry: RetrySchedule,
}

impl Transport {
    pub fn new(server_addr: &str, key: Option<&str>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;
        let hasher = key
            .filter(|k| !k.is_empty())
            .map(Hasher::new)
            .transpose()
            .map_err(|e: HashError| anyhow::anyhow!("Invalid signing key: {e}"))?;

        Ok(Self {
            client,
            url: format!("http://{}/updates/", server_addr.trim()),
            hasher,
            retry: RetrySchedule::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetrySchedule) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends `batch`, retrying per the schedule, and returns the number of
    /// requests made.
    ///
    /// The body is encoded and signed once; every attempt resends the same
    /// bytes. An empty batch sends nothing.
    pub async fn deliver(&self, batch: &[MetricRecord]) -> Result<usize, TransportError> {
        if batch.is_empty() {
            tracing::warn!("Empty batch, nothing to deliver");
            return Ok(0);
        }
        let body = encode_batch(batch)?;
        let signature = self.hasher.as_ref().map(|h| h.hash(&body));

        let mut attempts = 0;
        let sent = self
            .retry
            .run(
                |attempt| {
                    attempts = attempt + 1;
                    self.post(&body, signature.as_deref())
                },
                TransportError::is_retryable,
            )
            .await;
        match sent {
            Ok(()) => {
                tracing::debug!(
                    count = batch.len(),
                    bytes = body.len(),
                    attempts,
                    "Batch delivered"
                );
                Ok(attempts)
            }
            Err(e) => {
                tracing::warn!(count = batch.len(), attempts, error = %e, "Batch not delivered");
                Err(e)
            }
        }
    }

    async fn post(&self, body: &[u8], signature: Option<&str>) -> Result<(), TransportError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(body.to_vec());
        if let Some(signature) = signature {
            request = request.header(HASH_HEADER, signature);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status { status, body })
    }
}
