use std::time::Duration;

use ecobee_remote_common::{DbSection, Metric, PollTime, WriteBatch};
use reqwest::StatusCode;
use tracing::{info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("influx request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("influx rejected write with HTTP {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Writes line protocol batches to an InfluxDB 1.x `/write` endpoint.
pub struct InfluxPublisher {
    http: reqwest::Client,
    base_url: String,
    database: String,
}

impl InfluxPublisher {
    pub fn new(db: &DbSection) -> Result<Self, PublishError> {
        Self::with_base_url(
            format!("http://{}:{}", db.influx_host, db.influx_port),
            &db.influx_dbname,
        )
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        database: impl Into<String>,
    ) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: database.into(),
        })
    }

    pub async fn write(&self, batch: &WriteBatch) -> Result<(), PublishError> {
        if batch.is_empty() {
            return Ok(());
        }

        let response = self
            .http
            .post(format!("{}/write", self.base_url))
            .query(&[("db", self.database.as_str()), ("precision", "ns")])
            .body(batch.to_line_protocol())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected { status, body });
        }
        Ok(())
    }

    /// Converts `metrics` into one batch stamped with `poll_time` and writes
    /// it. Malformed metrics are logged and left out. Returns the number of
    /// points written.
    pub async fn publish(
        &self,
        metrics: &[Metric],
        poll_time: PollTime,
    ) -> Result<usize, PublishError> {
        let (batch, skipped) = WriteBatch::from_metrics(metrics, poll_time);
        for skip in &skipped {
            warn!("skipping bad measurement #{} ({}): {}", skip.index, skip.metric, skip.error);
        }

        info!(
            "publishing {} series to {} db:{}",
            batch.len(),
            self.base_url,
            self.database
        );
        self.write(&batch).await?;
        info!("publishing complete");
        Ok(batch.len())
    }
}
