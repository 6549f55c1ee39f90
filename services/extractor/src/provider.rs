//! Climate data provider seam and the CDS implementation.

use std::path::Path;

use async_trait::async_trait;
use era5_common::{ExtractionError, ExtractionResult};
use reqwest::{Client, RequestBuilder as HttpRequest, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::ProviderConfig;
use crate::download::Downloader;
use crate::request::ProviderRequest;

/// Provider-side job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderJobHandle(pub String);

impl std::fmt::Display for ProviderJobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider view of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Accepted,
    Running,
    Ready,
    /// Terminal provider-side failure with its message.
    Failed(String),
}

impl ProviderStatus {
    /// Map a CDS process status string.
    pub fn from_cds(status: &str, message: Option<&str>) -> Self {
        match status {
            "accepted" => Self::Accepted,
            "running" => Self::Running,
            "successful" => Self::Ready,
            "failed" | "rejected" | "dismissed" => Self::Failed(
                message
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("job {}", status)),
            ),
            other => {
                warn!(status = %other, "Unrecognised job status, treating as running");
                Self::Running
            }
        }
    }
}

/// Where reanalysis jobs are submitted, polled and fetched.
#[async_trait]
pub trait ClimateDataProvider: Send + Sync {
    async fn submit(&self, request: &ProviderRequest) -> ExtractionResult<ProviderJobHandle>;

    async fn status(&self, handle: &ProviderJobHandle) -> ExtractionResult<ProviderStatus>;

    /// Download the finished result to `dest`, returning the byte count.
    async fn fetch(&self, handle: &ProviderJobHandle, dest: &Path) -> ExtractionResult<u64>;

    /// Release provider-side resources. Best effort.
    async fn release(&self, handle: &ProviderJobHandle) -> ExtractionResult<()>;
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    #[serde(rename = "jobID")]
    job_id: String,
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Copernicus Climate Data Store client (retrieve API v1).
#[derive(Debug, Clone)]
pub struct CdsProvider {
    client: Client,
    config: ProviderConfig,
    downloader: Downloader,
}

impl CdsProvider {
    pub fn new(config: ProviderConfig) -> ExtractionResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ExtractionError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            downloader: Downloader::new(client.clone()),
            client,
            config,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/retrieve/v1/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        match &self.config.key {
            Some(key) => request.header("PRIVATE-TOKEN", key),
            None => request,
        }
    }

    async fn send_json(&self, request: HttpRequest) -> ExtractionResult<Value> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn result_url(&self, handle: &ProviderJobHandle) -> ExtractionResult<String> {
        let body = self
            .send_json(self.client.get(self.api_url(&format!("jobs/{}/results", handle))))
            .await?;
        asset_href(&body)
    }
}

#[async_trait]
impl ClimateDataProvider for CdsProvider {
    #[instrument(skip(self, request), fields(dataset = %request.dataset))]
    async fn submit(&self, request: &ProviderRequest) -> ExtractionResult<ProviderJobHandle> {
        let url = self.api_url(&format!("processes/{}/execution", request.dataset));
        let body = self
            .send_json(self.client.post(url).json(&json!({ "inputs": request.inputs })))
            .await?;
        let job: JobStatusResponse = serde_json::from_value(body)?;

        info!(provider_job = %job.job_id, status = %job.status, "Submitted request");
        Ok(ProviderJobHandle(job.job_id))
    }

    async fn status(&self, handle: &ProviderJobHandle) -> ExtractionResult<ProviderStatus> {
        let body = self
            .send_json(self.client.get(self.api_url(&format!("jobs/{}", handle))))
            .await?;
        let job: JobStatusResponse = serde_json::from_value(body)?;
        debug!(provider_job = %handle, status = %job.status, "Polled job");
        Ok(ProviderStatus::from_cds(&job.status, job.message.as_deref()))
    }

    async fn fetch(&self, handle: &ProviderJobHandle, dest: &Path) -> ExtractionResult<u64> {
        let href = self.result_url(handle).await?;
        self.downloader.download(&href, dest).await
    }

    async fn release(&self, handle: &ProviderJobHandle) -> ExtractionResult<()> {
        let response = self
            .authorized(self.client.delete(self.api_url(&format!("jobs/{}", handle))))
            .send()
            .await
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(provider_job = %handle, "Released job");
            Ok(())
        } else {
            Err(http_error(status, ""))
        }
    }
}

/// `asset.value.href` of a results document.
pub fn asset_href(body: &Value) -> ExtractionResult<String> {
    body.pointer("/asset/value/href")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ExtractionError::Provider("results document has no asset href".to_string()))
}

/// Classify a non-success response. Rejections are not retried.
fn http_error(status: StatusCode, body: &str) -> ExtractionError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("detail")
                .or_else(|| v.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExtractionError::InvalidRequest(format!(
            "provider rejected credentials (HTTP {}): {}",
            status, detail
        )),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ExtractionError::InvalidRequest(
            format!("provider rejected request (HTTP {}): {}", status, detail),
        ),
        _ => ExtractionError::Provider(format!("HTTP {}: {}", status, detail)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use era5_common::ErrorKind;

    #[test]
    fn test_cds_status_mapping() {
        assert_eq!(ProviderStatus::from_cds("accepted", None), ProviderStatus::Accepted);
        assert_eq!(ProviderStatus::from_cds("running", None), ProviderStatus::Running);
        assert_eq!(ProviderStatus::from_cds("successful", None), ProviderStatus::Ready);
        assert_eq!(
            ProviderStatus::from_cds("failed", Some("quota exceeded")),
            ProviderStatus::Failed("quota exceeded".to_string())
        );
        assert_eq!(
            ProviderStatus::from_cds("dismissed", None),
            ProviderStatus::Failed("job dismissed".to_string())
        );
    }

    #[test]
    fn test_asset_href() {
        let body = json!({"asset": {"value": {"href": "https://data.example/x.nc", "type": "application/netcdf"}}});
        assert_eq!(asset_href(&body).unwrap(), "https://data.example/x.nc");
        assert_eq!(asset_href(&json!({})).unwrap_err().kind(), ErrorKind::ProviderError);
    }

    #[test]
    fn test_http_error_classification() {
        let err = http_error(StatusCode::UNAUTHORIZED, r#"{"detail": "bad token"}"#);
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("bad token"));

        let err = http_error(StatusCode::SERVICE_UNAVAILABLE, "busy");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_api_urls() {
        let provider = CdsProvider::new(ProviderConfig {
            url: "https://cds.example.org/api/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            provider.api_url("processes/reanalysis-era5-land/execution"),
            "https://cds.example.org/api/retrieve/v1/processes/reanalysis-era5-land/execution"
        );
    }
}
