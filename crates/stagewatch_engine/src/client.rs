use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::de::DeserializeOwned;
use stagewatch_core::{Channel, JobStatusReport, JobTicket, RawEvent};
use stagewatch_logging::sw_debug;

use crate::wire::{LogsResponse, SubmitRequest};
use crate::{ApiError, ApiSettings};

/// The generation service's HTTP job resources.
#[async_trait::async_trait]
pub trait JobApi: Send + Sync {
    async fn submit(&self, prompt: &str) -> Result<JobTicket, ApiError>;

    async fn fetch_status(&self, job_id: &str) -> Result<JobStatusReport, ApiError>;

    /// Log entries recorded so far, oldest first.
    async fn fetch_logs(&self, job_id: &str) -> Result<Vec<RawEvent>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestJobApi {
    base_url: Url,
    client: reqwest::Client,
}

impl ReqwestJobApi {
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let base_url = parse_base_url(&settings.base_url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::Network(err.to_string()))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|err| ApiError::InvalidUrl(err.to_string()))
    }
}

/// Parses the service base URL; a missing trailing slash is added so relative joins keep any path prefix.
pub fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(raw.trim()).map_err(|err| ApiError::InvalidUrl(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::InvalidUrl(format!("unsupported scheme {}", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait::async_trait]
impl JobApi for ReqwestJobApi {
    async fn submit(&self, prompt: &str) -> Result<JobTicket, ApiError> {
        let url = self.endpoint("api/generate")?;
        let body = serde_json::to_vec(&SubmitRequest { prompt }).map_err(|err| ApiError::Decode(err.to_string()))?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let ticket: JobTicket = read_json(response).await?;
        sw_debug!("submitted prompt, job id {}", ticket.job_id);
        Ok(ticket)
    }

    async fn fetch_status(&self, job_id: &str) -> Result<JobStatusReport, ApiError> {
        let url = self.endpoint(&format!("api/jobs/{job_id}"))?;
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        read_json(response).await
    }

    async fn fetch_logs(&self, job_id: &str) -> Result<Vec<RawEvent>, ApiError> {
        let url = self.endpoint(&format!("api/jobs/{job_id}/logs"))?;
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        let logs: LogsResponse = read_json(response).await?;
        Ok(logs
            .logs
            .into_iter()
            .map(|entry| entry.into_event(Channel::Poll))
            .collect())
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::HttpStatus(status.as_u16()));
    }
    let body = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&body).map_err(|err| ApiError::Decode(err.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::Timeout(err.to_string());
    }
    if err.is_builder() {
        return ApiError::InvalidUrl(err.to_string());
    }
    ApiError::Network(err.to_string())
}
