//! reqwest implementation of [`Backend`]

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::models::{
    RunAnalysisResponse, StartTaskRequest, StatusEnvelope, SubmitVodResponse, TaskId, WorkerStatus,
};
use super::status::StatusVocabulary;
use super::Backend;
use crate::analysis::AnalysisForm;
use crate::config::ServerConfig;
use crate::error::{ClientError, Result};
use crate::vod::VodSubmission;

/// HTTP client for the analytics backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    vocabulary: StatusVocabulary,
}

impl HttpBackend {
    pub fn new(server: &ServerConfig, vocabulary: StatusVocabulary) -> Result<Self> {
        // The server keeps the ingested vod id in its session cookie and
        // `/run_analysis` reads it back, so cookies must persist.
        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(server.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(server.connect_timeout_seconds))
            .user_agent(server.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url(&server.base_url)?,
            vocabulary,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn submit_current(&self, vod: &VodSubmission) -> Result<SubmitVodResponse> {
        let url = self.endpoint("")?;
        let form = Form::new().text("vod_url", vod.url().to_string());

        debug!("Submitting VOD {} to {}", vod.url(), url);
        let response = self.client.post(url).multipart(form).send().await?;
        read_json(response, "Could not load the VOD data.").await
    }

    async fn submit_legacy(&self, vod: &VodSubmission) -> Result<SubmitVodResponse> {
        let video_id = vod
            .video_id()
            .ok_or_else(|| ClientError::InvalidVodUrl(vod.url().to_string()))?;
        let url = self.endpoint("start-task")?;

        debug!("Starting legacy task for video {} at {}", video_id, url);
        let response = self
            .client
            .post(url)
            .json(&StartTaskRequest {
                video_id: video_id.to_string(),
            })
            .send()
            .await?;
        read_json(response, "Could not start the task.").await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn submit_vod(&self, vod: &VodSubmission) -> Result<SubmitVodResponse> {
        match self.vocabulary {
            StatusVocabulary::Current => self.submit_current(vod).await,
            StatusVocabulary::Legacy => self.submit_legacy(vod).await,
        }
    }

    async fn check_status(&self, task_id: &TaskId) -> Result<StatusEnvelope> {
        let encoded = urlencoding::encode(task_id.as_str());
        let url = self.endpoint(&self.vocabulary.status_path(&encoded))?;

        let response = self.client.get(url).send().await?;
        read_json(response, "Could not check the task status.").await
    }

    async fn run_analysis(&self, form: &AnalysisForm) -> Result<RunAnalysisResponse> {
        let url = self.endpoint("run_analysis")?;
        let multipart = form
            .fields()
            .into_iter()
            .fold(Form::new(), |acc, (name, value)| acc.text(name, value));

        debug!(
            "Submitting analysis: metrics={:?} keywords={}",
            form.metrics,
            form.keywords_json()
        );
        let response = self.client.post(url).multipart(multipart).send().await?;
        read_json(response, "Could not start the analysis.").await
    }

    async fn worker_status(&self) -> Result<WorkerStatus> {
        let url = self.endpoint("worker_status")?;
        let response = self.client.get(url).send().await?;
        read_json(response, "Could not read the worker status.").await
    }

    fn vocabulary(&self) -> StatusVocabulary {
        self.vocabulary
    }
}

/// Parse a base URL so that relative joins append to its path.
pub fn base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn read_json<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ClientError::Server {
            status: status.as_u16(),
            message: server_message(&text).unwrap_or_else(|| fallback.to_string()),
        });
    }

    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}

/// `message` (or `error`) field of a JSON error body
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = base_url("http://localhost:5000/analytics").unwrap();
        assert_eq!(
            url.join("run_analysis").unwrap().as_str(),
            "http://localhost:5000/analytics/run_analysis"
        );

        let root = base_url("http://localhost:5000").unwrap();
        assert_eq!(root.join("").unwrap().as_str(), "http://localhost:5000/");
    }

    #[test]
    fn test_base_url_rejects_garbage() {
        assert!(matches!(base_url("not a url"), Err(ClientError::Url(_))));
    }

    #[test]
    fn test_server_message_extraction() {
        assert_eq!(
            server_message(r#"{"message": "bad id"}"#),
            Some("bad id".to_string())
        );
        assert_eq!(server_message(r#"{"error": "boom"}"#), Some("boom".to_string()));
        assert_eq!(server_message(r#"{"message": "  "}"#), None);
        assert_eq!(server_message("<html>oops</html>"), None);
    }
}
