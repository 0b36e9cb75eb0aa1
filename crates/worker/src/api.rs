//! REST client for the generation backend.
//!
//! Every mode stage is a single `POST /v1/{mode}/{stage}` call; single-asset
//! regeneration is `POST /v1/{mode}/regenerate`.

use atelier_core::job::{AssetRef, Job, JobOutput};
use atelier_core::mode::Mode;
use atelier_core::status::JobStatus;
use atelier_core::types::JobId;
use serde::Serialize;

/// HTTP client for one generation backend.
pub struct GenerationApi {
    client: reqwest::Client,
    base_url: String,
}

/// Body sent with every stage request.
#[derive(Debug, Serialize)]
pub struct StageRequest<'a> {
    pub job_id: JobId,
    pub asset: &'a AssetRef,
    pub params: &'a serde_json::Value,
    /// Per-mode settings from the dispatcher.
    pub config: &'a serde_json::Map<String, serde_json::Value>,
    /// Response of the previous stage, if any.
    pub previous: Option<&'a serde_json::Value>,
}

/// Body sent to regenerate one sub-asset of a completed output.
#[derive(Debug, Serialize)]
pub struct RegenerateRequest<'a> {
    pub job_id: JobId,
    pub asset: &'a AssetRef,
    pub params: &'a serde_json::Value,
    pub config: &'a serde_json::Map<String, serde_json::Value>,
    pub output: Option<&'a JobOutput>,
    pub index: usize,
}

/// Errors from the generation backend REST layer.
#[derive(Debug, thiserror::Error)]
pub enum GenerationApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Generation backend error ({status}): {body}")]
    ApiError {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl GenerationApi {
    /// * `base_url` - e.g. `http://localhost:8700`. A trailing slash is
    ///   tolerated.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one stage of a job and return the backend's raw JSON response.
    pub async fn run_stage(
        &self,
        mode: Mode,
        stage: JobStatus,
        request: &StageRequest<'_>,
    ) -> Result<serde_json::Value, GenerationApiError> {
        let response = self
            .client
            .post(self.stage_url(mode, stage))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Ask the backend for a fresh version of one sub-asset.
    pub async fn regenerate(
        &self,
        job: &Job,
        request: &RegenerateRequest<'_>,
    ) -> Result<AssetRef, GenerationApiError> {
        let response = self
            .client
            .post(format!("{}/v1/{}/regenerate", self.base_url, job.mode))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub fn stage_url(&self, mode: Mode, stage: JobStatus) -> String {
        format!("{}/v1/{}/{}", self.base_url, mode, stage)
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GenerationApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GenerationApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GenerationApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_url_uses_wire_names() {
        let api = GenerationApi::new("http://gen.local:8700/");
        assert_eq!(api.base_url(), "http://gen.local:8700");
        assert_eq!(
            api.stage_url(Mode::VideoAd, JobStatus::RenderingVideo),
            "http://gen.local:8700/v1/video-ad/rendering_video"
        );
    }

    #[test]
    fn stage_request_serializes_previous_as_null_when_absent() {
        let asset = AssetRef::new("in.png");
        let params = serde_json::json!({ "prompt": "summer sale" });
        let config = serde_json::Map::new();
        let request = StageRequest {
            job_id: atelier_core::types::new_job_id(),
            asset: &asset,
            params: &params,
            config: &config,
            previous: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["previous"], serde_json::Value::Null);
        assert_eq!(json["params"]["prompt"], "summer sale");
        assert_eq!(json["asset"]["uri"], "in.png");
    }
}
