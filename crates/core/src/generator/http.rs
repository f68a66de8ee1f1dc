//! HTTP client for a remote generation service.
//!
//! Every collaborator role maps to one JSON endpoint. The service answers
//! with the produced artifact URLs; errors come back as `{"error": "..."}`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::config::GeneratorConfig;
use super::error::GeneratorError;
use super::traits::{AudioGenerator, ImageGenerator, NarrativeGenerator, VideoComposer};
use super::types::{
    CaptionRequest, CaptionedVideo, ComposedShot, DecomposeRequest, NarrativeRequest,
    SceneAssemblyRequest, ShotCompositionRequest, ShotMediaRequest, StoryAssemblyRequest,
};
use crate::metrics;
use crate::story::SceneDraft;

/// Generation service client implementing every collaborator role.
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct UrlResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ScenesResponse {
    scenes: Vec<SceneDraft>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl HttpGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, GeneratorError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeneratorError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn post_json<Req, Resp>(
        &self,
        operation: &str,
        path: &str,
        body: &Req,
    ) -> Result<Resp, GeneratorError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let start = Instant::now();
        let result = self.send(path, body).await;

        metrics::GENERATOR_REQUEST_DURATION
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());
        metrics::GENERATOR_REQUESTS
            .with_label_values(&[operation, if result.is_ok() { "success" } else { "error" }])
            .inc();

        debug!(
            operation = %operation,
            duration_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Generation request finished"
        );

        result
    }

    async fn send<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, GeneratorError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut request = self.client.post(self.endpoint(path)).json(body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| GeneratorError::invalid_response(e.to_string()))
    }

    fn map_transport(&self, error: reqwest::Error) -> GeneratorError {
        if error.is_timeout() {
            GeneratorError::Timeout(self.timeout)
        } else {
            GeneratorError::Http(error.to_string())
        }
    }
}

fn non_empty(value: String, what: &str) -> Result<String, GeneratorError> {
    if value.trim().is_empty() {
        Err(GeneratorError::invalid_response(format!("empty {}", what)))
    } else {
        Ok(value)
    }
}

#[async_trait]
impl NarrativeGenerator for HttpGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn write_story(&self, request: &NarrativeRequest) -> Result<String, GeneratorError> {
        let response: TextResponse = self.post_json("write_story", "narratives", request).await?;
        non_empty(response.text, "narrative")
    }

    async fn decompose(
        &self,
        request: &DecomposeRequest,
    ) -> Result<Vec<SceneDraft>, GeneratorError> {
        let response: ScenesResponse = self
            .post_json("decompose", "decompositions", request)
            .await?;
        Ok(response.scenes)
    }
}

#[async_trait]
impl ImageGenerator for HttpGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate_image(&self, request: &ShotMediaRequest) -> Result<String, GeneratorError> {
        let response: UrlResponse = self.post_json("generate_image", "images", request).await?;
        non_empty(response.url, "image url")
    }
}

#[async_trait]
impl AudioGenerator for HttpGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate_audio(&self, request: &ShotMediaRequest) -> Result<String, GeneratorError> {
        let response: UrlResponse = self.post_json("generate_audio", "audio", request).await?;
        non_empty(response.url, "audio url")
    }
}

#[async_trait]
impl VideoComposer for HttpGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn compose_shot(
        &self,
        request: &ShotCompositionRequest,
    ) -> Result<ComposedShot, GeneratorError> {
        self.post_json("compose_shot", "shots/compose", request).await
    }

    async fn assemble_scene(
        &self,
        request: &SceneAssemblyRequest,
    ) -> Result<String, GeneratorError> {
        let response: UrlResponse = self
            .post_json("assemble_scene", "scenes/assemble", request)
            .await?;
        non_empty(response.url, "scene video url")
    }

    async fn assemble_story(
        &self,
        request: &StoryAssemblyRequest,
    ) -> Result<String, GeneratorError> {
        let response: UrlResponse = self
            .post_json("assemble_story", "stories/assemble", request)
            .await?;
        non_empty(response.url, "story video url")
    }

    async fn apply_captions(
        &self,
        request: &CaptionRequest,
    ) -> Result<CaptionedVideo, GeneratorError> {
        self.post_json("apply_captions", "captions", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::types::RenderFormat;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn format() -> RenderFormat {
        RenderFormat {
            width: 1080,
            height: 1920,
            aspect_ratio: "9:16".to_string(),
        }
    }

    fn media_request() -> ShotMediaRequest {
        ShotMediaRequest {
            story_id: "story-1".to_string(),
            scene_id: "scene-1".to_string(),
            shot_id: "shot-1".to_string(),
            script: "A fox runs.".to_string(),
            format: format(),
        }
    }

    /// Serves a single canned HTTP response and returns the request head it received.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    fn client_for(base_url: String, api_key: Option<&str>) -> HttpGenerator {
        HttpGenerator::new(&GeneratorConfig {
            base_url,
            api_key: api_key.map(str::to_string),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let generator = client_for("http://gen.local/".to_string(), None);
        assert_eq!(generator.endpoint("images"), "http://gen.local/v1/images");
    }

    #[test]
    fn test_empty_api_key_ignored() {
        let generator = client_for("http://gen.local".to_string(), Some(""));
        assert!(generator.api_key.is_none());
    }

    #[tokio::test]
    async fn test_generate_image_success() {
        let (base, server) = serve_once("200 OK", r#"{"url":"https://cdn/img.png"}"#).await;
        let generator = client_for(base, Some("sk-test"));

        let url = generator.generate_image(&media_request()).await.unwrap();
        assert_eq!(url, "https://cdn/img.png");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/images"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains("\"shot_id\":\"shot-1\""));
    }

    #[tokio::test]
    async fn test_api_error_message_extracted() {
        let (base, _server) =
            serve_once("422 Unprocessable Entity", r#"{"error":"script too long"}"#).await;
        let generator = client_for(base, None);

        let err = generator.generate_audio(&media_request()).await.unwrap_err();
        match err {
            GeneratorError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "script too long");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_url_is_invalid_response() {
        let (base, _server) = serve_once("200 OK", r#"{"url":"  "}"#).await;
        let generator = client_for(base, None);

        let err = generator.generate_image(&media_request()).await.unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_decompose_parses_scenes() {
        let body = r#"{"scenes":[{"name":"Intro","shots":[{"name":"S1","script":"Hi."}]}]}"#;
        let (base, _server) = serve_once("200 OK", body).await;
        let generator = client_for(base, None);

        let scenes = generator
            .decompose(&DecomposeRequest {
                story_id: "story-1".to_string(),
                narrative: "Hi.".to_string(),
                format: format(),
            })
            .await
            .unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].shots[0].script, "Hi.");
    }

    #[tokio::test]
    async fn test_connection_refused_is_http_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let generator = client_for(format!("http://{}", addr), None);
        let err = generator.generate_image(&media_request()).await.unwrap_err();
        assert!(matches!(err, GeneratorError::Http(_)));
        assert!(err.is_retryable());
    }
}
