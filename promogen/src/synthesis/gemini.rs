//! Google Generative Language API client (Gemini image models, Veo video models).

use super::{
    GeneratedImage, ImageRequest, InlineImage, OperationHandle, OperationStatus, Result, SynthesisClient, SynthesisError,
    VideoRef, VideoRequest,
};
use crate::config::SynthesisConfig;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

const API_KEY_HEADER: &str = "x-goog-api-key";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HARASSMENT",
];

pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    image_model: String,
    video_model: String,
    image_size: String,
    video_resolution: String,
}

impl GeminiClient {
    pub fn new(config: &SynthesisConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow::anyhow!("synthesis.api_key must be set"))?;

        let http = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            api_key,
            image_model: config.image_model.clone(),
            video_model: config.video_model.clone(),
            image_size: config.image_size.clone(),
            video_resolution: config.video_resolution.clone(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    /// Turn a non-2xx response into `SynthesisError::Api`, preferring the provider's message
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| format!("Synthesis API returned {status}"));

        Err(SynthesisError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

// Wire types (only the fields we read)

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    error: Option<ApiError>,
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<SampleVideo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SampleVideo {
    uri: Option<String>,
    bytes_base64_encoded: Option<String>,
}

fn inline_part(image: &InlineImage) -> serde_json::Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": BASE64_STANDARD.encode(&image.data),
        }
    })
}

#[async_trait]
impl SynthesisClient for GeminiClient {
    #[instrument(skip_all, fields(model = %self.image_model, images = request.images.len()), err)]
    async fn generate_image(&self, request: ImageRequest) -> Result<GeneratedImage> {
        let mut parts: Vec<serde_json::Value> = request.images.iter().map(inline_part).collect();
        parts.push(json!({ "text": request.prompt }));

        let safety_settings: Vec<_> = SAFETY_CATEGORIES
            .iter()
            .map(|category| json!({ "category": category, "threshold": "OFF" }))
            .collect();

        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "maxOutputTokens": 32768,
                "temperature": 1,
                "topP": 0.95,
                "responseModalities": ["IMAGE"],
                "imageConfig": {
                    "aspectRatio": request.aspect_ratio.as_str(),
                    "imageSize": self.image_size,
                },
            },
            "safetySettings": safety_settings,
        });

        let response = self
            .http
            .post(self.model_url(&self.image_model, "generateContent"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response: GenerateContentResponse = Self::check(response).await?.json().await?;

        let parts = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts)
            .filter(|parts| !parts.is_empty())
            .ok_or(SynthesisError::UnexpectedResponse)?;

        // The model may interleave text; the last inline part is the final image
        let inline = parts
            .into_iter()
            .rev()
            .find_map(|part| part.inline_data)
            .ok_or(SynthesisError::NoImage)?;

        let data = BASE64_STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|_| SynthesisError::UnexpectedResponse)?;
        if data.is_empty() {
            return Err(SynthesisError::NoImage);
        }

        Ok(GeneratedImage {
            data: Bytes::from(data),
            mime_type: inline.mime_type,
        })
    }

    #[instrument(skip_all, fields(model = %self.video_model), err)]
    async fn start_video(&self, request: VideoRequest) -> Result<OperationHandle> {
        let body = json!({
            "instances": [{
                "prompt": request.prompt,
                "image": {
                    "bytesBase64Encoded": BASE64_STANDARD.encode(&request.image.data),
                    "mimeType": request.image.mime_type,
                },
            }],
            "parameters": {
                "aspectRatio": request.aspect_ratio.as_str(),
                "resolution": self.video_resolution,
                "sampleCount": 1,
            },
        });

        let response = self
            .http
            .post(self.model_url(&self.video_model, "predictLongRunning"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;
        let operation: Operation = Self::check(response).await?.json().await?;

        let name = operation.name.ok_or(SynthesisError::UnexpectedResponse)?;
        debug!("Started video operation {name}");
        Ok(OperationHandle(name))
    }

    #[instrument(skip_all, fields(operation = %handle), err)]
    async fn poll_video(&self, handle: &OperationHandle) -> Result<OperationStatus> {
        let response = self
            .http
            .get(format!("{}/v1beta/{}", self.base_url, handle.0))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let operation: Operation = Self::check(response).await?.json().await?;

        if !operation.done {
            return Ok(OperationStatus::Pending);
        }
        if let Some(error) = operation.error {
            return Err(SynthesisError::OperationFailed(error.message));
        }

        let video = operation
            .response
            .and_then(|response| response.generate_video_response)
            .and_then(|response| response.generated_samples.into_iter().next())
            .and_then(|sample| sample.video)
            .ok_or(SynthesisError::NoVideo)?;

        match (video.uri, video.bytes_base64_encoded) {
            (Some(uri), _) => Ok(OperationStatus::Done(VideoRef::Uri(uri))),
            (None, Some(encoded)) => {
                let data = BASE64_STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|_| SynthesisError::UnexpectedResponse)?;
                Ok(OperationStatus::Done(VideoRef::Inline(Bytes::from(data))))
            }
            (None, None) => Err(SynthesisError::NoVideo),
        }
    }

    #[instrument(skip_all, err)]
    async fn download_video(&self, video: &VideoRef) -> Result<Bytes> {
        match video {
            VideoRef::Inline(data) => Ok(data.clone()),
            VideoRef::Uri(uri) => {
                let response = self.http.get(uri).header(API_KEY_HEADER, &self.api_key).send().await?;
                let data = Self::check(response).await?.bytes().await?;
                if data.is_empty() {
                    return Err(SynthesisError::NoVideo);
                }
                Ok(data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{synthesis::composite_prompt, test_utils::install_crypto_provider, types::AspectRatio};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    fn client(server: &MockServer) -> GeminiClient {
        install_crypto_provider();
        let config = SynthesisConfig {
            api_key: Some("test-key".to_string()),
            base_url: url::Url::parse(&server.uri()).unwrap(),
            ..Default::default()
        };
        GeminiClient::new(&config).unwrap()
    }

    fn png(data: &'static [u8]) -> InlineImage {
        InlineImage {
            data: Bytes::from_static(data),
            mime_type: "image/png".to_string(),
        }
    }

    fn image_request() -> ImageRequest {
        ImageRequest {
            images: vec![png(b"product"), png(b"model")],
            prompt: composite_prompt("studio"),
            aspect_ratio: AspectRatio::Landscape,
        }
    }

    #[test]
    fn test_requires_api_key() {
        install_crypto_provider();
        assert!(GeminiClient::new(&SynthesisConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_generate_image_takes_last_inline_part() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-3-pro-image-preview:generateContent"))
            .and(header(API_KEY_HEADER, "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": {
                    "responseModalities": ["IMAGE"],
                    "imageConfig": { "aspectRatio": "16:9", "imageSize": "1K" }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "parts": [
                            { "inlineData": { "mimeType": "image/png", "data": BASE64_STANDARD.encode(b"draft") } },
                            { "text": "here you go" },
                            { "inlineData": { "mimeType": "image/png", "data": BASE64_STANDARD.encode(b"final") } }
                        ]
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let image = client(&server).generate_image(image_request()).await.unwrap();
        assert_eq!(image.data, Bytes::from_static(b"final"));
        assert_eq!(image.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_generate_image_without_parts_or_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "I cannot do that" }] } }]
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let first = client.generate_image(image_request()).await.unwrap_err();
        assert_eq!(first.to_string(), "Unexpected AI response");

        let second = client.generate_image(image_request()).await.unwrap_err();
        assert_eq!(second.to_string(), "Image generation failed");
    }

    #[tokio::test]
    async fn test_api_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).generate_image(image_request()).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Api { status: 429, .. }));
        assert_eq!(err.to_string(), "Resource has been exhausted");
    }

    #[tokio::test]
    async fn test_video_operation_lifecycle() {
        let server = MockServer::start().await;
        let operation = "models/veo-3.1-generate-preview/operations/op-1";

        Mock::given(method("POST"))
            .and(path("/v1beta/models/veo-3.1-generate-preview:predictLongRunning"))
            .and(body_partial_json(json!({
                "instances": [{ "prompt": "Showcase the product Lamp" }],
                "parameters": { "aspectRatio": "9:16", "resolution": "720p", "sampleCount": 1 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": operation })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v1beta/{operation}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": operation })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v1beta/{operation}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": operation,
                "done": true,
                "response": {
                    "generateVideoResponse": {
                        "generatedSamples": [{ "video": { "uri": format!("{}/v1beta/files/vid:download?alt=media", server.uri()) } }]
                    }
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/vid:download"))
            .and(header(API_KEY_HEADER, "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4-bytes".to_vec()))
            .mount(&server)
            .await;

        let client = client(&server);
        let handle = client
            .start_video(VideoRequest {
                prompt: "Showcase the product Lamp".to_string(),
                image: png(b"composite"),
                aspect_ratio: AspectRatio::Portrait,
            })
            .await
            .unwrap();
        assert_eq!(handle.0, operation);

        assert_eq!(client.poll_video(&handle).await.unwrap(), OperationStatus::Pending);
        let OperationStatus::Done(video) = client.poll_video(&handle).await.unwrap() else {
            panic!("operation should be done");
        };
        assert_eq!(client.download_video(&video).await.unwrap(), Bytes::from_static(b"mp4-bytes"));
    }

    #[tokio::test]
    async fn test_finished_operation_without_samples_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/op-2",
                "done": true,
                "response": { "generateVideoResponse": { "generatedSamples": [] } }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .poll_video(&OperationHandle("operations/op-2".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Video generation failed");
    }
}
