//! Reading a gauge value off an image.
//!
//! [`GeminiRecognizer`] asks a Gemini model through the Generative Language
//! REST API. Other models plug in through the [`Recognizer`] trait.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/";
pub const READING_PROMPT: &str = "Return only the value the needle points at on this gauge \
    image, or the number meant to be read. No units and no explanation.";

const JPEG_MIME_TYPE: &str = "image/jpeg";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RecognizeError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("recognition timed out: {0}")]
    Timeout(String),

    #[error("recognition temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("recognition request rejected: {0}")]
    Rejected(String),

    #[error("malformed recognition response: {0}")]
    MalformedResponse(String),
}

impl RecognizeError {
    /// Whether the same request may succeed when sent again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RecognizeError::RateLimited(_)
                | RecognizeError::Timeout(_)
                | RecognizeError::Unavailable(_)
        )
    }
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Name of the model, recorded with every reading.
    fn model(&self) -> &str;

    /// Returns the text the model read from `image`, a JPEG.
    async fn recognize(&self, image: &[u8], prompt: &str) -> Result<String, RecognizeError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 2],
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Part<'a> {
    Text(&'a str),
    InlineData { mime_type: &'a str, data: String },
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Default)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// Text of the first candidate, all parts joined.
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub struct GeminiRecognizer {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl GeminiRecognizer {
    pub fn new(
        api_base: &Url,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, RecognizeError> {
        let endpoint = api_base
            .join(&format!("v1beta/models/{model}:generateContent"))
            .map_err(|e| RecognizeError::Rejected(format!("invalid endpoint: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecognizeError::Unavailable(e.to_string()))?;

        Ok(GeminiRecognizer {
            client,
            endpoint,
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

fn send_error(error: reqwest::Error) -> RecognizeError {
    if error.is_timeout() {
        RecognizeError::Timeout(error.to_string())
    } else {
        RecognizeError::Unavailable(error.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> RecognizeError {
    let message = format!("{status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS {
        RecognizeError::RateLimited(message)
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        RecognizeError::Timeout(message)
    } else if status.is_server_error() {
        RecognizeError::Unavailable(message)
    } else {
        RecognizeError::Rejected(message)
    }
}

#[async_trait]
impl Recognizer for GeminiRecognizer {
    fn model(&self) -> &str {
        &self.model
    }

    async fn recognize(&self, image: &[u8], prompt: &str) -> Result<String, RecognizeError> {
        let request = GenerateRequest {
            contents: [Content {
                parts: [
                    Part::Text(prompt),
                    Part::InlineData {
                        mime_type: JPEG_MIME_TYPE,
                        data: STANDARD.encode(image),
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let response: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                RecognizeError::Timeout(e.to_string())
            } else {
                RecognizeError::MalformedResponse(e.to_string())
            }
        })?;

        Ok(response.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const IMAGE: &[u8] = b"\xFF\xD8\xFF\xE0jpeg";

    fn recognizer_for(server: &MockServer, timeout: Duration) -> GeminiRecognizer {
        let api_base = Url::parse(&format!("{}/", server.uri())).unwrap();
        GeminiRecognizer::new(&api_base, "gemini-test", "secret", timeout).unwrap()
    }

    #[tokio::test]
    async fn test_recognize() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "secret"))
            .and(body_json(json!({
                "contents": [{
                    "parts": [
                        {"text": "read it"},
                        {"inline_data": {"mime_type": "image/jpeg", "data": STANDARD.encode(IMAGE)}},
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [
                    {"content": {"parts": [{"text": "42"}, {"text": ".5"}], "role": "model"}},
                    {"content": {"parts": [{"text": "ignored"}]}},
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let recognizer = recognizer_for(&server, Duration::from_secs(2));

        assert_eq!(recognizer.model(), "gemini-test");
        assert_eq!(
            recognizer.recognize(IMAGE, "read it").await,
            Ok("42.5".into())
        );
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"promptFeedback": {}})))
            .mount(&server)
            .await;

        let recognizer = recognizer_for(&server, Duration::from_secs(2));
        assert_eq!(recognizer.recognize(IMAGE, "read it").await, Ok(String::new()));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let cases: [(u16, fn(&RecognizeError) -> bool); 3] = [
            (429, |e| matches!(e, RecognizeError::RateLimited(_))),
            (503, |e| matches!(e, RecognizeError::Unavailable(_))),
            (400, |e| matches!(e, RecognizeError::Rejected(_))),
        ];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).set_body_string("quota"))
                .mount(&server)
                .await;

            let error = recognizer_for(&server, Duration::from_secs(2))
                .recognize(IMAGE, "read it")
                .await
                .unwrap_err();

            assert!(expected(&error), "{status}: {error:?}");
            assert_eq!(error.is_transient(), status != 400);
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"candidates": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let error = recognizer_for(&server, Duration::from_millis(50))
            .recognize(IMAGE, "read it")
            .await
            .unwrap_err();

        assert!(matches!(error, RecognizeError::Timeout(_)), "{error:?}");
    }
}
