use crate::classifier::{Classifier, Prediction};
use crate::config::ClassifierConfig;
use crate::error::AppError;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Vision model behind an OpenAI-compatible `/chat/completions` endpoint
/// (Ollama, llama.cpp server, vLLM and friends).
pub struct GenerativeCaptioner {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl GenerativeCaptioner {
    pub fn new(config: &ClassifierConfig) -> Result<Self, AppError> {
        let mut base = config.endpoint.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)?.join("chat/completions")?;
        log::debug!("Creating generative captioner for {} ({})", endpoint, config.model);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

fn build_prompt(location_hint: Option<&str>) -> String {
    let location = match location_hint {
        Some(hint) if !hint.is_empty() => format!("The photo was taken in {hint}.\n\n"),
        _ => String::new(),
    };

    format!(
        r#"{location}Describe this photograph for a searchable photo catalog.

Respond with a single JSON object and nothing else:
{{
  "identified_objects": ["object", "..."],
  "themes": ["theme", "..."],
  "alt_text": "One sentence describing the image for screen readers",
  "critique": "A short critique of the photograph",
  "suggested_title": "A short title",
  "composition_critique": "A short critique of the composition",
  "subject": "The main subject in a few words"
}}"#
    )
}

fn mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") | Some("heif") => "image/heic",
        _ => "image/jpeg",
    }
}

#[async_trait]
impl Classifier for GenerativeCaptioner {
    async fn predict(
        &self,
        path: &Path,
        location_hint: Option<&str>,
    ) -> Result<Prediction, AppError> {
        let bytes = tokio::fs::read(path).await?;
        let data_uri = format!(
            "data:{};base64,{}",
            mime_type(path),
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );

        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": build_prompt(location_hint) },
                    { "type": "image_url", "image_url": { "url": data_uri } }
                ]
            }]
        });

        log::trace!("Calling {} for {:?}", self.endpoint, path);
        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Classifier(format!("HTTP {}: {}", status, text)));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Classifier("response has no message content".into()))?;

        Ok(Prediction::Text(content))
    }
}
