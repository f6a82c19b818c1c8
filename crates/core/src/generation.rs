use crate::endpoint::parse_base_url;
use crate::traits::TextGenerator;
use crate::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Models the chat surface offers; any other Ollama tag is accepted as well.
pub const KNOWN_MODELS: [&str; 4] = [
    DEFAULT_MODEL,
    "deepseek-r1:7b",
    "llama3.1:8b",
    "mistral:7b-instruct",
];

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaGenerator {
    client: Client,
    endpoint: Url,
}

impl OllamaGenerator {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, GenerationError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: parse_base_url(endpoint)?,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        debug!(model, prompt_chars = prompt.chars().count(), "requesting completion");
        let response = self
            .client
            .post(self.endpoint.join("api/generate")?)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response)
    }
}

/// Removes `<think>` markers, shared indentation and surrounding whitespace from a completion.
pub fn clean_completion(raw: &str) -> String {
    let without_markers = raw.replace("<think>", "").replace("</think>", "");
    dedent(without_markers.trim_matches('\n')).trim().to_string()
}

/// Strips the longest whitespace prefix shared by every non-blank line.
/// Prefixes are compared character by character, so a tab never matches spaces.
fn dedent(text: &str) -> String {
    let mut margin: Option<&str> = None;
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        let indent = &line[..line.len() - line.trim_start_matches([' ', '\t']).len()];
        margin = Some(match margin {
            None => indent,
            Some(current) if indent.starts_with(current) => current,
            Some(current) => {
                let shared = current
                    .bytes()
                    .zip(indent.bytes())
                    .take_while(|(left, right)| left == right)
                    .count();
                &current[..shared]
            }
        });
    }
    let margin = margin.unwrap_or("");

    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.strip_prefix(margin).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
