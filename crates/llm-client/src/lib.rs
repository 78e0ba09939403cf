//! OpenAI-compatible chat-completion client used to score news against a rubric.

pub mod error;
pub mod scoring;

pub use error::{LlmError, LlmResult};

use analysis_core::{AnalysisError, CriterionScore, LlmScorer, Rubric};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(120),
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Send one system + user exchange and return the assistant's reply text.
    pub async fn chat(&self, model: &str, system: String, user: String) -> LlmResult<String> {
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage::new("system", system), ChatMessage::new("user", user)],
            temperature: self.config.temperature,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(LlmError::ServiceUnavailable(format!(
                "Status: {} {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let result = response.json::<ChatResponse>().await?;
        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no choices in completion".to_string()))
    }

    pub async fn score(&self, model: &str, text: &str, rubric: &Rubric) -> LlmResult<Vec<CriterionScore>> {
        let reply = self
            .chat(model, scoring::system_prompt(rubric), scoring::user_prompt(text, rubric))
            .await?;
        scoring::parse_scores(&reply, rubric).map_err(|e| {
            tracing::warn!("Unparseable {} reply: {}", model, e);
            e
        })
    }
}

#[async_trait]
impl LlmScorer for LlmClient {
    async fn score_text(&self, model: &str, text: &str, rubric: &Rubric) -> Result<Vec<CriterionScore>, AnalysisError> {
        Ok(self.score(model, text, rubric).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "gpt-oss-120b",
            messages: vec![ChatMessage::new("system", "s".to_string()), ChatMessage::new("user", "u".to_string())],
            temperature: 0.3,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-oss-120b");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["temperature"], 0.3);
    }

    #[test]
    fn test_chat_response_parse() {
        let body = r#"{"id": "c1", "choices": [{"index": 0, "message": {"role": "assistant", "content": "{}"}, "finish_reason": "stop"}]}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].message.content, "{}");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_upstream_error() {
        let client = LlmClient::new(LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();
        let err = client
            .score_text("m", "text", &Rubric::crypto())
            .await
            .unwrap_err();
        assert!(err.is_upstream());
    }
}
