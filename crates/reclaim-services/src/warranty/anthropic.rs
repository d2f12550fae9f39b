//! Warranty lookups through Anthropic's Messages API

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use super::ai::{AiWarrantyAnswer, WarrantyAiProvider};
use super::resolver::WarrantyQuery;

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
/// Outermost `{...}` in a reply; models often wrap the JSON in prose or a fence.
const JSON_OBJECT_PATTERN: &str = r"(?s)\{.*\}";

pub struct AnthropicWarrantyProvider {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    json_object: Regex,
}

impl Debug for AnthropicWarrantyProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AnthropicWarrantyProvider")
            .field("model", &self.model)
            .finish()
    }
}

// Messages API request/response structures
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<MessageParam>,
}

#[derive(Debug, Serialize)]
struct MessageParam {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlockResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockResponse {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl AnthropicWarrantyProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for warranty lookups")?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: API_BASE.to_string(),
            json_object: Regex::new(JSON_OBJECT_PATTERN)
                .context("Failed to compile JSON extraction pattern")?,
        })
    }

    /// Point the client at another Messages API root (e.g. a test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_prompt(query: &WarrantyQuery) -> String {
        let mut parts = vec![format!("Item: {}", query.item_name)];
        if let Some(ref description) = query.description {
            parts.push(format!("Description: {}", description));
        }
        if let Some(ref merchant) = query.merchant {
            parts.push(format!("Merchant: {}", merchant));
        }
        parts.push(format!("Purchase date: {}", query.purchase_date));
        if let Some(price) = query.price {
            parts.push(format!("Price: {}", price));
        }
        parts.push(
            "\nDoes this item come with a manufacturer warranty? Respond with JSON only:\n\
             {\"has_warranty\": bool, \"duration_months\": number, \"manufacturer\": string|null, \
             \"category\": string|null, \"confidence\": number between 0 and 1, \
             \"source_urls\": [string]}"
                .to_string(),
        );
        parts.join("\n")
    }

    /// Parse the model's answer. The JSON object may be surrounded by prose
    /// or a markdown fence.
    fn parse_answer(&self, text: &str) -> Result<AiWarrantyAnswer> {
        let json_text = self
            .json_object
            .find(text)
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow::anyhow!("Warranty answer contained no JSON object"))?;

        serde_json::from_str(json_text).context("Failed to parse warranty answer as JSON")
    }
}

#[async_trait]
impl WarrantyAiProvider for AnthropicWarrantyProvider {
    async fn lookup(&self, query: &WarrantyQuery) -> Result<AiWarrantyAnswer> {
        let body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: "You are a product warranty researcher. Answer with a single JSON object."
                .to_string(),
            messages: vec![MessageParam {
                role: "user".to_string(),
                content: Self::build_prompt(query),
            }],
        };

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send warranty lookup request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Warranty lookup request failed: {} - {}",
                status,
                error_text
            ));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Messages API response")?;

        let text = parsed
            .content
            .into_iter()
            .find_map(|b| match b {
                ContentBlockResponse::Text { text } => Some(text),
                ContentBlockResponse::Other => None,
            })
            .ok_or_else(|| anyhow::anyhow!("Messages API response contained no text"))?;

        self.parse_answer(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mockito::Matcher;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn query() -> WarrantyQuery {
        WarrantyQuery {
            tenant_id: Uuid::new_v4(),
            receipt_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            item_name: "Cordless Drill".to_string(),
            description: Some("20V brushless".to_string()),
            merchant: Some("Home Depot".to_string()),
            purchase_date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            price: Some(Decimal::new(12999, 2)),
        }
    }

    #[test]
    fn test_prompt_includes_item_details() {
        let prompt = AnthropicWarrantyProvider::build_prompt(&query());
        assert!(prompt.contains("Item: Cordless Drill"));
        assert!(prompt.contains("Merchant: Home Depot"));
        assert!(prompt.contains("Purchase date: 2024-04-02"));
        assert!(prompt.contains("Price: 129.99"));
    }

    fn provider() -> AnthropicWarrantyProvider {
        AnthropicWarrantyProvider::new("test-key", "claude-test", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_fenced_answer() {
        let text = "Here you go:\n```json\n{\"has_warranty\": true, \"duration_months\": 36, \"confidence\": 0.7}\n```";
        let answer = provider().parse_answer(text).unwrap();
        assert!(answer.has_warranty);
        assert_eq!(answer.months(), Some(36));
        assert_eq!(answer.confidence(), Some(0.7));
    }

    #[test]
    fn test_parse_answer_embedded_in_prose() {
        let text = "Sure: {\"has_warranty\": true, \"duration_months\": 24, \"manufacturer\": \"Breville\", \"source_urls\": []} Let me know if you need more.";
        let answer = provider().parse_answer(text).unwrap();
        assert_eq!(answer.months(), Some(24));
        assert_eq!(answer.manufacturer.as_deref(), Some("Breville"));
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(provider().parse_answer("I am not sure.").is_err());
        assert!(provider().parse_answer("Maybe {not json}").is_err());
    }

    #[tokio::test]
    async fn test_lookup_against_messages_api() {
        let mut server = mockito::Server::new_async().await;
        let reply = serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{
                "type": "text",
                "text": "```json\n{\"has_warranty\": true, \"duration_months\": 60, \"manufacturer\": \"DeWalt\", \"confidence\": 0.9, \"source_urls\": [\"https://www.dewalt.com/warranty\"]}\n```"
            }],
            "usage": {"input_tokens": 10, "output_tokens": 20}
        });
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", API_VERSION)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "claude-test"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(reply.to_string())
            .create_async()
            .await;

        let client = provider().with_base_url(format!("{}/v1", server.url()));

        let answer = client.lookup(&query()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(answer.months(), Some(60));
        assert_eq!(answer.manufacturer.as_deref(), Some("DeWalt"));
    }

    #[tokio::test]
    async fn test_lookup_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body("{\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\"}}")
            .create_async()
            .await;

        let client = provider().with_base_url(format!("{}/v1/", server.url()));

        let err = client.lookup(&query()).await.unwrap_err();
        assert!(err.to_string().contains("529"));
    }
}
