use anyhow::Result;
use futures::StreamExt;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ApiConfig;
use crate::models::{ChatMessage, SamplingOptions};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// 流式输出的接收端，每个增量片段回调一次
pub type DeltaSink<'a> = &'a mut (dyn FnMut(&str) + Send);

// OpenAI chat completions 请求/响应结构
#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: String,
}

// Anthropic messages 请求/响应结构，system 单独提升为顶层字段
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(ApiClient { client, config })
    }

    pub fn openai_model(&self) -> String {
        std::env::var("OPENAI_MODEL").unwrap_or_else(|_| self.config.openai_model.clone())
    }

    pub fn anthropic_model(&self) -> String {
        std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| self.config.anthropic_model.clone())
    }

    // OpenAI 非流式请求
    pub async fn openai_chat(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        opts: &SamplingOptions,
    ) -> Result<String> {
        let model = self.openai_model();
        let request = OpenAiRequest {
            model: &model,
            messages,
            max_tokens: opts.max_tokens,
            temperature: opts.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(OPENAI_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI 请求失败 (状态码: {}): {}", status, error_text);
        }

        let api_response: OpenAiResponse = response.json().await?;
        let content = api_response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        Ok(content)
    }

    // OpenAI 流式请求，逐段写入 sink，返回完整文本
    pub async fn openai_chat_stream(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        opts: &SamplingOptions,
        sink: DeltaSink<'_>,
    ) -> Result<String> {
        let model = self.openai_model();
        let request = OpenAiRequest {
            model: &model,
            messages,
            max_tokens: opts.max_tokens,
            temperature: opts.temperature,
            stream: true,
        };

        let response = self
            .client
            .post(OPENAI_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI 流式请求失败 (状态码: {}): {}", status, error_text);
        }

        let mut acc = String::new();
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                let line = line.trim_end();
                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                if payload == "[DONE]" {
                    return Ok(acc);
                }
                // 单行解析失败直接跳过，不中断整个流
                let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
                    continue;
                };
                if let Some(delta) = value
                    .pointer("/choices/0/delta/content")
                    .and_then(|v| v.as_str())
                {
                    if !delta.is_empty() {
                        acc.push_str(delta);
                        sink(delta);
                    }
                }
            }
        }

        Ok(acc)
    }

    // Anthropic 非流式请求
    pub async fn anthropic_chat(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        opts: &SamplingOptions,
    ) -> Result<String> {
        let model = self.anthropic_model();
        let (system, user_messages) = split_system(messages);
        let request = AnthropicRequest {
            model: &model,
            messages: user_messages,
            max_tokens: opts.max_tokens,
            temperature: opts.temperature,
            system,
            stream: false,
        };

        let response = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic 请求失败 (状态码: {}): {}", status, error_text);
        }

        let api_response: AnthropicResponse = response.json().await?;
        let content = api_response
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text.as_str())
            .collect::<String>()
            .trim()
            .to_string();
        Ok(content)
    }

    // Anthropic 流式请求
    pub async fn anthropic_chat_stream(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        opts: &SamplingOptions,
        sink: DeltaSink<'_>,
    ) -> Result<String> {
        let model = self.anthropic_model();
        let (system, user_messages) = split_system(messages);
        let request = AnthropicRequest {
            model: &model,
            messages: user_messages,
            max_tokens: opts.max_tokens,
            temperature: opts.temperature,
            system,
            stream: true,
        };

        let response = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic 流式请求失败 (状态码: {}): {}", status, error_text);
        }

        let mut acc = String::new();
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                let line = line.trim_end();
                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
                    continue;
                };
                match value.get("type").and_then(|v| v.as_str()) {
                    Some("content_block_delta") => {
                        if let Some(delta) =
                            value.pointer("/delta/text").and_then(|v| v.as_str())
                        {
                            if !delta.is_empty() {
                                acc.push_str(delta);
                                sink(delta);
                            }
                        }
                    }
                    Some("message_stop") => return Ok(acc),
                    _ => {}
                }
            }
        }

        Ok(acc)
    }
}

// Anthropic 不接受 system 角色消息，统一提取到顶层 system 字段
fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<ChatMessage>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .collect();
    let rest = messages
        .iter()
        .filter(|m| m.role != "system")
        .cloned()
        .collect();
    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n"))
    };
    (system, rest)
}
