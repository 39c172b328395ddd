use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::api::{ApiClient, DeltaSink};
use crate::models::{BackendChoice, ChatMessage, SamplingOptions};

// 模型后端凭证，每次调用时从环境变量现场读取
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Credentials {
            openai: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            anthropic: std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty()),
        }
    }
}

// 选择后端：显式指定优先，auto 模式按凭证依次选择，最后退到本地 mock
pub fn select_backend(provider: &str, creds: &Credentials) -> BackendChoice {
    match provider {
        "openai" => BackendChoice::OpenAi,
        "anthropic" => BackendChoice::Anthropic,
        "mock" => BackendChoice::Mock,
        _ => {
            if creds.openai.is_some() {
                BackendChoice::OpenAi
            } else if creds.anthropic.is_some() {
                BackendChoice::Anthropic
            } else {
                BackendChoice::Mock
            }
        }
    }
}

// 统一的文本生成能力，三种后端各自实现
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        messages: &[ChatMessage],
        opts: &SamplingOptions,
    ) -> Result<String>;

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        opts: &SamplingOptions,
        sink: DeltaSink<'_>,
    ) -> Result<String> {
        let text = self.generate(messages, opts).await?;
        sink(&text);
        Ok(text)
    }

    async fn generate_analysis(
        &self,
        messages: &[ChatMessage],
        opts: &SamplingOptions,
    ) -> Result<String> {
        self.generate(messages, opts).await
    }
}

pub struct OpenAiBackend {
    api: ApiClient,
    api_key: String,
}

impl OpenAiBackend {
    pub fn new(api: ApiClient, api_key: String) -> Self {
        OpenAiBackend { api, api_key }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        opts: &SamplingOptions,
    ) -> Result<String> {
        self.api.openai_chat(&self.api_key, messages, opts).await
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        opts: &SamplingOptions,
        sink: DeltaSink<'_>,
    ) -> Result<String> {
        self.api
            .openai_chat_stream(&self.api_key, messages, opts, sink)
            .await
    }
}

pub struct AnthropicBackend {
    api: ApiClient,
    api_key: String,
}

impl AnthropicBackend {
    pub fn new(api: ApiClient, api_key: String) -> Self {
        AnthropicBackend { api, api_key }
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        opts: &SamplingOptions,
    ) -> Result<String> {
        self.api.anthropic_chat(&self.api_key, messages, opts).await
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        opts: &SamplingOptions,
        sink: DeltaSink<'_>,
    ) -> Result<String> {
        self.api
            .anthropic_chat_stream(&self.api_key, messages, opts, sink)
            .await
    }
}

// 本地确定性后端，无凭证或线上后端全部失败时兜底，用于离线演示
pub struct MockBackend;

// mock 回复中保留的用户原文长度上限
const MOCK_ECHO_CHARS: usize = 90;

impl MockBackend {
    fn reply_for(messages: &[ChatMessage]) -> String {
        let user_last = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let truncated: String = user_last.chars().take(MOCK_ECHO_CHARS).collect();
        format!(
            "好的，我看到了。我们用简单的句子继续练习吧。\n\n原文：{}",
            truncated
        )
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        _opts: &SamplingOptions,
    ) -> Result<String> {
        Ok(Self::reply_for(messages))
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        _opts: &SamplingOptions,
        sink: DeltaSink<'_>,
    ) -> Result<String> {
        let text = Self::reply_for(messages);
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(12) {
            let piece: String = chunk.iter().collect();
            sink(&piece);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(text)
    }

    async fn generate_analysis(
        &self,
        _messages: &[ChatMessage],
        _opts: &SamplingOptions,
    ) -> Result<String> {
        Ok(serde_json::json!({
            "feedback": "语序基本正确，注意助词和介词的位置。",
            "words": [
                { "term": "你好", "pinyin": "nǐ hǎo", "meaning": "问候用语" },
                { "term": "明天", "pinyin": "míngtiān", "meaning": "今天的下一天" }
            ],
            "grammar": "注意问候表达与疑问句的语序。",
            "notes": "试着用三个以上的新词汇重新组织句子。"
        })
        .to_string())
    }
}

// 按选择顺序构建后端链，mock 永远作为最后一环
pub fn backend_chain(
    api: &ApiClient,
    provider: &str,
    creds: &Credentials,
) -> Vec<Box<dyn ChatBackend>> {
    let mut chain: Vec<Box<dyn ChatBackend>> = Vec::new();

    match select_backend(provider, creds) {
        BackendChoice::OpenAi => {
            chain.push(Box::new(OpenAiBackend::new(
                api.clone(),
                creds.openai.clone().unwrap_or_default(),
            )));
            // 仅 auto 模式下降级到另一家线上后端
            if provider != "openai" {
                if let Some(key) = &creds.anthropic {
                    chain.push(Box::new(AnthropicBackend::new(api.clone(), key.clone())));
                }
            }
        }
        BackendChoice::Anthropic => {
            chain.push(Box::new(AnthropicBackend::new(
                api.clone(),
                creds.anthropic.clone().unwrap_or_default(),
            )));
        }
        BackendChoice::Mock => {}
    }

    chain.push(Box::new(MockBackend));
    chain
}

// 生成回复：先流式，失败后非流式重试一次，再失败降级到下一个后端。
// 链尾是 mock，所以总会返回非空文本，错误不会抛给调用方。
pub async fn generate_reply(
    chain: &[Box<dyn ChatBackend>],
    messages: &[ChatMessage],
    opts: &SamplingOptions,
    sink: DeltaSink<'_>,
) -> String {
    for backend in chain {
        match backend.generate_stream(messages, opts, &mut *sink).await {
            Ok(text) if !text.trim().is_empty() => return text,
            Ok(_) => {
                warn!(backend = backend.name(), "流式响应为空，改用非流式重试");
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "流式请求失败，改用非流式重试");
            }
        }

        match backend.generate(messages, opts).await {
            Ok(text) if !text.trim().is_empty() => {
                sink(&text);
                return text;
            }
            Ok(_) => {
                warn!(backend = backend.name(), "非流式响应为空，降级到下一个后端");
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "非流式请求失败，降级到下一个后端");
            }
        }
    }

    // mock 不会走到这里，仅作兜底
    String::new()
}

// 生成分析用的原始文本，同样按链降级，mock 返回固定的 JSON
pub async fn generate_analysis_raw(
    chain: &[Box<dyn ChatBackend>],
    messages: &[ChatMessage],
    opts: &SamplingOptions,
) -> String {
    for backend in chain {
        match backend.generate_analysis(messages, opts).await {
            Ok(text) if !text.trim().is_empty() => return text,
            Ok(_) => {
                warn!(backend = backend.name(), "分析响应为空，降级到下一个后端");
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "分析请求失败，降级到下一个后端");
            }
        }
    }

    String::new()
}
