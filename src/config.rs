use anyhow::Result;
use serde::Deserialize;

// 配置文件结构
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub default_language: String,
    pub default_level: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub analysis_max_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            default_language: "zh".to_string(),
            default_level: "intermediate".to_string(),
            temperature: 0.2,
            max_tokens: 400,
            analysis_max_tokens: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    // auto | openai | anthropic | mock
    pub provider: String,
    pub openai_model: String,
    pub anthropic_model: String,
    pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            provider: "auto".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            anthropic_model: "claude-3-5-sonnet-latest".to_string(),
            request_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub transcript_json: String,
    pub transcript_text: String,
    pub transcript_csv: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            transcript_json: "conversation.json".to_string(),
            transcript_text: "conversation.txt".to_string(),
            transcript_csv: "conversation.csv".to_string(),
        }
    }
}

impl Config {
    // 读取 config.toml，文件不存在时使用默认配置
    pub fn load() -> Result<Config> {
        match std::fs::read_to_string("config.toml") {
            Ok(content) => Config::from_toml(&content),
            Err(_) => Ok(Config::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("配置文件解析失败: {}", e))?;
        Ok(config)
    }
}
