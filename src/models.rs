use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

// 单条对话记录，translation 在用户请求翻译后补充
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ConversationTurn {
            role,
            content: content.into(),
            timestamp: Local::now(),
            translation: None,
        }
    }

    // 界面与导出统一使用的时间格式
    pub fn formatted_time(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M").to_string()
    }
}

// 词汇条目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub term: String,
    pub phonetic: String,
    pub meaning: String,
}

// 模型对学习者发言的点评
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected: Option<String>,
}

// 规范化后的分析结果，所有字段保证有值，展示层不需要判空
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub pinyin: String,
    pub vocabulary: Vec<VocabEntry>,
    pub grammar: String,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl AnalysisResult {
    // 模型输出完全无法解析时的占位结果
    pub fn unavailable() -> Self {
        AnalysisResult {
            pinyin: String::new(),
            vocabulary: Vec::new(),
            grammar: "分析不可用".to_string(),
            notes: "模型输出无法解析".to_string(),
            feedback: None,
        }
    }
}

// 每次调用时根据凭证现场推导，不做持久化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    OpenAi,
    Anthropic,
    Mock,
}

// 支持的目标语言
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub label: &'static str,
    pub english: &'static str,
    pub flag: &'static str,
    // 需要注音/罗马音的语言
    pub script_based: bool,
}

pub const LANGUAGES: &[Language] = &[
    Language { code: "zh", label: "中文", english: "Chinese", flag: "🇨🇳", script_based: true },
    Language { code: "ja", label: "日语", english: "Japanese", flag: "🇯🇵", script_based: true },
    Language { code: "en", label: "英语", english: "English", flag: "🇬🇧", script_based: false },
    Language { code: "fr", label: "法语", english: "French", flag: "🇫🇷", script_based: false },
    Language { code: "es", label: "西班牙语", english: "Spanish", flag: "🇪🇸", script_based: false },
    Language { code: "de", label: "德语", english: "German", flag: "🇩🇪", script_based: false },
    Language { code: "ko", label: "韩语", english: "Korean", flag: "🇰🇷", script_based: true },
];

pub fn find_language(code: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|l| l.code == code)
}

// 学习者水平
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    // 提示词里使用的英文标识
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Level::Beginner => "初级",
            Level::Intermediate => "中级",
            Level::Advanced => "高级",
        }
    }

    pub fn parse(s: &str) -> Option<Level> {
        match s {
            "beginner" | "初级" => Some(Level::Beginner),
            "intermediate" | "中级" => Some(Level::Intermediate),
            "advanced" | "高级" => Some(Level::Advanced),
            _ => None,
        }
    }
}

// 发送给后端的消息
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage { role: role.into(), content: content.into() }
    }
}

// 采样参数
#[derive(Debug, Clone, Copy)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        SamplingOptions { temperature: 0.2, max_tokens: 400 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_language_known_and_unknown() {
        let zh = find_language("zh").unwrap();
        assert_eq!(zh.label, "中文");
        assert!(zh.script_based);
        assert!(find_language("xx").is_none());
    }

    #[test]
    fn level_parse_accepts_both_forms() {
        assert_eq!(Level::parse("beginner"), Some(Level::Beginner));
        assert_eq!(Level::parse("高级"), Some(Level::Advanced));
        assert_eq!(Level::parse("expert"), None);
    }

    #[test]
    fn role_serializes_lowercase() {
        let turn = ConversationTurn::new(Role::User, "你好");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("translation").is_none());
    }
}
