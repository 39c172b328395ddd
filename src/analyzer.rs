use serde_json::Value;
use tracing::warn;

use crate::models::{AnalysisResult, ChatMessage, Feedback, Language, Level, VocabEntry};

// 聊天回复的系统提示词
pub fn reply_system_prompt(language: &Language, level: Level) -> String {
    format!(
        "You are a concise, corrective language partner. Reply in {} only. \
         Keep responses short (no more than 3 sentences). \
         The learner's level is {}.",
        language.english,
        level.as_str()
    )
}

// 构建分析请求的消息列表
pub fn analysis_messages(text: &str, language: &Language, level: Level) -> Vec<ChatMessage> {
    let system = "You are a precise language-teaching assistant. Return STRICT JSON only.";

    // 注音字段只对需要注音的语言要求
    let pinyin_line = if language.script_based {
        "  \"pinyin\": \"整句的拼音或罗马音\",\n"
    } else {
        ""
    };

    let prompt = format!(
        r#"
语言代码：{}
学习者水平：{}
请按以下格式只输出 JSON，不要添加其他内容：

{{
{}  "feedback": "对学习者这句话的简短点评",
  "words": [{{"term": "词语", "pinyin": "拼音或罗马音", "meaning": "中文释义"}}],
  "grammar": "核心语法/表达说明",
  "notes": "补充学习笔记"
}}

分析对象：
{}
"#,
        language.code,
        level.as_str(),
        pinyin_line,
        text
    );

    vec![
        ChatMessage::new("system", system),
        ChatMessage::new("user", prompt),
    ]
}

// 构建翻译请求的消息列表
pub fn translation_messages(text: &str) -> Vec<ChatMessage> {
    let prompt = format!(
        "请把下面这段话翻译成中文，只返回译文，不要任何解释：\n\n{}",
        text
    );
    vec![ChatMessage::new("user", prompt)]
}

// 去掉首尾空白和常见的代码围栏标记
fn strip_fences(s: &str) -> &str {
    let mut t = s.trim();
    if let Some(rest) = t.strip_prefix("```json") {
        t = rest;
    } else if let Some(rest) = t.strip_prefix("```") {
        t = rest;
    }
    t = t.trim_start();
    if let Some(rest) = t.strip_suffix("```") {
        t = rest;
    }
    t.trim()
}

// 把模型返回的半结构化文本规范化为完整的分析结果。
// 模型只是被提示输出 JSON，并没有任何格式保证，所以这里解析失败
// 一律返回占位结果，缺失或类型不对的字段一律取默认值，绝不抛错。
pub fn parse_analysis(raw: &str) -> AnalysisResult {
    let stripped = strip_fences(raw);
    let value = match serde_json::from_str::<Value>(stripped) {
        Ok(v) => v,
        Err(_) => {
            // 再剥一层围栏后重试，处理嵌套围栏的情况
            let stripped = strip_fences(stripped);
            match serde_json::from_str::<Value>(stripped) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "分析输出不是合法 JSON，使用占位结果");
                    return AnalysisResult::unavailable();
                }
            }
        }
    };

    let Some(obj) = value.as_object() else {
        warn!("分析输出不是 JSON 对象，使用占位结果");
        return AnalysisResult::unavailable();
    };

    let vocabulary = obj
        .get("words")
        .or_else(|| obj.get("vocabulary"))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let entry = entry.as_object()?;
                    Some(VocabEntry {
                        term: str_field(entry, "term"),
                        phonetic: {
                            let p = str_field(entry, "pinyin");
                            if p.is_empty() { str_field(entry, "phonetic") } else { p }
                        },
                        meaning: str_field(entry, "meaning"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    AnalysisResult {
        pinyin: obj
            .get("pinyin")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        vocabulary,
        grammar: obj
            .get("grammar")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        notes: obj
            .get("notes")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        feedback: parse_feedback(obj.get("feedback")),
    }
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// feedback 既可能是字符串也可能是对象，两种都接受
fn parse_feedback(value: Option<&Value>) -> Option<Feedback> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(Feedback {
            comment: s.trim().to_string(),
            corrected: None,
        }),
        Some(Value::Object(o)) => {
            let comment = o
                .get("comment")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            let corrected = o
                .get("corrected")
                .and_then(Value::as_str)
                .map(|s| s.to_string());
            if comment.is_empty() && corrected.is_none() {
                None
            } else {
                Some(Feedback { comment, corrected })
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::find_language;

    #[test]
    fn well_formed_json_round_trips() {
        let raw = r#"{
            "pinyin": "míngtiān jiàn",
            "feedback": "表达自然。",
            "words": [
                {"term": "明天", "pinyin": "míngtiān", "meaning": "今天的下一天"},
                {"term": "见", "pinyin": "jiàn", "meaning": "见面"}
            ],
            "grammar": "时间词放在句首。",
            "notes": "可以加上具体时间。"
        }"#;
        let result = parse_analysis(raw);
        assert_eq!(result.pinyin, "míngtiān jiàn");
        assert_eq!(result.vocabulary.len(), 2);
        assert_eq!(result.vocabulary[0].term, "明天");
        assert_eq!(result.vocabulary[0].phonetic, "míngtiān");
        assert_eq!(result.vocabulary[1].meaning, "见面");
        assert_eq!(result.grammar, "时间词放在句首。");
        assert_eq!(result.notes, "可以加上具体时间。");
        assert_eq!(result.feedback.unwrap().comment, "表达自然。");
    }

    #[test]
    fn fenced_json_parses() {
        let raw = "```json\n{\"grammar\": \"主谓宾\"}\n```";
        let result = parse_analysis(raw);
        assert_eq!(result.grammar, "主谓宾");
        assert!(result.vocabulary.is_empty());
    }

    #[test]
    fn nested_fence_parses_on_second_strip() {
        let raw = "```\n```json\n{\"notes\": \"嵌套围栏\"}\n```\n```";
        let result = parse_analysis(raw);
        assert_eq!(result.notes, "嵌套围栏");
    }

    #[test]
    fn non_json_yields_unavailable_record() {
        let result = parse_analysis("not json");
        assert_eq!(result, AnalysisResult::unavailable());
    }

    #[test]
    fn top_level_array_yields_unavailable_record() {
        let result = parse_analysis("[1, 2, 3]");
        assert_eq!(result, AnalysisResult::unavailable());
    }

    #[test]
    fn missing_words_defaults_to_empty_vocabulary() {
        let result = parse_analysis(r#"{"grammar": "说明", "notes": "笔记"}"#);
        assert!(result.vocabulary.is_empty());
        assert_eq!(result.grammar, "说明");
    }

    #[test]
    fn wrong_typed_words_defaults_to_empty_vocabulary() {
        let result = parse_analysis(r#"{"words": "不是数组"}"#);
        assert!(result.vocabulary.is_empty());
    }

    #[test]
    fn non_object_word_entries_are_skipped() {
        let raw = r#"{"words": [42, {"term": "走", "meaning": "行走"}]}"#;
        let result = parse_analysis(raw);
        assert_eq!(result.vocabulary.len(), 1);
        assert_eq!(result.vocabulary[0].term, "走");
    }

    // 围栏 + 缺省字段组合的完整场景
    #[test]
    fn fenced_partial_schema_normalizes_with_defaults() {
        let raw = "```json {\"pinyin\":\"nǐ hǎo\",\"words\":[{\"term\":\"你好\",\"meaning\":\"hello\"}]} ```";
        let result = parse_analysis(raw);
        assert_eq!(result.pinyin, "nǐ hǎo");
        assert_eq!(result.vocabulary.len(), 1);
        assert_eq!(result.vocabulary[0].term, "你好");
        assert_eq!(result.vocabulary[0].meaning, "hello");
        assert_eq!(result.vocabulary[0].phonetic, "");
        assert_eq!(result.grammar, "");
        assert_eq!(result.notes, "");
        assert!(result.feedback.is_none());
    }

    #[test]
    fn feedback_object_form_is_accepted() {
        let raw = r#"{"feedback": {"comment": "不错", "corrected": "我明天去上海。"}}"#;
        let result = parse_analysis(raw);
        let feedback = result.feedback.unwrap();
        assert_eq!(feedback.comment, "不错");
        assert_eq!(feedback.corrected.as_deref(), Some("我明天去上海。"));
    }

    #[test]
    fn empty_feedback_is_none() {
        let result = parse_analysis(r#"{"feedback": ""}"#);
        assert!(result.feedback.is_none());
        let result = parse_analysis(r#"{"feedback": {}}"#);
        assert!(result.feedback.is_none());
    }

    #[test]
    fn phonetic_key_is_accepted_as_alias() {
        let raw = r#"{"words": [{"term": "犬", "phonetic": "いぬ", "meaning": "狗"}]}"#;
        let result = parse_analysis(raw);
        assert_eq!(result.vocabulary[0].phonetic, "いぬ");
    }

    #[test]
    fn analysis_prompt_requests_pinyin_only_for_script_languages() {
        let zh = find_language("zh").unwrap();
        let en = find_language("en").unwrap();
        let zh_prompt = &analysis_messages("你好", zh, Level::Intermediate)[1].content;
        let en_prompt = &analysis_messages("hello", en, Level::Intermediate)[1].content;
        assert!(zh_prompt.contains("\"pinyin\": \"整句"));
        assert!(!en_prompt.contains("\"pinyin\": \"整句"));
    }

    #[test]
    fn reply_prompt_names_target_language_and_level() {
        let ja = find_language("ja").unwrap();
        let prompt = reply_system_prompt(ja, Level::Beginner);
        assert!(prompt.contains("Japanese"));
        assert!(prompt.contains("beginner"));
    }
}
