use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::session::ChatSession;
use crate::APP_TITLE;

// JSON 导出的整体结构
#[derive(Debug, Serialize)]
struct TranscriptPayload<'a> {
    title: &'static str,
    language: &'static str,
    level: &'static str,
    created_at: String,
    messages: &'a [crate::models::ConversationTurn],
}

// CSV 导出的扁平记录
#[derive(Debug, Serialize)]
struct TranscriptRow<'a> {
    role: &'static str,
    content: &'a str,
    translation: &'a str,
    timestamp: String,
}

// 导出 JSON 格式的完整对话
pub fn export_json(session: &ChatSession, path: impl AsRef<Path>) -> Result<()> {
    let payload = TranscriptPayload {
        title: APP_TITLE,
        language: session.language.label,
        level: session.level.label(),
        created_at: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        messages: &session.turns,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    std::fs::write(path.as_ref(), json)?;
    println!("✅ 对话已导出：{}", path.as_ref().display());
    Ok(())
}

// 导出纯文本格式，译文另起一行缩进
pub fn export_text(session: &ChatSession, path: impl AsRef<Path>) -> Result<()> {
    let mut file = File::create(path.as_ref())?;
    for turn in &session.turns {
        writeln!(file, "[{}] {}", turn.role.as_str(), turn.content)?;
        if let Some(translation) = &turn.translation {
            writeln!(file, "    译: {}", translation)?;
        }
    }
    println!("✅ 对话已导出：{}", path.as_ref().display());
    Ok(())
}

// 导出 CSV 格式，每回合一行
pub fn export_csv(session: &ChatSession, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for turn in &session.turns {
        writer.serialize(TranscriptRow {
            role: turn.role.as_str(),
            content: &turn.content,
            translation: turn.translation.as_deref().unwrap_or(""),
            timestamp: turn.formatted_time(),
        })?;
    }
    writer.flush()?;
    println!("✅ 对话已导出：{}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Level;

    fn sample_session() -> ChatSession {
        let mut session = ChatSession::new("zh", Level::Intermediate);
        session.push_user("你好，我叫 Mia");
        session.push_assistant("你好 Mia！今天想聊什么？");
        let index = session.last_assistant_index().unwrap();
        session.attach_translation(index, "Hello Mia! What shall we talk about today?");
        session
    }

    #[test]
    fn json_export_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation.json");
        let session = sample_session();

        export_json(&session, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["language"], "中文");
        let messages = value["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(
            messages[1]["translation"],
            "Hello Mia! What shall we talk about today?"
        );
    }

    #[test]
    fn text_export_has_role_tagged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation.txt");
        let session = sample_session();

        export_text(&session, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "[user] 你好，我叫 Mia");
        assert_eq!(lines[1], "[assistant] 你好 Mia！今天想聊什么？");
        assert!(lines[2].starts_with("    译: Hello Mia"));
    }

    #[test]
    fn csv_export_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation.csv");
        let session = sample_session();

        export_csv(&session, &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> =
            reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "user");
        assert_eq!(&rows[1][2], "Hello Mia! What shall we talk about today?");
    }

    #[test]
    fn empty_session_exports_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        let session = ChatSession::new("zh", Level::Beginner);

        export_text(&session, &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
