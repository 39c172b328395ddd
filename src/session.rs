use crate::models::{
    find_language, AnalysisResult, ChatMessage, ConversationTurn, Language, Level, Role,
};

// 单个会话的全部状态，显式传给各处理函数，不使用全局变量。
// 同一时刻只有一个未完成的请求，busy 标记由编排层维护。
#[derive(Debug)]
pub struct ChatSession {
    pub language: &'static Language,
    pub level: Level,
    pub turns: Vec<ConversationTurn>,
    // 最近一次分析结果，每轮重算，不保留历史
    pub analysis: Option<AnalysisResult>,
    pub translation_visible: bool,
    pub busy: bool,
}

impl ChatSession {
    pub fn new(language_code: &str, level: Level) -> Self {
        let language = find_language(language_code)
            .unwrap_or(&crate::models::LANGUAGES[0]);
        ChatSession {
            language,
            level,
            turns: Vec::new(),
            analysis: None,
            translation_visible: false,
            busy: false,
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::new(Role::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns
            .push(ConversationTurn::new(Role::Assistant, content));
    }

    pub fn last_user_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
    }

    // 最后一条助手回复的下标
    pub fn last_assistant_index(&self) -> Option<usize> {
        self.turns.iter().rposition(|t| t.role == Role::Assistant)
    }

    // 给指定回合补充译文，会话单一所有者，原地修改即可
    pub fn attach_translation(&mut self, index: usize, translation: impl Into<String>) {
        if let Some(turn) = self.turns.get_mut(index) {
            turn.translation = Some(translation.into());
        }
    }

    // 切换语言会清空历史与分析缓存
    pub fn switch_language(&mut self, language_code: &str) -> bool {
        let Some(language) = find_language(language_code) else {
            return false;
        };
        self.language = language;
        self.turns.clear();
        self.analysis = None;
        self.translation_visible = false;
        true
    }

    pub fn switch_level(&mut self, level: Level) {
        self.level = level;
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.analysis = None;
        self.translation_visible = false;
    }

    // 系统提示 + 完整历史，发送给后端的消息列表
    pub fn history_messages(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::new("system", system_prompt)];
        for turn in &self.turns {
            messages.push(ChatMessage::new(turn.role.as_str(), turn.content.clone()));
        }
        messages
    }
}
