use anyhow::Result;
use tracing::{debug, info};

use crate::analyzer::{
    analysis_messages, parse_analysis, reply_system_prompt, translation_messages,
};
use crate::api::{ApiClient, DeltaSink};
use crate::backend::{
    backend_chain, generate_analysis_raw, generate_reply, select_backend, ChatBackend,
    Credentials,
};
use crate::config::Config;
use crate::models::{Role, SamplingOptions};
use crate::session::ChatSession;

// 会话编排器：把后端选择、回复生成、分析和翻译串起来。
// 后端选择在每次调用时根据当前凭证重新推导。
pub struct LanguageTutor {
    config: Config,
    api: ApiClient,
}

impl LanguageTutor {
    pub fn new(config: Config) -> Result<Self> {
        let api = ApiClient::new(config.api.clone())?;
        Ok(LanguageTutor { config, api })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn chain(&self) -> Vec<Box<dyn ChatBackend>> {
        let creds = Credentials::from_env();
        backend_chain(&self.api, &self.config.api.provider, &creds)
    }

    // 当前会选中的后端名，用于界面展示
    pub fn current_backend_name(&self) -> &'static str {
        let creds = Credentials::from_env();
        match select_backend(&self.config.api.provider, &creds) {
            crate::models::BackendChoice::OpenAi => "openai",
            crate::models::BackendChoice::Anthropic => "anthropic",
            crate::models::BackendChoice::Mock => "mock",
        }
    }

    fn reply_options(&self) -> SamplingOptions {
        SamplingOptions {
            temperature: self.config.chat.temperature,
            max_tokens: self.config.chat.max_tokens,
        }
    }

    fn analysis_options(&self) -> SamplingOptions {
        SamplingOptions {
            temperature: 0.1,
            max_tokens: self.config.chat.analysis_max_tokens,
        }
    }

    // 处理一次用户发言：追加用户回合、生成回复、追加助手回合，
    // 然后刷新对这句话的分析缓存。空输入和进行中的会话都是空操作。
    pub async fn send_message(
        &self,
        session: &mut ChatSession,
        text: &str,
        sink: DeltaSink<'_>,
    ) -> Option<String> {
        let text = text.trim();
        if text.is_empty() || session.busy {
            return None;
        }

        session.busy = true;
        session.push_user(text);

        let system = reply_system_prompt(session.language, session.level);
        let messages = session.history_messages(&system);
        let chain = self.chain();

        let reply = generate_reply(&chain, &messages, &self.reply_options(), sink).await;
        session.push_assistant(reply.trim());

        // 自动刷新最新发言的分析，解析结果永远是完整记录，失败不影响本轮
        session.analysis = Some(self.analyze_text(&chain, session, text).await);
        session.busy = false;

        Some(reply.trim().to_string())
    }

    // 重新分析最后一条用户发言，没有可分析内容时返回 false
    pub async fn analyze_last(&self, session: &mut ChatSession) -> bool {
        let Some(text) = session.last_user_text().map(String::from) else {
            return false;
        };
        let chain = self.chain();
        session.analysis = Some(self.analyze_text(&chain, session, &text).await);
        true
    }

    async fn analyze_text(
        &self,
        chain: &[Box<dyn ChatBackend>],
        session: &ChatSession,
        text: &str,
    ) -> crate::models::AnalysisResult {
        let messages = analysis_messages(text, session.language, session.level);
        let raw = generate_analysis_raw(chain, &messages, &self.analysis_options()).await;
        debug!(len = raw.len(), "收到分析原始输出");
        parse_analysis(&raw)
    }

    // 按需翻译指定回合（通常是最后一条助手回复），结果缓存在回合上，
    // 已有译文时直接复用不再请求。
    pub async fn translate_turn(&self, session: &mut ChatSession, index: usize) -> bool {
        let Some(turn) = session.turns.get(index) else {
            return false;
        };
        if turn.role != Role::Assistant {
            return false;
        }
        if turn.translation.is_some() {
            session.translation_visible = true;
            return true;
        }

        let messages = translation_messages(&turn.content);
        let chain = self.chain();
        let translation =
            generate_reply(&chain, &messages, &self.reply_options(), &mut |_| {}).await;
        if translation.trim().is_empty() {
            return false;
        }

        info!(index, "已为回复补充译文");
        session.attach_translation(index, translation.trim());
        session.translation_visible = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Level;

    fn mock_tutor() -> LanguageTutor {
        let mut config = Config::default();
        config.api.provider = "mock".to_string();
        LanguageTutor::new(config).unwrap()
    }

    #[tokio::test]
    async fn send_message_appends_turns_and_analysis() {
        let tutor = mock_tutor();
        let mut session = ChatSession::new("zh", Level::Intermediate);
        let mut sink = |_: &str| {};

        let reply = tutor
            .send_message(&mut session, "你好，我叫小明", &mut sink)
            .await;

        let reply = reply.unwrap();
        assert!(!reply.is_empty());
        assert_eq!(session.turns.len(), 2);
        assert_eq!(session.turns[0].role, Role::User);
        assert_eq!(session.turns[1].role, Role::Assistant);
        assert_eq!(session.turns[1].content, reply);

        // mock 的分析输出是合法 JSON，应被完整解析
        let analysis = session.analysis.as_ref().unwrap();
        assert!(!analysis.vocabulary.is_empty());
        assert!(!session.busy);
    }

    #[tokio::test]
    async fn empty_input_is_a_noop() {
        let tutor = mock_tutor();
        let mut session = ChatSession::new("zh", Level::Intermediate);
        let mut sink = |_: &str| {};

        assert!(tutor.send_message(&mut session, "   ", &mut sink).await.is_none());
        assert!(session.turns.is_empty());
        assert!(session.analysis.is_none());
    }

    #[tokio::test]
    async fn busy_session_rejects_send() {
        let tutor = mock_tutor();
        let mut session = ChatSession::new("zh", Level::Intermediate);
        session.busy = true;
        let mut sink = |_: &str| {};

        assert!(tutor.send_message(&mut session, "你好", &mut sink).await.is_none());
        assert!(session.turns.is_empty());
    }

    #[tokio::test]
    async fn analyze_last_without_history_is_false() {
        let tutor = mock_tutor();
        let mut session = ChatSession::new("zh", Level::Intermediate);
        assert!(!tutor.analyze_last(&mut session).await);
    }

    #[tokio::test]
    async fn translate_turn_caches_translation() {
        let tutor = mock_tutor();
        let mut session = ChatSession::new("zh", Level::Intermediate);
        let mut sink = |_: &str| {};
        tutor.send_message(&mut session, "你好", &mut sink).await;

        let index = session.last_assistant_index().unwrap();
        assert!(tutor.translate_turn(&mut session, index).await);
        let first = session.turns[index].translation.clone().unwrap();
        assert!(session.translation_visible);

        // 第二次调用直接复用已有译文
        assert!(tutor.translate_turn(&mut session, index).await);
        assert_eq!(session.turns[index].translation.as_deref(), Some(first.as_str()));
    }

    #[tokio::test]
    async fn translate_user_turn_is_rejected() {
        let tutor = mock_tutor();
        let mut session = ChatSession::new("zh", Level::Intermediate);
        session.push_user("你好");
        assert!(!tutor.translate_turn(&mut session, 0).await);
    }
}
