use std::sync::Arc;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_trait::async_trait;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::{AnalyzerConfig, ConfigError};
use crate::openai::history::{AssistantMessage, Conversation, Message, ToolInvocationRequest};
use crate::openai::tools::ToolRegistry;

use super::request::build_chat_request;
use super::types::Invocation;

/// 回答またはツール要求を返すチャットモデル
///
/// 並行実行間で共有されるため `Send + Sync` が必要
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[Message], tools: &ToolRegistry) -> Result<AssistantMessage>;

    /// ログ用のラベル
    fn label(&self) -> &str { "chat-model" }
}

/// OpenAI Chat Completions バックエンド
pub struct OpenAiChatModel {
    client: Client<OpenAIConfig>,
    config: AnalyzerConfig,
}

impl OpenAiChatModel {
    /// 設定から OpenAI クライアントを作成する。認証情報がなければ即エラー。
    pub fn new(config: AnalyzerConfig) -> std::result::Result<Self, ConfigError> {
        Self::new_with_lookup(config, |key| std::env::var(key).ok())
    }

    /// 認証情報を `lookup` 経由で解決して作成する
    ///
    /// # Arguments
    /// * `config` - アナライザ設定（明示キーが優先される）
    /// * `lookup` - 環境変数の代わりに使う検索関数
    ///
    /// # Returns
    /// OpenAI バックエンド、または `ConfigError`
    pub fn new_with_lookup(
        config: AnalyzerConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let key = config.resolve_api_key_with(lookup)?;
        let client = Client::with_config(OpenAIConfig::new().with_api_key(key));
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, messages: &[Message], tools: &ToolRegistry) -> Result<AssistantMessage> {
        let req = build_chat_request(messages, &tools.chat_tools(), &self.config)?;
        info!(target: "openai", model = %self.config.model, messages = messages.len(), "chat_request");
        let resp = self.client.chat().create(req).await?;
        debug!(target: "openai", choices = resp.choices.len(), "chat_response");

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("malformed response: no choices returned"))?;
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| ToolInvocationRequest::new(c.id, c.function.name, c.function.arguments))
            .collect();
        Ok(AssistantMessage::with_tool_calls(
            choice.message.content.unwrap_or_default(),
            tool_calls,
        ))
    }

    fn label(&self) -> &str { &self.config.model }
}

/// [`ChatModel`] にシステムプロンプト・ツール宣言・失敗の封じ込めを加えたもの
#[derive(Clone)]
pub struct ModelInvoker {
    model: Arc<dyn ChatModel>,
    registry: Arc<ToolRegistry>,
    system_prompt: String,
    request_timeout: Duration,
}

impl ModelInvoker {
    pub fn new(
        model: Arc<dyn ChatModel>,
        registry: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self { model, registry, system_prompt: system_prompt.into(), request_timeout }
    }

    pub fn system_prompt(&self) -> &str { &self.system_prompt }

    pub fn registry(&self) -> &ToolRegistry { &self.registry }

    /// システムメッセージを保証してからモデルに次の発話を問い合わせる
    ///
    /// 応答は履歴に追加しない（追加は呼び出し側）。
    ///
    /// # Arguments
    /// * `conversation` - 会話履歴（必要ならシステムメッセージが挿入される）
    /// * `deadline` - 実行全体の締め切り
    ///
    /// # Returns
    /// `Invocation::Reply`、またはエラー・タイムアウト時の `Invocation::Degraded`
    #[instrument(name = "invoke_model", skip_all, fields(model = %self.model.label(), history_len = conversation.len()))]
    pub async fn invoke(&self, conversation: &mut Conversation, deadline: Option<Instant>) -> Invocation {
        if conversation.ensure_system(&self.system_prompt) {
            debug!(target: "footfall", "system prompt injected");
        }

        let limit = call_limit(Instant::now(), self.request_timeout, deadline);
        let budget = limit.map(|l| l.saturating_duration_since(Instant::now())).unwrap_or_default();

        let call = self.model.complete(conversation.messages(), &self.registry);
        let outcome = match limit {
            Some(limit) => tokio::time::timeout_at(limit, call).await,
            None => Ok(call.await),
        };

        let error = match outcome {
            Ok(Ok(reply)) => {
                debug!(target: "footfall", tool_calls = reply.tool_calls.len(), "model replied");
                return Invocation::Reply(reply);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("model call timed out after {budget:?}"),
        };
        warn!(target: "footfall", error = %error, "model invocation failed");
        Invocation::Degraded {
            message: AssistantMessage::text(format!("An error occurred: {error}")),
            error,
        }
    }
}

/// 1回のモデル呼び出しに許す期限を決める
///
/// # Arguments
/// * `now` - 現在時刻
/// * `request_timeout` - 呼び出し1回あたりのタイムアウト
/// * `deadline` - 実行全体の締め切り
///
/// # Returns
/// 早いほうの期限。どちらも表現できなければ `None`（期限なし）
fn call_limit(now: Instant, request_timeout: Duration, deadline: Option<Instant>) -> Option<Instant> {
    match (now.checked_add(request_timeout), deadline) {
        (Some(limit), Some(deadline)) => Some(limit.min(deadline)),
        (limit, deadline) => limit.or(deadline),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_limit_takes_the_earlier_bound() {
        let now = Instant::now();
        let deadline = now + Duration::from_secs(1);
        assert_eq!(call_limit(now, Duration::from_secs(60), Some(deadline)), Some(deadline));
        assert_eq!(call_limit(now, Duration::from_secs(1), None), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn call_limit_survives_unrepresentable_timeouts() {
        let now = Instant::now();
        assert_eq!(call_limit(now, Duration::MAX, None), None);
        let deadline = now + Duration::from_secs(5);
        assert_eq!(call_limit(now, Duration::MAX, Some(deadline)), Some(deadline));
    }
}
