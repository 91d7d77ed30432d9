use crate::config::AnalyzerConfig;
use crate::openai::history::{AssistantMessage, Message, ToolInvocationRequest};
use async_openai::types::{
    ChatCompletionMessageToolCall,
    ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool,
    ChatCompletionToolChoiceOption,
    ChatCompletionToolType,
    CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs,
    FunctionCall,
};
use color_eyre::Result;
use tracing::debug;

/// トークン制限戦略を表現する列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenLimitStrategy {
    /// `max_tokens` を使用（4oモデル向け）
    MaxTokens,
    /// `max_completion_tokens` を使用（5系モデル向け）
    MaxCompletionTokens,
}

/// モデル名からトークン制限戦略を判定する
pub(crate) fn determine_token_limit_strategy(model: &str) -> TokenLimitStrategy {
    if model.contains("4o") || model.starts_with("gpt-3.5") || model.starts_with("gpt-4-") {
        debug!(model = %model, strategy = "MaxTokens", "legacy token limit field");
        TokenLimitStrategy::MaxTokens
    } else {
        debug!(model = %model, strategy = "MaxCompletionTokens", "completion token limit field");
        TokenLimitStrategy::MaxCompletionTokens
    }
}

fn to_api_tool_call(call: &ToolInvocationRequest) -> ChatCompletionMessageToolCall {
    ChatCompletionMessageToolCall {
        id: call.id.clone(),
        r#type: ChatCompletionToolType::Function,
        function: FunctionCall { name: call.name.clone(), arguments: call.arguments.clone() },
    }
}

fn to_api_assistant(msg: &AssistantMessage) -> Result<ChatCompletionRequestMessage> {
    let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
    if !msg.content.is_empty() || msg.tool_calls.is_empty() {
        builder.content(msg.content.as_str());
    }
    if msg.has_tool_calls() {
        builder.tool_calls(msg.tool_calls.iter().map(to_api_tool_call).collect::<Vec<_>>());
    }
    Ok(builder.build()?.into())
}

/// 会話メッセージを SDK のリクエストメッセージに変換する
pub fn to_api_message(msg: &Message) -> Result<ChatCompletionRequestMessage> {
    let out: ChatCompletionRequestMessage = match msg {
        Message::System { content } => ChatCompletionRequestSystemMessageArgs::default()
            .content(content.as_str())
            .build()?
            .into(),
        Message::User { content } => ChatCompletionRequestUserMessageArgs::default()
            .content(content.as_str())
            .build()?
            .into(),
        Message::Assistant(a) => to_api_assistant(a)?,
        Message::ToolResult(r) => ChatCompletionRequestToolMessageArgs::default()
            .tool_call_id(r.call_id.as_str())
            .content(r.content.as_str())
            .build()?
            .into(),
    };
    Ok(out)
}

/// 会話からChatCompletionリクエストを構築する
///
/// `tool_choice` はツールがあるときだけ付ける（ツールなしだと API が拒否する）
///
/// # Arguments
/// * `messages` - 会話履歴
/// * `tools` - 宣言するツール
/// * `config` - アナライザ設定
///
/// # Returns
/// 構築されたChatCompletionリクエスト
pub fn build_chat_request(
    messages: &[Message],
    tools: &[ChatCompletionTool],
    config: &AnalyzerConfig,
) -> Result<CreateChatCompletionRequest> {
    let api_messages = messages.iter().map(to_api_message).collect::<Result<Vec<_>>>()?;

    let mut builder = CreateChatCompletionRequestArgs::default();
    builder
        .model(config.model.as_str())
        .messages(api_messages)
        .temperature(config.temperature);
    if !tools.is_empty() {
        builder
            .tools(tools.to_vec())
            .tool_choice(ChatCompletionToolChoiceOption::Auto);
    }

    let req = match determine_token_limit_strategy(&config.model) {
        TokenLimitStrategy::MaxTokens => {
            debug!(max_tokens = config.max_tokens, "applying max_tokens");
            builder.max_tokens(config.max_tokens).build()?
        }
        TokenLimitStrategy::MaxCompletionTokens => {
            debug!(max_completion_tokens = config.max_completion_tokens, "applying max_completion_tokens");
            builder.max_completion_tokens(config.max_completion_tokens).build()?
        }
    };
    debug!(messages = messages.len(), tools = tools.len(), "chat request built");
    Ok(req)
}
