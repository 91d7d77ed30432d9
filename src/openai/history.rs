use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// モデルからのツール実行要求
///
/// `arguments` はモデルが出力した JSON テキストそのもの（解析はディスパッチャ側）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInvocationRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolInvocationRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), arguments: arguments.into() }
    }
}

/// アシスタントの発話。`tool_calls` が空なら最終回答
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssistantMessage {
    pub content: String,
    pub tool_calls: Vec<ToolInvocationRequest>,
}

impl AssistantMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_calls: Vec::new() }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolInvocationRequest>) -> Self {
        Self { content: content.into(), tool_calls }
    }

    pub fn has_tool_calls(&self) -> bool { !self.tool_calls.is_empty() }
}

/// ツール1回分の実行結果（モデルへ返す）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    /// JSON テキスト
    pub content: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant(AssistantMessage),
    ToolResult(ToolResult),
}

impl Message {
    pub fn content(&self) -> &str {
        match self {
            Message::System { content } | Message::User { content } => content,
            Message::Assistant(a) => &a.content,
            Message::ToolResult(r) => &r.content,
        }
    }

    pub fn is_system(&self) -> bool { matches!(self, Message::System { .. }) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("tool result for unknown invocation id {0}")]
    UnknownCall(String),
    #[error("invocation {0} already has a tool result")]
    AlreadyResolved(String),
}

/// 1回の分析で使う会話履歴
///
/// 不変条件: 各 `ToolResult` は未回答の要求ちょうど1つに対応する。
/// 呼び出し ID は会話内で一意で、空や重複の ID は `call_<n>` に振り直す。
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    issued: HashSet<String>,
    resolved: HashSet<String>,
    generated: usize,
}

impl Conversation {
    /// 空の履歴を作成
    pub fn new() -> Self { Self::default() }

    /// ユーザーメッセージ1件から始まる履歴
    pub fn with_user<S: AsRef<str>>(content: S) -> Self {
        let mut c = Self::new();
        c.push_user(content);
        c
    }

    pub fn len(&self) -> usize { self.messages.len() }
    pub fn is_empty(&self) -> bool { self.messages.is_empty() }
    pub fn messages(&self) -> &[Message] { &self.messages }
    pub fn last(&self) -> Option<&Message> { self.messages.last() }
    pub fn into_messages(self) -> Vec<Message> { self.messages }

    pub fn has_system(&self) -> bool { self.messages.iter().any(Message::is_system) }

    /// システムメッセージがなければ先頭に挿入する
    ///
    /// # Arguments
    /// * `prompt` - システムプロンプト
    ///
    /// # Returns
    /// 挿入した場合は true
    pub fn ensure_system<S: AsRef<str>>(&mut self, prompt: S) -> bool {
        if self.has_system() {
            return false;
        }
        self.messages.insert(0, Message::System { content: prompt.as_ref().to_string() });
        true
    }

    pub fn push_user<S: AsRef<str>>(&mut self, content: S) -> &mut Self {
        self.messages.push(Message::User { content: content.as_ref().to_string() });
        self
    }

    /// アシスタントの発話を追加する
    ///
    /// # Arguments
    /// * `msg` - モデルの応答
    ///
    /// # Returns
    /// 履歴に格納された発話（ID 振り直し済み）
    pub fn push_assistant(&mut self, mut msg: AssistantMessage) -> &AssistantMessage {
        for call in &mut msg.tool_calls {
            if call.id.trim().is_empty() || self.issued.contains(&call.id) {
                call.id = self.next_generated_id();
            }
            self.issued.insert(call.id.clone());
        }
        self.messages.push(Message::Assistant(msg));
        match self.messages.last() {
            Some(Message::Assistant(a)) => a,
            _ => unreachable!("assistant message was just pushed"),
        }
    }

    /// ツール結果を追加する
    ///
    /// # Arguments
    /// * `result` - ツール実行結果
    ///
    /// # Returns
    /// 未知の ID や回答済みの ID なら `ConversationError`
    pub fn push_tool_result(&mut self, result: ToolResult) -> Result<(), ConversationError> {
        if !self.issued.contains(&result.call_id) {
            return Err(ConversationError::UnknownCall(result.call_id));
        }
        if !self.resolved.insert(result.call_id.clone()) {
            return Err(ConversationError::AlreadyResolved(result.call_id));
        }
        self.messages.push(Message::ToolResult(result));
        Ok(())
    }

    /// まだ結果のない要求（発行順）
    pub fn pending_tool_calls(&self) -> Vec<&ToolInvocationRequest> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Assistant(a) => Some(a.tool_calls.iter()),
                _ => None,
            })
            .flatten()
            .filter(|c| !self.resolved.contains(&c.id))
            .collect()
    }

    fn next_generated_id(&mut self) -> String {
        loop {
            self.generated += 1;
            let id = format!("call_{}", self.generated);
            if !self.issued.contains(&id) {
                return id;
            }
        }
    }
}
