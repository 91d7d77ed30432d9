//! 台本どおりに応答する [`ChatModel`]
//!
//! テストとオフラインデモで使う。受け取った会話はすべて記録する。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::Result;
use color_eyre::eyre::eyre;

use crate::openai::history::{AssistantMessage, Message, ToolInvocationRequest};
use crate::openai::tools::ToolRegistry;

use super::proposer::ChatModel;

pub type Responder = Arc<dyn Fn(&[Message]) -> AssistantMessage + Send + Sync + 'static>;

#[derive(Clone)]
pub enum ScriptStep {
    Reply(AssistantMessage),
    /// それまでの会話から応答を組み立てる
    Respond(Responder),
    /// 故障の注入
    Fail(String),
    /// 待ってから応答
    Slow { delay: Duration, reply: AssistantMessage },
}

impl std::fmt::Debug for ScriptStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptStep::Reply(m) => f.debug_tuple("Reply").field(m).finish(),
            ScriptStep::Respond(_) => f.write_str("Respond(..)"),
            ScriptStep::Fail(e) => f.debug_tuple("Fail").field(e).finish(),
            ScriptStep::Slow { delay, reply } => f.debug_struct("Slow").field("delay", delay).field("reply", reply).finish(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedChatModel {
    steps: Mutex<VecDeque<ScriptStep>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedChatModel {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self { steps: Mutex::new(steps.into_iter().collect()), seen: Mutex::new(Vec::new()) }
    }

    pub fn push(&self, step: ScriptStep) { lock(&self.steps).push_back(step); }

    pub fn remaining(&self) -> usize { lock(&self.steps).len() }

    /// `complete` の呼び出し回数
    pub fn calls(&self) -> usize { lock(&self.seen).len() }

    /// 受け取った会話（古い順）
    pub fn seen(&self) -> Vec<Vec<Message>> { lock(&self.seen).clone() }

    /// ツール呼び出し1回 → テキスト回答 の台本
    pub fn tool_then_answer(tool: &str, arguments: &str, answer: &str) -> Self {
        Self::new([
            ScriptStep::Reply(AssistantMessage::with_tool_calls(
                "",
                vec![ToolInvocationRequest::new("call_1", tool, arguments)],
            )),
            ScriptStep::Reply(AssistantMessage::text(answer)),
        ])
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, messages: &[Message], _tools: &ToolRegistry) -> Result<AssistantMessage> {
        lock(&self.seen).push(messages.to_vec());
        let step = lock(&self.steps).pop_front();
        match step {
            Some(ScriptStep::Reply(m)) => Ok(m),
            Some(ScriptStep::Respond(f)) => Ok(f(messages)),
            Some(ScriptStep::Fail(e)) => Err(eyre!(e)),
            Some(ScriptStep::Slow { delay, reply }) => {
                tokio::time::sleep(delay).await;
                Ok(reply)
            }
            None => Err(eyre!("script exhausted")),
        }
    }

    fn label(&self) -> &str { "scripted" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_and_records() -> Result<()> {
        let model = ScriptedChatModel::new([
            ScriptStep::Reply(AssistantMessage::text("one")),
            ScriptStep::Fail("boom".into()),
        ]);
        let reg = ToolRegistry::empty();
        let msgs = vec![Message::User { content: "q".into() }];

        assert_eq!(model.complete(&msgs, &reg).await?.content, "one");
        let err = model.complete(&msgs, &reg).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(model.complete(&msgs, &reg).await.is_err());
        assert_eq!(model.calls(), 3);
        assert_eq!(model.seen()[0], msgs);
        Ok(())
    }
}
