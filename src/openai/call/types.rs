use std::fmt::{self, Display};

use crate::openai::history::{AssistantMessage, Conversation, ToolResult};

/// モデル呼び出しの結果。`Err` は使わず、バックエンドの失敗は `Degraded` にまとめる
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Reply(AssistantMessage),
    Degraded { message: AssistantMessage, error: String },
}

impl Invocation {
    pub fn message(&self) -> &AssistantMessage {
        match self {
            Invocation::Reply(m) | Invocation::Degraded { message: m, .. } => m,
        }
    }

    pub fn is_degraded(&self) -> bool { matches!(self, Invocation::Degraded { .. }) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    AwaitingTools,
    Done,
}

impl Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::AwaitingModel => "AWAITING_MODEL",
            LoopState::AwaitingTools => "AWAITING_TOOLS",
            LoopState::Done => "DONE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorKind {
    ModelInvocation,
    IterationLimit,
    DeadlineExceeded,
    Internal,
}

impl Display for RunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunErrorKind::ModelInvocation => "model invocation failed",
            RunErrorKind::IterationLimit => "iteration limit reached",
            RunErrorKind::DeadlineExceeded => "deadline exceeded",
            RunErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub final_answer: String,
    pub conversation: Conversation,
    /// モデル呼び出し回数
    pub iterations: usize,
    /// 通過した状態（`AwaitingModel` で始まり `Done` で終わる）
    pub trace: Vec<LoopState>,
}

impl RunReport {
    /// 実行中に追加されたツール結果（順序どおり）
    pub fn tool_results(&self) -> Vec<&ToolResult> {
        self.conversation
            .messages()
            .iter()
            .filter_map(|m| match m {
                crate::openai::history::Message::ToolResult(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RunFailure {
    pub kind: RunErrorKind,
    pub message: String,
    /// 失敗までの履歴（ループが始まっていれば）
    pub conversation: Option<Conversation>,
}

/// 1回の分析の最終結果
#[derive(Debug, Clone)]
pub enum RunResult {
    Completed(RunReport),
    Failed(RunFailure),
}

impl RunResult {
    pub fn failed(kind: RunErrorKind, message: impl Into<String>, conversation: Option<Conversation>) -> Self {
        RunResult::Failed(RunFailure { kind, message: message.into(), conversation })
    }

    pub fn is_completed(&self) -> bool { matches!(self, RunResult::Completed(_)) }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunResult::Completed(r) => Some(r),
            RunResult::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            RunResult::Completed(_) => None,
            RunResult::Failed(f) => Some(f),
        }
    }

    /// 最終回答、または失敗の説明
    pub fn text(&self) -> &str {
        match self {
            RunResult::Completed(r) => &r.final_answer,
            RunResult::Failed(f) => &f.message,
        }
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        match self {
            RunResult::Completed(r) => Some(&r.conversation),
            RunResult::Failed(f) => f.conversation.as_ref(),
        }
    }
}

/// ループからの進捗通知
#[derive(Debug, Clone)]
pub enum LoopEvent {
    IterationStart { iteration: usize },
    SystemPromptInjected,
    ModelReplied { iteration: usize, tool_calls: usize },
    ModelDegraded { iteration: usize, error: String },
    ToolsDispatched { iteration: usize, results: Vec<ToolResult> },
    Transition { from: LoopState, to: LoopState },
    FinalAnswer { iteration: usize, text: String },
    IterationLimit { max_iterations: usize },
    DeadlineExceeded { iteration: usize },
}

impl Display for LoopEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopEvent::IterationStart { iteration } => write!(f, "IterationStart #{}", iteration),
            LoopEvent::SystemPromptInjected => write!(f, "SystemPromptInjected"),
            LoopEvent::ModelReplied { iteration, tool_calls } => {
                write!(f, "ModelReplied @{} tool_calls={}", iteration, tool_calls)
            }
            LoopEvent::ModelDegraded { iteration, error } => write!(f, "ModelDegraded @{} error={}", iteration, error),
            LoopEvent::ToolsDispatched { iteration, results } => {
                let names: Vec<String> = results
                    .iter()
                    .map(|r| format!("{}[{}]{}", r.name, r.call_id, if r.is_error { "!" } else { "" }))
                    .collect();
                write!(f, "ToolsDispatched @{} {}", iteration, names.join(","))
            }
            LoopEvent::Transition { from, to } => write!(f, "Transition {} -> {}", from, to),
            LoopEvent::FinalAnswer { iteration, text } => write!(f, "FinalAnswer @{} len={}", iteration, text.len()),
            LoopEvent::IterationLimit { max_iterations } => write!(f, "IterationLimit after {} invocations", max_iterations),
            LoopEvent::DeadlineExceeded { iteration } => write!(f, "DeadlineExceeded @{}", iteration),
        }
    }
}
