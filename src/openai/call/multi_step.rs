use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::openai::history::{Conversation, ToolInvocationRequest};

use super::proposer::ModelInvoker;
use super::resolver::dispatch;
use super::types::{Invocation, LoopEvent, LoopState, RunErrorKind, RunReport, RunResult};

/// 1回の分析を進めるループ: モデル → (ツール → モデル)* → 完了
///
/// 状態遷移:
/// - `AwaitingModel` → `AwaitingTools`（ツール要求あり）/ `Done`（要求なし）
/// - `AwaitingTools` → `AwaitingModel`（全要求に結果が揃ったら）
///
/// モデル呼び出しは1回の実行につき最大 `max_iterations` 回
#[derive(Clone)]
pub struct LoopController {
    invoker: ModelInvoker,
    max_iterations: usize,
    run_timeout: Option<Duration>,
}

struct Run<'o> {
    conversation: Conversation,
    state: LoopState,
    trace: Vec<LoopState>,
    iteration: usize,
    observer: &'o mut (dyn FnMut(&LoopEvent) + Send),
}

impl Run<'_> {
    fn emit(&mut self, ev: LoopEvent) {
        debug!(target: "footfall", event = %ev, "loop_event");
        (self.observer)(&ev);
    }

    fn transition(&mut self, to: LoopState) {
        let from = self.state;
        self.state = to;
        self.trace.push(to);
        self.emit(LoopEvent::Transition { from, to });
    }

    fn fail(self, kind: RunErrorKind, message: String) -> RunResult {
        warn!(target: "footfall", kind = %kind, message = %message, iterations = self.iteration, "run failed");
        RunResult::failed(kind, message, Some(self.conversation))
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

impl LoopController {
    pub fn new(invoker: ModelInvoker, max_iterations: usize, run_timeout: Option<Duration>) -> Self {
        Self { invoker, max_iterations: max_iterations.max(1), run_timeout }
    }

    pub fn max_iterations(&self) -> usize { self.max_iterations }

    pub fn invoker(&self) -> &ModelInvoker { &self.invoker }

    pub async fn run(&self, query: &str) -> RunResult {
        self.run_with_observer(query, &mut |_: &LoopEvent| {}).await
    }

    /// ループを実行し、各イベントを `observer` に通知する
    ///
    /// # Arguments
    /// * `query` - ユーザーの質問
    /// * `observer` - ループイベントのコールバック
    ///
    /// # Returns
    /// 完了または失敗の `RunResult`（`Err` は返さない）
    #[instrument(name = "loop_controller", skip(self, observer), fields(max_iterations = self.max_iterations))]
    pub async fn run_with_observer(
        &self,
        query: &str,
        observer: &mut (dyn FnMut(&LoopEvent) + Send),
    ) -> RunResult {
        // 表現できないほど先の締め切りは「締め切りなし」として扱う
        let deadline = self.run_timeout.and_then(|t| Instant::now().checked_add(t));
        let mut run = Run {
            conversation: Conversation::with_user(query),
            state: LoopState::AwaitingModel,
            trace: vec![LoopState::AwaitingModel],
            iteration: 0,
            observer,
        };
        let mut pending: Vec<ToolInvocationRequest> = Vec::new();

        loop {
            match run.state {
                LoopState::AwaitingModel => {
                    if run.iteration >= self.max_iterations {
                        let max_iterations = self.max_iterations;
                        run.emit(LoopEvent::IterationLimit { max_iterations });
                        return run.fail(
                            RunErrorKind::IterationLimit,
                            format!("Stopped after {max_iterations} model invocations without a final answer"),
                        );
                    }
                    if expired(deadline) {
                        let iteration = run.iteration;
                        run.emit(LoopEvent::DeadlineExceeded { iteration });
                        return run.fail(RunErrorKind::DeadlineExceeded, "Run deadline exceeded before the model was called".into());
                    }

                    run.iteration += 1;
                    let iteration = run.iteration;
                    run.emit(LoopEvent::IterationStart { iteration });

                    let had_system = run.conversation.has_system();
                    let invocation = self.invoker.invoke(&mut run.conversation, deadline).await;
                    if !had_system {
                        run.emit(LoopEvent::SystemPromptInjected);
                    }

                    match invocation {
                        Invocation::Degraded { message, error } => {
                            run.emit(LoopEvent::ModelDegraded { iteration, error: error.clone() });
                            let text = message.content.clone();
                            run.conversation.push_assistant(message);
                            let kind = if expired(deadline) {
                                RunErrorKind::DeadlineExceeded
                            } else {
                                RunErrorKind::ModelInvocation
                            };
                            return run.fail(kind, text);
                        }
                        Invocation::Reply(reply) => {
                            let tool_calls = reply.tool_calls.len();
                            run.emit(LoopEvent::ModelReplied { iteration, tool_calls });
                            let stored = run.conversation.push_assistant(reply);
                            pending = stored.tool_calls.clone();
                            let next = if pending.is_empty() { LoopState::Done } else { LoopState::AwaitingTools };
                            run.transition(next);
                        }
                    }
                }
                LoopState::AwaitingTools => {
                    if expired(deadline) {
                        let iteration = run.iteration;
                        run.emit(LoopEvent::DeadlineExceeded { iteration });
                        return run.fail(RunErrorKind::DeadlineExceeded, "Run deadline exceeded before tools were dispatched".into());
                    }
                    let results = dispatch(&pending, self.invoker.registry());
                    for r in results.iter().cloned() {
                        if let Err(e) = run.conversation.push_tool_result(r) {
                            return run.fail(RunErrorKind::Internal, e.to_string());
                        }
                    }
                    pending.clear();
                    let iteration = run.iteration;
                    run.emit(LoopEvent::ToolsDispatched { iteration, results });
                    run.transition(LoopState::AwaitingModel);
                }
                LoopState::Done => {
                    let final_answer = run
                        .conversation
                        .last()
                        .map(|m| m.content().to_string())
                        .unwrap_or_default();
                    let iteration = run.iteration;
                    run.emit(LoopEvent::FinalAnswer { iteration, text: final_answer.clone() });
                    info!(target: "footfall", iterations = iteration, answer_len = final_answer.len(), "run completed");
                    return RunResult::Completed(RunReport {
                        final_answer,
                        conversation: run.conversation,
                        iterations: run.iteration,
                        trace: run.trace,
                    });
                }
            }
        }
    }
}
