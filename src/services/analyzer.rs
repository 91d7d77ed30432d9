//! RetailFootfallAnalyzer
//!
//! エージェントループの公開窓口。
//! 設定・ツール・モデルを組み立て、`analyze` で1回の分析を実行する。

use std::sync::Arc;

use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tracing::{info, instrument, warn};

use crate::config::{AnalyzerConfig, ConfigError};
use crate::openai::call::{
    ChatModel, LoopController, LoopEvent, ModelInvoker, OpenAiChatModel, RunErrorKind, RunResult,
    ScriptStep, ScriptedChatModel,
};
use crate::openai::history::{AssistantMessage, Message, ToolInvocationRequest};
use crate::openai::tools::{default_registry, FootprintRecord, ToolRegistry, RETAIL_FOOTPRINT_TOOL};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a retail analyst specializing in footfall patterns and competitive analysis.
When using the retail_footprint_api tool:
1. Extract key insights about peak hours, customer traffic, and competitor data
2. Present the information in a clear, structured format
3. Only use factual information from the API results
4. If specific data is not available, acknowledge the limitation
5. Focus on actionable insights for business owners and marketers";

pub const DEFAULT_QUERY: &str = "Analyze the footfall patterns for retail stores in Marathahalli, Bangalore. Focus on peak hours and comparison with competitors.";

/// 小売フットフォール分析エージェント
pub struct RetailFootfallAnalyzer {
    controller: LoopController,
    config: AnalyzerConfig,
}

impl RetailFootfallAnalyzer {
    /// OpenAI バックエンドで作成。認証情報がなければ即エラー。
    pub fn new(config: AnalyzerConfig) -> Result<Self, ConfigError> {
        Self::new_with_lookup(config, |key| std::env::var(key).ok())
    }

    /// `new` と同じだが、認証情報を `lookup` 経由で探す
    ///
    /// # Arguments
    /// * `config` - アナライザ設定
    /// * `lookup` - 環境変数の代わりに使う検索関数
    ///
    /// # Returns
    /// OpenAI バックエンドのアナライザ、または `ConfigError`
    pub fn new_with_lookup(
        config: AnalyzerConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let model = OpenAiChatModel::new_with_lookup(config.clone(), lookup)?;
        Self::with_model(Arc::new(model), config)
    }

    /// 環境変数から設定を読み込んで作成
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(AnalyzerConfig::from_env()?)
    }

    /// 任意のバックエンドで作成（既定のツールとプロンプト、認証情報は不要）
    pub fn with_model(model: Arc<dyn ChatModel>, config: AnalyzerConfig) -> Result<Self, ConfigError> {
        Self::with_parts(model, default_registry()?, DEFAULT_SYSTEM_PROMPT, config)
    }

    /// ツール一式やシステムプロンプトを差し替えて作成
    ///
    /// # Arguments
    /// * `model` - チャットモデル
    /// * `registry` - ツールレジストリ
    /// * `system_prompt` - システムプロンプト
    /// * `config` - アナライザ設定
    ///
    /// # Returns
    /// アナライザ、または設定が不正なら `ConfigError`
    pub fn with_parts(
        model: Arc<dyn ChatModel>,
        registry: ToolRegistry,
        system_prompt: impl Into<String>,
        config: AnalyzerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let invoker = ModelInvoker::new(model, Arc::new(registry), system_prompt, config.request_timeout);
        let controller = LoopController::new(invoker, config.max_iterations, config.run_timeout);
        info!(target: "footfall", model = %config.model, max_iterations = config.max_iterations, "analyzer ready");
        Ok(Self { controller, config })
    }

    pub fn config(&self) -> &AnalyzerConfig { &self.config }

    pub fn system_prompt(&self) -> &str { self.controller.invoker().system_prompt() }

    pub fn tool_names(&self) -> Vec<&str> { self.controller.invoker().registry().names() }

    /// 1回の分析を実行する。失敗も `RunResult::Failed` として返す。
    pub async fn analyze(&self, query: &str) -> RunResult {
        self.analyze_with_observer(query, |_| {}).await
    }

    /// ループイベントごとにコールバックを呼びながら分析する
    ///
    /// ループは別タスクで動かし、内部のパニックは `RunErrorKind::Internal` として返す。
    ///
    /// # Arguments
    /// * `query` - ユーザーの質問
    /// * `observer` - イベントのコールバック
    #[instrument(name = "analyze", skip(self, observer))]
    pub async fn analyze_with_observer<F>(&self, query: &str, observer: F) -> RunResult
    where
        F: FnMut(&LoopEvent) + Send + 'static,
    {
        let controller = self.controller.clone();
        let query = query.to_string();
        let started = std::time::Instant::now();
        let handle = tokio::spawn(async move {
            let mut observer = observer;
            controller.run_with_observer(&query, &mut observer).await
        });
        let result = match handle.await {
            Ok(r) => r,
            Err(e) => RunResult::failed(RunErrorKind::Internal, format!("analysis task failed: {e}"), None),
        };
        info!(
            target: "footfall",
            completed = result.is_completed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );
        result
    }

    /// ブロッキングで分析するヘルパー
    ///
    /// ランタイム外ではランタイムを内部で作成する。マルチスレッドランタイムの中からは
    /// `block_in_place` で現在のランタイムを使い、シングルスレッドランタイムの中では
    /// ブロックできないため `RunErrorKind::Internal` を返す。
    ///
    /// # Arguments
    /// * `query` - ユーザーの質問
    ///
    /// # Returns
    /// 分析結果（失敗も `RunResult::Failed` として返す）
    pub fn analyze_blocking(&self, query: &str) -> RunResult {
        if let Ok(handle) = Handle::try_current() {
            if !matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) {
                warn!(target: "footfall", "analyze_blocking called on a current-thread runtime");
                return RunResult::failed(
                    RunErrorKind::Internal,
                    "analyze_blocking cannot block a current-thread runtime; use analyze().await".to_string(),
                    None,
                );
            }
            return tokio::task::block_in_place(|| handle.block_on(self.analyze(query)));
        }
        match Runtime::new() {
            Ok(rt) => rt.block_on(self.analyze(query)),
            Err(e) => RunResult::failed(RunErrorKind::Internal, format!("could not start runtime: {e}"), None),
        }
    }
}

/// フットプリントレコードをテキストのレポートにする（レコードの値だけを使う）
pub fn render_report(record: &FootprintRecord) -> String {
    let fd = &record.footfall_data;
    let ci = &record.competitor_insights;
    format!(
        "Footfall report: {location}\n\
         - Average daily footfall: {avg}\n\
         - Busiest day: {day}, highest hour: {hour}\n\
         - Weekday peaks: {wd}\n\
         - Weekend peaks: {we}\n\
         - Competitor density: {density} ({players})\n\
         - Comparative traffic: {traffic}",
        location = record.location,
        avg = fd.average_daily,
        day = fd.busiest_day,
        hour = fd.highest_hour,
        wd = record.peak_hours.weekdays.join(", "),
        we = record.peak_hours.weekends.join(", "),
        density = ci.density,
        players = ci.major_players.join(", "),
        traffic = ci.comparative_traffic,
    )
}

fn summarize_tool_output(content: &str) -> String {
    if let Ok(record) = serde_json::from_str::<FootprintRecord>(content) {
        return render_report(&record);
    }
    let reason = serde_json::from_str::<serde_json::Value>(content)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| content.to_string());
    format!("No footfall data is available for this request ({reason}).")
}

/// API キーなしで動かすためのバックエンド
///
/// 質問でフットプリントツールを1回呼び、その出力をそのままレポートする。
pub fn offline_model() -> ScriptedChatModel {
    ScriptedChatModel::new([
        ScriptStep::Respond(Arc::new(|messages: &[Message]| {
            let query = messages
                .iter()
                .rev()
                .find_map(|m| match m {
                    Message::User { content } => Some(content.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            let arguments = serde_json::json!({ "query": query }).to_string();
            AssistantMessage::with_tool_calls(
                "",
                vec![ToolInvocationRequest::new("call_1", RETAIL_FOOTPRINT_TOOL, arguments)],
            )
        })),
        ScriptStep::Respond(Arc::new(|messages: &[Message]| {
            let text = messages
                .iter()
                .rev()
                .find_map(|m| match m {
                    Message::ToolResult(r) => Some(summarize_tool_output(&r.content)),
                    _ => None,
                })
                .unwrap_or_else(|| "No tool output was received.".to_string());
            AssistantMessage::text(text)
        })),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline() -> RetailFootfallAnalyzer {
        RetailFootfallAnalyzer::with_model(Arc::new(offline_model()), AnalyzerConfig::default()).unwrap()
    }

    #[test]
    fn creation_without_credential_fails() {
        let cfg = AnalyzerConfig { api_key: Some(String::new()), ..AnalyzerConfig::default() };
        let err = RetailFootfallAnalyzer::new_with_lookup(cfg, |_| None).err();
        assert_eq!(err, Some(ConfigError::MissingCredential));
    }

    #[test]
    fn credential_found_through_lookup() {
        let lookup = |key: &str| (key == crate::config::API_KEY_ENV).then(|| "sk-from-lookup".to_string());
        assert!(RetailFootfallAnalyzer::new_with_lookup(AnalyzerConfig::new(), lookup).is_ok());
    }

    #[test]
    fn explicit_key_builds_openai_analyzer() {
        let analyzer = RetailFootfallAnalyzer::new(AnalyzerConfig::new().with_api_key("sk-test")).unwrap();
        assert_eq!(analyzer.config().model, "gpt-4o-mini");
        assert_eq!(analyzer.tool_names(), vec![RETAIL_FOOTPRINT_TOOL]);
        assert!(analyzer.system_prompt().starts_with("You are a retail analyst"));
    }

    #[test]
    fn offline_marathahalli_report() {
        let result = offline().analyze_blocking(DEFAULT_QUERY);
        let report = result.report().expect("completed");
        assert!(report.final_answer.contains("Marathahalli, Bangalore"));
        assert!(report.final_answer.contains("1250"));
        assert_eq!(report.iterations, 2);
    }

    #[test]
    fn offline_unknown_location_acknowledges_missing_data() {
        let result = offline().analyze_blocking("How busy is Jayanagar?");
        assert!(result.is_completed());
        assert!(result.text().contains("No footfall data is available"));
    }
}
