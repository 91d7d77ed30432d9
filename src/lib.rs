//! footfall_analyzer
//!
//! 小売フットフォールに関する質問へ、モックツールと言語モデルの往復で答えるエージェント。
//! 中心は `openai::call::LoopController`（モデル → ツール → モデル のループ）。

pub mod config;
pub mod openai;
pub mod services;

pub use config::{AnalyzerConfig, ConfigError};
pub use openai::{LoopEvent, RunErrorKind, RunResult};
pub use services::RetailFootfallAnalyzer;

// Ensure .env is loaded for tests before anything else runs in the test process.
#[cfg(test)]
#[ctor::ctor]
fn load_dotenv_for_tests() {
    let _ = dotenvy::dotenv();
}
