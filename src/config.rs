//! アナライザ設定と定数

use std::time::Duration;
use thiserror::Error;

/// 認証情報を読む環境変数名
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// 既定のモデル名
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// 既定のループ上限（モデル呼び出し回数）
pub const DEFAULT_MAX_ITERATIONS: usize = 8;

/// アナライザ構築時の設定エラー（致命的）
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("OpenAI API key not found. Provide it explicitly or set the OPENAI_API_KEY environment variable.")]
    MissingCredential,
    #[error("temperature must be within [0, 2], got {0}")]
    InvalidTemperature(f32),
    #[error("invalid value for {key}: {value}")]
    InvalidSetting { key: String, value: String },
    #[error("tool already registered: {0}")]
    DuplicateTool(String),
}

/// アナライザ設定
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// 明示的に渡された API キー（None なら環境変数を参照）
    pub api_key: Option<String>,
    /// OpenAI APIモデル名
    pub model: String,
    /// 応答のランダム性 [0, 2]
    pub temperature: f32,
    /// 最大トークン数（4o系）
    pub max_tokens: u32,
    /// 最大補完トークン数（5系）
    pub max_completion_tokens: u32,
    /// 1回の analyze で許すモデル呼び出しの上限
    pub max_iterations: usize,
    /// モデル呼び出し1回あたりのタイムアウト
    pub request_timeout: Duration,
    /// analyze 全体の締め切り
    pub run_timeout: Option<Duration>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 2000,
            max_completion_tokens: 2000,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            request_timeout: Duration::from_secs(60),
            run_timeout: None,
        }
    }
}

impl AnalyzerConfig {
    /// 新しい設定インスタンスを作成
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// 既定値を環境変数 `FOOTFALL_*` で上書きして作成
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`from_env`](Self::from_env) と同じだが `lookup` 経由で読む
    ///
    /// # Arguments
    /// * `lookup` - 環境変数の代わりに使う検索関数
    ///
    /// # Returns
    /// 検証済みの設定、または `ConfigError`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.api_key = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty());
        if let Some(model) = lookup("FOOTFALL_MODEL") {
            cfg.model = model;
        }
        if let Some(raw) = lookup("FOOTFALL_TEMPERATURE") {
            cfg.temperature = parse_setting("FOOTFALL_TEMPERATURE", &raw)?;
        }
        if let Some(raw) = lookup("FOOTFALL_MAX_ITERATIONS") {
            cfg.max_iterations = parse_setting("FOOTFALL_MAX_ITERATIONS", &raw)?;
        }
        if let Some(raw) = lookup("FOOTFALL_RUN_TIMEOUT_SECS") {
            let secs: u64 = parse_setting("FOOTFALL_RUN_TIMEOUT_SECS", &raw)?;
            cfg.run_timeout = Some(Duration::from_secs(secs));
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// 認証情報以外の値の範囲を検証する
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "max_iterations".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// 明示キー → 環境変数 の順で認証情報を解決する。
    /// プロセス環境は書き換えない。
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        self.resolve_api_key_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_api_key_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()))
            .ok_or(ConfigError::MissingCredential)
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidSetting {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
