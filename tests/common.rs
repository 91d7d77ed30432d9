#![allow(dead_code)]

use std::sync::Mutex;

use footfall_analyzer::config::API_KEY_ENV;
use once_cell::sync::Lazy;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// テスト用ロギング。最初に触れたときに一度だけ組み立てる。
/// ガードは static に置いてプロセス終了までファイル出力を生かす。
static TEST_LOGGING: Lazy<Mutex<Option<WorkerGuard>>> = Lazy::new(|| {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("footfall=debug,openai=debug,info"));
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily("logs", "footfall-tests.log"));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(target: "footfall", "test logging ready");
    }
    Mutex::new(Some(guard))
});

/// `.env` とロギングを準備する（何度呼んでもよい）
pub fn init() {
    Lazy::force(&TEST_LOGGING);
}

/// ライブテスト用: キーがなければ true を返して呼び出し側で早期 return
pub fn skip_if_no_api_key() -> bool {
    let missing = std::env::var(API_KEY_ENV).map_or(true, |k| k.trim().is_empty());
    if missing {
        tracing::warn!(target: "footfall", "{API_KEY_ENV} not set; skipping live test");
    }
    missing
}
