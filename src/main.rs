use std::sync::Arc;

use color_eyre::Result;
use color_eyre::eyre::eyre;
use footfall_analyzer::services::{offline_model, DEFAULT_QUERY};
use footfall_analyzer::{AnalyzerConfig, RetailFootfallAnalyzer, RunResult};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "usage: footfall-analyzer [--offline] [QUERY...]";

/// コマンドライン引数
#[derive(Debug, PartialEq)]
struct Cli {
    offline: bool,
    query: String,
}

/// 引数を解釈する。`--help` なら `None`、未知のオプションはエラー。
fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Option<Cli>> {
    let mut offline = false;
    let mut words = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--offline" => offline = true,
            "-h" | "--help" => return Ok(None),
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(eyre!("unknown option: {flag}\n{USAGE}"));
            }
            _ => words.push(arg),
        }
    }
    let query = if words.is_empty() { DEFAULT_QUERY.to_string() } else { words.join(" ") };
    Ok(Some(Cli { offline, query }))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Load .env (optional) so OPENAI_API_KEY can live in a local file.
    let _ = dotenvy::dotenv();

    // stderr + daily rolling file; the guard must outlive every log call.
    let file_appender = rolling::daily("logs", "footfall.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    let cli = match parse_args(std::env::args().skip(1))? {
        Some(cli) => cli,
        None => {
            println!("{USAGE}");
            return Ok(());
        }
    };
    let Cli { offline, query } = cli;

    let config = AnalyzerConfig::from_env()?;
    let analyzer = if offline {
        RetailFootfallAnalyzer::with_model(Arc::new(offline_model()), config)?
    } else {
        RetailFootfallAnalyzer::new(config)?
    };

    tracing::info!(target: "footfall", offline, query = %query, "starting analysis");
    match analyzer.analyze(&query).await {
        RunResult::Completed(report) => {
            println!("\n--- Analysis Report ---");
            println!("{}", report.final_answer);
            Ok(())
        }
        RunResult::Failed(failure) => {
            eprintln!("Analysis failed ({}): {}", failure.kind, failure.message);
            Err(eyre!("analysis failed: {}", failure.kind))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn offline_flag_and_query_words() {
        let cli = parse_args(args(&["--offline", "pune", "malls"])).unwrap().unwrap();
        assert_eq!(cli, Cli { offline: true, query: "pune malls".to_string() });
    }

    #[test]
    fn no_words_uses_default_query() {
        let cli = parse_args(args(&[])).unwrap().unwrap();
        assert!(!cli.offline);
        assert_eq!(cli.query, DEFAULT_QUERY);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = parse_args(args(&["--ofline", "pune"])).unwrap_err();
        assert!(err.to_string().contains("unknown option: --ofline"));
    }

    #[test]
    fn help_prints_usage() {
        assert_eq!(parse_args(args(&["--help"])).unwrap(), None);
    }
}
