pub mod analyzer;

pub use analyzer::{offline_model, render_report, RetailFootfallAnalyzer, DEFAULT_QUERY, DEFAULT_SYSTEM_PROMPT};
