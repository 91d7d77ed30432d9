//! Tools module aggregator.
//!
//! `core` holds the tool definition, schema builder and registry; each data
//! source lives in its own file and exposes a `build_*_tool` constructor.

mod core; // core definitions: ToolDefinition, ToolParameters, ToolRegistry
mod retail_footprint; // mock footfall data source

pub use self::core::{
    ToolDefinition,
    ToolHandler,
    ToolParameters,
    ToolParametersBuilder,
    ToolRegistry,
    ToolRegistryBuilder,
};
pub use retail_footprint::{
    build_retail_footprint_tool,
    lookup_footprint,
    query_retail_footprint,
    CompetitorInsights,
    FootfallData,
    FootprintRecord,
    PeakHours,
    NO_DATA_ERROR,
    RETAIL_FOOTPRINT_TOOL,
};

/// 既定のツール一式（小売フットプリントツール）を持つレジストリ
pub fn default_registry() -> Result<ToolRegistry, crate::config::ConfigError> {
    Ok(ToolRegistry::builder()
        .register(build_retail_footprint_tool())?
        .build())
}
