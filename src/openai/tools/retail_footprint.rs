//! Mock retail footprint data source.
//!
//! Stands in for a real footfall API: a keyword lookup over two sample
//! locations. Swap [`build_retail_footprint_tool`] for a network-backed
//! `ToolDefinition` with the same name to use real data.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::openai::tools::{ToolDefinition, ToolParametersBuilder};

pub const RETAIL_FOOTPRINT_TOOL: &str = "retail_footprint_api";

pub const NO_DATA_ERROR: &str = "No specific data available for this location";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakHours {
    pub weekdays: Vec<String>,
    pub weekends: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootfallData {
    pub average_daily: u32,
    pub highest_hour: String,
    pub busiest_day: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorInsights {
    pub density: String,
    pub major_players: Vec<String>,
    pub comparative_traffic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootprintRecord {
    pub location: String,
    pub peak_hours: PeakHours,
    pub footfall_data: FootfallData,
    pub competitor_insights: CompetitorInsights,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn marathahalli() -> FootprintRecord {
    FootprintRecord {
        location: "Marathahalli, Bangalore".into(),
        peak_hours: PeakHours {
            weekdays: strings(&["6PM-8PM"]),
            weekends: strings(&["11AM-2PM", "5PM-9PM"]),
        },
        footfall_data: FootfallData {
            average_daily: 1250,
            highest_hour: "6PM-7PM".into(),
            busiest_day: "Saturday".into(),
        },
        competitor_insights: CompetitorInsights {
            density: "High".into(),
            major_players: strings(&["Central", "Lifestyle", "Max"]),
            comparative_traffic: "25% higher during evening hours".into(),
        },
    }
}

fn pune() -> FootprintRecord {
    FootprintRecord {
        location: "Pune, Maharashtra".into(),
        peak_hours: PeakHours {
            weekdays: strings(&["5PM-7PM"]),
            weekends: strings(&["12PM-3PM", "6PM-8PM"]),
        },
        footfall_data: FootfallData {
            average_daily: 980,
            highest_hour: "6PM-7PM".into(),
            busiest_day: "Sunday".into(),
        },
        competitor_insights: CompetitorInsights {
            density: "Medium".into(),
            major_players: strings(&["Westside", "Shoppers Stop", "Pantaloons"]),
            comparative_traffic: "15% higher during weekend evenings".into(),
        },
    }
}

/// 大文字小文字を区別しないキーワード検索（Marathahalli を先に見る）
pub fn lookup_footprint(query: &str) -> Option<FootprintRecord> {
    let q = query.to_lowercase();
    if q.contains("marathahalli") {
        Some(marathahalli())
    } else if q.contains("pune") {
        Some(pune())
    } else {
        None
    }
}

/// レコードの JSON、未知の場所なら `{"error": ...}`
pub fn query_retail_footprint(query: &str) -> color_eyre::Result<Value> {
    info!(target: "footfall", query = %query, "retail_footprint_query");
    match lookup_footprint(query) {
        Some(record) => Ok(serde_json::to_value(record)?),
        None => Ok(json!({ "error": NO_DATA_ERROR })),
    }
}

pub fn build_retail_footprint_tool() -> ToolDefinition {
    let parameters = ToolParametersBuilder::new_object()
        .add_string("query", Some("A specific request for retail footprint data, including the location"))
        .required("query")
        .additional_properties(false)
        .build();

    ToolDefinition::new(
        RETAIL_FOOTPRINT_TOOL,
        "Get retail footprint data including peak hours, footfall patterns, and competitor insights for specific locations",
        parameters,
        Arc::new(|args: &Value| {
            let query = args
                .get("query")
                .and_then(|v| v.as_str())
                .ok_or_else(|| color_eyre::eyre::eyre!("Invalid or missing 'query' parameter"))?;
            query_retail_footprint(query)
        }),
    )
}
