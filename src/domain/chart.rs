// Chart data domain models
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Line,
    Area,
}

/// Load status of one registered chart.
///
/// `Init` is only seen before the first fetch. Every trigger moves through `Loading`
/// to one of the settled states and there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartStatus {
    Init,
    Loading,
    Ok,
    Empty,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateValues {
    pub total: f64,
    pub max: f64,
    pub min: f64,
    pub avg: f64,
    pub current: f64,
}

/// One rendered line: a dense value array aligned to the chart time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub data: Vec<Option<f64>>,
    pub color: String,
    pub fill: bool,
    pub aggregate_values: AggregateValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub kind: ChartKind,
    pub labels: Vec<String>,
    pub times: Vec<i64>,
    pub interval: i64,
    pub datasets: Vec<Dataset>,
}

/// Status transition published to chart observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEvent {
    pub chart_id: String,
    pub status: ChartStatus,
    pub filter_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ChartData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read model of a registered chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartView {
    pub id: String,
    pub kind: ChartKind,
    pub status: ChartStatus,
    pub filter_version: u64,
    pub dropped_triggers: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ChartData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One row of the chart listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSummary {
    pub id: String,
    pub status: ChartStatus,
    pub filter_version: u64,
}
