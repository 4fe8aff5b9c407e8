// Result-to-series transformer - sparse result sets to dense chart datasets
use crate::application::error::PipelineError;
use crate::domain::chart::{AggregateValues, ChartData, ChartKind, Dataset};
use crate::domain::result_set::ResultSet;
use chrono::{FixedOffset, Offset, TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

const FIVE_MINUTES_MS: i64 = 5 * 60 * 1000;

pub const DEFAULT_PALETTE: [&str; 10] = [
    "#7cb5ec", "#434348", "#90ed7d", "#f7a35c", "#8085e9", "#f15c80", "#e4d354", "#2b908f",
    "#f45b5b", "#91e8e1",
];

/// How a grid point with no value is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapFill {
    /// `0`, indistinguishable from a real zero.
    #[default]
    Zero,
    /// An explicit gap (`null` on the wire).
    Null,
}

#[derive(Debug, Clone)]
pub struct SeriesTransformer {
    gap_fill: GapFill,
    palette: Vec<String>,
    offset: FixedOffset,
}

impl Default for SeriesTransformer {
    fn default() -> Self {
        Self::new(GapFill::default(), Vec::new(), Utc.fix())
    }
}

impl SeriesTransformer {
    /// An empty palette falls back to [`DEFAULT_PALETTE`].
    pub fn new(gap_fill: GapFill, palette: Vec<String>, offset: FixedOffset) -> Self {
        let palette = if palette.is_empty() {
            DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect()
        } else {
            palette
        };
        Self {
            gap_fill,
            palette,
            offset,
        }
    }

    /// Build chart data from one or more result sets (one per chart target).
    ///
    /// Returns `Ok(None)` when there is nothing to draw. The time axis comes from the
    /// first result set that has series, and every dataset is filled against that axis,
    /// so points of later result sets off the axis are dropped. Colors restart from the
    /// first palette entry on every call.
    pub fn transform(
        &self,
        results: &[ResultSet],
        kind: ChartKind,
    ) -> Result<Option<ChartData>, PipelineError> {
        let mut axis: Option<(Vec<i64>, Vec<String>, i64)> = None;
        let mut datasets = Vec::new();
        let mut color_idx = 0usize;

        for rs in results.iter().filter(|rs| !rs.is_empty()) {
            if rs.grid_len().is_none() {
                return Err(PipelineError::InvalidResult(format!(
                    "metric {}: start={} end={} interval={}",
                    rs.metric_name, rs.start_time, rs.end_time, rs.interval
                )));
            }
            let (times, _, _) = &*axis.get_or_insert_with(|| {
                let times: Vec<i64> = rs.grid().collect();
                let labels = self.axis_labels(rs.start_time, rs.end_time, &times);
                (times, labels, rs.interval)
            });

            for series in &rs.series {
                let group = series.group_label();
                for (field, points) in &series.fields {
                    let (data, aggregate_values) = self.fill(times, points);
                    datasets.push(Dataset {
                        label: dataset_label(&group, field, series.fields.len()),
                        data,
                        color: self.palette[color_idx % self.palette.len()].clone(),
                        fill: kind == ChartKind::Area,
                        aggregate_values,
                    });
                    color_idx += 1;
                }
            }
        }

        Ok(axis.map(|(times, labels, interval)| ChartData {
            kind,
            labels,
            times,
            interval,
            datasets,
        }))
    }

    fn fill(&self, times: &[i64], points: &BTreeMap<i64, f64>) -> (Vec<Option<f64>>, AggregateValues) {
        let gap = match self.gap_fill {
            GapFill::Zero => Some(0.0),
            GapFill::Null => None,
        };
        let mut data = Vec::with_capacity(times.len());
        let mut agg = AggregateValues::default();
        let mut count = 0usize;

        for t in times {
            match points.get(t) {
                Some(&value) => {
                    if count == 0 {
                        agg.max = value;
                        agg.min = value;
                    } else {
                        agg.max = agg.max.max(value);
                        agg.min = agg.min.min(value);
                    }
                    agg.total += value;
                    agg.current = value;
                    count += 1;
                    data.push(Some(value));
                }
                None => data.push(gap),
            }
        }

        if count > 0 {
            agg.avg = agg.total / count as f64;
        }
        (data, agg)
    }

    fn axis_labels(&self, start: i64, end: i64, times: &[i64]) -> Vec<String> {
        let format = self.label_format(start, end);
        times
            .iter()
            .map(|&t| match self.offset.timestamp_millis_opt(t).single() {
                Some(dt) => dt.format(format).to_string(),
                None => t.to_string(),
            })
            .collect()
    }

    fn label_format(&self, start: i64, end: i64) -> &'static str {
        let day = |t: i64| {
            self.offset
                .timestamp_millis_opt(t)
                .single()
                .map(|dt| dt.date_naive())
        };
        if day(start) != day(end) {
            "%m/%d %H:%M"
        } else if end - start > FIVE_MINUTES_MS {
            "%H:%M"
        } else {
            "%H:%M:%S"
        }
    }
}

fn dataset_label(group: &str, field: &str, field_count: usize) -> String {
    if group.is_empty() {
        field.to_string()
    } else if field_count == 1 {
        group.to_string()
    } else {
        format!("{}/{}", group, field)
    }
}
