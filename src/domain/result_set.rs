// Backend result set domain model
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tabular result returned by the backend `/exec` endpoint.
///
/// Times and interval are epoch milliseconds. Field maps are sparse: a grid point
/// without data has no entry at all.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    #[serde(default)]
    pub metric_name: String,
    pub start_time: i64,
    pub end_time: i64,
    pub interval: i64,
    #[serde(default)]
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub fields: BTreeMap<String, BTreeMap<i64, f64>>,
}

/// Upper bound on points per series; larger grids are rejected as invalid results.
pub const MAX_GRID_POINTS: usize = 100_000;

impl ResultSet {
    /// Number of grid points from `start_time` to `end_time` inclusive, or `None` when the
    /// range or interval cannot describe a grid of at most [`MAX_GRID_POINTS`].
    pub fn grid_len(&self) -> Option<usize> {
        if self.interval <= 0 {
            return None;
        }
        let span = self.end_time.checked_sub(self.start_time)?;
        if span < 0 {
            return None;
        }
        let len = usize::try_from(span / self.interval).ok()?.checked_add(1)?;
        (len <= MAX_GRID_POINTS).then_some(len)
    }

    /// Grid timestamps, `start_time + k * interval` up to and including `end_time`.
    pub fn grid(&self) -> impl Iterator<Item = i64> + '_ {
        let len = self.grid_len().unwrap_or(0);
        (0..len).map(move |k| self.start_time + k as i64 * self.interval)
    }

    /// True when no series carries any field.
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.fields.is_empty())
    }
}

impl Series {
    /// Display group of a series: the bare value for one tag, `k1:v1,k2:v2` for several
    /// (ordered by key), empty without tags.
    pub fn group_label(&self) -> String {
        match self.tags.len() {
            0 => String::new(),
            1 => self.tags.values().next().cloned().unwrap_or_default(),
            _ => self
                .tags
                .iter()
                .map(|(k, v)| format!("{}:{}", k, v))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_backend_payload() {
        let json = r#"{
            "metricName": "cpu",
            "startTime": 0,
            "endTime": 400,
            "interval": 100,
            "series": [{"tags": {"node": "n1"}, "fields": {"cpu": {"100": 10, "300": 30.5}}}]
        }"#;
        let rs: ResultSet = serde_json::from_str(json).unwrap();

        assert_eq!(rs.metric_name, "cpu");
        let points = &rs.series[0].fields["cpu"];
        assert_eq!(points.get(&100), Some(&10.0));
        assert_eq!(points.get(&300), Some(&30.5));
        assert_eq!(points.get(&200), None);
    }

    #[test]
    fn test_grid() {
        let rs = ResultSet {
            start_time: 0,
            end_time: 450,
            interval: 100,
            ..Default::default()
        };
        assert_eq!(rs.grid_len(), Some(5));
        assert_eq!(rs.grid().collect::<Vec<_>>(), vec![0, 100, 200, 300, 400]);

        let bad = ResultSet {
            start_time: 10,
            end_time: 0,
            interval: 100,
            ..Default::default()
        };
        assert_eq!(bad.grid_len(), None);
        assert_eq!(bad.grid().count(), 0);
    }

    #[test]
    fn test_grid_rejects_overflowing_and_huge_ranges() {
        let overflow = ResultSet {
            start_time: i64::MIN,
            end_time: 100,
            interval: 100,
            ..Default::default()
        };
        assert_eq!(overflow.grid_len(), None);

        let huge = ResultSet {
            start_time: 0,
            end_time: i64::MAX,
            interval: 1,
            ..Default::default()
        };
        assert_eq!(huge.grid_len(), None);

        let at_limit = ResultSet {
            start_time: 0,
            end_time: (MAX_GRID_POINTS as i64 - 1) * 10,
            interval: 10,
            ..Default::default()
        };
        assert_eq!(at_limit.grid_len(), Some(MAX_GRID_POINTS));
    }

    #[test]
    fn test_group_label() {
        let mut series = Series::default();
        assert_eq!(series.group_label(), "");

        series.tags.insert("node".to_string(), "n1".to_string());
        assert_eq!(series.group_label(), "n1");

        series.tags.insert("db".to_string(), "_internal".to_string());
        assert_eq!(series.group_label(), "db:_internal,node:n1");
    }
}
