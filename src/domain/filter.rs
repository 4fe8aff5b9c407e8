// URL filter state domain model
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Value of one URL parameter. Repeated keys in a query string become `Multi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(String),
    Multi(Vec<String>),
}

impl FilterValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            FilterValue::Single(v) => vec![v.as_str()],
            FilterValue::Multi(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    /// Flat text form used by templates: values joined with `,`.
    pub fn joined(&self) -> String {
        self.values().join(",")
    }

    fn push(&mut self, value: String) {
        match self {
            FilterValue::Single(first) => {
                *self = FilterValue::Multi(vec![std::mem::take(first), value]);
            }
            FilterValue::Multi(vs) => vs.push(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterParams(BTreeMap<String, FilterValue>);

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a URL query string (`node=n1&node=n2&from=now()-1h`). A leading `?` is
    /// ignored, pairs without a value or with an empty value are skipped.
    pub fn from_query_string(query: &str) -> Self {
        let mut params = Self::new();
        for pair in query.trim_start_matches('?').split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let key = decode_component(key);
            let value = decode_component(value);
            if key.is_empty() || value.is_empty() {
                continue;
            }
            params.append(key, value);
        }
        params
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FilterValue) {
        self.0.insert(key.into(), value);
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        match self.0.entry(key.into()) {
            Entry::Occupied(mut existing) => existing.get_mut().push(value),
            Entry::Vacant(slot) => {
                slot.insert(FilterValue::Single(value));
            }
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.0.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    let decoded = urlencoding::decode(&raw).map(|d| d.into_owned());
    decoded.unwrap_or(raw)
}

/// Versioned snapshot of the URL filter state. The version increases by one on
/// every published change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSnapshot {
    pub version: u64,
    pub params: FilterParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string() {
        let params = FilterParams::from_query_string("?node=n1&node=n2&from=now()-1h&to=&db=_internal");

        assert_eq!(
            params.get("node"),
            Some(&FilterValue::Multi(vec!["n1".to_string(), "n2".to_string()]))
        );
        assert_eq!(params.get("from"), Some(&FilterValue::Single("now()-1h".to_string())));
        assert_eq!(params.get("to"), None);
        assert_eq!(params.get("db").map(FilterValue::joined), Some("_internal".to_string()));
    }

    #[test]
    fn test_parse_decodes_components() {
        let params = FilterParams::from_query_string("from=2024-01-01%2010%3A00%3A00&host=a+b&novalue");

        assert_eq!(params.get("from").unwrap().joined(), "2024-01-01 10:00:00");
        assert_eq!(params.get("host").unwrap().joined(), "a b");
        assert_eq!(params.iter().count(), 2);
    }

    #[test]
    fn test_multi_value_serializes_as_array() {
        let mut params = FilterParams::new();
        params.append("node", "n1");
        params.append("node", "n2");
        params.append("from", "now()-1h");

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, serde_json::json!({"from": "now()-1h", "node": ["n1", "n2"]}));
    }
}
