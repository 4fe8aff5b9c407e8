// Query target domain model
use serde::{Deserialize, Serialize};

/// One chart data request: the database to run against, the query (raw template or
/// structured form) and the URL parameters folded into its where-clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTarget {
    #[serde(default)]
    pub db: Option<String>,
    pub sql: QuerySource,
    #[serde(default, alias = "watch_keys")]
    pub watch_keys: Vec<String>,
}

impl QueryTarget {
    pub fn new(db: impl Into<String>, sql: QuerySource, watch_keys: Vec<String>) -> Self {
        Self {
            db: Some(db.into()),
            sql,
            watch_keys,
        }
    }

    /// Database name if present and non-blank. Targets without one are never sent.
    pub fn database(&self) -> Option<&str> {
        self.db.as_deref().map(str::trim).filter(|db| !db.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuerySource {
    Raw(String),
    Structured(StructuredQuery),
}

impl QuerySource {
    pub fn raw(sql: impl Into<String>) -> Self {
        QuerySource::Raw(sql.into())
    }

    /// Query-language text for this source, before templating and filtering.
    pub fn to_sql(&self) -> String {
        match self {
            QuerySource::Raw(sql) => sql.clone(),
            QuerySource::Structured(query) => query.to_sql(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub metric: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default, alias = "group_by")]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

impl StructuredQuery {
    pub fn to_sql(&self) -> String {
        let mut sql = format!("select {} from '{}'", self.fields.join(","), self.metric);
        if let Some(ns) = self.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            sql.push_str(&format!(" on '{}'", ns));
        }
        if let Some(cond) = self.condition.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            sql.push_str(" where ");
            sql.push_str(cond);
        }
        if !self.group_by.is_empty() {
            sql.push_str(" group by ");
            sql.push_str(&self.group_by.join(","));
        }
        sql
    }
}
