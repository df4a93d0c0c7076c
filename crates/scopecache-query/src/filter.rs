//! Console filter expressions and list query parameters

use crate::page::PageRange;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Filter operator as sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Equality (`eq`); a list value matches any element
    Eq,
    /// Membership (`in`)
    In,
    /// Exclusion (`not_in`)
    NotIn,
    /// Substring match (`contain`)
    Contain,
}

/// One `{k, v, o}` filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Field name
    pub k: String,
    /// Operand
    pub v: Value,
    /// Operator
    pub o: FilterOp,
}

impl Filter {
    /// Create a filter
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<Value>, op: FilterOp) -> Self {
        Self {
            k: key.into(),
            v: value.into(),
            o: op,
        }
    }

    /// `key` is neither null nor empty
    #[must_use]
    pub fn present(key: impl Into<String>) -> Self {
        Self::new(key, json!([null, ""]), FilterOp::NotIn)
    }

    /// `key` is one of `values`
    #[must_use]
    pub fn any_of<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<Value> = values.into_iter().map(|v| Value::String(v.into())).collect();
        Self::new(key, Value::Array(values), FilterOp::In)
    }
}

/// Body of the `query` object sent to list-style verbs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiQuery {
    /// Filters, combined with AND
    #[serde(rename = "filter", default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    /// Fields to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<Vec<String>>,
    /// Distinct field (stat verbs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<String>,
    /// Page window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageRange>,
}

impl ApiQuery {
    /// Empty query
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With an extra filter
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// With returned fields
    #[must_use]
    pub fn with_only(mut self, only: Vec<String>) -> Self {
        self.only = Some(only);
        self
    }

    /// With distinct field
    #[must_use]
    pub fn with_distinct(mut self, distinct: impl Into<String>) -> Self {
        self.distinct = Some(distinct.into());
        self
    }

    /// With page window
    #[must_use]
    pub fn with_page(mut self, page: PageRange) -> Self {
        self.page = Some(page);
        self
    }

    /// `{"query": {...}}` request parameters
    #[must_use]
    pub fn into_params(self) -> Value {
        json!({ "query": self })
    }
}
